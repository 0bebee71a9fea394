//! Backend speaking the hosted REST and object-storage APIs.
//!
//! Rows go through `{base}/rest/v1/{table}` with PostgREST-style filters;
//! rasters go to `{base}/storage/v1/object/{bucket}/{path}`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use scribe_core::{Attempt, AttemptId, AttemptStatus, OwnerId, PersistedStep, StepId, StepPatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::AttemptBackend;
use crate::error::BackendError;
use crate::transport::{parse_base_url, USER_AGENT};

const ATTEMPTS_TABLE: &str = "attempts";
const STEPS_TABLE: &str = "attempt_steps";
const PROBLEMS_TABLE: &str = "problems";

/// Step row as inserted; the backend assigns the id.
#[derive(Serialize)]
struct NewStepRow<'a> {
    attempt_id: AttemptId,
    step_index: u32,
    png_storage_path: &'a str,
    vector_json: &'a [scribe_core::Stroke],
}

#[derive(Deserialize)]
struct IdRow {
    id: StepId,
}

#[derive(Deserialize)]
struct ProblemRow {
    body: Option<String>,
}

/// REST backend client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base: Url,
    api_key: Option<String>,
    bucket: String,
}

impl HttpBackend {
    /// Create a client for the given backend base URL and storage bucket.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if the URL is malformed.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let base = parse_base_url(base_url).map_err(BackendError::InvalidUrl)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base,
            api_key,
            bucket: bucket.into(),
        })
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url, BackendError> {
        let mut url = self
            .base
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn object_url(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(&format!("storage/v1/object/{}/{}", self.bucket, path))
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key).header("apikey", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        debug!("Backend returned {}: {}", status, message);
        Err(match status.as_u16() {
            404 => BackendError::NotFound(message),
            409 => BackendError::Conflict(message),
            code => BackendError::Http {
                status: code,
                message,
            },
        })
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.table_url(table, filters)?;
        let response = self.send(self.http.get(url)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn patch(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<(), BackendError> {
        let url = self.table_url(table, filters)?;
        self.send(self.http.patch(url).json(body)).await?;
        Ok(())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl AttemptBackend for HttpBackend {
    async fn find_in_progress(&self, owner: &OwnerId) -> Result<Option<Attempt>, BackendError> {
        let rows: Vec<Attempt> = self
            .rows(
                ATTEMPTS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("user_id", eq(owner)),
                    ("status", eq("in_progress")),
                    ("order", "updated_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_attempt(
        &self,
        owner: &OwnerId,
        problem_id: Option<&str>,
    ) -> Result<Attempt, BackendError> {
        let url = self.table_url(ATTEMPTS_TABLE, &[("select", "*".to_string())])?;
        let body = json!({
            "user_id": owner,
            "status": AttemptStatus::InProgress,
            "problem_id": problem_id,
        });
        let request = self
            .http
            .post(url)
            .header("Prefer", "return=representation")
            .json(&body);
        let bytes = self.send(request).await?.bytes().await?;
        let rows: Vec<Attempt> = serde_json::from_slice(&bytes)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("created attempt not returned".into()))
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        unlink_problem: bool,
    ) -> Result<(), BackendError> {
        let mut body = json!({ "status": AttemptStatus::Completed });
        if unlink_problem {
            body["problem_id"] = serde_json::Value::Null;
        }
        self.patch(ATTEMPTS_TABLE, &[("id", eq(attempt_id))], &body)
            .await
    }

    async fn problem_body(&self, problem_id: &str) -> Result<Option<String>, BackendError> {
        let rows: Vec<ProblemRow> = self
            .rows(
                PROBLEMS_TABLE,
                &[("select", "body".to_string()), ("id", eq(problem_id))],
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.body))
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = self.object_url(path)?;
        let request = self
            .http
            .post(url)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        self.send(request).await?;
        Ok(())
    }

    async fn upsert_step(&self, row: &PersistedStep) -> Result<StepId, BackendError> {
        let url = self.table_url(
            STEPS_TABLE,
            &[
                ("on_conflict", "attempt_id,step_index".to_string()),
                ("select", "id".to_string()),
            ],
        )?;
        let body = NewStepRow {
            attempt_id: row.attempt_id,
            step_index: row.step_index,
            png_storage_path: &row.raster_path,
            vector_json: &row.vector_data,
        };
        let request = self
            .http
            .post(url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body);
        let bytes = self.send(request).await?.bytes().await?;
        let rows: Vec<IdRow> = serde_json::from_slice(&bytes)?;
        rows.into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| BackendError::NotFound("upserted step not returned".into()))
    }

    async fn update_step(&self, step_id: StepId, patch: &StepPatch) -> Result<(), BackendError> {
        if patch.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(patch)?;
        self.patch(STEPS_TABLE, &[("id", eq(step_id))], &body).await
    }

    async fn list_steps(&self, attempt_id: AttemptId) -> Result<Vec<PersistedStep>, BackendError> {
        self.rows(
            STEPS_TABLE,
            &[
                ("select", "*".to_string()),
                ("attempt_id", eq(attempt_id)),
                ("order", "step_index.asc".to_string()),
            ],
        )
        .await
    }

    async fn get_step(
        &self,
        attempt_id: AttemptId,
        step_index: u32,
    ) -> Result<Option<PersistedStep>, BackendError> {
        let rows: Vec<PersistedStep> = self
            .rows(
                STEPS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("attempt_id", eq(attempt_id)),
                    ("step_index", eq(step_index)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}
