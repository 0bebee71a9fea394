//! Step validation client.

use std::sync::Arc;

use scribe_core::{ValidationResult, ValidationStatus};
use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceError;
use crate::retry::{run_with_retry, RetryConfig};
use crate::transport::FunctionTransport;

/// Body sent to the validation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    /// Previous step's text; absent for the first validated step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_latex: Option<String>,
    /// Current step's text.
    pub curr_latex: String,
    /// Problem statement.
    pub problem: String,
}

/// Classifies a step against the previous one and the problem.
#[derive(Clone)]
pub struct ValidationClient {
    transport: Arc<dyn FunctionTransport>,
    function: String,
    retry: RetryConfig,
}

impl ValidationClient {
    /// Create a client calling `function` through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn FunctionTransport>,
        function: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            function: function.into(),
            retry,
        }
    }

    /// Validate one step.
    ///
    /// # Errors
    ///
    /// Returns the last [`ServiceError`] once retries are exhausted,
    /// [`ServiceError::Timeout`] when a request exceeds its timeout, or
    /// [`ServiceError::InvalidResponse`] for an unknown status or missing reason.
    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ServiceError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let value = run_with_retry(&self.retry, "validation", |_| {
            self.transport.invoke(&self.function, body.clone())
        })
        .await?;

        parse_validation(&value)
    }
}

impl std::fmt::Debug for ValidationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationClient")
            .field("function", &self.function)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn parse_validation(value: &Value) -> Result<ValidationResult, ServiceError> {
    let raw = value
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidResponse("missing string `status`".into()))?;
    let status = ValidationStatus::parse(raw)
        .ok_or_else(|| ServiceError::InvalidResponse(format!("unknown status `{raw}`")))?;
    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidResponse("missing string `reason`".into()))?;
    let solver_metadata = value
        .get("solverMetadata")
        .filter(|m| !m.is_null())
        .cloned();

    Ok(ValidationResult {
        status,
        reason: reason.to_string(),
        solver_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = ValidationRequest {
            prev_latex: None,
            curr_latex: "x=2".into(),
            problem: "2x=4".into(),
        };
        assert_eq!(
            serde_json::to_value(&request).expect("json"),
            json!({"currLatex": "x=2", "problem": "2x=4"})
        );
    }

    #[test]
    fn test_parse_with_metadata() {
        let result = parse_validation(&json!({
            "status": "incorrect",
            "reason": "sign error",
            "solverMetadata": {"expected": "x=2"}
        }))
        .expect("ok");
        assert_eq!(result.status, ValidationStatus::Incorrect);
        assert_eq!(result.reason, "sign error");
        assert_eq!(result.solver_metadata, Some(json!({"expected": "x=2"})));
    }

    #[test]
    fn test_null_metadata_is_none() {
        let result = parse_validation(&json!({
            "status": "uncertain",
            "reason": "",
            "solverMetadata": null
        }))
        .expect("ok");
        assert!(result.solver_metadata.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for value in [
            json!({"reason": "r"}),
            json!({"status": "great", "reason": "r"}),
            json!({"status": "incorrect"}),
            json!({"status": "incorrect", "reason": 3}),
        ] {
            assert!(matches!(
                parse_validation(&value),
                Err(ServiceError::InvalidResponse(_))
            ));
        }
    }
}
