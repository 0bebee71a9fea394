//! Multi-line LaTeX handling.

const ROW_SEPARATOR: &str = "\\\\";

/// Collapse a possibly multi-line transcription to its last line.
///
/// Lines are separated by newlines or LaTeX row breaks (`\\`). Returns the
/// last non-empty trimmed line, or the trimmed input when there is none.
#[must_use]
pub fn last_line(latex: &str) -> String {
    let normalized = latex
        .replace("\r\n", ROW_SEPARATOR)
        .replace(['\r', '\n'], ROW_SEPARATOR);
    normalized
        .rsplit(ROW_SEPARATOR)
        .map(str::trim)
        .find(|part| !part.is_empty())
        .map_or_else(|| latex.trim().to_string(), str::to_string)
}
