use serde::Serialize;
use thiserror::Error;

/// Failure markers returned by the analysis engine. Every variant serializes
/// to an object with an `error` field.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("unknown field `{name}`")]
    UnknownField { name: String },

    #[error("insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("period `{period}` has no records")]
    EmptyPeriod { period: String },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_serialize_with_marker_field() {
        let err = AnalysisError::InsufficientData {
            required: 3,
            actual: 2,
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "insufficient_data");
        assert_eq!(value["required"], 3);
        assert_eq!(value["actual"], 2);
    }

    #[test]
    fn display_names_the_missing_field() {
        let err = AnalysisError::UnknownField {
            name: "badge_count".to_string(),
        };
        assert_eq!(err.to_string(), "unknown field `badge_count`");
    }
}
