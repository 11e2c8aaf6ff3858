use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Missing driver parameter: {driver} requires {parameter}")]
    MissingDriverParameter { driver: String, parameter: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ForecastError {
    fn from(e: serde_json::Error) -> Self {
        ForecastError::SerializationError(e.to_string())
    }
}
