pub mod drivers;
pub mod error;
pub mod forecast;
pub mod types;

pub use error::ForecastError;
pub use types::*;

/// Standard result type for all forecast-engine operations
pub type ForecastResult<T> = Result<T, ForecastError>;
