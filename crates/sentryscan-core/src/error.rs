//! Error taxonomy for SentryScan
//!
//! Kinds map to the surfaces they are reported at (see `sentryscan-server`
//! for the HTTP status mapping): `InputError`/`AuthError`/`PolicyError`
//! never retry; `ResolutionError` aborts the scan; `ProbeError` and
//! `EnrichmentError` are recorded inline and never abort a scan.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid port set: {0}")]
    InvalidPortSet(String),

    #[error("blocked target: {0}")]
    BlockedTarget(String),

    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("blocked after resolution: {0}")]
    BlockedAfterResolution(String),

    #[error("on cooldown until {0}")]
    OnCooldown(chrono::DateTime<chrono::Utc>),

    #[error("rate limited")]
    RateLimited,

    #[error("exceeds concurrency limit")]
    ExceedsConcurrency,

    #[error("denied: {0}")]
    Denied(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP-ish status class this error belongs to, per the error taxonomy
    /// table. Used by the server crate to map to a concrete status code.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Error::InvalidTarget(_) | Error::InvalidPortSet(_) => StatusClass::BadRequest,
            Error::Unauthorized(_) => StatusClass::Unauthorized,
            Error::BlockedTarget(_) | Error::Denied(_) => StatusClass::Policy,
            Error::OnCooldown(_) | Error::RateLimited | Error::ExceedsConcurrency => {
                StatusClass::RateLimited
            }
            Error::ResolutionFailed(_) | Error::BlockedAfterResolution(_) => {
                StatusClass::Resolution
            }
            Error::Cancelled => StatusClass::Cancelled,
            Error::Config(_) | Error::Storage(_) | Error::Internal(_) => StatusClass::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    Unauthorized,
    Policy,
    RateLimited,
    Resolution,
    Cancelled,
    Internal,
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML parse error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_class_mapping() {
        assert_eq!(
            Error::InvalidTarget("x".into()).status_class(),
            StatusClass::BadRequest
        );
        assert_eq!(Error::RateLimited.status_class(), StatusClass::RateLimited);
        assert_eq!(
            Error::Denied("x".into()).status_class(),
            StatusClass::Policy
        );
    }
}
