//! Client for the sync daemon's REST management interface.
//!
//! - [`executor`]: asynchronous request execution ([`RequestExecutor`]).
//! - [`probe`]: readiness polling and the "web GUI available" edge.
//! - [`bootstrap`]: the three-way startup fan-in.
//! - [`api`]: the [`RestApi`] facade over the cached configuration document.
//! - [`document`] / [`types`]: projections of daemon JSON into typed values.

pub mod api;
pub mod bootstrap;
pub mod document;
pub mod executor;
pub mod probe;
pub mod types;

pub use api::{ApiState, RestApi};
pub use bootstrap::{BootstrapReport, BootstrapStep};
pub use executor::{
    API_KEY_HEADER, ApiKey, ApiRequest, Completion, Method, RequestError, RequestExecutor,
    ReqwestExecutor,
};
pub use probe::{ProbeError, ReadinessProber, WebGuiAvailableListener};
pub use types::{
    Connection, Connections, LOCAL_NODE_CONNECTIONS, Node, Repository, Section, SystemInfo,
    Versioning,
};

/// Errors raised while interpreting daemon responses or the cached document.
///
/// Read accessors on [`RestApi`] log these and return a sentinel instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("REST API is not available yet ({0})")]
    NotAvailable(&'static str),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    #[error("missing field: {0}")]
    Missing(String),

    #[error("{0} is not a JSON {1}")]
    WrongType(String, &'static str),

    #[error("array values must be space-separated text, got {0}")]
    ArrayValueNotText(String),

    #[error("unknown configuration section: {0}")]
    UnknownSection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::WrongType("Nodes".to_string(), "array");
        assert_eq!(err.to_string(), "Nodes is not a JSON array");

        let err = ApiError::from(RequestError::Status {
            url: "http://h/rest/config".to_string(),
            status: 403,
        });
        assert_eq!(err.to_string(), "http://h/rest/config answered with HTTP 403");
    }
}
