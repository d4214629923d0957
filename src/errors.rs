use color_eyre::Report;
use thiserror::Error;

/// Failure of a single lifecycle operation.
///
/// Every variant is scoped to the operation that produced it and is reported to the caller
/// together with the operation log.
#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    /// The requested port is not an integer in `1..=65535`.
    #[error("invalid port '{0}': expected an integer between 1 and 65535")]
    InvalidPort(String),

    /// The requested port is already bound on the host.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// A required request field is missing or empty.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The container runtime rejected a start.
    #[error("container runtime failed for '{container}': {message}")]
    Runtime { container: String, message: String },

    /// The module never accepted its configuration.
    #[error("module did not accept its configuration after {attempts} attempts: {last_error}")]
    Handshake { attempts: u32, last_error: String },

    /// No module with this id is registered.
    #[error("module {0} not found")]
    NotFound(String),

    /// The record store failed.
    #[error("record store failed: {0}")]
    Store(String),
}

/// Taxonomy class of a [`LifecycleError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Validation,
    Runtime,
    Handshake,
    NotFound,
    Store,
}

impl ErrorKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Handshake => "handshake",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store",
        }
    }
}

impl LifecycleError {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidPort(_)
            | LifecycleError::PortInUse(_)
            | LifecycleError::MissingField(_) => ErrorKind::Validation,
            LifecycleError::Runtime { .. } => ErrorKind::Runtime,
            LifecycleError::Handshake { .. } => ErrorKind::Handshake,
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::Store(_) => ErrorKind::Store,
        }
    }

    /// Converts a store report, keeping its whole context chain in the message.
    pub(crate) fn store(report: Report) -> Self {
        LifecycleError::Store(format!("{:#}", report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::{WrapErr, eyre};

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LifecycleError::InvalidPort("0".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(LifecycleError::PortInUse(80).kind(), ErrorKind::Validation);
        assert_eq!(
            LifecycleError::MissingField("name").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LifecycleError::Handshake {
                attempts: 10,
                last_error: "refused".into()
            }
            .kind()
            .as_str(),
            "handshake"
        );
        assert_eq!(
            LifecycleError::NotFound("x".into()).kind().as_str(),
            "not_found"
        );
    }

    #[test]
    fn test_store_error_keeps_context() {
        let report = Err::<(), _>(eyre!("disk I/O error"))
            .wrap_err("Failed to upsert module demo")
            .unwrap_err();

        let err = LifecycleError::store(report);
        let msg = err.to_string();
        assert!(msg.contains("Failed to upsert module demo"));
        assert!(msg.contains("disk I/O error"));
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
