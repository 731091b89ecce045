//! Error types for the network migration crate.

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetmigErrorKind {
    /// Fabric client call failed before a task was created
    FabricError,
    /// Host, VM, switch or network not found
    NotFound,
    /// Port group / switch with that name already exists on the host
    AlreadyExists,
    /// Task reached the `error` state on the fabric
    TaskError,
    /// Task did not reach a terminal state within the wait policy
    Timeout,
    /// Port-group name does not follow the `switch|uplink|name` convention
    InvalidName,
    /// No distributed port group matches a VM's network (batch-fatal)
    UnmatchedPortGroup,
    /// Missing or invalid configuration value
    ConfigError,
    /// JSON / YAML parse error
    ParseError,
    /// File I/O error
    IoError,
    /// Run aborted by the operator
    Interrupted,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{kind:?}] {message}")]
pub struct NetmigError {
    pub kind: NetmigErrorKind,
    pub message: String,
}

impl NetmigError {
    pub fn new(kind: NetmigErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn fabric(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::FabricError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::AlreadyExists, msg)
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::TaskError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::Timeout, msg)
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::InvalidName, msg)
    }

    pub fn unmatched(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::UnmatchedPortGroup, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::ConfigError, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::ParseError, msg)
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::new(NetmigErrorKind::Interrupted, msg)
    }

    /// Whether this error stops the whole run rather than one entity.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self.kind,
            NetmigErrorKind::UnmatchedPortGroup | NetmigErrorKind::Interrupted
        )
    }
}

impl From<serde_json::Error> for NetmigError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

impl From<serde_yaml::Error> for NetmigError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::parse(format!("YAML parse error: {e}"))
    }
}

impl From<std::io::Error> for NetmigError {
    fn from(e: std::io::Error) -> Self {
        Self::new(NetmigErrorKind::IoError, format!("I/O error: {e}"))
    }
}

/// Convenience alias.
pub type NetmigResult<T> = Result<T, NetmigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = NetmigError::task("Port group already exists");
        assert_eq!(err.to_string(), "[TaskError] Port group already exists");
    }

    #[test]
    fn only_unmatched_and_interrupt_are_batch_fatal() {
        assert!(NetmigError::unmatched("x").is_batch_fatal());
        assert!(NetmigError::interrupted("x").is_batch_fatal());
        assert!(!NetmigError::task("x").is_batch_fatal());
        assert!(!NetmigError::not_found("x").is_batch_fatal());
    }

    #[test]
    fn json_errors_map_to_parse_kind() {
        let err: NetmigError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind, NetmigErrorKind::ParseError);
    }
}
