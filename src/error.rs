/// Failure to turn a dataset identifier into typed records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// The server answered with a non-success status.
    #[error("failed to fetch {identifier}: status {status}")]
    Network { identifier: String, status: u16 },

    /// The request never produced a response (connection refused, DNS, ...).
    #[error("failed to fetch {identifier}: {reason}")]
    Transport { identifier: String, reason: String },

    /// The payload did not match the dataset's schema.
    #[error("failed to parse {identifier}: {reason}")]
    Parse { identifier: String, reason: String },
}

impl DataError {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Network { identifier, .. }
            | Self::Transport { identifier, .. }
            | Self::Parse { identifier, .. } => identifier,
        }
    }

    pub(crate) fn parse(identifier: &str, reason: impl ToString) -> Self {
        Self::Parse {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether a retry could plausibly succeed. Schema mismatches never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { status, .. } => *status >= 500 || *status == 429,
            Self::Transport { .. } => true,
            Self::Parse { .. } => false,
        }
    }
}
