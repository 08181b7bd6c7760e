use std::fmt;

/// Machine-readable error codes for scripted callers and log scraping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MissingApiToken,
    SchemaLoadFailed,
    SchemaViolation,
    RemoteStatus,
    RemoteTimeout,
    RemoteTransport,
    RemoteDecode,
    UnresolvedInsert,
    LockContention,
    FileWriteFailed,
    SnapshotMissing,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MissingApiToken => "E1002",
            Self::SchemaLoadFailed => "E2001",
            Self::SchemaViolation => "E2002",
            Self::RemoteStatus => "E3001",
            Self::RemoteTimeout => "E3002",
            Self::RemoteTransport => "E3003",
            Self::RemoteDecode => "E3004",
            Self::UnresolvedInsert => "E4001",
            Self::LockContention => "E5001",
            Self::FileWriteFailed => "E5002",
            Self::SnapshotMissing => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MissingApiToken => "Todoist API token not configured",
            Self::SchemaLoadFailed => "Schema could not be loaded",
            Self::SchemaViolation => "Document does not match schema",
            Self::RemoteStatus => "Todoist rejected the sync request",
            Self::RemoteTimeout => "Todoist sync request timed out",
            Self::RemoteTransport => "Todoist sync request failed",
            Self::RemoteDecode => "Todoist response was not valid JSON",
            Self::UnresolvedInsert => "Insert reference names no ritual",
            Self::LockContention => "Lock contention",
            Self::FileWriteFailed => "File write failed",
            Self::SnapshotMissing => "No local Todoist snapshot",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the orchestra config.toml and retry."),
            Self::MissingApiToken => {
                Some("Set TODOIST_API_TOKEN or [todoist].api_token in config.toml.")
            }
            Self::SchemaLoadFailed => Some("Check the configured schema paths point at JSON Schema files."),
            Self::SchemaViolation => None,
            Self::RemoteStatus => Some("Check the API token and endpoint, then retry."),
            Self::RemoteTimeout => Some("Retry later or raise [todoist].timeout_secs."),
            Self::RemoteTransport => Some("Check network connectivity and retry."),
            Self::RemoteDecode => Some("Retry with `orchestra sync --full`."),
            Self::UnresolvedInsert => {
                Some("Rename the insert marker to match an existing ritual name exactly.")
            }
            Self::LockContention => Some("Retry after the other `orchestra` process finishes."),
            Self::FileWriteFailed => Some("Check disk space and write permissions."),
            Self::SnapshotMissing => Some("Run `orchestra sync` first."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
