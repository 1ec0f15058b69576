use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Requested range is inverted, too wide, or outside valid timestamps.
    InvalidRange(String),
    /// A blocking schedule policy or booking rule rejected the operation.
    PolicyViolation { rule_type: String, detail: String },
    /// The proposed time collides with an existing booking.
    Conflict(Ulid),
    /// No resource of the requested type can cover the window; raised after
    /// the bounded allocation retry is exhausted.
    ResourceUnavailable { resource_type: String },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::PolicyViolation { rule_type, detail } => {
                write!(f, "policy violation ({rule_type}): {detail}")
            }
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::ResourceUnavailable { resource_type } => {
                write!(f, "no {resource_type} available for the requested window")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
