use thiserror::Error;

/// Error taxonomy surfaced by the sessmesh core.
///
/// Callers of the router only ever observe the terminal classifications
/// `NoBackends` and `AllExhausted`; the per-attempt variants
/// (`Unreachable`, `ServerRejected`) circulate inside the failover loop
/// and are retained as the last cause.
#[derive(Error, Debug)]
pub enum SessmeshError {
    #[error("no backends registered")]
    NoBackends,

    #[error("all backends exhausted: {0}")]
    AllExhausted(String),

    #[error("backend at {address} unreachable: {cause}")]
    Unreachable { address: String, cause: String },

    #[error("backend {server_id} rejected request: {message}")]
    ServerRejected { server_id: String, message: String },

    #[error("unknown backend: {0}")]
    BackendUnknown(String),

    #[error("invalid cache capacity: the hot tier needs at least one slot")]
    CapacityInvalid,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessmeshError {
    /// Whether a failed attempt with this error should move the failover
    /// loop on to the next ring successor.
    ///
    /// Everything that can happen on a single attempt is worth another
    /// backend; only the terminal classifications are not.
    pub fn is_per_attempt(&self) -> bool {
        !matches!(
            self,
            SessmeshError::NoBackends
                | SessmeshError::AllExhausted(_)
                | SessmeshError::BackendUnknown(_)
                | SessmeshError::CapacityInvalid
        )
    }
}

pub type Result<T> = std::result::Result<T, SessmeshError>;
