use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("RPC error: {0}")]
    RpcError(#[from] ethers::providers::ProviderError),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Malformed upstream response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Notification rejected: {0}")]
    NotifyRejected(String),
}

impl GatewayError {
    /// Errors from chain or quote endpoints, as opposed to local failures.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            GatewayError::RpcError(_)
                | GatewayError::HttpError(_)
                | GatewayError::UpstreamStatus(_)
                | GatewayError::Timeout(_)
                | GatewayError::InvalidResponse(_)
                | GatewayError::JsonRpc { .. }
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(e.to_string())
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
