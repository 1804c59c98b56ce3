use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Gateway rejected the request: {0}")]
    GatewayError(String),
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),
    #[error("Webhook signature invalid")]
    SignatureInvalid,
    #[error("Effect application failed: {0}")]
    EffectApplicationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

impl PaymentError {
    /// Only a failed round-trip to the gateway is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnreachable(_))
    }

    /// The HTTP status an outer routing layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError(_) => 400,
            Self::SignatureInvalid => 401,
            Self::NotFound(_) => 404,
            Self::GatewayError(_) | Self::GatewayUnreachable(_) => 502,
            _ => 500,
        }
    }

    /// Message suitable for showing to the payer.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationError(reason) => format!("Invalid request: {}", reason),
            Self::NotFound(_) => "Payment not found".to_string(),
            Self::GatewayError(reason) => format!("The payment provider declined: {}", reason),
            Self::GatewayUnreachable(_) => {
                "The payment provider is unreachable, please try again".to_string()
            }
            Self::SignatureInvalid => "Invalid signature".to_string(),
            _ => "Something went wrong while processing the payment".to_string(),
        }
    }
}
