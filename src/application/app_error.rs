use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    /// Transport or auth failure while talking to a gateway. Distinct from
    /// any status verdict: it never causes a payment state transition.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The owning account's gateway has no usable client configuration.
    #[error("Gateway not configured")]
    GatewayNotConfigured,

    /// Every candidate account was filtered out or excluded. Checkout must
    /// fail closed rather than leave a payment without an owning account.
    #[error("No payment account available")]
    NoAccountAvailable,

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    NotFound,
    GatewayUnavailable,
    GatewayNotConfigured,
    NoAccountAvailable,
    PaymentRejected,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
            ErrorCode::GatewayNotConfigured => "GATEWAY_NOT_CONFIGURED",
            ErrorCode::NoAccountAvailable => "NO_ACCOUNT_AVAILABLE",
            ErrorCode::PaymentRejected => "PAYMENT_REJECTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Database(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
