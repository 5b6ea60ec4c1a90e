pub mod events;
pub mod identity;
pub mod inquiry;
pub mod offering;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod ticket;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
