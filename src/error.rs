use super::message::ChainError;
use super::request::RequestStatus;

/// Coarse classification of every [`EngineError`], as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    Conflict,
    Validation,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Caller is not permitted to {0}")]
    Unauthorized(String),
    #[error("Requesters cannot make offers on their own request")]
    SelfOffer,
    #[error("Request is not open for this action. Current status: {0:?}")]
    RequestNotOpen(RequestStatus),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Offerer already has a pending offer on this request")]
    DuplicatePendingOffer,
    #[error("Participant has already accepted in this negotiation")]
    DuplicateAccept,
    #[error("Negotiation expired through inactivity and has been closed")]
    NegotiationExpired,
    #[error("Concurrent update: {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("Negotiation log failed verification: {0}")]
    Corrupted(#[from] ChainError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    #[error("Operation failed")]
    OperationFailed,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("{field} exceeds the maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("Item requests must reference a catalog item")]
    MissingItem,
    #[error("Item quantity must be greater than zero")]
    NonPositiveQuantity,
    #[error("Price must be greater than zero")]
    NonPositivePrice,
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),
    #[error("A counter offer must carry a price")]
    MissingCounterPrice,
    #[error("Message content must not be empty")]
    EmptyMessage,
    #[error("Offers can only be moved to accepted, rejected or withdrawn")]
    IllegalOfferTarget,
    #[error("Malformed configuration value for {0}")]
    BadConfig(&'static str),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::SelfOffer | EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::RequestNotOpen(_)
            | EngineError::InvalidState(_)
            | EngineError::NegotiationExpired => ErrorKind::InvalidState,
            EngineError::DuplicatePendingOffer
            | EngineError::DuplicateAccept
            | EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Storage(_)
            | EngineError::Decode(_)
            | EngineError::Encode(_)
            | EngineError::Corrupted(_)
            | EngineError::Internal(_)
            | EngineError::OperationFailed => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_classify() {
        assert_eq!(EngineError::SelfOffer.kind(), ErrorKind::Validation);
        assert_eq!(EngineError::DuplicateAccept.kind(), ErrorKind::Conflict);
        assert_eq!(
            EngineError::RequestNotOpen(RequestStatus::Cancelled).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            EngineError::not_found("offer", "ofr1xyz").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::from(ValidationError::MissingItem).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn internal_errors_are_opaque_kind() {
        let err = EngineError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
