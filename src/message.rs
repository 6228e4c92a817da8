//! Negotiation messages and the hash chain over them
use super::types::{Currency, MessageId, NegotiationId, Price, TimeStamp, UserId};
use super::utils::chain_digest;

type EncodeError = minicbor::encode::Error<std::convert::Infallible>;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Plain conversation.
    #[n(0)]
    Message,
    /// A non-binding price suggestion.
    #[n(1)]
    Offer,
    #[n(2)]
    CounterOffer,
    #[n(3)]
    Accept,
    #[n(4)]
    Reject,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct NegotiationMessage {
    #[n(0)]
    pub id: MessageId,
    #[n(1)]
    pub negotiation_id: NegotiationId,
    #[n(2)]
    pub sender_id: UserId,
    #[n(3)]
    pub message_type: MessageType,
    #[n(4)]
    pub content: String,
    #[n(5)]
    pub price_offer: Option<Price>,
    #[n(6)]
    pub currency: Option<Currency>,
    #[n(7)]
    pub sequence: u64, // dense per negotiation, starting at 0
    #[n(8)]
    pub created_at: TimeStamp,
    #[n(9)]
    pub prev_digest: String,
    #[n(10)]
    pub digest: String, // sha256 over prev_digest and the cbor of this message with digest blank
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("Message {sequence} is out of order, expected {expected}")]
    OutOfOrder { sequence: u64, expected: u64 },
    #[error("Message {0} does not link to its predecessor")]
    BrokenLink(u64),
    #[error("Message {0} digest does not match its contents")]
    BadDigest(u64),
    #[error("Negotiation head digest does not match the last message")]
    HeadMismatch,
}

impl NegotiationMessage {
    /// Fills in `prev_digest` and `digest`, linking this message after `prev_digest`.
    pub(crate) fn seal(mut self, prev_digest: &str) -> Result<Self, EncodeError> {
        self.prev_digest = prev_digest.to_string();
        self.digest = self.compute_digest()?;
        Ok(self)
    }

    fn compute_digest(&self) -> Result<String, EncodeError> {
        let blank = Self {
            digest: String::new(),
            ..self.clone()
        };
        let body = minicbor::to_vec(&blank)?;
        Ok(chain_digest(&self.prev_digest, &body))
    }
}

/// Walks a log in sequence order and checks every link. Returns the head digest,
/// the empty string for an empty log.
pub fn verify_chain(messages: &[NegotiationMessage]) -> Result<String, ChainError> {
    let mut head = String::new();

    for (expected, message) in (0u64..).zip(messages) {
        if message.sequence != expected {
            return Err(ChainError::OutOfOrder {
                sequence: message.sequence,
                expected,
            });
        }
        if message.prev_digest != head {
            return Err(ChainError::BrokenLink(message.sequence));
        }
        match message.compute_digest() {
            Ok(digest) if digest == message.digest => head = digest,
            _ => return Err(ChainError::BadDigest(message.sequence)),
        }
    }

    Ok(head)
}
