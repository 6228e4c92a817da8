//! Negotiation engine: the bargaining log and bilateral agreement
use super::config::EngineConfig;
use super::error::{EngineError, EngineResult, ValidationError};
use super::lifecycle::{self, RequestEvent, Transition};
use super::message::{MessageType, NegotiationMessage};
use super::negotiation::{Negotiation, NegotiationStatus, Participants};
use super::store::{OrAbort, Store, TxResult, TxView, abort};
use super::types::{Currency, NegotiationId, Price, TimeStamp, validate_price};
use super::utils::{MESSAGE_HRP, new_uuid_to_bech32};
use chrono::Duration;
use tracing::{debug, info, warn};

/// A message as submitted by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub message_type: MessageType,
    pub content: String,
    pub price_offer: Option<Price>,
    pub currency: Option<String>,
}

impl MessageDraft {
    pub fn new(message_type: MessageType, content: &str) -> Self {
        Self {
            message_type,
            content: content.to_string(),
            price_offer: None,
            currency: None,
        }
    }
    pub fn message(content: &str) -> Self {
        Self::new(MessageType::Message, content)
    }
    pub fn counter_offer(price: Price) -> Self {
        Self::new(MessageType::CounterOffer, "").set_price(price)
    }
    pub fn accept() -> Self {
        Self::new(MessageType::Accept, "")
    }
    pub fn reject(reason: &str) -> Self {
        Self::new(MessageType::Reject, reason)
    }
    pub fn set_price(mut self, price: Price) -> Self {
        self.price_offer = Some(price);
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_string());
        self
    }

    fn validate(
        &self,
        config: &EngineConfig,
    ) -> Result<(Option<Price>, Option<Currency>), ValidationError> {
        if self.content.chars().count() > config.max_text_len {
            return Err(ValidationError::TooLong {
                field: "message",
                max: config.max_text_len,
            });
        }
        if self.message_type == MessageType::Message && self.content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if self.message_type == MessageType::CounterOffer && self.price_offer.is_none() {
            return Err(ValidationError::MissingCounterPrice);
        }
        let price = validate_price(self.price_offer)?;
        let currency = self.currency.as_deref().map(Currency::new).transpose()?;
        Ok((price, currency))
    }
}

#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub message: NegotiationMessage,
    pub negotiation: Negotiation,
    /// True when this message completed bilateral agreement.
    pub promoted: bool,
}

pub struct NegotiationEngine<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
}

impl<'a> NegotiationEngine<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn send_message(
        &self,
        negotiation_id: &str,
        sender_id: &str,
        draft: &MessageDraft,
    ) -> EngineResult<MessageOutcome> {
        let (price, currency) = draft.validate(self.config)?;

        let negotiation = self.store.negotiation(negotiation_id)?;
        let request = self.store.request(&negotiation.request_id)?;
        let offer = self.store.offer(&negotiation.offer_id)?;
        let participants = Participants::derive(&request, &offer);

        if !participants.contains(sender_id) {
            return Err(EngineError::Unauthorized(
                "send messages in this negotiation".into(),
            ));
        }
        if draft.message_type == MessageType::Accept && negotiation.has_accepted(sender_id) {
            return Err(EngineError::DuplicateAccept);
        }
        if negotiation.status() != NegotiationStatus::InProgress {
            return Err(EngineError::InvalidState(format!(
                "negotiation {negotiation_id} is {:?}",
                negotiation.status()
            )));
        }

        let now = TimeStamp::new();
        if negotiation.is_stale(&now, self.config.negotiation_expiry) {
            let expiry = self.config.negotiation_expiry;
            let expired = self
                .store
                .transaction(|tx| expire_in_tx(tx, negotiation_id, &now, expiry))?;
            if let Some(transition) = expired {
                transition.log();
                warn!(negotiation_id, "negotiation expired before message was accepted");
                return Err(EngineError::NegotiationExpired);
            }
        }

        let message_id = new_uuid_to_bech32(MESSAGE_HRP)?;
        let (outcome, transition) = self.store.transaction(|tx| {
            let mut negotiation = tx.negotiation(negotiation_id)?;
            // the duplicate check precedes the status check, the first accept may have closed it
            if draft.message_type == MessageType::Accept && negotiation.has_accepted(sender_id) {
                return abort(EngineError::DuplicateAccept);
            }
            if negotiation.status() != NegotiationStatus::InProgress {
                return abort(EngineError::Conflict(format!(
                    "negotiation {negotiation_id} closed while the message was in flight"
                )));
            }

            let mut message = NegotiationMessage {
                id: message_id.clone(),
                negotiation_id: negotiation_id.to_string(),
                sender_id: sender_id.to_string(),
                message_type: draft.message_type,
                content: draft.content.clone(),
                price_offer: price,
                currency: currency.clone(),
                sequence: negotiation.message_count(),
                created_at: now.clone(),
                prev_digest: String::new(),
                digest: String::new(),
            };
            let mut transition = None;

            match draft.message_type {
                MessageType::Message | MessageType::Offer => {}
                MessageType::CounterOffer => {
                    let price = price.ok_or(ValidationError::MissingCounterPrice).or_abort()?;
                    negotiation.apply_counter_offer(price, currency.clone());
                }
                MessageType::Accept => {
                    // the accept always records the terms on the table right now
                    let terms = negotiation.terms();
                    message.price_offer = terms.price;
                    message.currency = Some(terms.currency.clone());

                    let both = negotiation.record_accept(sender_id, &participants).or_abort()?;
                    if both && negotiation.close(NegotiationStatus::Agreed, &now) {
                        let mut request = tx.request(&negotiation.request_id)?;
                        let agreed = RequestEvent::TermsAgreed {
                            currency: terms.currency,
                        };
                        transition = Some(lifecycle::apply(&mut request, agreed, &now).or_abort()?);
                        tx.put_request(&request)?;
                    }
                }
                MessageType::Reject => {
                    if negotiation.close(NegotiationStatus::Failed, &now) {
                        transition = Some(reopen_request(tx, &negotiation, &now)?);
                    }
                }
            }

            let message = message.seal(negotiation.head_digest()).or_abort()?;
            negotiation.append(&message.digest, &now);
            tx.append_message(&message)?;
            tx.put_negotiation(&negotiation)?;

            let outcome = MessageOutcome {
                message,
                negotiation,
                promoted: draft.message_type == MessageType::Accept && transition.is_some(),
            };
            Ok((outcome, transition))
        })?;

        if let Some(transition) = &transition {
            transition.log();
        }

        info!(
            negotiation_id,
            sender_id,
            message_type = ?draft.message_type,
            status = ?outcome.negotiation.status(),
            "negotiation message recorded"
        );
        if outcome.promoted {
            info!(
                negotiation_id,
                request_id = %outcome.negotiation.request_id,
                "both parties agreed"
            );
        }
        Ok(outcome)
    }

    /// Fails every in-progress negotiation idle for longer than the configured expiry
    /// as of `now`, reopening their requests. Returns the ids that were failed.
    pub fn expire_stale_negotiations(&self, now: &TimeStamp) -> EngineResult<Vec<NegotiationId>> {
        let expiry = self.config.negotiation_expiry;
        if expiry.is_none() {
            debug!("negotiation expiry disabled, nothing to sweep");
            return Ok(vec![]);
        }

        let mut expired = vec![];
        for negotiation in self.store.negotiations_in_progress()? {
            if !negotiation.is_stale(now, expiry) {
                continue;
            }
            let outcome = self
                .store
                .transaction(|tx| expire_in_tx(tx, &negotiation.id, now, expiry))?;
            if let Some(transition) = outcome {
                transition.log();
                info!(negotiation_id = %negotiation.id, "negotiation expired");
                expired.push(negotiation.id);
            }
        }
        Ok(expired)
    }
}

/// Fails the negotiation if it is still stale inside the transaction. Returns the
/// request's reopening when it did.
fn expire_in_tx(
    tx: &TxView<'_>,
    negotiation_id: &str,
    now: &TimeStamp,
    expiry: Option<Duration>,
) -> TxResult<Option<Transition>> {
    let mut negotiation = tx.negotiation(negotiation_id)?;
    if !negotiation.is_stale(now, expiry) || !negotiation.close(NegotiationStatus::Failed, now) {
        return Ok(None);
    }
    let transition = reopen_request(tx, &negotiation, now)?;
    tx.put_negotiation(&negotiation)?;
    Ok(Some(transition))
}

/// A failed negotiation hands its request back to the market. The offer it was
/// built on stays closed; a fresh offer is needed.
fn reopen_request(
    tx: &TxView<'_>,
    negotiation: &Negotiation,
    now: &TimeStamp,
) -> TxResult<Transition> {
    let mut request = tx.request(&negotiation.request_id)?;
    let transition =
        lifecycle::apply(&mut request, RequestEvent::NegotiationFailed, now).or_abort()?;
    tx.put_request(&request)?;

    let mut offer = tx.offer(&negotiation.offer_id)?;
    offer.revoke_acceptance(now);
    tx.put_offer(&offer)?;
    Ok(transition)
}
