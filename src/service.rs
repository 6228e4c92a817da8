//! Service layer API for the request / offer / negotiation workflow
use super::completion::CompletionCoordinator;
use super::config::EngineConfig;
use super::engine::{MessageDraft, NegotiationEngine};
use super::error::{EngineError, EngineResult, ErrorKind};
use super::lifecycle::{self, RequestEvent};
use super::message::{ChainError, NegotiationMessage, verify_chain};
use super::negotiation::{Negotiation, NegotiationStatus, Participants};
use super::offer::{Offer, OfferDetails, OfferStatus};
use super::offer_manager::OfferManager;
use super::request::{Request, RequestDetails, RequestStatus};
use super::store::{OrAbort, Store, abort};
use super::types::{MessageId, NegotiationId, OfferId, RequestId, TimeStamp};
use super::utils::{REQUEST_HRP, new_uuid_to_bech32};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferReceipt {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferStatusReceipt {
    pub offer_id: OfferId,
    pub status: OfferStatus,
    /// Set when the update accepted the offer and opened a negotiation.
    pub negotiation_id: Option<NegotiationId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub message_id: MessageId,
    pub negotiation_status: NegotiationStatus,
    pub promoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReceipt {
    pub request_id: RequestId,
}

/// A negotiation together with its verified message log.
#[derive(Debug, Clone)]
pub struct NegotiationHistory {
    pub negotiation: Negotiation,
    pub participants: Participants,
    pub messages: Vec<NegotiationMessage>,
}

pub struct MarketService {
    store: Store,
    config: EngineConfig,
}

impl MarketService {
    pub fn new(instance: Arc<sled::Db>) -> EngineResult<Self> {
        Self::with_config(instance, EngineConfig::default())
    }

    pub fn with_config(instance: Arc<sled::Db>, config: EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            store: Store::open(instance)?,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn offers(&self) -> OfferManager<'_> {
        OfferManager::new(&self.store, &self.config)
    }

    pub fn engine(&self) -> NegotiationEngine<'_> {
        NegotiationEngine::new(&self.store, &self.config)
    }

    pub fn completion(&self) -> CompletionCoordinator<'_> {
        CompletionCoordinator::new(&self.store)
    }

    /// Business errors pass through, anything unexpected is logged and made opaque.
    fn surface<T>(&self, operation: &'static str, result: EngineResult<T>) -> EngineResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == ErrorKind::Internal => {
                error!(operation, error = %err, "operation failed");
                Err(EngineError::OperationFailed)
            }
            Err(err) => {
                warn!(operation, error = %err, kind = ?err.kind(), "operation rejected");
                Err(err)
            }
        }
    }

    /// Posts a new open request owned by `requester_id`.
    pub fn create_request(
        &self,
        requester_id: &str,
        details: &RequestDetails,
    ) -> EngineResult<Request> {
        let result = (|| -> EngineResult<Request> {
            let details = details.validate_and_finalise(&self.config)?;
            let request_id = new_uuid_to_bech32(REQUEST_HRP)?;
            let request = Request::open(request_id, requester_id.to_string(), details);
            self.store.transaction(|tx| {
                tx.put_request(&request)?;
                Ok(())
            })?;
            info!(request_id = %request.id, requester_id, "request created");
            Ok(request)
        })();
        self.surface("create_request", result)
    }

    /// The requester withdraws an open request. Its pending offers are rejected.
    pub fn cancel_request(&self, request_id: &str, caller_id: &str) -> EngineResult<Request> {
        let result = (|| -> EngineResult<Request> {
            let request = self.store.request(request_id)?;
            if request.requester_id != caller_id {
                return Err(EngineError::Unauthorized("cancel this request".into()));
            }
            if !request.is_open() {
                return Err(EngineError::RequestNotOpen(request.status()));
            }

            let (request, transition) = self.store.transaction(|tx| {
                let now = TimeStamp::new();
                let mut request = tx.request(request_id)?;
                if !request.is_open() {
                    return abort(EngineError::Conflict(format!(
                        "request {request_id} changed before it could be cancelled"
                    )));
                }
                let transition =
                    lifecycle::apply(&mut request, RequestEvent::RequesterCancelled, &now)
                        .or_abort()?;
                for mut offer in tx.offers_for_request(request_id)? {
                    if offer.is_pending() {
                        offer.set_status(OfferStatus::Rejected, &now);
                        tx.put_offer(&offer)?;
                    }
                }
                tx.put_request(&request)?;
                Ok((request, transition))
            })?;
            transition.log();
            info!(request_id, "request cancelled");
            Ok(request)
        })();
        self.surface("cancel_request", result)
    }

    pub fn create_offer(
        &self,
        request_id: &str,
        offerer_id: &str,
        details: &OfferDetails,
    ) -> EngineResult<OfferReceipt> {
        let result = self
            .offers()
            .create_offer(request_id, offerer_id, details)
            .map(|offer| OfferReceipt { offer_id: offer.id });
        self.surface("create_offer", result)
    }

    pub fn update_offer(
        &self,
        offer_id: &str,
        caller_id: &str,
        status: OfferStatus,
    ) -> EngineResult<OfferStatusReceipt> {
        let result = self
            .offers()
            .update_offer(offer_id, caller_id, status)
            .map(|update| OfferStatusReceipt {
                status: update.offer.status(),
                offer_id: update.offer.id,
                negotiation_id: update.negotiation.map(|n| n.id),
            });
        self.surface("update_offer", result)
    }

    pub fn send_negotiation_message(
        &self,
        negotiation_id: &str,
        sender_id: &str,
        draft: &MessageDraft,
    ) -> EngineResult<MessageReceipt> {
        let result = self
            .engine()
            .send_message(negotiation_id, sender_id, draft)
            .map(|outcome| MessageReceipt {
                message_id: outcome.message.id,
                negotiation_status: outcome.negotiation.status(),
                promoted: outcome.promoted,
            });
        self.surface("send_negotiation_message", result)
    }

    pub fn complete_request(
        &self,
        request_id: &str,
        negotiation_id: &str,
        caller_id: &str,
    ) -> EngineResult<CompletionReceipt> {
        let result = self
            .completion()
            .complete_request(request_id, negotiation_id, caller_id)
            .map(|(request, _)| CompletionReceipt {
                request_id: request.id,
            });
        self.surface("complete_request", result)
    }

    pub fn expire_stale_negotiations(&self, now: &TimeStamp) -> EngineResult<Vec<NegotiationId>> {
        let result = self.engine().expire_stale_negotiations(now);
        self.surface("expire_stale_negotiations", result)
    }

    pub fn request(&self, request_id: &str) -> EngineResult<Request> {
        self.surface("request", self.store.request(request_id))
    }

    pub fn offer(&self, offer_id: &str) -> EngineResult<Offer> {
        self.surface("offer", self.store.offer(offer_id))
    }

    pub fn offers_for_request(&self, request_id: &str) -> EngineResult<Vec<Offer>> {
        self.surface("offers_for_request", self.store.offers_for_request(request_id))
    }

    pub fn negotiation(&self, negotiation_id: &str) -> EngineResult<Negotiation> {
        self.surface("negotiation", self.store.negotiation(negotiation_id))
    }

    /// The request's current negotiation, if an offer on it has been accepted.
    pub fn negotiation_for_request(&self, request_id: &str) -> EngineResult<Option<Negotiation>> {
        self.surface(
            "negotiation_for_request",
            self.store.negotiation_for_request(request_id),
        )
    }

    pub fn messages(&self, negotiation_id: &str) -> EngineResult<Vec<NegotiationMessage>> {
        self.surface("messages", self.store.messages(negotiation_id))
    }

    pub fn requests_with_status(&self, status: RequestStatus) -> EngineResult<Vec<Request>> {
        self.surface("requests_with_status", self.store.requests_with_status(status))
    }

    /// The full, chain-verified log of a negotiation.
    pub fn negotiation_history(&self, negotiation_id: &str) -> EngineResult<NegotiationHistory> {
        let result = (|| -> EngineResult<NegotiationHistory> {
            let negotiation = self.store.negotiation(negotiation_id)?;
            let request = self.store.request(&negotiation.request_id)?;
            let offer = self.store.offer(&negotiation.offer_id)?;
            let messages = self.store.messages(negotiation_id)?;

            let head = verify_chain(&messages)?;
            if head != negotiation.head_digest() {
                return Err(ChainError::HeadMismatch.into());
            }
            debug!(negotiation_id, messages = messages.len(), "negotiation history verified");

            Ok(NegotiationHistory {
                participants: Participants::derive(&request, &offer),
                negotiation,
                messages,
            })
        })();
        self.surface("negotiation_history", result)
    }
}

impl fmt::Display for NegotiationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self.negotiation.terms();
        writeln!(
            f,
            "negotiation {} ({:?}) between {} and {}",
            self.negotiation.id,
            self.negotiation.status(),
            self.participants.requester,
            self.participants.offerer
        )?;
        for m in &self.messages {
            write!(f, "  #{} {} {:?}", m.sequence, m.sender_id, m.message_type)?;
            if let Some(price) = m.price_offer {
                write!(f, " {price}")?;
                if let Some(currency) = &m.currency {
                    write!(f, " {currency}")?;
                }
            }
            if !m.content.is_empty() {
                write!(f, ": {}", m.content)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  counter-offers: {}", self.negotiation.counter_offers())?;
        match terms.price {
            Some(price) => write!(f, "  terms: {price} {}", terms.currency),
            None => write!(f, "  terms: open price in {}", terms.currency),
        }
    }
}
