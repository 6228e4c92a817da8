//! Making, withdrawing, accepting and rejecting offers
use super::config::EngineConfig;
use super::error::{EngineError, EngineResult, ValidationError};
use super::lifecycle::{self, RequestEvent, Transition};
use super::negotiation::{Negotiation, Participants};
use super::offer::{Offer, OfferDetails, OfferStatus};
use super::request::RequestStatus;
use super::store::{OrAbort, Store, TxView, TxResult, abort};
use super::types::TimeStamp;
use super::utils::{NEGOTIATION_HRP, OFFER_HRP, new_uuid_to_bech32};
use tracing::{debug, info};

/// Result of [`OfferManager::update_offer`]. Acceptance also yields the new negotiation.
#[derive(Debug, Clone)]
pub struct OfferUpdate {
    pub offer: Offer,
    pub negotiation: Option<Negotiation>,
}

pub struct OfferManager<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
}

impl<'a> OfferManager<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Places a pending offer on an open request.
    pub fn create_offer(
        &self,
        request_id: &str,
        offerer_id: &str,
        details: &OfferDetails,
    ) -> EngineResult<Offer> {
        let terms = details.validate_and_finalise(self.config)?;

        let request = self.store.request(request_id)?;
        if request.requester_id == offerer_id {
            return Err(EngineError::SelfOffer);
        }
        if !request.is_open() {
            return Err(EngineError::RequestNotOpen(request.status()));
        }

        let offer_id = new_uuid_to_bech32(OFFER_HRP)?;
        let offer = self.store.transaction(|tx| {
            let request = tx.request(request_id)?;
            if !request.is_open() {
                return abort(EngineError::Conflict(format!(
                    "request {request_id} stopped accepting offers"
                )));
            }
            let duplicate = tx
                .offers_for_request(request_id)?
                .iter()
                .any(|o| o.offerer_id == offerer_id && o.is_pending());
            if duplicate {
                return abort(EngineError::DuplicatePendingOffer);
            }

            let offer = Offer::pending(
                offer_id.clone(),
                request_id.to_string(),
                offerer_id.to_string(),
                terms.clone(),
            );
            tx.insert_offer(&offer)?;
            Ok(offer)
        })?;

        info!(offer_id = %offer.id, request_id, offerer_id, "offer created");
        Ok(offer)
    }

    /// Moves a pending offer to `status`. Accepting collapses the request's offers
    /// into a single negotiation in one transaction.
    pub fn update_offer(
        &self,
        offer_id: &str,
        caller_id: &str,
        status: OfferStatus,
    ) -> EngineResult<OfferUpdate> {
        if status == OfferStatus::Pending {
            return Err(ValidationError::IllegalOfferTarget.into());
        }

        let offer = self.store.offer(offer_id)?;
        let request = self.store.request(&offer.request_id)?;

        match status {
            OfferStatus::Withdrawn if caller_id != offer.offerer_id => {
                return Err(EngineError::Unauthorized("withdraw this offer".into()));
            }
            OfferStatus::Accepted | OfferStatus::Rejected if caller_id != request.requester_id => {
                return Err(EngineError::Unauthorized(
                    "accept or reject offers on this request".into(),
                ));
            }
            _ => {}
        }
        // another offer on this request won the acceptance
        if status == OfferStatus::Accepted && request.status() == RequestStatus::InNegotiation {
            return Err(EngineError::Conflict(format!(
                "request {} is already negotiating another offer",
                request.id
            )));
        }
        if !offer.is_pending() {
            return Err(EngineError::InvalidState(format!(
                "offer {offer_id} is already {:?}",
                offer.status()
            )));
        }
        if status != OfferStatus::Withdrawn && !request.is_open() {
            return Err(EngineError::RequestNotOpen(request.status()));
        }

        let update = match status {
            OfferStatus::Accepted => {
                let negotiation_id = new_uuid_to_bech32(NEGOTIATION_HRP)?;
                let (update, transition) = self
                    .store
                    .transaction(|tx| accept_in_tx(tx, offer_id, &negotiation_id))?;
                transition.log();
                update
            }
            _ => self.store.transaction(|tx| {
                let mut offer = tx.offer(offer_id)?;
                if !offer.is_pending() {
                    return abort(EngineError::Conflict(format!(
                        "offer {offer_id} changed while updating"
                    )));
                }
                if status == OfferStatus::Rejected && !tx.request(&offer.request_id)?.is_open() {
                    return abort(EngineError::Conflict(format!(
                        "request {} stopped accepting offers",
                        offer.request_id
                    )));
                }
                offer.set_status(status, &TimeStamp::new());
                tx.put_offer(&offer)?;
                Ok(OfferUpdate {
                    offer,
                    negotiation: None,
                })
            })?,
        };

        info!(offer_id, ?status, "offer updated");
        if let Some(negotiation) = &update.negotiation {
            debug!(negotiation_id = %negotiation.id, offer_id, "negotiation opened");
        }
        Ok(update)
    }
}

fn accept_in_tx(
    tx: &TxView<'_>,
    offer_id: &str,
    negotiation_id: &str,
) -> TxResult<(OfferUpdate, Transition)> {
    let now = TimeStamp::new();
    let mut offer = tx.offer(offer_id)?;
    let mut request = tx.request(&offer.request_id)?;

    // the request must still be open at commit time, otherwise another acceptance won
    if !request.is_open() || !offer.is_pending() {
        return abort(EngineError::Conflict(format!(
            "request {} was taken by a concurrent update",
            request.id
        )));
    }

    offer.set_status(OfferStatus::Accepted, &now);
    let transition = lifecycle::apply(&mut request, RequestEvent::OfferAccepted, &now).or_abort()?;

    for mut other in tx.offers_for_request(&request.id)? {
        if other.id != offer.id && other.is_pending() {
            other.set_status(OfferStatus::Rejected, &now);
            tx.put_offer(&other)?;
        }
    }

    let participants = Participants::derive(&request, &offer);
    let negotiation = Negotiation::open(negotiation_id.to_string(), &offer, &participants, &now);

    tx.put_offer(&offer)?;
    tx.put_request(&request)?;
    tx.put_negotiation(&negotiation)?;
    tx.link_negotiation(&request.id, &negotiation.id)?;

    let update = OfferUpdate {
        offer,
        negotiation: Some(negotiation),
    };
    Ok((update, transition))
}
