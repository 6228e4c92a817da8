//! Completion: confirming that an agreed deal actually happened
use super::error::{EngineError, EngineResult};
use super::lifecycle::{self, RequestEvent};
use super::negotiation::{Negotiation, NegotiationStatus, Participants};
use super::request::{Request, RequestStatus};
use super::store::{OrAbort, Store, abort};
use super::types::TimeStamp;
use tracing::info;

pub struct CompletionCoordinator<'a> {
    store: &'a Store,
}

impl<'a> CompletionCoordinator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Marks an accepted request completed. Either participant may confirm.
    pub fn complete_request(
        &self,
        request_id: &str,
        negotiation_id: &str,
        caller_id: &str,
    ) -> EngineResult<(Request, Negotiation)> {
        let request = self.store.request(request_id)?;
        let negotiation = self.store.negotiation(negotiation_id)?;
        if negotiation.request_id != request.id {
            return Err(EngineError::InvalidState(format!(
                "negotiation {negotiation_id} does not belong to request {request_id}"
            )));
        }
        let offer = self.store.offer(&negotiation.offer_id)?;
        if !Participants::derive(&request, &offer).contains(caller_id) {
            return Err(EngineError::Unauthorized("complete this request".into()));
        }
        if request.status() != RequestStatus::Accepted {
            return Err(EngineError::InvalidState(format!(
                "request {request_id} is {:?}, not accepted",
                request.status()
            )));
        }
        if negotiation.status() != NegotiationStatus::Agreed {
            return Err(EngineError::InvalidState(format!(
                "negotiation {negotiation_id} is {:?}, not agreed",
                negotiation.status()
            )));
        }

        let (request, negotiation, transition) = self.store.transaction(|tx| {
            let now = TimeStamp::new();
            let mut request = tx.request(request_id)?;
            let mut negotiation = tx.negotiation(negotiation_id)?;

            if request.status() != RequestStatus::Accepted
                || tx.negotiation_id_for_request(request_id)?.as_deref() != Some(negotiation_id)
            {
                return abort(EngineError::Conflict(format!(
                    "request {request_id} changed before completion"
                )));
            }

            let transition =
                lifecycle::apply(&mut request, RequestEvent::CompletionConfirmed, &now).or_abort()?;
            negotiation.mark_completed(&now);
            tx.put_request(&request)?;
            tx.put_negotiation(&negotiation)?;
            Ok((request, negotiation, transition))
        })?;

        transition.log();
        info!(request_id, negotiation_id, caller_id, "request completed");
        Ok((request, negotiation))
    }
}
