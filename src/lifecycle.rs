//! Request lifecycle: the only place a request's status is written.
//!
//! ```text
//! Open --offer accepted--> InNegotiation --both accept--> Accepted --confirmed--> Completed*
//! Open --requester cancels--> Cancelled*
//! InNegotiation --either rejects or expiry--> Open
//! ```
use super::error::{EngineError, EngineResult};
use super::request::{Request, RequestStatus};
use super::types::{Currency, RequestId, TimeStamp};
use tracing::info;

/// Something that happened elsewhere in the engine and moves a request along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    OfferAccepted,
    /// Both participants accepted. The agreed currency becomes the request's currency.
    TermsAgreed { currency: Currency },
    NegotiationFailed,
    CompletionConfirmed,
    RequesterCancelled,
}

impl RequestEvent {
    /// The single (from, to) edge this event drives.
    pub fn edge(&self) -> (RequestStatus, RequestStatus) {
        use RequestStatus::*;
        match self {
            RequestEvent::OfferAccepted => (Open, InNegotiation),
            RequestEvent::TermsAgreed { .. } => (InNegotiation, Accepted),
            RequestEvent::NegotiationFailed => (InNegotiation, Open),
            RequestEvent::CompletionConfirmed => (Accepted, Completed),
            RequestEvent::RequesterCancelled => (Open, Cancelled),
        }
    }
}

pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Open, InNegotiation)
            | (Open, Cancelled)
            | (InNegotiation, Accepted)
            | (InNegotiation, Open)
            | (Accepted, Completed)
    )
}

/// A status change made by [`apply`]. Logged by the caller once its transaction commits,
/// since sled may run a transaction body more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
}

impl Transition {
    pub(crate) fn log(&self) {
        info!(
            request_id = %self.request_id,
            from = ?self.from,
            to = ?self.to,
            "request status changed"
        );
    }
}

/// Applies `event` to the request in memory. The caller persists it in the same
/// transaction that produced the event.
pub(crate) fn apply(
    request: &mut Request,
    event: RequestEvent,
    now: &TimeStamp,
) -> EngineResult<Transition> {
    let (from, to) = event.edge();
    if request.status != from {
        return Err(EngineError::InvalidState(format!(
            "request {} cannot move to {:?} from {:?}",
            request.id, to, request.status
        )));
    }
    debug_assert!(can_transition(from, to));

    match event {
        RequestEvent::TermsAgreed { currency } => request.currency = currency,
        RequestEvent::CompletionConfirmed => request.completed_at = Some(now.clone()),
        _ => {}
    }
    request.status = to;
    request.updated_at = now.clone();

    Ok(Transition {
        request_id: request.id.clone(),
        from,
        to,
    })
}
