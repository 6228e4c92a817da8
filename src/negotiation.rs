//! Negotiations: the two-party bargaining session behind an accepted offer
use super::error::{EngineError, EngineResult};
use super::offer::Offer;
use super::request::Request;
use super::types::{Currency, NegotiationId, OfferId, Price, RequestId, TimeStamp, UserId};
use chrono::Duration;
use std::collections::BTreeMap;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationStatus {
    #[n(0)]
    InProgress,
    #[n(1)]
    Agreed,
    #[n(2)]
    Failed,
}

impl NegotiationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationStatus::InProgress)
    }
}

/// The price and currency currently on the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terms {
    pub price: Option<Price>,
    pub currency: Currency,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    #[n(0)]
    pub id: NegotiationId,
    #[n(1)]
    pub request_id: RequestId,
    #[n(2)]
    pub offer_id: OfferId, // the accepted offer, fixed for the life of the negotiation
    #[n(3)]
    pub final_price: Option<Price>,
    #[n(4)]
    pub currency: Currency,
    #[n(5)]
    pub(crate) acceptances: BTreeMap<UserId, bool>,
    #[n(6)]
    pub(crate) status: NegotiationStatus,
    #[n(7)]
    pub(crate) counter_offers: u32,
    #[n(8)]
    pub(crate) message_count: u64,
    #[n(9)]
    pub(crate) head_digest: String,
    #[n(10)]
    pub created_at: TimeStamp,
    #[n(11)]
    pub last_activity_at: TimeStamp,
    /// When the negotiation reached AGREED or FAILED.
    #[n(12)]
    pub closed_at: Option<TimeStamp>,
    /// When either participant confirmed the exchange happened.
    #[n(13)]
    pub completed_at: Option<TimeStamp>,
}

/// The two users allowed to act on a negotiation, derived from current entity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub requester: UserId,
    pub offerer: UserId,
}

impl Participants {
    pub fn derive(request: &Request, accepted_offer: &Offer) -> Self {
        Self {
            requester: request.requester_id.clone(),
            offerer: accepted_offer.offerer_id.clone(),
        }
    }
    pub fn contains(&self, user: &str) -> bool {
        self.requester == user || self.offerer == user
    }
    pub fn counterpart(&self, user: &str) -> Option<&UserId> {
        if self.requester == user {
            Some(&self.offerer)
        } else if self.offerer == user {
            Some(&self.requester)
        } else {
            None
        }
    }
}

impl Negotiation {
    pub(crate) fn open(
        id: NegotiationId,
        offer: &Offer,
        participants: &Participants,
        now: &TimeStamp,
    ) -> Self {
        let acceptances = [
            (participants.requester.clone(), false),
            (participants.offerer.clone(), false),
        ]
        .into_iter()
        .collect();

        Self {
            id,
            request_id: offer.request_id.clone(),
            offer_id: offer.id.clone(),
            final_price: offer.offered_price,
            currency: offer.currency.clone(),
            acceptances,
            status: NegotiationStatus::InProgress,
            counter_offers: 0,
            message_count: 0,
            head_digest: String::new(),
            created_at: now.clone(),
            last_activity_at: now.clone(),
            closed_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> NegotiationStatus {
        self.status
    }
    pub fn message_count(&self) -> u64 {
        self.message_count
    }
    pub fn head_digest(&self) -> &str {
        &self.head_digest
    }
    pub fn counter_offers(&self) -> u32 {
        self.counter_offers
    }
    pub fn has_accepted(&self, user: &str) -> bool {
        self.acceptances.get(user).copied().unwrap_or(false)
    }
    pub fn is_completed(&self) -> bool {
        self.status == NegotiationStatus::Agreed && self.completed_at.is_some()
    }
    pub fn terms(&self) -> Terms {
        Terms {
            price: self.final_price,
            currency: self.currency.clone(),
        }
    }

    /// True once `expiry` has passed since the last message on an in-progress negotiation.
    pub fn is_stale(&self, now: &TimeStamp, expiry: Option<Duration>) -> bool {
        match expiry {
            Some(expiry) if self.status == NegotiationStatus::InProgress => {
                self.last_activity_at.elapsed_until(now) >= expiry
            }
            _ => false,
        }
    }

    pub(crate) fn apply_counter_offer(&mut self, price: Price, currency: Option<Currency>) {
        self.final_price = Some(price);
        if let Some(currency) = currency {
            self.currency = currency;
        }
        self.counter_offers += 1;
    }

    /// Marks `user` as accepted. Returns whether the counterpart had already accepted.
    pub(crate) fn record_accept(
        &mut self,
        user: &str,
        participants: &Participants,
    ) -> EngineResult<bool> {
        if self.has_accepted(user) {
            return Err(EngineError::DuplicateAccept);
        }
        self.acceptances.insert(user.to_string(), true);

        Ok(participants
            .counterpart(user)
            .is_some_and(|other| self.has_accepted(other)))
    }

    /// Moves an in-progress negotiation to a terminal status. Returns false when
    /// it was no longer in progress, in which case nothing changes.
    pub(crate) fn close(&mut self, status: NegotiationStatus, now: &TimeStamp) -> bool {
        if self.status != NegotiationStatus::InProgress || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.closed_at = Some(now.clone());
        true
    }

    pub(crate) fn mark_completed(&mut self, now: &TimeStamp) {
        self.completed_at = Some(now.clone());
    }

    /// Advances the log counters after a message has been sealed onto the chain.
    pub(crate) fn append(&mut self, digest: &str, now: &TimeStamp) {
        self.message_count += 1;
        self.head_digest = digest.to_string();
        self.last_activity_at = now.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::offer::OfferDetails;
    use crate::request::RequestDetails;

    fn fixture() -> (Negotiation, Participants) {
        let details = RequestDetails::new()
            .set_title("Enchanted pickaxe")
            .validate_and_finalise(&EngineConfig::default())
            .unwrap();
        let request = Request::open("req1".into(), "alice".into(), details);
        let offer_details = OfferDetails::new("emeralds")
            .set_price(10)
            .validate_and_finalise(&EngineConfig::default())
            .unwrap();
        let offer = Offer::pending("ofr1".into(), "req1".into(), "bob".into(), offer_details);
        let participants = Participants::derive(&request, &offer);
        let negotiation =
            Negotiation::open("neg1".into(), &offer, &participants, &TimeStamp::new());
        (negotiation, participants)
    }

    #[test]
    fn seeded_from_offer() {
        let (negotiation, _) = fixture();
        assert_eq!(negotiation.final_price, Some(10));
        assert_eq!(negotiation.currency.as_str(), "emeralds");
        assert_eq!(negotiation.status(), NegotiationStatus::InProgress);
    }

    #[test]
    fn counterpart_lookup() {
        let (_, participants) = fixture();
        assert_eq!(participants.counterpart("alice"), Some(&"bob".to_string()));
        assert_eq!(participants.counterpart("bob"), Some(&"alice".to_string()));
        assert_eq!(participants.counterpart("mallory"), None);
    }

    #[test]
    fn second_accept_reports_both() {
        let (mut negotiation, participants) = fixture();
        assert!(!negotiation.record_accept("alice", &participants).unwrap());
        assert!(negotiation.record_accept("bob", &participants).unwrap());
    }

    #[test]
    fn duplicate_accept_refused() {
        let (mut negotiation, participants) = fixture();
        negotiation.record_accept("alice", &participants).unwrap();
        assert!(matches!(
            negotiation.record_accept("alice", &participants),
            Err(EngineError::DuplicateAccept)
        ));
    }

    #[test]
    fn close_is_one_shot() {
        let (mut negotiation, _) = fixture();
        let now = TimeStamp::new();
        assert!(negotiation.close(NegotiationStatus::Agreed, &now));
        assert!(!negotiation.close(NegotiationStatus::Failed, &now));
        assert_eq!(negotiation.status(), NegotiationStatus::Agreed);
    }

    #[test]
    fn staleness_follows_last_activity() {
        let (mut negotiation, _) = fixture();
        negotiation.last_activity_at = TimeStamp::new_with(2024, 1, 1, 0, 0, 0).unwrap();
        let now = TimeStamp::new_with(2024, 1, 20, 0, 0, 0).unwrap();

        assert!(negotiation.is_stale(&now, Some(Duration::days(14))));
        assert!(!negotiation.is_stale(&now, Some(Duration::days(30))));
        assert!(!negotiation.is_stale(&now, None));
    }
}
