//! Property-based tests for the request lifecycle
//!
//! Random sequences of marketplace actions are replayed against a real store. Most
//! actions will be refused in whatever state they land in; the point is that no
//! sequence, refused or not, can leave the request, its offers and its negotiation
//! disagreeing with each other.

use market_negotiation::{
    ErrorKind, MarketService,
    engine::MessageDraft,
    negotiation::NegotiationStatus,
    offer::{OfferDetails, OfferStatus},
    request::{RequestDetails, RequestStatus},
    utils,
};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;

const OFFERERS: usize = 3;

/// A single marketplace action. Users are indexed: 0 is the requester, 1.. are offerers.
#[derive(Debug, Clone)]
enum Action {
    Offer { offerer: usize, price: u64 },
    Accept { offer: usize },
    Reject { offer: usize },
    Withdraw { offer: usize },
    Chat { user: usize },
    Counter { user: usize, price: u64 },
    AcceptTerms { user: usize },
    RejectTerms { user: usize },
    Complete { user: usize },
    Cancel,
}

// PROPERTY TEST STRATEGIES

fn action_strategy() -> impl Strategy<Value = Action> {
    let user = 0..=OFFERERS;
    let offerer = 1..=OFFERERS;
    let offer = 0usize..8;
    prop_oneof![
        3 => (offerer, 1u64..100).prop_map(|(offerer, price)| Action::Offer { offerer, price }),
        2 => offer.clone().prop_map(|offer| Action::Accept { offer }),
        1 => offer.clone().prop_map(|offer| Action::Reject { offer }),
        1 => offer.prop_map(|offer| Action::Withdraw { offer }),
        1 => user.clone().prop_map(|user| Action::Chat { user }),
        2 => (user.clone(), 1u64..100).prop_map(|(user, price)| Action::Counter { user, price }),
        3 => user.clone().prop_map(|user| Action::AcceptTerms { user }),
        1 => user.clone().prop_map(|user| Action::RejectTerms { user }),
        1 => user.prop_map(|user| Action::Complete { user }),
        1 => Just(Action::Cancel),
    ]
}

fn script_strategy() -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(action_strategy(), 1..40)
}

struct Market {
    _dir: tempfile::TempDir,
    service: MarketService,
    users: Vec<String>,
    request_id: String,
    offer_ids: Vec<String>,
}

impl Market {
    fn open() -> anyhow::Result<Self> {
        let dir = tempdir()?;
        let db = Arc::new(sled::open(dir.path().join("lifecycle.db"))?);
        let service = MarketService::new(db)?;
        let users = (0..=OFFERERS)
            .map(|_| utils::new_uuid_to_bech32("user_"))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let details = RequestDetails::new().set_title("Shulker box of cobblestone");
        let request_id = service.create_request(&users[0], &details)?.id;
        Ok(Self {
            _dir: dir,
            service,
            users,
            request_id,
            offer_ids: vec![],
        })
    }

    fn current_negotiation(&self) -> Option<String> {
        self.service
            .negotiation_for_request(&self.request_id)
            .ok()
            .flatten()
            .map(|n| n.id)
    }

    fn offer_at(&self, i: usize) -> Option<String> {
        match self.offer_ids.len() {
            0 => None,
            n => Some(self.offer_ids[i % n].clone()),
        }
    }

    /// Runs one action. Returns the error kind when the action was refused.
    fn run(&mut self, action: &Action) -> Option<ErrorKind> {
        if let Action::Offer { offerer, price } = action {
            let details = OfferDetails::new("emeralds").set_price(*price);
            let offerer = &self.users[*offerer];
            return match self.service.create_offer(&self.request_id, offerer, &details) {
                Ok(receipt) => {
                    self.offer_ids.push(receipt.offer_id);
                    None
                }
                Err(e) => Some(e.kind()),
            };
        }

        let s = &self.service;
        let u = &self.users;
        let result = match action {
            Action::Offer { .. } => Ok(()),
            Action::Accept { offer: i }
            | Action::Reject { offer: i }
            | Action::Withdraw { offer: i } => {
                let Some(offer_id) = self.offer_at(*i) else { return None };
                let (caller, status) = match action {
                    Action::Accept { .. } => (u[0].clone(), OfferStatus::Accepted),
                    Action::Reject { .. } => (u[0].clone(), OfferStatus::Rejected),
                    _ => match s.offer(&offer_id) {
                        Ok(o) => (o.offerer_id, OfferStatus::Withdrawn),
                        Err(e) => return Some(e.kind()),
                    },
                };
                s.update_offer(&offer_id, &caller, status).map(|_| ())
            }
            Action::Chat { user }
            | Action::Counter { user, .. }
            | Action::AcceptTerms { user }
            | Action::RejectTerms { user } => {
                let Some(negotiation_id) = self.current_negotiation() else { return None };
                let draft = match action {
                    Action::Chat { .. } => MessageDraft::message("how about it"),
                    Action::Counter { price, .. } => MessageDraft::counter_offer(*price),
                    Action::AcceptTerms { .. } => MessageDraft::accept(),
                    _ => MessageDraft::reject("no deal"),
                };
                s.send_negotiation_message(&negotiation_id, &u[*user], &draft).map(|_| ())
            }
            Action::Complete { user } => {
                let Some(negotiation_id) = self.current_negotiation() else { return None };
                s.complete_request(&self.request_id, &negotiation_id, &u[*user]).map(|_| ())
            }
            Action::Cancel => s.cancel_request(&self.request_id, &u[0]).map(|_| ()),
        };
        result.err().map(|e| e.kind())
    }
}

/// Cross-entity consistency of one request. Returns a description of the first violation.
fn check_consistency(market: &Market) -> Result<(), String> {
    let s = &market.service;
    let request = s.request(&market.request_id).map_err(|e| e.to_string())?;
    let offers = s.offers_for_request(&market.request_id).map_err(|e| e.to_string())?;
    let negotiation = s
        .negotiation_for_request(&market.request_id)
        .map_err(|e| e.to_string())?;

    let accepted: Vec<_> = offers.iter().filter(|o| o.status() == OfferStatus::Accepted).collect();
    if accepted.len() > 1 {
        return Err(format!("{} accepted offers on one request", accepted.len()));
    }

    let doubled = market.users[1..]
        .iter()
        .any(|u| offers.iter().filter(|o| &o.offerer_id == u && o.is_pending()).count() > 1);
    if doubled {
        return Err("an offerer holds two pending offers".into());
    }
    if !request.is_open() && offers.iter().any(|o| o.is_pending()) {
        return Err(format!("pending offers left on a {:?} request", request.status()));
    }

    match request.status() {
        RequestStatus::Open | RequestStatus::Cancelled => {
            if !accepted.is_empty() {
                return Err(format!("{:?} request still has an accepted offer", request.status()));
            }
            if negotiation.as_ref().is_some_and(|n| n.status() == NegotiationStatus::InProgress) {
                return Err("reopened request still has a live negotiation".into());
            }
        }
        RequestStatus::InNegotiation | RequestStatus::Accepted | RequestStatus::Completed => {
            let Some(n) = &negotiation else {
                return Err(format!("{:?} request without a negotiation", request.status()));
            };
            if accepted.len() != 1 || accepted[0].id != n.offer_id {
                return Err("negotiation does not sit on the accepted offer".into());
            }
            let expected = match request.status() {
                RequestStatus::InNegotiation => NegotiationStatus::InProgress,
                _ => NegotiationStatus::Agreed,
            };
            if n.status() != expected {
                return Err(format!(
                    "{:?} request with {:?} negotiation",
                    request.status(),
                    n.status()
                ));
            }
            if (request.status() == RequestStatus::Completed) != n.is_completed() {
                return Err("completion markers disagree".into());
            }
        }
    }

    if let Some(n) = &negotiation {
        let offerer = offers
            .iter()
            .find(|o| o.id == n.offer_id)
            .map(|o| o.offerer_id.clone())
            .ok_or("negotiation points at an unknown offer")?;
        let both = n.has_accepted(&request.requester_id) && n.has_accepted(&offerer);
        if (n.status() == NegotiationStatus::Agreed) != both {
            return Err(format!("{:?} negotiation but both accepted = {both}", n.status()));
        }
        let messages = s.messages(&n.id).map_err(|e| e.to_string())?;
        if messages.len() as u64 != n.message_count() {
            return Err("message count out of step with the log".into());
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: whatever is attempted, entities agree and refusals are business errors
    #[test]
    fn prop_random_scripts_stay_consistent(script in script_strategy()) {
        let mut market = Market::open().unwrap();

        for (step, action) in script.iter().enumerate() {
            let refused = market.run(action);
            prop_assert!(
                !matches!(refused, Some(ErrorKind::Internal)),
                "step {step} {:?} failed internally", action
            );
            let check = check_consistency(&market);
            prop_assert!(check.is_ok(), "after step {step} {:?}: {:?}", action, check);
        }
    }

    /// Property: once completed a request never changes state again
    #[test]
    fn prop_completed_is_final(script in script_strategy()) {
        let mut market = Market::open().unwrap();
        let mut completed_seen = false;

        for action in &script {
            market.run(action);
            let status = market.service.request(&market.request_id).unwrap().status();
            if completed_seen {
                prop_assert_eq!(status, RequestStatus::Completed);
            }
            completed_seen |= status == RequestStatus::Completed;
        }
    }
}
