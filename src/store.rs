//! Typed access to the sled trees that hold requests, offers, negotiations and messages.
//!
//! Every multi-row change goes through [`Store::transaction`], which runs the closure
//! inside a serializable sled transaction over all trees. sled retries the closure on
//! conflicting concurrent writes, so state read inside it is never stale.
use super::error::{EngineError, EngineResult};
use super::message::NegotiationMessage;
use super::negotiation::{Negotiation, NegotiationStatus};
use super::offer::Offer;
use super::request::{Request, RequestStatus};
use super::types::{NegotiationId, OfferId};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};
use std::sync::Arc;

const REQUESTS: &str = "requests";
const OFFERS: &str = "offers";
const REQUEST_OFFERS: &str = "request_offers";
const NEGOTIATIONS: &str = "negotiations";
const REQUEST_NEGOTIATION: &str = "request_negotiation";
const MESSAGES: &str = "messages";

pub(crate) type TxResult<T> = ConflictableTransactionResult<T, EngineError>;

/// Aborts the surrounding transaction with `err`.
pub(crate) fn abort<T>(err: impl Into<EngineError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

/// Lifts a business-rule result into a transaction result, aborting on `Err`.
pub(crate) trait OrAbort<T> {
    fn or_abort(self) -> TxResult<T>;
}

impl<T, E: Into<EngineError>> OrAbort<T> for Result<T, E> {
    fn or_abort(self) -> TxResult<T> {
        self.map_err(|err| ConflictableTransactionError::Abort(err.into()))
    }
}

fn decode<T>(bytes: &[u8]) -> Result<T, minicbor::decode::Error>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes)
}

// log keys sort by sequence within a negotiation
fn message_key(negotiation_id: &str, sequence: u64) -> Vec<u8> {
    let mut key = message_prefix(negotiation_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn message_prefix(negotiation_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(negotiation_id.len() + 9);
    key.extend_from_slice(negotiation_id.as_bytes());
    key.push(b'/');
    key
}

pub struct Store {
    instance: Arc<Db>,
    requests: Tree,
    offers: Tree,
    request_offers: Tree,
    negotiations: Tree,
    request_negotiation: Tree,
    messages: Tree,
}

/// The trees as seen from inside one transaction.
pub(crate) struct TxView<'a> {
    requests: &'a TransactionalTree,
    offers: &'a TransactionalTree,
    request_offers: &'a TransactionalTree,
    negotiations: &'a TransactionalTree,
    request_negotiation: &'a TransactionalTree,
    messages: &'a TransactionalTree,
}

impl Store {
    pub fn open(instance: Arc<Db>) -> EngineResult<Self> {
        Ok(Self {
            requests: instance.open_tree(REQUESTS)?,
            offers: instance.open_tree(OFFERS)?,
            request_offers: instance.open_tree(REQUEST_OFFERS)?,
            negotiations: instance.open_tree(NEGOTIATIONS)?,
            request_negotiation: instance.open_tree(REQUEST_NEGOTIATION)?,
            messages: instance.open_tree(MESSAGES)?,
            instance,
        })
    }

    pub fn flush(&self) -> EngineResult<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Runs `f` atomically across every tree. An abort inside `f` rolls back all of
    /// its writes and surfaces as the returned error.
    pub(crate) fn transaction<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: Fn(&TxView<'_>) -> TxResult<T>,
    {
        let trees = (
            &self.requests,
            &self.offers,
            &self.request_offers,
            &self.negotiations,
            &self.request_negotiation,
            &self.messages,
        );
        let result = trees.transaction(
            |(requests, offers, request_offers, negotiations, request_negotiation, messages)| {
                f(&TxView {
                    requests,
                    offers,
                    request_offers,
                    negotiations,
                    request_negotiation,
                    messages,
                })
            },
        );

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(EngineError::Storage(err)),
        }
    }

    fn load<T>(tree: &Tree, entity: &'static str, id: &str) -> EngineResult<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(EngineError::not_found(entity, id)),
        }
    }

    pub fn request(&self, id: &str) -> EngineResult<Request> {
        Self::load(&self.requests, "request", id)
    }

    pub fn offer(&self, id: &str) -> EngineResult<Offer> {
        Self::load(&self.offers, "offer", id)
    }

    pub fn negotiation(&self, id: &str) -> EngineResult<Negotiation> {
        Self::load(&self.negotiations, "negotiation", id)
    }

    pub fn negotiation_for_request(&self, request_id: &str) -> EngineResult<Option<Negotiation>> {
        match self.request_negotiation.get(request_id.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id);
                Ok(Some(self.negotiation(&id)?))
            }
            None => Ok(None),
        }
    }

    /// Offers on a request in the order they were made.
    pub fn offers_for_request(&self, request_id: &str) -> EngineResult<Vec<Offer>> {
        let ids: Vec<OfferId> = match self.request_offers.get(request_id.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => vec![],
        };
        ids.iter().map(|id| self.offer(id)).collect()
    }

    /// The message log of a negotiation in sequence order.
    pub fn messages(&self, negotiation_id: &str) -> EngineResult<Vec<NegotiationMessage>> {
        self.messages
            .scan_prefix(message_prefix(negotiation_id))
            .values()
            .map(|bytes| -> EngineResult<NegotiationMessage> { Ok(decode(&bytes?)?) })
            .collect()
    }

    pub fn requests_with_status(&self, status: RequestStatus) -> EngineResult<Vec<Request>> {
        let mut found = vec![];
        for bytes in self.requests.iter().values() {
            let request: Request = decode(&bytes?)?;
            if request.status() == status {
                found.push(request);
            }
        }
        Ok(found)
    }

    pub fn negotiations_in_progress(&self) -> EngineResult<Vec<Negotiation>> {
        let mut found = vec![];
        for bytes in self.negotiations.iter().values() {
            let negotiation: Negotiation = decode(&bytes?)?;
            if negotiation.status() == NegotiationStatus::InProgress {
                found.push(negotiation);
            }
        }
        Ok(found)
    }
}

impl TxView<'_> {
    fn load<T>(tree: &TransactionalTree, entity: &'static str, id: &str) -> TxResult<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(id.as_bytes())? {
            Some(bytes) => decode(&bytes).or_abort(),
            None => abort(EngineError::not_found(entity, id)),
        }
    }

    fn save<T>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()>
    where
        T: minicbor::Encode<()>,
    {
        let bytes = minicbor::to_vec(value).or_abort()?;
        tree.insert(key, bytes)?;
        Ok(())
    }

    pub(crate) fn request(&self, id: &str) -> TxResult<Request> {
        Self::load(self.requests, "request", id)
    }

    pub(crate) fn put_request(&self, request: &Request) -> TxResult<()> {
        Self::save(self.requests, request.id.as_bytes(), request)
    }

    pub(crate) fn offer(&self, id: &str) -> TxResult<Offer> {
        Self::load(self.offers, "offer", id)
    }

    pub(crate) fn put_offer(&self, offer: &Offer) -> TxResult<()> {
        Self::save(self.offers, offer.id.as_bytes(), offer)
    }

    pub(crate) fn offer_ids(&self, request_id: &str) -> TxResult<Vec<OfferId>> {
        match self.request_offers.get(request_id.as_bytes())? {
            Some(bytes) => decode(&bytes).or_abort(),
            None => Ok(vec![]),
        }
    }

    /// All offers on a request, read inside the transaction.
    pub(crate) fn offers_for_request(&self, request_id: &str) -> TxResult<Vec<Offer>> {
        self.offer_ids(request_id)?
            .iter()
            .map(|id| self.offer(id))
            .collect()
    }

    /// Stores a new offer and links it to its request.
    pub(crate) fn insert_offer(&self, offer: &Offer) -> TxResult<()> {
        let mut ids = self.offer_ids(&offer.request_id)?;
        ids.push(offer.id.clone());
        Self::save(self.request_offers, offer.request_id.as_bytes(), &ids)?;
        self.put_offer(offer)
    }

    pub(crate) fn negotiation(&self, id: &str) -> TxResult<Negotiation> {
        Self::load(self.negotiations, "negotiation", id)
    }

    pub(crate) fn put_negotiation(&self, negotiation: &Negotiation) -> TxResult<()> {
        Self::save(self.negotiations, negotiation.id.as_bytes(), negotiation)
    }

    pub(crate) fn negotiation_id_for_request(
        &self,
        request_id: &str,
    ) -> TxResult<Option<NegotiationId>> {
        Ok(self
            .request_negotiation
            .get(request_id.as_bytes())?
            .map(|id| String::from_utf8_lossy(&id).into_owned()))
    }

    /// Points the request at its current negotiation. A request reopened after a
    /// failed negotiation is re-linked when its next offer is accepted.
    pub(crate) fn link_negotiation(&self, request_id: &str, negotiation_id: &str) -> TxResult<()> {
        self.request_negotiation
            .insert(request_id.as_bytes(), negotiation_id.as_bytes())?;
        Ok(())
    }

    pub(crate) fn append_message(&self, message: &NegotiationMessage) -> TxResult<()> {
        let key = message_key(&message.negotiation_id, message.sequence);
        Self::save(self.messages, &key, message)
    }
}
