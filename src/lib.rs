//! Request / offer / negotiation engine for a peer-to-peer marketplace.
//!
//! A requester posts a [`request::Request`], other users place competing
//! [`offer::Offer`]s, the requester accepts one, and the two parties bargain in a
//! [`negotiation::Negotiation`] until both accept. [`service::MarketService`] is the
//! entry point; state lives in an embedded sled database.

pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod negotiation;
pub mod offer;
pub mod offer_manager;
pub mod request;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use service::MarketService;
