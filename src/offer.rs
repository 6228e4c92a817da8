//! Offers: competing bids against an open request
use super::config::EngineConfig;
use super::error::ValidationError;
use super::types::{Currency, OfferId, Price, RequestId, TimeStamp, UserId, validate_price};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Withdrawn,
}

impl OfferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    pub id: OfferId,
    #[n(1)]
    pub request_id: RequestId,
    #[n(2)]
    pub offerer_id: UserId,
    #[n(3)]
    pub offered_price: Option<Price>,
    #[n(4)]
    pub currency: Currency,
    #[n(5)]
    pub message: Option<String>,
    #[n(6)]
    pub(crate) status: OfferStatus,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
}

impl Offer {
    pub fn status(&self) -> OfferStatus {
        self.status
    }
    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }
    pub(crate) fn set_status(&mut self, status: OfferStatus, now: &TimeStamp) {
        self.status = status;
        self.updated_at = now.clone();
    }
    /// An accepted offer whose negotiation failed. Keeps a request at no more than
    /// one accepted offer once it reopens.
    pub(crate) fn revoke_acceptance(&mut self, now: &TimeStamp) {
        if self.status == OfferStatus::Accepted {
            self.set_status(OfferStatus::Rejected, now);
        }
    }
}

/// What an offerer submits. Checked by [`OfferDetails::validate_and_finalise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferDetails {
    pub offered_price: Option<Price>,
    pub currency: String,
    pub message: Option<String>,
}

impl OfferDetails {
    pub fn new(currency: &str) -> Self {
        Self {
            offered_price: None,
            currency: currency.to_string(),
            message: None,
        }
    }
    pub fn set_price(mut self, price: Price) -> Self {
        self.offered_price = Some(price);
        self
    }
    pub fn set_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub(crate) fn validate_and_finalise(
        &self,
        config: &EngineConfig,
    ) -> Result<(Option<Price>, Currency, Option<String>), ValidationError> {
        let price = validate_price(self.offered_price)?;
        let currency = Currency::new(&self.currency)?;
        let message = self
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        if message
            .as_ref()
            .is_some_and(|m| m.chars().count() > config.max_text_len)
        {
            return Err(ValidationError::TooLong {
                field: "offer message",
                max: config.max_text_len,
            });
        }

        Ok((price, currency, message))
    }
}

impl Offer {
    pub(crate) fn pending(
        id: OfferId,
        request_id: RequestId,
        offerer_id: UserId,
        (offered_price, currency, message): (Option<Price>, Currency, Option<String>),
    ) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            request_id,
            offerer_id,
            offered_price,
            currency,
            message,
            status: OfferStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
