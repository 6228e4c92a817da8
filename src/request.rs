//! Requests: the want-ads that offers are made against
use super::config::EngineConfig;
use super::error::ValidationError;
use super::types::{Currency, Price, RequestId, TimeStamp, UserId, validate_price};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// A specific catalog item, with a quantity.
    #[n(0)]
    Item,
    /// Anything else: a service, a build, a favour.
    #[n(1)]
    #[default]
    General,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    #[n(0)]
    Open,
    #[n(1)]
    InNegotiation,
    #[n(2)]
    Accepted,
    #[n(3)]
    Completed,
    #[n(4)]
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    #[n(0)]
    pub id: RequestId,
    #[n(1)]
    pub requester_id: UserId,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub kind: RequestKind,
    #[n(5)]
    pub item_id: Option<String>, // catalog reference, never resolved here
    #[n(6)]
    pub quantity: Option<u32>,
    #[n(7)]
    pub suggested_price: Option<Price>,
    #[n(8)]
    pub currency: Currency,
    // written only through the lifecycle module
    #[n(9)]
    pub(crate) status: RequestStatus,
    #[n(10)]
    pub created_at: TimeStamp,
    #[n(11)]
    pub updated_at: TimeStamp,
    #[n(12)]
    pub completed_at: Option<TimeStamp>,
}

impl Request {
    pub fn status(&self) -> RequestStatus {
        self.status
    }
    pub fn is_open(&self) -> bool {
        self.status == RequestStatus::Open
    }
}

/// Draft of a request, assembled by the caller and checked before anything is stored.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    title: Option<String>,
    description: String,
    kind: RequestKind,
    item_id: Option<String>,
    quantity: Option<u32>,
    suggested_price: Option<Price>,
    currency: Option<String>,
}

/// The checked form of [`RequestDetails`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequestDetails {
    pub title: String,
    pub description: String,
    pub kind: RequestKind,
    pub item_id: Option<String>,
    pub quantity: Option<u32>,
    pub suggested_price: Option<Price>,
    pub currency: Currency,
}

pub const DEFAULT_CURRENCY: &str = "emeralds";

impl RequestDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    /// Turns the draft into an item request for `quantity` of the catalog item.
    pub fn set_item(mut self, item_id: &str, quantity: u32) -> Self {
        self.kind = RequestKind::Item;
        self.item_id = Some(item_id.to_string());
        self.quantity = Some(quantity);
        self
    }
    pub fn set_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }
    pub fn set_suggested_price(mut self, price: Price) -> Self {
        self.suggested_price = Some(price);
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_string());
        self
    }

    pub fn validate_and_finalise(
        &self,
        config: &EngineConfig,
    ) -> Result<ValidRequestDetails, ValidationError> {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if title.chars().count() > config.max_title_len {
            return Err(ValidationError::TooLong {
                field: "title",
                max: config.max_title_len,
            });
        }
        if self.description.chars().count() > config.max_text_len {
            return Err(ValidationError::TooLong {
                field: "description",
                max: config.max_text_len,
            });
        }

        let (item_id, quantity) = match self.kind {
            RequestKind::Item => {
                let item_id = self
                    .item_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or(ValidationError::MissingItem)?;
                match self.quantity {
                    Some(q) if q > 0 => (Some(item_id.to_string()), Some(q)),
                    _ => return Err(ValidationError::NonPositiveQuantity),
                }
            }
            // general requests carry no catalog reference
            RequestKind::General => (None, None),
        };

        let suggested_price = validate_price(self.suggested_price)?;
        let currency = Currency::new(self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;

        Ok(ValidRequestDetails {
            title: title.to_string(),
            description: self.description.clone(),
            kind: self.kind,
            item_id,
            quantity,
            suggested_price,
            currency,
        })
    }
}

impl Request {
    pub(crate) fn open(id: RequestId, requester_id: UserId, details: ValidRequestDetails) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            requester_id,
            title: details.title,
            description: details.description,
            kind: details.kind,
            item_id: details.item_id,
            quantity: details.quantity,
            suggested_price: details.suggested_price,
            currency: details.currency,
            status: RequestStatus::Open,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}
