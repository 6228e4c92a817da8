//! Shared value types: timestamps, currencies and prices
use super::error::ValidationError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// Identifier of a user, supplied by the authentication layer and trusted as-is.
pub type UserId = String;
pub type RequestId = String;
pub type OfferId = String;
pub type NegotiationId = String;
pub type MessageId = String;

/// Prices are whole units of the negotiated currency.
pub type Price = u64;

const MAX_CURRENCY_LEN: usize = 32;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// A UTC timestamp from calendar components, `None` if they name no valid instant.
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Time elapsed from `self` until `later`, zero if `later` is earlier.
    pub fn elapsed_until(&self, later: &TimeStamp) -> Duration {
        (later.0 - self.0).max(Duration::zero())
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A currency code such as `emeralds` or `diamonds`.
///
/// Codes are free-form but normalised to lowercase ascii letters, digits and
/// underscores so that `Emeralds` and `emeralds` compare equal.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, minicbor::Encode, minicbor::Decode)]
pub struct Currency(#[n(0)] String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim().to_ascii_lowercase();
        let well_formed = !code.is_empty()
            && code.len() <= MAX_CURRENCY_LEN
            && code
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !well_formed {
            return Err(ValidationError::InvalidCurrency(code));
        }
        Ok(Self(code))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks an optional price, zero is never a meaningful bid.
pub fn validate_price(price: Option<Price>) -> Result<Option<Price>, ValidationError> {
    match price {
        Some(0) => Err(ValidationError::NonPositivePrice),
        other => Ok(other),
    }
}
