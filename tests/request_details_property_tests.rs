//! Property-based tests for request and offer draft validation
//!
//! Validation runs before anything is written, so these properties pin down which
//! drafts are admitted for every combination of inputs, not just hand-picked ones.

use market_negotiation::{
    config::EngineConfig,
    error::ValidationError,
    request::{RequestDetails, RequestKind},
    types::Currency,
};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

/// Strategy to generate titles that are non-blank and within the default limit
fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,60}"
}

/// Strategy to generate catalog item references
fn item_strategy() -> impl Strategy<Value = String> {
    "minecraft:[a-z_]{3,20}"
}

/// Strategy to generate currency codes in mixed case
fn currency_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("emeralds".to_string()),
        Just("Diamonds".to_string()),
        Just("EMERALD_BLOCKS".to_string()),
        "[a-z][a-z0-9_]{0,15}",
    ]
}

proptest! {
    /// Property: well formed item requests always validate and keep their item
    #[test]
    fn prop_item_requests_validate(
        title in title_strategy(),
        item in item_strategy(),
        quantity in 1u32..=10_000,
        price in 1u64..=1_000_000,
        currency in currency_strategy(),
    ) {
        let details = RequestDetails::new()
            .set_title(&title)
            .set_item(&item, quantity)
            .set_suggested_price(price)
            .set_currency(&currency)
            .validate_and_finalise(&EngineConfig::default());

        prop_assert!(details.is_ok(), "Valid item request should validate: {:?}", details);
        let details = details.unwrap();
        prop_assert_eq!(details.kind, RequestKind::Item);
        prop_assert_eq!(details.item_id, Some(item));
        prop_assert_eq!(details.quantity, Some(quantity));
        prop_assert_eq!(details.suggested_price, Some(price));
    }

    /// Property: an item request with zero quantity is never admitted
    #[test]
    fn prop_zero_quantity_fails(title in title_strategy(), item in item_strategy()) {
        let result = RequestDetails::new()
            .set_title(&title)
            .set_item(&item, 0)
            .validate_and_finalise(&EngineConfig::default());

        prop_assert_eq!(result, Err(ValidationError::NonPositiveQuantity));
    }

    /// Property: whitespace-only titles are rejected whatever else is set
    #[test]
    fn prop_blank_title_fails(blank in "[ \t]{0,10}", price in 1u64..=100) {
        let result = RequestDetails::new()
            .set_title(&blank)
            .set_suggested_price(price)
            .validate_and_finalise(&EngineConfig::default());

        prop_assert_eq!(result, Err(ValidationError::EmptyTitle));
    }

    /// Property: titles past the configured limit are rejected
    #[test]
    fn prop_long_title_fails(limit in 1usize..50, extra in 1usize..20) {
        let config = EngineConfig::default().set_max_title_len(limit);
        let result = RequestDetails::new()
            .set_title(&"a".repeat(limit + extra))
            .validate_and_finalise(&config);

        let is_too_long = matches!(result, Err(ValidationError::TooLong { field: "title", .. }));
        prop_assert!(is_too_long);
    }

    /// Property: general requests never carry catalog data, even if kind was switched back
    #[test]
    fn prop_general_requests_drop_item(title in title_strategy(), item in item_strategy()) {
        let details = RequestDetails::new()
            .set_title(&title)
            .set_item(&item, 3)
            .set_kind(RequestKind::General)
            .validate_and_finalise(&EngineConfig::default())
            .unwrap();

        prop_assert_eq!(details.item_id, None);
        prop_assert_eq!(details.quantity, None);
    }

    /// Property: currency normalisation is idempotent
    #[test]
    fn prop_currency_normalisation_idempotent(code in currency_strategy()) {
        let once = Currency::new(&code).unwrap();
        let twice = Currency::new(once.as_str()).unwrap();
        prop_assert_eq!(once, twice);
    }
}
