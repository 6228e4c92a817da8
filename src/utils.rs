//! Utility functions for identifiers and hashing

use bech32::Bech32m;
use uuid7::uuid7;

/// Human readable prefixes for the entity identifiers.
pub const REQUEST_HRP: &str = "req";
pub const OFFER_HRP: &str = "ofr";
pub const NEGOTIATION_HRP: &str = "neg";
pub const MESSAGE_HRP: &str = "msg";

// construct a unique time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Hash-chains a record onto the digest of its predecessor.
pub fn chain_digest(prev_digest: &str, body: &[u8]) -> String {
    let mut input = Vec::with_capacity(prev_digest.len() + body.len());
    input.extend_from_slice(prev_digest.as_bytes());
    input.extend_from_slice(body);
    sha256::digest(input.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let id = new_uuid_to_bech32(OFFER_HRP).unwrap();
        assert!(id.starts_with("ofr1"));
    }

    #[test]
    fn chain_depends_on_predecessor() {
        let a = chain_digest("", b"hello");
        let b = chain_digest(&a, b"hello");
        assert_ne!(a, b);
        assert_eq!(a, chain_digest("", b"hello"));
    }
}
