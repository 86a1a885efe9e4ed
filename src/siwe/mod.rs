//! Sign-In-With-Ethereum primitives
//!
//! - `message`   - EIP-4361 message grammar
//! - `signature` - secp256k1 signer recovery and origin/expiry checks
//! - `nonce`     - single-use nonce ledger

pub mod message;
pub mod nonce;
pub mod signature;

use alloy_primitives::Address;
use std::str::FromStr;

pub use message::{MessageError, SiweMessage};
pub use nonce::{ConsumeResult, Nonce, NonceLedger, NonceStatus};
pub use signature::{SignatureError, SignatureVerifier, VerifiedLogin, address_from_key, recover_signer};

/// Canonical address form used for storage and comparison: lowercase, `0x`-prefixed
pub fn normalize_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Parse any-case hex address into canonical form
pub fn canonical_address(input: &str) -> Option<String> {
    Address::from_str(input.trim()).ok().map(|a| normalize_address(&a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_address() {
        assert_eq!(
            canonical_address("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").as_deref(),
            Some("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")
        );
        assert!(canonical_address("0x123").is_none());
        assert!(canonical_address("alice.eth").is_none());
    }
}
