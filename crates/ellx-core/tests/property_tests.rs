//! Property-based tests for ellx-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use ellx_core::{b64url_decode, b64url_encode, CompactSignature, Curve, KeyPair};
use proptest::prelude::*;

// ============================================
// Arbitrary Implementations
// ============================================

fn arb_message() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

fn arb_compact_signature() -> impl Strategy<Value = CompactSignature> {
    (0u8..=1, any::<[u8; 32]>(), any::<[u8; 32]>())
        .prop_map(|(param, r, s)| CompactSignature::new(param, r, s).unwrap())
}

// ============================================
// Encoding Properties
// ============================================

proptest! {
    #[test]
    fn prop_b64url_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let encoded = b64url_encode(&bytes);
        prop_assert!(!encoded.contains(['+', '/', '=']));
        prop_assert_eq!(b64url_decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn prop_compact_signature_roundtrip(sig in arb_compact_signature()) {
        prop_assert_eq!(CompactSignature::from_bytes(&sig.to_bytes()).unwrap(), sig);
        prop_assert_eq!(CompactSignature::decode(&sig.encode()).unwrap(), sig);
    }

    #[test]
    fn prop_wrong_width_is_rejected(bytes in prop::collection::vec(any::<u8>(), 0..130)) {
        prop_assume!(bytes.len() != ellx_core::SIGNATURE_SIZE);
        prop_assert!(CompactSignature::from_bytes(&bytes).is_err());
    }
}

// ============================================
// Signature Properties
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sign_then_verify(message in arb_message()) {
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(&message).unwrap();
        prop_assert!(key.verify(&message, &signature));
    }

    #[test]
    fn prop_bit_flip_fails(message in arb_message(), bit in any::<prop::sample::Index>()) {
        prop_assume!(!message.is_empty());
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(&message).unwrap();

        let mut mutated = message.clone();
        let bit = bit.index(mutated.len() * 8);
        mutated[bit / 8] ^= 1 << (bit % 8);

        prop_assert!(!key.verify(&mutated, &signature));
    }

    #[test]
    fn prop_recover_matches_signer(message in arb_message()) {
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(&message).unwrap();
        let recovered = KeyPair::recover(&message, &signature, Curve::Secp256k1).unwrap();
        prop_assert_eq!(recovered.public_key(), key.public_key());
    }

    #[test]
    fn prop_key_encoding_roundtrip(_seed in any::<u8>()) {
        let key = KeyPair::generate(Curve::Secp256k1);

        let private = key.private_key().unwrap();
        let imported = KeyPair::from_private(&private, Curve::Secp256k1).unwrap();
        prop_assert_eq!(imported.private_key().unwrap(), private);

        let public = key.public_key();
        let imported = KeyPair::from_public(&public, Curve::Secp256k1).unwrap();
        prop_assert_eq!(imported.public_key(), public);
    }
}
