//! Multisig Descriptor Assembly
//!
//! Builds the ordered co-signer descriptor a signing device verifies
//! against its own re-derivation. Co-signers are sorted by their
//! account public key bytes so that every participating device, given
//! the same unordered set, produces the identical descriptor; ordering
//! drift across co-signers is a hard failure of the multisig scheme.

use serde::{Deserialize, Serialize};

use crate::error::{SignerError, SignerResult};
use crate::path::DerivationPath;
use crate::types::AccountKey;

/// One co-signer slot: account key plus the derivation suffix reaching
/// this input's or output's key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosignerPath {
    pub node: AccountKey,
    pub suffix: DerivationPath,
}

/// Ordered co-signer list plus threshold, with one signature slot per
/// co-signer. Slots start empty and are filled by each co-signer's
/// independent signing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisigDescriptor {
    pub pubkeys: Vec<CosignerPath>,
    pub signatures: Vec<Vec<u8>>,
    pub threshold: u16,
}

/// Build a multisig descriptor from a threshold and an unordered
/// co-signer collection. Returns `None` for a single co-signer:
/// multisig does not apply to single-signer inputs.
pub fn descriptor(
    threshold: u16,
    pairs: Vec<(AccountKey, DerivationPath)>,
) -> SignerResult<Option<MultisigDescriptor>> {
    if pairs.len() == 1 {
        return Ok(None);
    }

    let n = pairs.len();
    if pairs.is_empty() || threshold == 0 || threshold as usize > n {
        return Err(SignerError::internal_inconsistency(format!(
            "invalid multisig threshold: {} of {}",
            threshold, n
        )));
    }

    let mut pairs = pairs;
    pairs.sort_by(|a, b| a.0.public_key.cmp(&b.0.public_key));

    let pubkeys: Vec<CosignerPath> = pairs
        .into_iter()
        .map(|(node, suffix)| CosignerPath { node, suffix })
        .collect();

    Ok(Some(MultisigDescriptor {
        signatures: vec![Vec::new(); n],
        pubkeys,
        threshold,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> AccountKey {
        AccountKey {
            depth: 3,
            parent_fingerprint: [0x0a, 0x0b, 0x0c, byte],
            child_number: 0x8000_0000,
            chain_code: vec![byte; 32],
            public_key: vec![byte; 33],
        }
    }

    fn suffix() -> DerivationPath {
        DerivationPath::new(vec![0, 7])
    }

    #[test]
    fn test_single_cosigner_is_not_multisig() {
        let built = descriptor(1, vec![(key(1), suffix())]).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let forward = vec![(key(1), suffix()), (key(2), suffix()), (key(3), suffix())];
        let backward = vec![(key(3), suffix()), (key(1), suffix()), (key(2), suffix())];

        let a = descriptor(2, forward).unwrap().unwrap();
        let b = descriptor(2, backward).unwrap().unwrap();
        assert_eq!(a, b);

        let order: Vec<u8> = a.pubkeys.iter().map(|c| c.node.public_key[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_signature_slots_start_empty() {
        let built = descriptor(2, vec![(key(1), suffix()), (key(2), suffix())])
            .unwrap()
            .unwrap();
        assert_eq!(built.signatures.len(), 2);
        assert!(built.signatures.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(descriptor(0, vec![(key(1), suffix()), (key(2), suffix())]).is_err());
        assert!(descriptor(3, vec![(key(1), suffix()), (key(2), suffix())]).is_err());
        assert!(descriptor(2, vec![]).is_err());
    }
}
