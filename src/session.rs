//! Signing Session
//!
//! One synchronous signing exchange with the device. The call blocks on
//! physical user confirmation, so callers dispatch it on a dedicated
//! worker thread, never inline on a UI thread. Mid-session the device
//! may request previously broadcast transactions; the session answers
//! each from a caller-supplied map and fails the whole exchange when a
//! requested hash is absent.

use std::collections::HashMap;

use bitcoin::Txid;

use crate::device::SignerDevice;
use crate::error::{SignerError, SignerResult};
use crate::translate::{self, TxTranslator};
use crate::types::{Keystore, ReferencedTransaction, WalletOwnership, WalletTransaction};

/// One-byte signature-hash-type suffix appended to every device
/// signature before it is handed back to the wallet (SIGHASH_ALL).
pub const SIGHASH_ALL_SUFFIX: u8 = 0x01;

/// Observable lifecycle of one signing exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingDeviceConfirmation,
    Completed,
    Cancelled,
    Failed,
}

/// Answers the device's mid-session requests for previously broadcast
/// transactions, by transaction hash.
pub trait ReferencedTxSource {
    fn referenced_tx(&mut self, prev_hash: &Txid) -> SignerResult<ReferencedTransaction>;
}

struct PrevTxMap<'a> {
    prev_txs: &'a HashMap<Txid, WalletTransaction>,
}

impl ReferencedTxSource for PrevTxMap<'_> {
    fn referenced_tx(&mut self, prev_hash: &Txid) -> SignerResult<ReferencedTransaction> {
        self.prev_txs
            .get(prev_hash)
            .map(translate::referenced)
            .ok_or_else(|| {
                SignerError::missing_previous_tx(format!(
                    "device requested unknown previous transaction {}",
                    prev_hash
                ))
            })
    }
}

/// One signing exchange. State is ephemeral; the session is discarded
/// after completion.
pub struct SigningSession<'a> {
    coin: &'a str,
    prev_txs: &'a HashMap<Txid, WalletTransaction>,
    state: SessionState,
}

impl<'a> SigningSession<'a> {
    pub fn new(coin: &'a str, prev_txs: &'a HashMap<Txid, WalletTransaction>) -> Self {
        Self {
            coin,
            prev_txs,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive one signing exchange. On success returns one signature per
    /// input, in input order, each with the sighash suffix appended.
    pub fn sign(
        &mut self,
        device: &mut dyn SignerDevice,
        keystore: &dyn Keystore,
        ownership: &dyn WalletOwnership,
        tx: &WalletTransaction,
    ) -> SignerResult<Vec<Vec<u8>>> {
        let translator = TxTranslator::new(keystore, ownership);
        let inputs = translator.signing_inputs(tx)?;
        let outputs = translator.outputs(tx)?;

        self.state = SessionState::AwaitingDeviceConfirmation;
        let mut source = PrevTxMap {
            prev_txs: self.prev_txs,
        };

        match device.sign_transaction(
            self.coin,
            &inputs,
            &outputs,
            tx.version,
            tx.lock_time,
            &mut source,
        ) {
            Ok(mut signatures) => {
                if signatures.len() != inputs.len() {
                    self.state = SessionState::Failed;
                    return Err(SignerError::internal_inconsistency(format!(
                        "device returned {} signatures for {} inputs",
                        signatures.len(),
                        inputs.len()
                    )));
                }
                for signature in &mut signatures {
                    signature.push(SIGHASH_ALL_SUFFIX);
                }
                self.state = SessionState::Completed;
                Ok(signatures)
            }
            Err(e) if e.is_cancel() => {
                self.state = SessionState::Cancelled;
                Err(e)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn test_session_starts_idle() {
        let prev_txs = HashMap::new();
        let session = SigningSession::new("Testnet", &prev_txs);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_prev_tx_map_rejects_unknown_hash() {
        let prev_txs = HashMap::new();
        let mut source = PrevTxMap {
            prev_txs: &prev_txs,
        };
        let err = source.referenced_tx(&Txid::all_zeros()).unwrap_err();
        assert_eq!(
            err.code,
            crate::error::ErrorCode::MissingPreviousTransaction
        );
    }

    #[test]
    fn test_prev_tx_map_translates_in_reference_mode() {
        let tx = WalletTransaction::new(1, 0, vec![], vec![]);
        let mut prev_txs = HashMap::new();
        prev_txs.insert(Txid::all_zeros(), tx);

        let mut source = PrevTxMap {
            prev_txs: &prev_txs,
        };
        let referenced = source.referenced_tx(&Txid::all_zeros()).unwrap();
        assert_eq!(referenced.version, 1);
        assert!(referenced.inputs.is_empty());
        assert!(referenced.bin_outputs.is_empty());
    }
}
