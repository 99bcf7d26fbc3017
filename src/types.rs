//! Shared types for the signer adapter
//!
//! Wallet-side transaction model, the immutable request records handed
//! to the signing device, and the capability traits the host wallet
//! implements. Request records are constructed in one step; partially
//! built states are unrepresentable.

use bitcoin::bip32::Xpub;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{SignerError, SignerResult};
use crate::multisig::MultisigDescriptor;
use crate::path::DerivationPath;

// =============================================================================
// Script Types
// =============================================================================

/// Script types as the host wallet classifies its inputs and outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

/// Input script types the device protocol understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputScriptType {
    SpendAddress,
    SpendMultisig,
}

/// Output script types the device protocol understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputScriptType {
    PayToAddress,
    PayToMultisig,
    PayToOpReturn,
}

impl WalletScriptType {
    pub fn input_script_type(self) -> SignerResult<InputScriptType> {
        match self {
            WalletScriptType::P2pkh => Ok(InputScriptType::SpendAddress),
            WalletScriptType::P2sh => Ok(InputScriptType::SpendMultisig),
            other => Err(SignerError::script_type_not_supported(format!(
                "unexpected input script type: {:?}",
                other
            ))),
        }
    }

    pub fn output_script_type(self) -> SignerResult<OutputScriptType> {
        match self {
            WalletScriptType::P2pkh => Ok(OutputScriptType::PayToAddress),
            WalletScriptType::P2sh => Ok(OutputScriptType::PayToMultisig),
            other => Err(SignerError::script_type_not_supported(format!(
                "unexpected output script type: {:?}",
                other
            ))),
        }
    }
}

// =============================================================================
// Account Keys
// =============================================================================

/// One co-signer's extended public key material at account depth.
/// Immutable once loaded from a wallet keystore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
    pub chain_code: Vec<u8>,
    /// Compressed public key (33 bytes); also the deterministic
    /// multisig sort key
    pub public_key: Vec<u8>,
}

impl AccountKey {
    pub fn from_xpub(xpub: &Xpub) -> Self {
        Self {
            depth: xpub.depth,
            parent_fingerprint: xpub.parent_fingerprint.to_bytes(),
            child_number: u32::from(xpub.child_number),
            chain_code: xpub.chain_code.to_bytes().to_vec(),
            public_key: xpub.public_key.serialize().to_vec(),
        }
    }

    pub fn from_xpub_str(xpub: &str) -> SignerResult<Self> {
        let parsed = Xpub::from_str(xpub)?;
        Ok(Self::from_xpub(&parsed))
    }
}

// =============================================================================
// Wallet-Side Transaction Model
// =============================================================================

/// Which derivation branch an owned output sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    External,
    Change,
}

/// One transaction input as the host wallet models it
#[derive(Debug, Clone)]
pub struct WalletInput {
    pub txid: Txid,
    pub vout: u32,
    /// Spend amount in the base unit, when known
    pub value: Option<u64>,
    pub script_type: WalletScriptType,
    /// Public keys able to spend this input. Empty for foreign inputs
    /// the wallet knows nothing about.
    pub pubkeys: Vec<Vec<u8>>,
    /// Required signature count for this input's script
    pub threshold: u16,
    pub sequence: u32,
    /// Present when the input was signed by some other means already
    pub script_sig: Option<Vec<u8>>,
    pub coinbase: bool,
}

/// One transaction output as the host wallet models it
#[derive(Debug, Clone)]
pub struct WalletOutput {
    pub value: u64,
    /// Literal destination address; `None` for data-carrier outputs
    pub address: Option<String>,
    pub script_pubkey: Vec<u8>,
    pub pubkeys: Vec<Vec<u8>>,
    pub threshold: u16,
    pub script_type: WalletScriptType,
}

/// The host wallet's transaction, with per-input signature slots
#[derive(Debug, Clone)]
pub struct WalletTransaction {
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<WalletInput>,
    pub outputs: Vec<WalletOutput>,
    signatures: Vec<Option<Vec<u8>>>,
}

impl WalletTransaction {
    pub fn new(
        version: i32,
        lock_time: u32,
        inputs: Vec<WalletInput>,
        outputs: Vec<WalletOutput>,
    ) -> Self {
        let signatures = vec![None; inputs.len()];
        Self {
            version,
            lock_time,
            inputs,
            outputs,
            signatures,
        }
    }

    /// Accept final signatures, one per input, in input order.
    pub fn apply_signatures(&mut self, signatures: Vec<Vec<u8>>) -> SignerResult<()> {
        if signatures.len() != self.inputs.len() {
            return Err(SignerError::internal_inconsistency(format!(
                "expected {} signatures, device returned {}",
                self.inputs.len(),
                signatures.len()
            )));
        }
        self.signatures = signatures.into_iter().map(Some).collect();
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(|s| s.is_some())
    }

    pub fn signatures(&self) -> &[Option<Vec<u8>>] {
        &self.signatures
    }
}

// =============================================================================
// Device Request Records
// =============================================================================

/// Sentinel previous-output hash for coinbase inputs
pub const COINBASE_PREV_HASH: [u8; 32] = [0u8; 32];

/// Sentinel previous-output index for coinbase inputs
pub const COINBASE_PREV_INDEX: u32 = 0xffff_ffff;

/// One input as the signing device consumes it.
///
/// `script_type`, `address_path` and `multisig` are active-signing
/// metadata; reference-mode translation leaves all three unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInputRequest {
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub amount: Option<u64>,
    pub sequence: u32,
    pub script_sig: Option<Vec<u8>>,
    pub script_type: Option<InputScriptType>,
    pub address_path: Option<DerivationPath>,
    pub multisig: Option<MultisigDescriptor>,
}

impl SignInputRequest {
    /// Coinbase inputs carry the sentinel prevout and no signing
    /// metadata in either translation mode.
    pub fn coinbase(input: &WalletInput) -> Self {
        Self {
            prev_hash: COINBASE_PREV_HASH,
            prev_index: COINBASE_PREV_INDEX,
            amount: input.value,
            sequence: input.sequence,
            script_sig: input.script_sig.clone(),
            script_type: None,
            address_path: None,
            multisig: None,
        }
    }

    /// Copy of this request with the active-signing metadata removed.
    pub fn stripped(&self) -> Self {
        Self {
            script_type: None,
            address_path: None,
            multisig: None,
            ..self.clone()
        }
    }
}

/// One output as the signing device consumes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignOutputRequest {
    /// Wallet-owned output the device re-derives and displays itself.
    /// Omitting the address from the wire message is the stronger
    /// guarantee: the device proves the output pays back to this seed.
    ByDerivation {
        amount: u64,
        address_path: DerivationPath,
        script_type: OutputScriptType,
        multisig: Option<MultisigDescriptor>,
    },
    /// Explicit destination address, displayed verbatim for the user to
    /// verify
    ByAddress { amount: u64, address: String },
    /// Null output carrying only a data payload
    DataCarrier { amount: u64, payload: Vec<u8> },
}

impl SignOutputRequest {
    pub fn amount(&self) -> u64 {
        match self {
            SignOutputRequest::ByDerivation { amount, .. }
            | SignOutputRequest::ByAddress { amount, .. }
            | SignOutputRequest::DataCarrier { amount, .. } => *amount,
        }
    }

    pub fn is_by_derivation(&self) -> bool {
        matches!(self, SignOutputRequest::ByDerivation { .. })
    }
}

/// Output of a previously broadcast transaction, in raw script form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedOutput {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

/// A previously broadcast transaction the device examines to validate
/// an input's claimed spend amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedTransaction {
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<SignInputRequest>,
    pub bin_outputs: Vec<ReferencedOutput>,
}

// =============================================================================
// Host Capability Traits
// =============================================================================

/// Ownership and classification answers the translator needs from the
/// host wallet, passed in explicitly rather than reached through global
/// wallet state.
pub trait WalletOwnership {
    fn is_mine(&self, output: &WalletOutput) -> bool;

    /// Only meaningful for owned outputs.
    fn classify(&self, output: &WalletOutput) -> Branch;

    /// Full derivation path of an owned output's key.
    fn find_own_path(&self, output: &WalletOutput) -> Option<DerivationPath>;
}

/// Account-level key material the translator needs from the host
/// wallet's keystore.
pub trait Keystore {
    /// Account-level derivation prefix, e.g. `m/44'/5'/0'`
    fn derivation_prefix(&self) -> DerivationPath;

    /// Every co-signer's account-level extended public key. Length 1
    /// for single-signer accounts.
    fn account_keys(&self) -> Vec<AccountKey>;

    /// Signature-count threshold `m` for multisig accounts; 1 otherwise
    fn threshold(&self) -> u16;

    /// Locate this signer's own public key among an input's or
    /// output's known public keys, returning it with its full
    /// derivation path.
    fn find_my_pubkey_in(&self, pubkeys: &[Vec<u8>]) -> Option<(Vec<u8>, DerivationPath)>;
}
