//! Transaction Translation
//!
//! Maps the wallet's transaction model into the request records a
//! signing device consumes. Two modes:
//! - **signing**: derivation paths and multisig descriptors attached to
//!   the inputs and outputs this wallet owns
//! - **reference**: describing a previously broadcast transaction the
//!   device asked for mid-session, with no signing metadata
//!
//! Stripping the signing-only fields from a signing translation yields
//! exactly the reference translation of the same transaction.

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Instruction, Script};

use crate::error::{SignerError, SignerResult};
use crate::multisig::{self, MultisigDescriptor};
use crate::path::DerivationPath;
use crate::types::{
    Branch, Keystore, ReferencedOutput, ReferencedTransaction, SignInputRequest,
    SignOutputRequest, WalletInput, WalletOutput, WalletOwnership, WalletTransaction,
};

/// Translates wallet transactions for one keystore, with ownership
/// answers supplied by the host rather than global wallet state.
pub struct TxTranslator<'a> {
    keystore: &'a dyn Keystore,
    ownership: &'a dyn WalletOwnership,
}

impl<'a> TxTranslator<'a> {
    pub fn new(keystore: &'a dyn Keystore, ownership: &'a dyn WalletOwnership) -> Self {
        Self { keystore, ownership }
    }

    /// Translate every input for active signing, in input order.
    pub fn signing_inputs(&self, tx: &WalletTransaction) -> SignerResult<Vec<SignInputRequest>> {
        tx.inputs
            .iter()
            .map(|input| self.signing_input(input))
            .collect()
    }

    fn signing_input(&self, input: &WalletInput) -> SignerResult<SignInputRequest> {
        if input.coinbase {
            return Ok(SignInputRequest::coinbase(input));
        }

        // Inputs without a known pubkey set were signed by some other
        // means; they carry no signing metadata.
        let (script_type, address_path, multisig) = if input.pubkeys.is_empty() {
            (None, None, None)
        } else {
            let script_type = input.script_type.input_script_type()?;
            let (_, full_path) =
                self.keystore
                    .find_my_pubkey_in(&input.pubkeys)
                    .ok_or_else(|| {
                        SignerError::internal_inconsistency(
                            "owned input resolves to no derivation path",
                        )
                    })?;
            let multisig = self.cosigner_descriptor(
                &input.pubkeys,
                input.threshold,
                &full_path,
            )?;
            (Some(script_type), Some(full_path), multisig)
        };

        Ok(SignInputRequest {
            prev_hash: input.txid.to_byte_array(),
            prev_index: input.vout,
            amount: input.value,
            sequence: input.sequence,
            script_sig: input.script_sig.clone(),
            script_type,
            address_path,
            multisig,
        })
    }

    /// Translate every output, deciding which single output (at most)
    /// may be emitted by derivation.
    ///
    /// The device firmware verifies only one change output per
    /// transaction, so the slot goes to the owned output whose branch
    /// matches the transaction's overall change-branch classification.
    /// An owned output on the other branch is emitted by address; the
    /// user verifies it on the device display instead.
    pub fn outputs(&self, tx: &WalletTransaction) -> SignerResult<Vec<SignOutputRequest>> {
        let any_on_change_branch = tx
            .outputs
            .iter()
            .any(|o| self.ownership.is_mine(o) && self.ownership.classify(o) == Branch::Change);
        let tx_branch = if any_on_change_branch {
            Branch::Change
        } else {
            Branch::External
        };

        let mut has_change = false;
        let mut requests = Vec::with_capacity(tx.outputs.len());
        for output in &tx.outputs {
            let use_derivation = !has_change
                && self.ownership.is_mine(output)
                && self.ownership.classify(output) == tx_branch;

            let request = if use_derivation {
                has_change = true;
                self.output_by_derivation(output)?
            } else {
                self.output_by_address(output)?
            };
            requests.push(request);
        }
        Ok(requests)
    }

    fn output_by_derivation(&self, output: &WalletOutput) -> SignerResult<SignOutputRequest> {
        let script_type = output.script_type.output_script_type()?;
        let full_path = self.ownership.find_own_path(output).ok_or_else(|| {
            SignerError::internal_inconsistency("owned output resolves to no derivation path")
        })?;
        let multisig =
            self.cosigner_descriptor(&output.pubkeys, output.threshold, &full_path)?;

        Ok(SignOutputRequest::ByDerivation {
            amount: output.value,
            address_path: full_path,
            script_type,
            multisig,
        })
    }

    fn output_by_address(&self, output: &WalletOutput) -> SignerResult<SignOutputRequest> {
        match &output.address {
            Some(address) => Ok(SignOutputRequest::ByAddress {
                amount: output.value,
                address: address.clone(),
            }),
            None => Ok(SignOutputRequest::DataCarrier {
                amount: output.value,
                payload: null_output_payload(output)?,
            }),
        }
    }

    /// Multisig descriptor for an input or output involving more than
    /// one public key: every co-signer's account key paired with this
    /// spend's derivation suffix.
    fn cosigner_descriptor(
        &self,
        pubkeys: &[Vec<u8>],
        threshold: u16,
        full_path: &DerivationPath,
    ) -> SignerResult<Option<MultisigDescriptor>> {
        if pubkeys.len() <= 1 {
            return Ok(None);
        }
        let suffix = DerivationPath::new(full_path.suffix(2).to_vec());
        let pairs = self
            .keystore
            .account_keys()
            .into_iter()
            .map(|key| (key, suffix.clone()))
            .collect();
        multisig::descriptor(threshold, pairs)
    }
}

/// Translate every input of a historical transaction, with no signing
/// metadata attached.
pub fn reference_inputs(tx: &WalletTransaction) -> Vec<SignInputRequest> {
    tx.inputs
        .iter()
        .map(|input| {
            if input.coinbase {
                SignInputRequest::coinbase(input)
            } else {
                SignInputRequest {
                    prev_hash: input.txid.to_byte_array(),
                    prev_index: input.vout,
                    amount: input.value,
                    sequence: input.sequence,
                    script_sig: input.script_sig.clone(),
                    script_type: None,
                    address_path: None,
                    multisig: None,
                }
            }
        })
        .collect()
}

/// Describe a previously broadcast transaction in the shape the device
/// consumes when validating an input's claimed amount.
pub fn referenced(tx: &WalletTransaction) -> ReferencedTransaction {
    ReferencedTransaction {
        version: tx.version,
        lock_time: tx.lock_time,
        inputs: reference_inputs(tx),
        bin_outputs: tx
            .outputs
            .iter()
            .map(|output| ReferencedOutput {
                amount: output.value,
                script_pubkey: output.script_pubkey.clone(),
            })
            .collect(),
    }
}

/// Extract the payload of a null (data-carrier) output, rejecting
/// anything that is not `OP_RETURN <one push>` with zero value.
pub fn null_output_payload(output: &WalletOutput) -> SignerResult<Vec<u8>> {
    if output.value != 0 {
        return Err(SignerError::invalid_output(
            "null output must carry zero value",
        ));
    }

    let script = Script::from_bytes(&output.script_pubkey);
    let mut instructions = script.instructions();

    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_RETURN => {}
        _ => {
            return Err(SignerError::invalid_output(
                "null output script must start with OP_RETURN",
            )
            .with_details(hex::encode(&output.script_pubkey)))
        }
    }

    let payload = match instructions.next() {
        Some(Ok(Instruction::PushBytes(push))) => push.as_bytes().to_vec(),
        _ => {
            return Err(SignerError::invalid_output(
                "null output script must push its payload",
            )
            .with_details(hex::encode(&output.script_pubkey)))
        }
    };
    if payload.is_empty() {
        return Err(SignerError::invalid_output("null output payload is empty"));
    }
    if instructions.next().is_some() {
        return Err(SignerError::invalid_output(
            "null output script has trailing data",
        ));
    }

    Ok(payload)
}
