//! Hardware Signer Adapter Core
//!
//! Translation layer between a wallet application's transaction and
//! keystore model and an external hardware signing device. The device
//! firmware, transport and wire protocol live in the vendor's library
//! behind the [`device::SignerDevice`] trait; what lives here is the
//! glue:
//!
//! - **path**: derivation path parsing and resolution
//! - **multisig**: deterministic co-signer descriptor assembly
//! - **translate**: wallet transaction -> device request records
//! - **session**: one blocking signing exchange, including the device's
//!   mid-session requests for previously broadcast transactions
//! - **device**: per-keystore client cache, firmware gating, and the
//!   host-facing signing / message / initialization entry points
//!
//! # Threading
//!
//! Device calls block on exclusive transport I/O and physical user
//! confirmation. Dispatch every [`device::DeviceManager`] operation on
//! a dedicated worker thread; two different devices may be driven in
//! parallel, one device never.
//!
//! # Example
//!
//! ```rust,ignore
//! use hwsigner::device::DeviceManager;
//!
//! let manager = DeviceManager::new(network, Box::new(connect));
//! manager.sign_transaction(keystore_id, &keystore, &ownership, &mut tx, &prev_txs)?;
//! ```

pub mod device;
pub mod error;
pub mod multisig;
pub mod path;
pub mod session;
pub mod translate;
pub mod types;

// Re-export key types for convenience
pub use error::{ErrorCode, SignerError, SignerResult};
pub use types::*;

pub use device::{DeviceManager, InitMethod, InitSettings, SignerDevice, MAX_LABEL_LEN,
    MINIMUM_FIRMWARE};
pub use multisig::{CosignerPath, MultisigDescriptor};
pub use path::{DerivationPath, PathParseError, HARDENED};
pub use session::{ReferencedTxSource, SessionState, SigningSession, SIGHASH_ALL_SUFFIX};
pub use translate::{null_output_payload, reference_inputs, referenced, TxTranslator};
