//! Device Session Management
//!
//! Caches one live device client per keystore identity, gates sessions
//! on a minimum firmware version, and exposes the host-facing entry
//! points: transaction signing, message signing, address derivation and
//! display, and device initialization.
//!
//! Every device call blocks on exclusive, stateful transport I/O and
//! may wait indefinitely on user interaction; callers dispatch these on
//! a dedicated worker. The protocol offers no mid-call abort: a caller
//! wanting a timeout runs its own watchdog and calls `mark_unusable`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bitcoin::Network;
use bitcoin::Txid;
use secrecy::SecretString;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SignerError, SignerResult};
use crate::multisig::{self, MultisigDescriptor};
use crate::path::{self, DerivationPath};
use crate::session::{ReferencedTxSource, SigningSession};
use crate::types::{
    InputScriptType, Keystore, SignInputRequest, SignOutputRequest, WalletOwnership,
    WalletScriptType, WalletTransaction,
};

/// Debug logging macro that only prints in debug builds
#[cfg(debug_assertions)]
macro_rules! debug_log {
    ($($arg:tt)*) => { eprintln!($($arg)*) }
}
#[cfg(not(debug_assertions))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Oldest firmware this adapter will open a session against
pub const MINIMUM_FIRMWARE: (u32, u32, u32) = (1, 0, 5);

/// Device labels longer than this are rejected before reaching the wire
pub const MAX_LABEL_LEN: usize = 32;

/// The device-communication library's client, behind a trait so the
/// wire protocol stays outside this crate.
pub trait SignerDevice {
    fn ping(&mut self, message: &str) -> SignerResult<()>;

    fn firmware_version(&self) -> (u32, u32, u32);

    fn label(&self) -> String;

    /// Liveness ping; keeps the device-side session alive.
    fn used(&mut self) -> SignerResult<()>;

    /// Extended public key at `path`, serialized for the host.
    fn get_xpub(&mut self, path: &DerivationPath) -> SignerResult<String>;

    /// Derive and display an address on the device screen.
    fn show_address(
        &mut self,
        coin: &str,
        path: &DerivationPath,
        script_type: InputScriptType,
        multisig: Option<&MultisigDescriptor>,
    ) -> SignerResult<()>;

    fn sign_message(
        &mut self,
        coin: &str,
        path: &DerivationPath,
        message: &[u8],
    ) -> SignerResult<Vec<u8>>;

    /// Sign a transaction, calling `referenced` for every previous
    /// transaction the device needs to examine. Returns one raw DER
    /// signature per input, in input order.
    fn sign_transaction(
        &mut self,
        coin: &str,
        inputs: &[SignInputRequest],
        outputs: &[SignOutputRequest],
        version: i32,
        lock_time: u32,
        referenced: &mut dyn ReferencedTxSource,
    ) -> SignerResult<Vec<Vec<u8>>>;

    // Initialization protocol

    fn reset_device(&mut self, strength: u16, settings: &InitSettings) -> SignerResult<()>;

    fn recover_device(&mut self, word_count: u8, settings: &InitSettings) -> SignerResult<()>;

    fn load_mnemonic(&mut self, mnemonic: &SecretString, settings: &InitSettings)
        -> SignerResult<()>;

    fn load_xprv(&mut self, xprv: &SecretString, settings: &InitSettings) -> SignerResult<()>;
}

/// How to bring an uninitialized device to a usable state
#[derive(Debug)]
pub enum InitMethod {
    /// Device generates a completely new seed on its own RNG
    GenerateNew { strength: u16 },
    /// Recover from a seed the user has written down; words are entered
    /// on-device
    RecoverSeed { word_count: u8 },
    /// Upload a BIP39 mnemonic from the host
    LoadMnemonic { mnemonic: SecretString },
    /// Upload a master private key from the host
    LoadKey { xprv: SecretString },
}

/// Settings shared by every initialization method
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct InitSettings {
    pub label: String,
    pub pin: Option<String>,
    pub passphrase_protection: bool,
}

type Connector<D> = Box<dyn Fn(&str) -> SignerResult<D> + Send + Sync>;

/// One cached live client per keystore identity. The write lock is held
/// across connection so two threads racing on the same keystore share
/// one handle instead of opening two transports to one physical device.
pub struct DeviceManager<D: SignerDevice> {
    clients: RwLock<HashMap<String, Arc<Mutex<D>>>>,
    connect: Connector<D>,
    network: Network,
}

impl<D: SignerDevice> DeviceManager<D> {
    pub fn new(network: Network, connect: Connector<D>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            connect,
            network,
        }
    }

    /// Coin name the device protocol expects for this network
    pub fn coin_name(&self) -> &'static str {
        match self.network {
            Network::Bitcoin => "Bitcoin",
            Network::Testnet => "Testnet",
            Network::Signet => "Signet",
            Network::Regtest => "Regtest",
            _ => "Testnet",
        }
    }

    /// Cached live handle for this keystore, connecting on first use.
    pub fn get_client(&self, keystore_id: &str) -> SignerResult<Arc<Mutex<D>>> {
        if let Some(client) = self.clients.read().unwrap().get(keystore_id) {
            let client = Arc::clone(client);
            client.lock().unwrap().used()?;
            return Ok(client);
        }

        let mut clients = self.clients.write().unwrap();
        if let Some(client) = clients.get(keystore_id) {
            // Another thread connected while we waited for the lock
            let client = Arc::clone(client);
            drop(clients);
            client.lock().unwrap().used()?;
            return Ok(client);
        }

        let client = self.create_client(keystore_id)?;
        let client = Arc::new(Mutex::new(client));
        clients.insert(keystore_id.to_string(), Arc::clone(&client));
        drop(clients);

        client.lock().unwrap().used()?;
        Ok(client)
    }

    fn create_client(&self, keystore_id: &str) -> SignerResult<D> {
        debug_log!("connecting to device for keystore {}", keystore_id);
        let mut client = (self.connect)(keystore_id)?;

        // Ping for device sanity before trusting the handle
        client.ping("t").map_err(|e| {
            debug_log!("ping failed for keystore {}", keystore_id);
            SignerError::device_unavailable("Device did not answer ping")
                .with_details(e.to_string())
        })?;

        let version = client.firmware_version();
        if version < MINIMUM_FIRMWARE {
            return Err(SignerError::device_too_old(format!(
                "Outdated firmware for device labelled '{}'. Please upgrade to {}.{}.{} or newer",
                client.label(),
                MINIMUM_FIRMWARE.0,
                MINIMUM_FIRMWARE.1,
                MINIMUM_FIRMWARE.2
            )));
        }

        debug_log!("connected to device for keystore {}", keystore_id);
        Ok(client)
    }

    /// Drop an abandoned handle, e.g. after a caller-side watchdog gave
    /// up on a wedged transport. The next `get_client` reconnects.
    pub fn mark_unusable(&self, keystore_id: &str) {
        self.clients.write().unwrap().remove(keystore_id);
    }

    /// Sign `tx` in place. `prev_txs` must cover every non-coinbase
    /// input; the device asks for these mid-session to validate claimed
    /// spend amounts.
    pub fn sign_transaction(
        &self,
        keystore_id: &str,
        keystore: &dyn Keystore,
        ownership: &dyn WalletOwnership,
        tx: &mut WalletTransaction,
        prev_txs: &HashMap<Txid, WalletTransaction>,
    ) -> SignerResult<()> {
        if tx.is_complete() {
            return Ok(());
        }
        for input in tx.inputs.iter().filter(|input| !input.coinbase) {
            if !prev_txs.contains_key(&input.txid) {
                return Err(SignerError::missing_previous_tx(format!(
                    "missing previous transaction {} for input",
                    input.txid
                )));
            }
        }

        let client = self.get_client(keystore_id)?;
        let mut client = client.lock().unwrap();

        let mut session = SigningSession::new(self.coin_name(), prev_txs);
        let signatures = session.sign(&mut *client, keystore, ownership, tx)?;
        tx.apply_signatures(signatures)
    }

    /// Device-side extended key derivation. Only standard single-sig
    /// scripts are supported for account creation on this device family.
    pub fn derive_address(
        &self,
        keystore_id: &str,
        path: &str,
        script_type: WalletScriptType,
    ) -> SignerResult<String> {
        if script_type != WalletScriptType::P2pkh {
            return Err(SignerError::script_type_not_supported(
                "This type of script is not supported with this device",
            ));
        }
        let path: DerivationPath = path.parse().map_err(SignerError::from)?;

        let client = self.get_client(keystore_id)?;
        let mut client = client.lock().unwrap();
        client.get_xpub(&path)
    }

    /// Derive and display an address on the device screen, with the
    /// multisig descriptor when the account has co-signers.
    pub fn show_address(
        &self,
        keystore_id: &str,
        keystore: &dyn Keystore,
        change: u32,
        index: u32,
        script_type: WalletScriptType,
    ) -> SignerResult<()> {
        let address_path = path::resolve(&keystore.derivation_prefix(), change, index);
        let input_type = script_type.input_script_type()?;

        let account_keys = keystore.account_keys();
        let descriptor = if account_keys.len() > 1 {
            let suffix = DerivationPath::new(vec![change, index]);
            multisig::descriptor(
                keystore.threshold(),
                account_keys.into_iter().map(|key| (key, suffix.clone())).collect(),
            )?
        } else {
            None
        };

        let client = self.get_client(keystore_id)?;
        let mut client = client.lock().unwrap();
        client.show_address(self.coin_name(), &address_path, input_type, descriptor.as_ref())
    }

    /// Sign an arbitrary message with the key at (change, index) under
    /// this keystore's account prefix.
    pub fn sign_message(
        &self,
        keystore_id: &str,
        keystore: &dyn Keystore,
        change: u32,
        index: u32,
        message: &[u8],
    ) -> SignerResult<Vec<u8>> {
        let address_path = path::resolve(&keystore.derivation_prefix(), change, index);

        let client = self.get_client(keystore_id)?;
        let mut client = client.lock().unwrap();
        client.sign_message(self.coin_name(), &address_path, message)
    }

    /// Not implemented by this device family.
    pub fn decrypt_message(&self, _keystore_id: &str) -> SignerResult<Vec<u8>> {
        Err(SignerError::unsupported(
            "Encryption and decryption are not implemented by this device",
        ))
    }

    /// Bring an uninitialized device to a usable state. Parameters are
    /// validated locally before anything reaches the wire.
    pub fn initialize_device(
        &self,
        keystore_id: &str,
        method: InitMethod,
        settings: InitSettings,
    ) -> SignerResult<()> {
        if settings.label.len() > MAX_LABEL_LEN {
            return Err(SignerError::invalid_label(format!(
                "device label exceeds {} bytes",
                MAX_LABEL_LEN
            )));
        }

        let client = self.get_client(keystore_id)?;
        let mut client = client.lock().unwrap();

        match method {
            InitMethod::GenerateNew { strength } => {
                if !matches!(strength, 128 | 192 | 256) {
                    return Err(SignerError::invalid_init(format!(
                        "seed strength must be 128, 192 or 256 bits, got {}",
                        strength
                    )));
                }
                client.reset_device(strength, &settings)
            }
            InitMethod::RecoverSeed { word_count } => {
                if !matches!(word_count, 12 | 18 | 24) {
                    return Err(SignerError::invalid_init(format!(
                        "recovery word count must be 12, 18 or 24, got {}",
                        word_count
                    )));
                }
                client.recover_device(word_count, &settings)
            }
            InitMethod::LoadMnemonic { mnemonic } => client.load_mnemonic(&mnemonic, &settings),
            InitMethod::LoadKey { xprv } => client.load_xprv(&xprv, &settings),
        }
    }
}
