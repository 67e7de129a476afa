//! Server-held EVM signing wallet.
//!
//! Every ledger write is signed by this one key. User wallets only ever
//! appear as entity attributes. The key lives in `~/.peerlearn/wallet.json`
//! with strict file permissions.

use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::path::{Path, PathBuf};
use tracing::info;

/// Wallet file stored at `~/.peerlearn/wallet.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFile {
    /// Hex-encoded private key with 0x prefix.
    #[serde(rename = "privateKey")]
    pub private_key: String,
    /// ISO 8601 creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// An in-memory signing wallet.
#[derive(Clone)]
pub struct SigningWallet {
    signing_key: SigningKey,
    /// Ethereum address (checksummed).
    pub address: String,
    /// Where the key was loaded from, if anywhere.
    pub path: Option<PathBuf>,
}

impl std::fmt::Debug for SigningWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningWallet")
            .field("address", &self.address)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SigningWallet {
    /// Load an existing wallet or generate a new one at the given path.
    pub fn load_or_create(wallet_path: &Path) -> Result<Self> {
        if wallet_path.exists() {
            Self::load(wallet_path)
        } else {
            Self::generate(wallet_path)
        }
    }

    /// Load a wallet from disk.
    pub fn load(wallet_path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(wallet_path).context("Failed to read wallet file")?;
        let file: WalletFile =
            serde_json::from_str(&contents).context("Failed to parse wallet JSON")?;

        let mut wallet = Self::from_private_key_hex(&file.private_key)?;
        wallet.path = Some(wallet_path.to_path_buf());

        info!("Loaded signing wallet: {}", wallet.address);
        Ok(wallet)
    }

    /// Generate a new random wallet and persist it.
    pub fn generate(wallet_path: &Path) -> Result<Self> {
        let mut wallet = Self::ephemeral();

        let file = WalletFile {
            private_key: format!("0x{}", hex::encode(wallet.signing_key.to_bytes())),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Some(parent) = wallet_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(wallet_path, &json).context("Failed to write wallet file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(wallet_path, std::fs::Permissions::from_mode(0o600))?;
        }

        wallet.path = Some(wallet_path.to_path_buf());
        info!("Generated new signing wallet: {}", wallet.address);
        Ok(wallet)
    }

    /// A throwaway key that is never written to disk.
    pub fn ephemeral() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = derive_address(&signing_key);
        Self {
            signing_key,
            address,
            path: None,
        }
    }

    /// Build a wallet from a hex private key (with or without 0x).
    pub fn from_private_key_hex(key: &str) -> Result<Self> {
        let key_hex = key.strip_prefix("0x").unwrap_or(key);
        let key_bytes = hex::decode(key_hex).context("Invalid hex in private key")?;
        let signing_key =
            SigningKey::from_slice(&key_bytes).context("Invalid private key bytes")?;
        let address = derive_address(&signing_key);
        Ok(Self {
            signing_key,
            address,
            path: None,
        })
    }

    /// Lowercase address, the form stored in `signer_wallet` attributes.
    pub fn address_lower(&self) -> String {
        self.address.to_lowercase()
    }

    /// Sign a message using EIP-191 personal sign.
    pub fn sign_message(&self, message: &[u8]) -> Result<String> {
        let mut prefixed =
            format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
        prefixed.extend_from_slice(message);
        let hash = Keccak256::digest(&prefixed);

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&hash)
            .context("Signing failed")?;

        let mut sig_bytes = signature.to_bytes().to_vec();
        sig_bytes.push(recovery_id.to_byte() + 27);

        Ok(format!("0x{}", hex::encode(sig_bytes)))
    }
}

/// Derive a checksummed Ethereum address from a signing key.
fn derive_address(signing_key: &SigningKey) -> String {
    let verifying_key = signing_key.verifying_key();

    // Uncompressed public key: 0x04 || x || y
    let pubkey = verifying_key.to_encoded_point(false);
    let hash = Keccak256::digest(&pubkey.as_bytes()[1..]);

    let address = format!("0x{}", hex::encode(&hash[12..]));
    checksum_address(&address)
}

/// EIP-55 checksum an Ethereum address.
pub fn checksum_address(address: &str) -> String {
    let addr = address.strip_prefix("0x").unwrap_or(address).to_lowercase();
    let hash_hex = hex::encode(Keccak256::digest(addr.as_bytes()));

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");

    for (c, h) in addr.chars().zip(hash_hex.chars()) {
        if c.is_ascii_alphabetic() && h.to_digit(16).unwrap_or(0) >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }

    checksummed
}
