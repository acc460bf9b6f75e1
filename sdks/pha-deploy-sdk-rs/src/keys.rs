//! Signing secret handling.
//!
//! The operator's key arrives WIF-encoded. It is held in zeroizing storage,
//! never rendered, and only the derived owner address is shown to humans.

use std::fmt;

use bitcoin::secp256k1::SecretKey;
use bitcoin::{NetworkKind, PrivateKey};
use ed25519_dalek::SigningKey;
use serde::{Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::ConfigError;

/// Address kind byte for user-owned addresses.
const USER_ADDRESS_KIND: u8 = 1;

/// A WIF-encoded signing secret. `Debug` is redacted and there is no
/// `Display`/`Serialize`.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(wif: impl Into<String>) -> Self {
        Self(Zeroizing::new(wif.into()))
    }

    /// Raw WIF text. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Decode the ed25519 signing key whose seed is the WIF payload.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        let key = PrivateKey::from_wif(self.0.trim()).map_err(|e| ConfigError::InvalidWif {
            reason: e.to_string(),
        })?;
        let seed = Zeroizing::new(key.inner.secret_bytes());
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Public owner address derived from the secret.
    pub fn owner(&self) -> Result<OwnerAddress, ConfigError> {
        Ok(OwnerAddress(self.signing_key()?.verifying_key().to_bytes()))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Encode a 32-byte seed as a mainnet WIF.
pub fn wif_from_seed(seed: [u8; 32]) -> anyhow::Result<String> {
    let key = SecretKey::from_slice(&seed)?;
    Ok(PrivateKey::new(key, NetworkKind::Main).to_wif())
}

/// Public identity of a signer: the 32-byte ed25519 public key, rendered as
/// a `P`-prefixed base58 address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OwnerAddress(pub [u8; 32]);

impl OwnerAddress {
    pub fn public_key(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OwnerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; 34];
        raw[0] = USER_ADDRESS_KIND;
        raw[2..].copy_from_slice(&self.0);
        write!(f, "P{}", bs58::encode(raw).into_string())
    }
}

impl Serialize for OwnerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
