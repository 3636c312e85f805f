//! Secp256k1 message signing and signer-address recovery.
//!
//! Messages are signed with the Ethereum personal-message scheme: the signed
//! prehash is `keccak256("\x19Ethereum Signed Message:\n" ++ len ++ message)`
//! and the signer is identified by the last 20 bytes of the Keccak-256 hash of
//! its uncompressed public key.

use crate::encoding::{hash_part, HashPart};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

/// A 20-byte address derived from the public key hash.
pub type AddressBytes = [u8; 20];

/// Length of a recoverable signature: `r ‖ s ‖ v`.
pub const SIGNATURE_LENGTH: usize = 65;

const MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid address format")]
    InvalidAddress,
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Keccak-256 of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// The prehash actually signed for `message` under the personal-message scheme.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// An address on the ledger.
///
/// Equality is byte-wise, so two textual forms that differ only in case
/// compare equal once parsed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub AddressBytes);

impl Address {
    /// The zero address (all zeros).
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: AddressBytes) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &AddressBytes {
        &self.0
    }

    /// Derive the address of a secp256k1 public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.as_affine().to_encoded_point(false);
        // Skip the 0x04 uncompressed-point tag
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Self(addr)
    }

    /// Convert to a lowercase hex string (with 0x prefix).
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Mixed-case checksummed form (EIP-55).
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let byte = digest[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Parse from a hex string (with or without 0x prefix, any case).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr).map_err(|_| CryptoError::InvalidAddress)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl HashPart for Address {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        hash_part(self.to_checksum().as_str(), buffer);
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A recoverable secp256k1 signature, `r ‖ s ‖ v` with `v` in `{27, 28}`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Convert to a hex string (with 0x prefix).
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from a hex string (with or without 0x prefix).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut arr = [0u8; SIGNATURE_LENGTH];
        hex::decode_to_slice(s, &mut arr).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(arr))
    }

    fn parts(&self) -> Result<(EcdsaSignature, RecoveryId), CryptoError> {
        let sig = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|_| CryptoError::InvalidSignature)?;
        let v = match self.0[64] {
            27 | 28 => self.0[64] - 27,
            v @ (0 | 1) => v,
            _ => return Err(CryptoError::InvalidSignature),
        };
        let recid = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidSignature)?;
        Ok((sig, recid))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..18])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recover the address that produced `signature` over `message`.
pub fn recover_address(message: &[u8], signature: &Signature) -> Result<Address, CryptoError> {
    let (sig, recid) = signature.parts()?;
    let prehash = eip191_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recid)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(Address::from_verifying_key(&key))
}

/// Something able to sign messages on behalf of an address.
///
/// Implementations may be backed by a remote key store, so both operations
/// are asynchronous.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The address signatures will recover to.
    async fn address(&self) -> Result<Address, Self::Error>;

    /// Sign `message` under the personal-message scheme.
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, Self::Error>;
}

/// An in-process secp256k1 key.
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Generate a new random wallet.
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Create a wallet from a private key (32 bytes).
    pub fn from_private_key(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create a wallet from a hex private key (with or without 0x prefix).
    pub fn from_private_key_hex(s: &str) -> Result<Self, CryptoError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Self::from_private_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Get the private key bytes.
    pub fn private_key(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Get the address derived from the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a message. Deterministic (RFC 6979).
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let prehash = eip191_hash(message);
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recid.to_byte() + 27;
        Ok(Signature(bytes))
    }
}

#[async_trait]
impl MessageSigner for Wallet {
    type Error = CryptoError;

    async fn address(&self) -> Result<Address, CryptoError> {
        Ok(self.address)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        self.sign(message)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish()
    }
}
