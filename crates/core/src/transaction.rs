//! Ledger transactions, their digest, signing and verification.

use crate::amount::Amount;
use crate::crypto::{recover_address, Address, MessageSigner, Signature};
use crate::encoding::{hash_full, hash_part, HashPart};
use crate::hash::{hash, Hash};
use crate::validation::{JsonValidator, ValidationError, TRANSACTION_SCHEMA};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A single trade settlement record.
///
/// `signer` and `signature` stay `None` until [`Transaction::sign`] succeeds.
/// The signer is part of the digest, the signature never is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// ID of the trade.
    pub trade_id: String,
    /// ID of the user.
    pub user_id: String,
    /// Settlement state tag, e.g. "0" pending or "1" settled.
    pub state: String,
    /// Amount transferred.
    pub amount: Amount,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// User ID on the exchange side.
    pub exchange_user_id: String,
    /// ID of the exchange.
    pub exchange_id: String,
    /// Address that signed this transaction.
    #[serde(default, with = "empty_as_none")]
    pub signer: Option<Address>,
    /// Signature over the transaction digest.
    #[serde(default, with = "empty_as_none")]
    pub signature: Option<Signature>,
}

/// `None` travels as the empty string.
mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        match s.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

impl Transaction {
    /// Create a new unsigned transaction.
    pub fn new_unsigned(
        trade_id: impl Into<String>,
        user_id: impl Into<String>,
        state: impl Into<String>,
        amount: impl Into<Amount>,
        timestamp: u64,
        exchange_user_id: impl Into<String>,
        exchange_id: impl Into<String>,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            user_id: user_id.into(),
            state: state.into(),
            amount: amount.into(),
            timestamp,
            exchange_user_id: exchange_user_id.into(),
            exchange_id: exchange_id.into(),
            signer: None,
            signature: None,
        }
    }

    /// Whether a signature has been attached.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// The digest of this transaction (excludes the signature).
    pub fn hash(&self) -> Hash {
        hash_full(self)
    }

    fn hash_fields(&self, signer: Option<&Address>, buffer: &mut Vec<u8>) {
        hash_part(&self.trade_id, buffer);
        hash_part(&self.user_id, buffer);
        hash_part(&self.state, buffer);
        hash_part(&self.amount, buffer);
        hash_part(&self.timestamp, buffer);
        hash_part(&self.exchange_user_id, buffer);
        hash_part(&self.exchange_id, buffer);
        match signer {
            Some(addr) => hash_part(addr, buffer),
            None => hash_part("", buffer),
        }
    }

    fn hash_with_signer(&self, signer: &Address) -> Hash {
        let mut buffer = Vec::new();
        self.hash_fields(Some(signer), &mut buffer);
        hash(&buffer)
    }

    /// Sign the transaction with the given signer.
    ///
    /// The digest is taken with the signer's address already in place, so
    /// the address is covered by the signature. Nothing is modified unless
    /// the signer succeeds.
    pub async fn sign<S>(&mut self, signer: &S) -> Result<(), S::Error>
    where
        S: MessageSigner + ?Sized,
    {
        let address = signer.address().await?;
        let digest = self.hash_with_signer(&address);
        let signature = signer.sign_message(digest.as_bytes()).await?;

        self.signer = Some(address);
        self.signature = Some(signature);
        debug!(signer = %address, hash = %digest, "transaction signed");
        Ok(())
    }

    /// Create a signed transaction.
    pub async fn signed<S>(mut self, signer: &S) -> Result<Self, S::Error>
    where
        S: MessageSigner + ?Sized,
    {
        self.sign(signer).await?;
        Ok(self)
    }

    /// Verify the signature against `expected`, or against the recorded
    /// signer when `expected` is `None`.
    ///
    /// Never fails: a missing or malformed signature yields `false`.
    pub fn verify(&self, expected: Option<&Address>) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let Some(claimed) = expected.or(self.signer.as_ref()) else {
            return false;
        };

        let digest = self.hash();
        match recover_address(digest.as_bytes(), signature) {
            Ok(recovered) => recovered == *claimed,
            Err(e) => {
                debug!(error = %e, hash = %digest, "signature recovery failed");
                false
            }
        }
    }

    /// JSON form, with `amount` as a decimal string.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("transaction serialization should not fail")
    }

    /// Revive a transaction from JSON after checking it against the schema.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        Self::from_json_with(JsonValidator::global(), value)
    }

    /// Like [`Transaction::from_json`], with an explicit validator.
    pub fn from_json_with(validator: &JsonValidator, value: &Value) -> Result<Self, ValidationError> {
        validator.validate(TRANSACTION_SCHEMA, value)?;
        serde_json::from_value(value.clone()).map_err(|source| ValidationError::Decode {
            type_name: TRANSACTION_SCHEMA.to_string(),
            source,
        })
    }

    /// Parse and revive a transaction from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(&value)
    }
}

impl HashPart for Transaction {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        self.hash_fields(self.signer.as_ref(), buffer);
    }
}
