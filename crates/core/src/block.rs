//! Block and block header structures.

use crate::encoding::{hash_full, hash_part, HashPart};
use crate::hash::Hash;
use crate::merkle::{build_merkle_tree, MerkleProof, MerkleTree};
use crate::transaction::Transaction;
use crate::validation::{JsonValidator, ValidationError, BLOCK_HEADER_SCHEMA, BLOCK_SCHEMA};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while assembling a block.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block height overflows after predecessor height {0}")]
    HeightOverflow(u64),
}

/// The header of a block containing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hash of the previous block (null for the first block).
    pub prev_block: Hash,
    /// Predecessor height + 1. Bounded by `u64::MAX`; revived JSON heights
    /// beyond it are rejected as schema violations.
    #[serde(with = "decimal_u64")]
    pub height: u64,
    /// Merkle root of transactions (null for an empty block).
    pub merkle_root: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// Heights travel as decimal strings; plain numbers are accepted too.
mod decimal_u64 {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    struct DecimalVisitor;

    impl<'de> Visitor<'de> for DecimalVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal string or a non-negative integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(E::custom)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

impl BlockHeader {
    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        hash_full(self)
    }

    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// Revive a header from JSON after checking it against the schema.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        Self::from_json_with(JsonValidator::global(), value)
    }

    /// Like [`BlockHeader::from_json`], with an explicit validator.
    pub fn from_json_with(validator: &JsonValidator, value: &Value) -> Result<Self, ValidationError> {
        validator.validate(BLOCK_HEADER_SCHEMA, value)?;
        check_height_range(&value["height"])?;
        serde_json::from_value(value.clone()).map_err(|source| ValidationError::Decode {
            type_name: BLOCK_HEADER_SCHEMA.to_string(),
            source,
        })
    }
}

/// The schema only checks the height's shape, not that it fits in a `u64`.
fn check_height_range(height: &Value) -> Result<(), ValidationError> {
    let in_range = match height {
        Value::String(s) => s.parse::<u64>().is_ok(),
        Value::Number(n) => n.as_u64().is_some(),
        _ => false,
    };
    if in_range {
        return Ok(());
    }
    Err(ValidationError::Schema {
        type_name: BLOCK_HEADER_SCHEMA.to_string(),
        violations: vec![format!("{height} exceeds the maximum height at '/height'")],
    })
}

impl HashPart for BlockHeader {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        hash_part(&self.prev_block, buffer);
        hash_part(&self.height, buffer);
        hash_part(&self.merkle_root, buffer);
        hash_part(&self.timestamp, buffer);
    }
}

/// A header together with its ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions in merkle-leaf order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block on top of `prev_hash` / `prev_height`, stamped with the
    /// current time.
    pub fn create_block(
        prev_hash: Hash,
        prev_height: u64,
        transactions: Vec<Transaction>,
    ) -> Result<Self, BlockError> {
        Self::create_block_at(
            prev_hash,
            prev_height,
            transactions,
            BlockHeader::current_timestamp(),
        )
    }

    /// Create a block with an explicit timestamp.
    pub fn create_block_at(
        prev_hash: Hash,
        prev_height: u64,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> Result<Self, BlockError> {
        let height = prev_height
            .checked_add(1)
            .ok_or(BlockError::HeightOverflow(prev_height))?;

        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        let merkle_root = build_merkle_tree(&tx_hashes)
            .last()
            .copied()
            .unwrap_or(Hash::NULL);

        debug!(height, txs = transactions.len(), %merkle_root, "block created");

        Ok(Self {
            header: BlockHeader {
                prev_block: prev_hash,
                height,
                merkle_root,
                timestamp,
            },
            transactions,
        })
    }

    /// Get the block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Get the block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Build the merkle tree over this block's transactions.
    pub fn merkle_tree(&self) -> MerkleTree {
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        MerkleTree::new(&tx_hashes)
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> bool {
        let computed = self.merkle_tree().root().unwrap_or(Hash::NULL);
        computed == self.header.merkle_root
    }

    /// Inclusion proof for the transaction at `index`.
    pub fn transaction_proof(&self, index: usize) -> Option<MerkleProof> {
        self.merkle_tree().proof(index)
    }

    /// JSON form: the header (height as a decimal string) and every transaction.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("block serialization should not fail")
    }

    /// Revive a block from JSON after checking it against the schema.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        Self::from_json_with(JsonValidator::global(), value)
    }

    /// Like [`Block::from_json`], with an explicit validator.
    pub fn from_json_with(validator: &JsonValidator, value: &Value) -> Result<Self, ValidationError> {
        validator.validate(BLOCK_SCHEMA, value)?;

        let header = BlockHeader::from_json_with(validator, &value["header"])?;
        let transactions = value["transactions"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|tx| Transaction::from_json_with(validator, tx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            transactions,
        })
    }

    /// Parse and revive a block from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(trade_id: &str, amount: u64) -> Transaction {
        Transaction::new_unsigned(
            trade_id,
            "0x0000000000000000000000000000000000000000",
            "0",
            amount,
            1668044556,
            "997DE626B2D417F0361D61C09EB907A57226DB5B",
            "a5c19fed89739383",
        )
    }

    #[test]
    fn test_empty_block() {
        let block = Block::create_block(Hash::NULL, 0, vec![]).unwrap();

        assert_eq!(block.height(), 1);
        assert_eq!(block.header.prev_block, Hash::NULL);
        assert_eq!(block.header.merkle_root, Hash::NULL);
        assert!(block.verify_merkle_root());
        assert_eq!(block.tx_count(), 0);
    }

    #[test]
    fn test_single_transaction_root_is_leaf() {
        let t = tx("00000000", 1);
        let block = Block::create_block_at(Hash::NULL, 0, vec![t.clone()], 10).unwrap();
        assert_eq!(block.header.merkle_root, t.hash());
    }

    #[test]
    fn test_height_increments() {
        let block = Block::create_block_at(Hash::NULL, 41, vec![], 0).unwrap();
        assert_eq!(block.height(), 42);
    }

    #[test]
    fn test_height_overflow() {
        let err = Block::create_block_at(Hash::NULL, u64::MAX, vec![], 0).unwrap_err();
        assert!(matches!(err, BlockError::HeightOverflow(u64::MAX)));
    }

    #[test]
    fn test_timestamp_is_now() {
        let before = BlockHeader::current_timestamp();
        let block = Block::create_block(Hash::NULL, 0, vec![]).unwrap();
        let after = BlockHeader::current_timestamp();
        assert!(block.header.timestamp >= before && block.header.timestamp <= after);
    }

    #[test]
    fn test_header_hash_covers_every_field() {
        let block = Block::create_block_at(Hash::NULL, 0, vec![tx("1", 1)], 100).unwrap();
        let base = block.hash();

        let mut h = block.header.clone();
        h.height += 1;
        assert_ne!(h.hash(), base);

        let mut h = block.header.clone();
        h.timestamp += 1;
        assert_ne!(h.hash(), base);

        let mut h = block.header.clone();
        h.merkle_root = Hash::NULL;
        assert_ne!(h.hash(), base);

        let mut h = block.header.clone();
        h.prev_block = base;
        assert_ne!(h.hash(), base);
    }

    #[test]
    fn test_transaction_order_changes_root() {
        let a = Block::create_block_at(Hash::NULL, 0, vec![tx("1", 1), tx("2", 2)], 0).unwrap();
        let b = Block::create_block_at(Hash::NULL, 0, vec![tx("2", 2), tx("1", 1)], 0).unwrap();
        assert_ne!(a.header.merkle_root, b.header.merkle_root);
    }

    #[test]
    fn test_tampered_transaction_fails_root_check() {
        let mut block =
            Block::create_block_at(Hash::NULL, 0, vec![tx("1", 1), tx("2", 2), tx("3", 3)], 0)
                .unwrap();
        assert!(block.verify_merkle_root());

        block.transactions[1].amount = 99u64.into();
        assert!(!block.verify_merkle_root());
    }

    #[test]
    fn test_transaction_proof() {
        let txs: Vec<Transaction> = (0..5).map(|i| tx(&i.to_string(), i)).collect();
        let block = Block::create_block_at(Hash::NULL, 0, txs, 0).unwrap();

        for i in 0..5 {
            let proof = block.transaction_proof(i).unwrap();
            assert_eq!(proof.leaf, block.transactions[i].hash());
            assert!(crate::merkle::verify_proof(&block.header.merkle_root, &proof));
        }
        assert!(block.transaction_proof(5).is_none());
    }

    #[test]
    fn test_header_json_shape() {
        let block = Block::create_block_at(Hash::NULL, 0, vec![], 1668044556).unwrap();
        let json = block.to_json();

        assert_eq!(json["header"]["height"], json!("1"));
        assert_eq!(json["header"]["prev_block"], json!(Hash::NULL.to_hex()));
        assert_eq!(json["header"]["timestamp"], json!(1668044556u64));
        assert_eq!(json["transactions"], json!([]));
    }

    #[test]
    fn test_header_accepts_numeric_height() {
        let json = json!({
            "prev_block": Hash::NULL.to_hex(),
            "height": 7,
            "merkle_root": Hash::NULL.to_hex(),
            "timestamp": 0
        });
        assert_eq!(BlockHeader::from_json(&json).unwrap().height, 7);
    }

    #[test]
    fn test_header_rejects_height_beyond_u64() {
        let mut json = json!({
            "prev_block": Hash::NULL.to_hex(),
            "height": "18446744073709551615",
            "merkle_root": Hash::NULL.to_hex(),
            "timestamp": 0
        });
        assert_eq!(BlockHeader::from_json(&json).unwrap().height, u64::MAX);

        json["height"] = json!("18446744073709551616");
        match BlockHeader::from_json(&json) {
            Err(ValidationError::Schema {
                type_name,
                violations,
            }) => {
                assert_eq!(type_name, BLOCK_HEADER_SCHEMA);
                assert!(violations[0].contains("/height"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_block_rejects_height_beyond_u64() {
        let block = Block::create_block_at(Hash::NULL, 0, vec![], 0).unwrap();
        let mut json = block.to_json();
        json["header"]["height"] = json!("99999999999999999999");

        assert!(matches!(
            Block::from_json(&json),
            Err(ValidationError::Schema { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_bad_hash() {
        let block = Block::create_block_at(Hash::NULL, 0, vec![tx("1", 1)], 0).unwrap();
        let mut json = block.to_json();
        json["header"]["merkle_root"] = json!("0x1234");

        assert!(matches!(
            Block::from_json(&json),
            Err(ValidationError::Schema { .. })
        ));
    }
}
