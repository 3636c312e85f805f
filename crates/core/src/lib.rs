//! Core ledger primitives for rollup blocks.
//!
//! This crate provides the record types of a rollup ledger and the machinery
//! that gives them integrity:
//! - A 32-byte digest and the canonical field encoding it is computed over
//! - Arbitrary-precision amounts
//! - Secp256k1 message signing and signer recovery
//! - Transactions, blocks and block headers with a JSON wire format
//! - Merkle trees over transaction hashes
//!
//! # Example
//!
//! ```rust,no_run
//! use rollup_core::{Block, Hash, Transaction, Wallet};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = Wallet::random();
//! let tx = Transaction::new_unsigned(
//!     "12345678",
//!     "0x064c9Fc53d5936792845ca58778a52317fCf47F2",
//!     "0",
//!     123u64,
//!     1668044556,
//!     "997DE626B2D417F0361D61C09EB907A57226DB5B",
//!     "a5c19fed89739383",
//! )
//! .signed(&wallet)
//! .await?;
//! assert!(tx.verify(None));
//!
//! let block = Block::create_block(Hash::NULL, 0, vec![tx])?;
//! let revived = Block::from_json(&block.to_json())?;
//! assert_eq!(block, revived);
//! # Ok(())
//! # }
//! ```

pub mod amount;
pub mod block;
pub mod crypto;
pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod validation;

// Re-export commonly used types at the crate root
pub use amount::{Amount, ParseAmountError};
pub use block::{Block, BlockError, BlockHeader};
pub use crypto::{recover_address, Address, CryptoError, MessageSigner, Signature, Wallet};
pub use encoding::{hash_full, hash_part, HashPart};
pub use hash::{hash, hash_multi, Hash, H256};
pub use merkle::{build_merkle_tree, merkle_root, MerkleProof, MerkleTree};
pub use transaction::Transaction;
pub use validation::{JsonValidator, SchemaRegistry, ValidationError};
