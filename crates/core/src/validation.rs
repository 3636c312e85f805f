//! Named JSON schemas checked before any value is revived from JSON.

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

pub const TRANSACTION_SCHEMA: &str = "Transaction";
pub const BLOCK_HEADER_SCHEMA: &str = "BlockHeader";
pub const BLOCK_SCHEMA: &str = "Block";

const HASH_PATTERN: &str = "^0x[0-9a-fA-F]{64}$";
const ADDRESS_OR_EMPTY_PATTERN: &str = "^(0x[0-9a-fA-F]{40})?$";
const SIGNATURE_OR_EMPTY_PATTERN: &str = "^(0x[0-9a-fA-F]{130})?$";
const DECIMAL_PATTERN: &str = "^[0-9]+$";

/// Errors raised while checking or decoding JSON input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no schema registered for {0}")]
    UnknownSchema(String),

    #[error("{type_name} failed validation: {}", .violations.join("; "))]
    Schema {
        type_name: String,
        violations: Vec<String>,
    },

    #[error("schema for {type_name} does not compile: {message}")]
    InvalidSchema { type_name: String, message: String },

    #[error("malformed {type_name}: {source}")]
    Decode {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A set of named JSON schemas.
///
/// The default registry holds the schemas for [`Transaction`](crate::Transaction),
/// [`BlockHeader`](crate::BlockHeader) and [`Block`](crate::Block).
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    /// A registry with no schemas.
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Register a schema, replacing any previous one with the same name.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schemas.get(name)
    }

    /// Names of all registered schemas, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        let header = block_header_schema();
        let transaction = transaction_schema();
        let block = json!({
            "type": "object",
            "required": ["header", "transactions"],
            "properties": {
                "header": header.clone(),
                "transactions": { "type": "array", "items": transaction.clone() }
            }
        });

        Self::empty()
            .with_schema(TRANSACTION_SCHEMA, transaction)
            .with_schema(BLOCK_HEADER_SCHEMA, header)
            .with_schema(BLOCK_SCHEMA, block)
    }
}

fn decimal_or_integer() -> Value {
    json!({
        "anyOf": [
            { "type": "string", "pattern": DECIMAL_PATTERN },
            { "type": "integer", "minimum": 0 }
        ]
    })
}

fn transaction_schema() -> Value {
    json!({
        "type": "object",
        "required": [
            "trade_id", "user_id", "state", "amount",
            "timestamp", "exchange_user_id", "exchange_id"
        ],
        "properties": {
            "trade_id": { "type": "string" },
            "user_id": { "type": "string" },
            "state": { "type": "string" },
            "amount": decimal_or_integer(),
            "timestamp": { "type": "integer", "minimum": 0 },
            "exchange_user_id": { "type": "string" },
            "exchange_id": { "type": "string" },
            "signer": { "type": "string", "pattern": ADDRESS_OR_EMPTY_PATTERN },
            "signature": { "type": "string", "pattern": SIGNATURE_OR_EMPTY_PATTERN }
        }
    })
}

fn block_header_schema() -> Value {
    json!({
        "type": "object",
        "required": ["prev_block", "height", "merkle_root", "timestamp"],
        "properties": {
            "prev_block": { "type": "string", "pattern": HASH_PATTERN },
            "height": decimal_or_integer(),
            "merkle_root": { "type": "string", "pattern": HASH_PATTERN },
            "timestamp": { "type": "integer", "minimum": 0 }
        }
    })
}

/// Compiled validators for every schema of a [`SchemaRegistry`].
pub struct JsonValidator {
    validators: HashMap<String, Validator>,
}

static GLOBAL: Lazy<JsonValidator> = Lazy::new(|| {
    JsonValidator::new(&SchemaRegistry::default()).expect("built-in schemas must compile")
});

impl JsonValidator {
    /// Compile all schemas of `registry`.
    pub fn new(registry: &SchemaRegistry) -> Result<Self, ValidationError> {
        let mut validators = HashMap::new();
        for (name, schema) in &registry.schemas {
            let validator =
                jsonschema::validator_for(schema).map_err(|e| ValidationError::InvalidSchema {
                    type_name: name.clone(),
                    message: e.to_string(),
                })?;
            validators.insert(name.clone(), validator);
        }
        Ok(Self { validators })
    }

    /// The validator for the built-in schemas.
    pub fn global() -> &'static JsonValidator {
        &GLOBAL
    }

    /// Check `value` against the schema named `type_name`.
    pub fn validate(&self, type_name: &str, value: &Value) -> Result<(), ValidationError> {
        let validator = self
            .validators
            .get(type_name)
            .ok_or_else(|| ValidationError::UnknownSchema(type_name.to_string()))?;

        let violations: Vec<String> = validator
            .validate(value)
            .err()
            .into_iter()
            .flatten()
            .map(|e| format!("{} at '{}'", e, e.instance_path))
            .collect();

        if violations.is_empty() {
            return Ok(());
        }

        debug!(type_name, count = violations.len(), "schema validation failed");
        Err(ValidationError::Schema {
            type_name: type_name.to_string(),
            violations,
        })
    }

    /// Whether `value` matches the schema named `type_name`.
    pub fn is_valid(&self, type_name: &str, value: &Value) -> bool {
        self.validate(type_name, value).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Value {
        json!({
            "trade_id": "12345678",
            "user_id": "0x064c9Fc53d5936792845ca58778a52317fCf47F2",
            "state": "0",
            "amount": "123",
            "timestamp": 1668044556,
            "exchange_user_id": "997DE626B2D417F0361D61C09EB907A57226DB5B",
            "exchange_id": "a5c19fed89739383",
            "signer": "",
            "signature": ""
        })
    }

    #[test]
    fn test_default_registry_names() {
        let registry = SchemaRegistry::default();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec![BLOCK_SCHEMA, BLOCK_HEADER_SCHEMA, TRANSACTION_SCHEMA]);
    }

    #[test]
    fn test_valid_transaction() {
        let validator = JsonValidator::global();
        assert!(validator.validate(TRANSACTION_SCHEMA, &sample_transaction()).is_ok());
    }

    #[test]
    fn test_missing_field_is_reported() {
        let mut tx = sample_transaction();
        tx.as_object_mut().unwrap().remove("exchange_id");

        let err = JsonValidator::global()
            .validate(TRANSACTION_SCHEMA, &tx)
            .unwrap_err();
        match err {
            ValidationError::Schema {
                type_name,
                violations,
            } => {
                assert_eq!(type_name, TRANSACTION_SCHEMA);
                assert!(violations.iter().any(|v| v.contains("exchange_id")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_every_violation_is_reported() {
        let mut tx = sample_transaction();
        tx["timestamp"] = json!("soon");
        tx["state"] = json!(0);

        match JsonValidator::global().validate(TRANSACTION_SCHEMA, &tx) {
            Err(ValidationError::Schema { violations, .. }) => {
                assert_eq!(violations.len(), 2, "{violations:?}");
                assert!(violations.iter().any(|v| v.contains("/timestamp")));
                assert!(violations.iter().any(|v| v.contains("/state")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_types_rejected() {
        let validator = JsonValidator::global();

        let mut tx = sample_transaction();
        tx["amount"] = json!("-5");
        assert!(!validator.is_valid(TRANSACTION_SCHEMA, &tx));

        let mut tx = sample_transaction();
        tx["timestamp"] = json!("1668044556");
        assert!(!validator.is_valid(TRANSACTION_SCHEMA, &tx));

        let mut tx = sample_transaction();
        tx["signer"] = json!("0x1234");
        assert!(!validator.is_valid(TRANSACTION_SCHEMA, &tx));
    }

    #[test]
    fn test_unknown_schema() {
        let err = JsonValidator::global()
            .validate("Receipt", &json!({}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownSchema(name) if name == "Receipt"));
    }

    #[test]
    fn test_custom_schema() {
        let registry = SchemaRegistry::empty().with_schema("Id", json!({ "type": "string" }));
        let validator = JsonValidator::new(&registry).unwrap();

        assert!(validator.is_valid("Id", &json!("abc")));
        assert!(!validator.is_valid("Id", &json!(1)));
        assert!(!validator.is_valid(TRANSACTION_SCHEMA, &sample_transaction()));
    }

    #[test]
    fn test_invalid_schema() {
        let registry = SchemaRegistry::empty().with_schema("Broken", json!({ "type": 12 }));
        assert!(matches!(
            JsonValidator::new(&registry),
            Err(ValidationError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_block_schema_checks_nested_transactions() {
        let block = json!({
            "header": {
                "prev_block": format!("0x{}", "0".repeat(64)),
                "height": "1",
                "merkle_root": format!("0x{}", "0".repeat(64)),
                "timestamp": 1668044556
            },
            "transactions": [sample_transaction(), { "trade_id": 5 }]
        });
        assert!(!JsonValidator::global().is_valid(BLOCK_SCHEMA, &block));
    }
}
