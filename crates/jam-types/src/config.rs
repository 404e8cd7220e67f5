//! Engine configuration: signing-domain parameters and well-known addresses.

use crate::validation::{Field, FieldType, Schema};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("parse error: {0}")]
	Parse(String),
	#[error("validation error: {0}")]
	Validation(#[from] crate::validation::ValidationError),
}

/// Static parameters of one deployed settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
	/// Chain id baked into every signing domain.
	pub chain_id: u64,
	/// The settlement engine's own address: custody account for in-flight
	/// funds and verifying contract of the order domain.
	pub verifying_contract: Address,
	/// Canonical Permit2 deployment.
	pub permit2: Address,
	/// External Blend maker-liquidity contract.
	pub blend: Address,
}

impl SettlementConfig {
	fn schema() -> Schema {
		Schema::new(
			vec![
				Field::new("chain_id", FieldType::Integer { min: Some(1), max: None }),
				Field::address("verifying_contract"),
			],
			vec![Field::address("permit2"), Field::address("blend")],
		)
	}

	/// Loads and validates configuration from a TOML document.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let value: toml::Value = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
		Self::schema().validate(&value)?;

		let table = value
			.as_table()
			.ok_or_else(|| ConfigError::Parse("top level must be a table".to_string()))?;
		let address = |key: &str| -> Address {
			table
				.get(key)
				.and_then(|v| v.as_str())
				.and_then(|s| s.parse().ok())
				.unwrap_or(Address::ZERO)
		};
		Ok(Self {
			chain_id: table
				.get("chain_id")
				.and_then(|v| v.as_integer())
				.unwrap_or_default() as u64,
			verifying_contract: address("verifying_contract"),
			permit2: address("permit2"),
			blend: address("blend"),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loads_full_config() {
		let config = SettlementConfig::from_toml_str(
			r#"
			chain_id = 137
			verifying_contract = "0x00000000000000000000000000000000000000aa"
			permit2 = "0x000000000022d473030f116ddee9f6b43ac78ba3"
			blend = "0x00000000000000000000000000000000000000bb"
			"#,
		)
		.unwrap();
		assert_eq!(config.chain_id, 137);
		assert_ne!(config.permit2, Address::ZERO);
	}

	#[test]
	fn optional_addresses_default_to_zero() {
		let config = SettlementConfig::from_toml_str(
			r#"
			chain_id = 1
			verifying_contract = "0x00000000000000000000000000000000000000aa"
			"#,
		)
		.unwrap();
		assert_eq!(config.blend, Address::ZERO);
	}

	#[test]
	fn rejects_missing_chain_id() {
		let err = SettlementConfig::from_toml_str(
			r#"verifying_contract = "0x00000000000000000000000000000000000000aa""#,
		);
		assert!(err.is_err());
	}
}
