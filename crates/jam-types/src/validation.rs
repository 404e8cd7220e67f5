//! TOML schema validation for engine configuration.

use thiserror::Error;

/// Errors raised while validating a configuration table.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("missing required field: {0}")]
	MissingField(String),
	#[error("invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("type mismatch for field '{field}': expected {expected}")]
	TypeMismatch { field: String, expected: String },
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A single field definition with an optional custom validator.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	validator: Option<FieldValidator>,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	/// A string field that must parse as a 0x-prefixed 20-byte address.
	pub fn address(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::String).with_validator(|value| {
			let addr = value.as_str().unwrap_or_default();
			let hex_part = addr.strip_prefix("0x").ok_or("address must start with 0x")?;
			if hex_part.len() != 40 || hex::decode(hex_part).is_err() {
				return Err("address must be 20 hex-encoded bytes".to_string());
			}
			Ok(())
		})
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		let ok = match &self.field_type {
			FieldType::String => value.is_str(),
			FieldType::Boolean => value.is_bool(),
			FieldType::Integer { min, max } => match value.as_integer() {
				Some(i) => min.map_or(true, |m| i >= m) && max.map_or(true, |m| i <= m),
				None => false,
			},
		};
		if !ok {
			return Err(ValidationError::TypeMismatch {
				field: self.name.clone(),
				expected: format!("{:?}", self.field_type),
			});
		}
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of one configuration table.
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| ValidationError::TypeMismatch {
			field: "root".to_string(),
			expected: "table".to_string(),
		})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![
				Field::new("chain_id", FieldType::Integer { min: Some(1), max: None }),
				Field::address("verifying_contract"),
			],
			vec![Field::new("domain_version", FieldType::String)],
		)
	}

	#[test]
	fn accepts_valid_table() {
		let value: toml::Value = toml::from_str(
			r#"
			chain_id = 1
			verifying_contract = "0x00000000000000000000000000000000000000aa"
			"#,
		)
		.unwrap();
		schema().validate(&value).unwrap();
	}

	#[test]
	fn rejects_missing_required_field() {
		let value: toml::Value = toml::from_str("chain_id = 1").unwrap();
		assert!(matches!(
			schema().validate(&value),
			Err(ValidationError::MissingField(_))
		));
	}

	#[test]
	fn rejects_malformed_address() {
		let value: toml::Value = toml::from_str(
			r#"
			chain_id = 1
			verifying_contract = "not-an-address"
			"#,
		)
		.unwrap();
		assert!(matches!(
			schema().validate(&value),
			Err(ValidationError::InvalidValue { .. })
		));
	}

	#[test]
	fn rejects_out_of_range_integer() {
		let value: toml::Value = toml::from_str(
			r#"
			chain_id = 0
			verifying_contract = "0x00000000000000000000000000000000000000aa"
			"#,
		)
		.unwrap();
		assert!(schema().validate(&value).is_err());
	}
}
