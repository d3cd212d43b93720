//! Configuration validation for backend sections.
//!
//! Every storage, lock and catalog backend declares a [`Schema`] for its own
//! TOML table. Schemas are checked when the system is built, so a bad value
//! fails at startup instead of on the first order.

use thiserror::Error;

/// A backend table that does not match its schema.
///
/// Field names are dotted paths from the backend table, with `[i]` for array
/// elements, e.g. `shops[0].queue_capacities.2`.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

impl ValidationError {
	fn mismatch(field: &str, expected: &'static str, value: &toml::Value) -> Self {
		ValidationError::TypeMismatch {
			field: field.to_string(),
			expected,
			actual: value.type_str(),
		}
	}

	fn invalid(field: &str, message: String) -> Self {
		ValidationError::InvalidValue {
			field: field.to_string(),
			message,
		}
	}
}

/// Expected shape of a configuration value.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer within inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// Array whose elements all have the inner type.
	Array(Box<FieldType>),
	/// Table with arbitrary keys whose values all have the inner type.
	Map(Box<FieldType>),
	/// Table with its own schema.
	Table(Schema),
}

impl FieldType {
	/// Checks `value` against this type, reporting failures under `path`.
	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		match self {
			FieldType::String if value.is_str() => Ok(()),
			FieldType::String => Err(ValidationError::mismatch(path, "string", value)),
			FieldType::Boolean if value.is_bool() => Ok(()),
			FieldType::Boolean => Err(ValidationError::mismatch(path, "boolean", value)),
			FieldType::Integer { min, max } => {
				let n = value
					.as_integer()
					.ok_or_else(|| ValidationError::mismatch(path, "integer", value))?;
				match (min, max) {
					(Some(min), _) if n < *min => Err(ValidationError::invalid(
						path,
						format!("Value {} is less than minimum {}", n, min),
					)),
					(_, Some(max)) if n > *max => Err(ValidationError::invalid(
						path,
						format!("Value {} is greater than maximum {}", n, max),
					)),
					_ => Ok(()),
				}
			},
			FieldType::Array(inner) => {
				let items = value
					.as_array()
					.ok_or_else(|| ValidationError::mismatch(path, "array", value))?;
				items
					.iter()
					.enumerate()
					.try_for_each(|(i, item)| inner.check(&format!("{}[{}]", path, i), item))
			},
			FieldType::Map(inner) => {
				let entries = value
					.as_table()
					.ok_or_else(|| ValidationError::mismatch(path, "table", value))?;
				entries
					.iter()
					.try_for_each(|(key, item)| inner.check(&format!("{}.{}", path, key), item))
			},
			FieldType::Table(schema) => schema.check_at(path, value),
		}
	}
}

/// Custom check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a [`Schema`].
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
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

	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(path, value)?;
		match &self.validator {
			Some(validator) => {
				validator(value).map_err(|message| ValidationError::invalid(path, message))
			},
			None => Ok(()),
		}
	}
}

/// Required and optional fields of a TOML table.
///
/// Unknown keys are ignored. Optional fields are checked only when present.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a backend table against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		self.check_at("", config)
	}

	fn check_at(&self, prefix: &str, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| {
			ValidationError::mismatch(if prefix.is_empty() { "root" } else { prefix }, "table", config)
		})?;
		let path = |name: &str| {
			if prefix.is_empty() {
				name.to_string()
			} else {
				format!("{}.{}", prefix, name)
			}
		};

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(path(&field.name)))?;
			field.check(&path(&field.name), value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(&path(&field.name), value)?;
			}
		}
		Ok(())
	}
}

/// A configuration schema that can validate TOML values.
///
/// Backends return one of these so the builder can check their table before
/// calling the factory.
pub trait ConfigSchema: Send + Sync {
	/// Validates a TOML configuration value against this schema.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new(
				"storage_path",
				FieldType::String,
			)
			.with_validator(|v| match v.as_str() {
				Some("") => Err("must not be empty".to_string()),
				_ => Ok(()),
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new(
					"queue_capacities",
					FieldType::Map(Box::new(FieldType::Integer {
						min: Some(0),
						max: None,
					})),
				),
			],
		)
	}

	#[test]
	fn test_valid_table_passes() {
		let value: toml::Value = toml::from_str(
			r#"
			storage_path = "./data"
			timeout_seconds = 10
			queue_capacities = { "1" = 5, "2" = 3 }
			"#,
		)
		.unwrap();
		assert!(schema().validate(&value).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let value: toml::Value = toml::from_str("timeout_seconds = 10").unwrap();
		assert!(matches!(
			schema().validate(&value),
			Err(ValidationError::MissingField(f)) if f == "storage_path"
		));
	}

	#[test]
	fn test_custom_validator_and_bounds() {
		let empty: toml::Value = toml::from_str(r#"storage_path = """#).unwrap();
		assert!(matches!(
			schema().validate(&empty),
			Err(ValidationError::InvalidValue { .. })
		));

		let too_large: toml::Value =
			toml::from_str("storage_path = \"x\"\ntimeout_seconds = 301").unwrap();
		assert!(matches!(
			schema().validate(&too_large),
			Err(ValidationError::InvalidValue { field, .. }) if field == "timeout_seconds"
		));
	}

	#[test]
	fn test_map_values_are_checked_with_path() {
		let value: toml::Value = toml::from_str(
			r#"
			storage_path = "x"
			queue_capacities = { "1" = 5, "2" = "many" }
			"#,
		)
		.unwrap();
		assert!(matches!(
			schema().validate(&value),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "queue_capacities.2"
		));
	}

	#[test]
	fn test_nested_tables_report_full_path() {
		let shop = Schema::new(vec![Field::new("id", FieldType::String)], vec![]);
		let schema = Schema::new(
			vec![Field::new("shops", FieldType::Array(Box::new(FieldType::Table(shop))))],
			vec![],
		);
		let value: toml::Value = toml::from_str("shops = [{ id = \"a\" }, { name = \"b\" }]").unwrap();
		assert!(matches!(
			schema.validate(&value),
			Err(ValidationError::MissingField(f)) if f == "shops[1].id"
		));
	}
}
