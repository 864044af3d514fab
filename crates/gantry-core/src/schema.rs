//! Declarative schema validation
//!
//! Schemas are built explicitly at startup and passed to their consumers;
//! validation reports every violation for a record at once, qualified by the
//! record's label or name, so a malformed stanza is never partially applied.

use std::fmt;

use serde_json::Value;

use crate::error::SchemaError;

/// Expected type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON string
    String,
    /// JSON integer
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// Any JSON value
    Any,
}

impl FieldType {
    /// Human-readable type name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// A single schema violation: the offending field, what was found, what was expected
#[derive(Debug, Clone)]
pub struct Violation {
    /// Offending field name
    pub field: String,
    /// What the record supplied, abbreviated
    pub found: Option<String>,
    /// What the schema expected
    pub expected: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "field '{}': expected {}, found {}",
                self.field, self.expected, found
            ),
            None => write!(f, "field '{}': {}", self.field, self.expected),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldDef {
    name: String,
    ty: FieldType,
    required: bool,
}

/// A declared record schema
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
    allow_extra: bool,
}

impl Schema {
    /// Create an empty schema with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            allow_extra: false,
        }
    }

    /// Declare a required field
    pub fn required(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    /// Declare an optional field
    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    /// Permit fields not named in the schema
    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collect every violation of this schema in `value`
    pub fn check(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();

        let Some(object) = value.as_object() else {
            violations.push(Violation {
                field: "<record>".to_string(),
                found: Some(abbreviate(value)),
                expected: "object".to_string(),
            });
            return violations;
        };

        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => violations.push(Violation {
                    field: field.name.clone(),
                    found: None,
                    expected: format!("required {} is missing", field.ty.name()),
                }),
                None => {}
                Some(v) if !field.ty.matches(v) => violations.push(Violation {
                    field: field.name.clone(),
                    found: Some(abbreviate(v)),
                    expected: field.ty.name().to_string(),
                }),
                Some(_) => {}
            }
        }

        if !self.allow_extra {
            for key in object.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    violations.push(Violation {
                        field: key.clone(),
                        found: None,
                        expected: "no such field in schema".to_string(),
                    });
                }
            }
        }

        violations
    }

    /// Validate a record, raising a single error carrying every violation.
    ///
    /// `ident` names the record (label, name, or primary dependency) so the
    /// error points at the offending stanza.
    pub fn validate(&self, value: &Value, ident: &str) -> Result<(), SchemaError> {
        let violations = self.check(value);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError {
                schema: self.name.clone(),
                ident: ident.to_string(),
                violations,
            })
        }
    }
}

fn abbreviate(value: &Value) -> String {
    let mut s = value.to_string();
    if s.len() > 60 {
        s.truncate(57);
        s.push_str("...");
    }
    s
}
