//! Dynamic field model
//!
//! A dynamic field is a named, typed value owned by an objective. Object-typed
//! fields own nested fields instead of carrying a value. Values cross the
//! storage and remote boundaries as a kind tag plus text; inside the crate
//! they are a typed [`FieldValue`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{impl_synchronizable, same_loaded_children, DetachedCopy, SyncEquivalent};
use crate::error::{Error, Result};

/// Kind tag of a dynamic field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Bool,
    Integer,
    Float,
    Date,
    Enumeration,
    Object,
}

impl FieldKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::Enumeration => "enumeration",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "bool" | "boolean" => Ok(Self::Bool),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "double" => Ok(Self::Float),
            "date" => Ok(Self::Date),
            "enumeration" | "enum" => Ok(Self::Enumeration),
            "object" => Ok(Self::Object),
            other => Err(Error::InvalidInput(format!(
                "unknown dynamic field kind: {other}"
            ))),
        }
    }
}

/// Typed value of a dynamic field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Unix ms
    Date(i64),
    /// External id of the selected enumeration value
    Enumeration(String),
    /// Nested fields live in `DynamicField::children`
    Object,
}

impl FieldValue {
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::String(_) => FieldKind::String,
            Self::Bool(_) => FieldKind::Bool,
            Self::Integer(_) => FieldKind::Integer,
            Self::Float(_) => FieldKind::Float,
            Self::Date(_) => FieldKind::Date,
            Self::Enumeration(_) => FieldKind::Enumeration,
            Self::Object => FieldKind::Object,
        }
    }

    /// Value used when the text form is empty.
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => Self::String(String::new()),
            FieldKind::Bool => Self::Bool(false),
            FieldKind::Integer => Self::Integer(0),
            FieldKind::Float => Self::Float(0.0),
            FieldKind::Date => Self::Date(0),
            FieldKind::Enumeration => Self::Enumeration(String::new()),
            FieldKind::Object => Self::Object,
        }
    }

    /// Encode into the kind tag and text form used by storage and the remote API.
    pub fn encode(&self) -> (FieldKind, String) {
        let text = match self {
            Self::String(value) | Self::Enumeration(value) => value.clone(),
            Self::Bool(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Date(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map_or_else(|| millis.to_string(), |date| date.to_rfc3339()),
            Self::Object => String::new(),
        };
        (self.kind(), text)
    }

    /// Decode a value from its kind tag and text form.
    ///
    /// Empty text decodes to [`FieldValue::default_for`] the kind.
    pub fn decode(kind: FieldKind, text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() && kind != FieldKind::String {
            return Ok(Self::default_for(kind));
        }

        let invalid = || Error::InvalidInput(format!("invalid {kind} field value: {trimmed}"));
        match kind {
            FieldKind::String => Ok(Self::String(text.to_string())),
            FieldKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Self::Bool(true)),
                "false" | "0" | "no" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            FieldKind::Integer => trimmed.parse().map(Self::Integer).map_err(|_| invalid()),
            FieldKind::Float => trimmed.parse().map(Self::Float).map_err(|_| invalid()),
            FieldKind::Date => DateTime::parse_from_rfc3339(trimmed)
                .map(|date| Self::Date(date.timestamp_millis()))
                .or_else(|_| trimmed.parse().map(Self::Date))
                .map_err(|_| invalid()),
            FieldKind::Enumeration => Ok(Self::Enumeration(trimmed.to_string())),
            FieldKind::Object => Ok(Self::Object),
        }
    }
}

/// A dynamic field owned by an objective or by an object-typed parent field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicField {
    pub id: i64,
    pub external_id: Option<String>,
    pub name: String,
    pub value: FieldValue,
    pub objective_id: Option<i64>,
    pub parent_field_id: Option<i64>,
    /// Remote connection whose value sets enumeration fields resolve against
    pub connection_info_id: Option<i64>,
    pub synchronization_mate_id: Option<i64>,
    pub is_synchronized: bool,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Nested fields of an object-typed field; `None` until loaded
    #[serde(default)]
    pub children: Option<Vec<DynamicField>>,
}

impl DynamicField {
    #[must_use]
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        let children = matches!(value, FieldValue::Object).then(Vec::new);
        Self {
            id: 0,
            external_id: None,
            name: name.into(),
            value,
            objective_id: None,
            parent_field_id: None,
            connection_info_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            updated_at: crate::util::unix_millis_now(),
            children,
        }
    }

    pub const fn kind(&self) -> FieldKind {
        self.value.kind()
    }

    /// Natural-key match: same name and kind.
    pub fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.kind() == other.kind()
    }

    /// Applies `visit` to this field and every loaded nested field.
    pub fn visit_mut(&mut self, visit: &mut impl FnMut(&mut Self)) {
        visit(self);
        if let Some(children) = self.children.as_mut() {
            for child in children {
                child.visit_mut(visit);
            }
        }
    }
}

impl_synchronizable!(DynamicField);

impl SyncEquivalent for DynamicField {
    fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && same_loaded_children(self.children.as_ref(), other.children.as_ref())
    }
}

impl DetachedCopy for DynamicField {
    fn detached_copy(&self) -> Self {
        Self {
            id: 0,
            objective_id: None,
            parent_field_id: None,
            connection_info_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            children: Some(Vec::new()),
            ..self.clone()
        }
    }
}
