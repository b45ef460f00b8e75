//! Typed views of the string values evaluations carry.
use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type a caller asks a variation to be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariationKind {
    String,
    Number,
    Boolean,
    Json,
}

/// A variation value converted to the requested [`VariationKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum VariationValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl From<&str> for VariationValue {
    fn from(value: &str) -> Self {
        VariationValue::String(value.to_owned())
    }
}

impl VariationValue {
    pub fn kind(&self) -> VariationKind {
        match self {
            VariationValue::String(_) => VariationKind::String,
            VariationValue::Number(_) => VariationKind::Number,
            VariationValue::Boolean(_) => VariationKind::Boolean,
            VariationValue::Json(_) => VariationKind::Json,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariationValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariationValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            VariationValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            VariationValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Interpret a raw variation value as `kind`.
///
/// Returns `None` when the value does not parse as that kind. Numbers must be finite, booleans
/// are `true`/`false` in any letter case.
///
/// # Examples
/// ```
/// # use flagsync::variation::{convert, VariationKind, VariationValue};
/// assert_eq!(convert("1.5", VariationKind::Number), Some(VariationValue::Number(1.5)));
/// assert_eq!(convert("yes", VariationKind::Boolean), None);
/// ```
pub fn convert(raw: &str, kind: VariationKind) -> Option<VariationValue> {
    match kind {
        VariationKind::String => Some(VariationValue::String(raw.to_owned())),
        VariationKind::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(VariationValue::Number),
        VariationKind::Boolean => {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("true") {
                Some(VariationValue::Boolean(true))
            } else if raw.eq_ignore_ascii_case("false") {
                Some(VariationValue::Boolean(false))
            } else {
                None
            }
        }
        VariationKind::Json => serde_json::from_str(raw).ok().map(VariationValue::Json),
    }
}
