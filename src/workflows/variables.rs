//! Coercion of loosely-typed workflow execution variables.
//!
//! The workflow engine hands variables over as JSON-like values. The shipment
//! id may arrive as an integer of any width, a real, or a numeric string; all
//! of them collapse to a [`ShipmentId`] here or fail with a [`CoercionError`].

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::shipment::ShipmentId;

/// Longest rendering of a rejected value kept in error messages.
const MAX_FOUND_LEN: usize = 64;

/// The closed set of shapes a workflow variable can take.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Null,
    Integer(i128),
    Real(f64),
    Text(String),
    /// Anything else (booleans, lists, maps), kept as its rendered form.
    Other(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("variable is missing or null")]
    Missing,
    #[error("variable has unusable value {found}")]
    InvalidType { found: String },
}

impl From<&Value> for VariableValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => VariableValue::Null,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    VariableValue::Integer(i128::from(i))
                } else if let Some(u) = n.as_u64() {
                    VariableValue::Integer(i128::from(u))
                } else {
                    VariableValue::Real(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => VariableValue::Text(s.clone()),
            other => VariableValue::Other(render(other.to_string())),
        }
    }
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        VariableValue::from(&value)
    }
}

macro_rules! integer_variable {
    ($($ty:ty),*) => {
        $(impl From<$ty> for VariableValue {
            fn from(value: $ty) -> Self {
                VariableValue::Integer(i128::from(value))
            }
        })*
    };
}

integer_variable!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<f32> for VariableValue {
    fn from(value: f32) -> Self {
        VariableValue::Real(f64::from(value))
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Real(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

impl VariableValue {
    /// Collapse to a shipment id.
    ///
    /// Reals truncate toward zero; non-finite reals and values outside the
    /// `i64` range are rejected.
    pub fn to_shipment_id(&self) -> Result<ShipmentId, CoercionError> {
        match self {
            VariableValue::Null => Err(CoercionError::Missing),
            VariableValue::Integer(i) => i64::try_from(*i)
                .map(ShipmentId)
                .map_err(|_| invalid(i.to_string())),
            VariableValue::Real(f) => real_to_id(*f),
            VariableValue::Text(s) => s
                .parse::<i64>()
                .map(ShipmentId)
                .map_err(|_| invalid(format!("{s:?}"))),
            VariableValue::Other(rendered) => Err(invalid(rendered.clone())),
        }
    }
}

// 2^63 as f64; `i64::MAX as f64` rounds up to this, so the bound is exclusive.
const I64_UPPER_EXCLUSIVE: f64 = 9_223_372_036_854_775_808.0;

fn real_to_id(value: f64) -> Result<ShipmentId, CoercionError> {
    if !value.is_finite() {
        return Err(invalid(value.to_string()));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= I64_UPPER_EXCLUSIVE {
        return Err(invalid(value.to_string()));
    }
    Ok(ShipmentId(truncated as i64))
}

fn invalid(found: String) -> CoercionError {
    CoercionError::InvalidType {
        found: render(found),
    }
}

fn render(mut rendered: String) -> String {
    if rendered.len() > MAX_FOUND_LEN {
        let mut cut = MAX_FOUND_LEN;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push('…');
    }
    rendered
}

/// Extract and coerce the shipment id from a variable bag.
pub fn shipment_id_from(
    variables: &HashMap<String, Value>,
    name: &str,
) -> Result<ShipmentId, CoercionError> {
    match variables.get(name) {
        None => Err(CoercionError::Missing),
        Some(value) => VariableValue::from(value).to_shipment_id(),
    }
}
