//! JSON conversion of values and of the variable table.
//!
//! Hosts that persist or display results get a plain JSON shape:
//!
//! - `Empty` is `null`, scalars are numbers, strings are strings
//! - matrices are arrays of rows (`[[1, 2], [3, 4]]`); `[]` is `[]`
//! - non-finite scalars are the strings `"Inf"`, `"-Inf"` and `"NaN"`
//! - functions and custom values are their display text
//!
//! Object keys come out sorted, so output is deterministic.
//!
//! ```
//! use mathscript::Value;
//! use mathscript::output::to_json;
//! use mathscript::value::Matrix;
//!
//! let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! assert_eq!(to_json(&Value::Matrix(m)), "[[1.0,2.0],[3.0,4.0]]");
//! assert_eq!(to_json(&Value::Scalar(f64::INFINITY)), r#""Inf""#);
//! ```

use serde_json::{Map, Number, Value as Json};

use crate::value::{Matrix, Value, format_number};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object of variables")]
    NotAnObject,

    #[error("'{name}': {reason}")]
    Unsupported { name: String, reason: String },
}

fn number(n: f64) -> Json {
    match Number::from_f64(n) {
        Some(number) => Json::Number(number),
        None => Json::String(format_number(n)),
    }
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Empty => Json::Null,
        Value::Scalar(n) => number(*n),
        Value::String(s) => Json::String(s.clone()),
        Value::Matrix(m) => Json::Array(
            (0..m.rows())
                .filter_map(|r| m.row(r))
                .map(|row| Json::Array(row.iter().map(|&x| number(x)).collect()))
                .collect(),
        ),
        Value::Function(_) | Value::Custom(_) => Json::String(value.to_string()),
    }
}

fn json_number(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "Inf" => Some(f64::INFINITY),
            "-Inf" => Some(f64::NEG_INFINITY),
            "NaN" => Some(f64::NAN),
            _ => None,
        },
        _ => None,
    }
}

/// Inverse of [`value_to_json`] for the data-only types.
pub fn value_from_json(json: &Json) -> Result<Value, String> {
    match json {
        Json::Null => Ok(Value::Empty),
        Json::Bool(b) => Ok(Value::from_bool(*b)),
        Json::Number(_) => json_number(json)
            .map(Value::Scalar)
            .ok_or_else(|| "number out of range".to_string()),
        Json::String(s) => Ok(json_number(json).map_or_else(|| Value::String(s.clone()), Value::Scalar)),
        Json::Array(rows) => {
            let mut parsed = Vec::with_capacity(rows.len());
            for row in rows {
                let cells = match row {
                    Json::Array(cells) => cells.as_slice(),
                    single => std::slice::from_ref(single),
                };
                let row = cells
                    .iter()
                    .map(|cell| json_number(cell).ok_or_else(|| "matrix cells must be numbers".to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                parsed.push(row);
            }
            Matrix::from_rows(parsed)
                .map(Value::Matrix)
                .map_err(|e| e.to_string())
        }
        Json::Object(_) => Err("objects have no value counterpart".to_string()),
    }
}

/// Compact JSON text of a value.
pub fn to_json(value: &Value) -> String {
    value_to_json(value).to_string()
}

/// Indented JSON text of a value.
pub fn to_json_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(&value_to_json(value)).unwrap_or_default()
}

/// A variable table as a JSON object. Function values are left out.
pub fn bindings_to_json<'a>(bindings: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
    let object: Map<String, Json> = bindings
        .into_iter()
        .filter(|(_, value)| !matches!(value, Value::Function(_)))
        .map(|(name, value)| (name.to_string(), value_to_json(value)))
        .collect();
    Json::Object(object).to_string()
}

/// Parses a JSON object written by [`bindings_to_json`].
pub fn bindings_from_json(json: &str) -> Result<Vec<(String, Value)>, OutputError> {
    let Json::Object(object) = serde_json::from_str::<Json>(json)? else {
        return Err(OutputError::NotAnObject);
    };
    object
        .into_iter()
        .map(|(name, json)| match value_from_json(&json) {
            Ok(value) => Ok((name, value)),
            Err(reason) => Err(OutputError::Unsupported { name, reason }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matrix_is_an_empty_array() {
        assert_eq!(to_json(&Value::Matrix(Matrix::empty())), "[]");
        assert_eq!(value_from_json(&Json::Array(vec![])).unwrap(), Value::Matrix(Matrix::empty()));
    }

    #[test]
    fn flat_arrays_become_column_vectors() {
        let json: Json = serde_json::from_str("[1, 2, 3]").unwrap();
        let value = value_from_json(&json).unwrap();
        assert_eq!(value, Value::Matrix(Matrix::column_vector(vec![1.0, 2.0, 3.0])));
    }

    #[test]
    fn bindings_skip_functions_and_sort_keys() {
        let f = crate::Evaluator::new().eval_str("x => x").unwrap();
        let b = Value::Scalar(2.0);
        let a = Value::from("s");
        let json = bindings_to_json([("f", &f), ("b", &b), ("a", &a)]);
        assert_eq!(json, r#"{"a":"s","b":2.0}"#);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(matches!(bindings_from_json("[1]"), Err(OutputError::NotAnObject)));
    }
}
