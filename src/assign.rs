//! Assignment targets.
//!
//! The left side of `=` is either a plain name or an indexed name
//! (`x(k)`, `m(i, j)`). Indexed stores grow matrices on demand.

use crate::ast::{Expr, ExprKind};
use crate::value::{Matrix, Value, ValueError};

/// A location an assignment can write to.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget<'a> {
    /// `name = ...`
    Symbol(&'a str),

    /// `name(i) = ...` or `name(i, j) = ...`
    Index { name: &'a str, indices: &'a [Expr] },
}

/// Whether an expression may appear on the left of an assignment.
pub fn is_assignable(expr: &Expr) -> bool {
    extract_target(expr).is_some()
}

/// The write location described by `expr`, if it is one.
///
/// # Examples
///
/// ```
/// use mathscript::assign::{AssignTarget, extract_target};
/// use mathscript::parser::Parser;
///
/// let expr = Parser::new("x(3)").parse().unwrap();
/// assert!(matches!(
///     extract_target(&expr),
///     Some(AssignTarget::Index { name: "x", .. })
/// ));
/// ```
pub fn extract_target(expr: &Expr) -> Option<AssignTarget<'_>> {
    match &expr.kind {
        ExprKind::Symbol(name) => Some(AssignTarget::Symbol(name)),
        ExprKind::Call { callee, args } if !args.is_empty() => {
            callee.as_symbol().map(|name| AssignTarget::Index {
                name,
                indices: args,
            })
        }
        _ => None,
    }
}

/// Writes `value` at 1-based `indices` of `current` and returns the updated
/// value. A missing or empty target starts out as `[]`.
pub fn store_indexed(
    current: Option<Value>,
    indices: &[usize],
    value: &Value,
) -> Result<Value, ValueError> {
    let element = value.as_scalar().ok_or_else(|| {
        ValueError::Invalid(format!(
            "cannot store {} in a matrix element",
            value.type_name()
        ))
    })?;

    let mut matrix = match current {
        None | Some(Value::Empty) => Matrix::empty(),
        Some(Value::Scalar(n)) => Matrix::scalar(n),
        Some(Value::Matrix(m)) => m,
        Some(other) => return Err(ValueError::NotIndexable(other.type_name().to_string())),
    };
    matrix.set(indices, element)?;
    Ok(Value::Matrix(matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn target_of(source: &str) -> Option<String> {
        let expr = Parser::new(source).parse().ok()?;
        extract_target(&expr).map(|target| match target {
            AssignTarget::Symbol(name) => name.to_string(),
            AssignTarget::Index { name, indices } => format!("{name}/{}", indices.len()),
        })
    }

    #[test]
    fn symbols_and_indexed_symbols_are_targets() {
        assert_eq!(target_of("x"), Some("x".to_string()));
        assert_eq!(target_of("m(1, 2)"), Some("m/2".to_string()));
    }

    #[test]
    fn other_expressions_are_not_targets() {
        assert_eq!(target_of("x + 1"), None);
        assert_eq!(target_of("f()"), None);
        assert_eq!(target_of("3"), None);
        assert_eq!(target_of("(x)"), None);
    }

    #[test]
    fn storing_into_nothing_creates_a_row() {
        let value = store_indexed(None, &[3], &Value::Scalar(7.0)).unwrap();
        assert_eq!(
            value,
            Value::Matrix(Matrix::row_vector(vec![0.0, 0.0, 7.0]))
        );
    }

    #[test]
    fn strings_cannot_be_stored_in_cells() {
        let err = store_indexed(None, &[1], &Value::from("a")).unwrap_err();
        assert!(matches!(err, ValueError::Invalid(_)));
    }
}
