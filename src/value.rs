//! Runtime values.

mod matrix;

use std::fmt;
use std::rc::Rc;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::ast::{BinOp, FunctionDef};
use crate::resolver::OverloadSet;
use crate::scope::ScopeId;

pub use matrix::Matrix;

/// A value produced by evaluating an expression.
///
/// # Examples
///
/// ```
/// use mathscript::value::{Matrix, Value};
///
/// let empty = Value::Empty;
/// let scalar = Value::Scalar(3.5);
/// let text = Value::String("hello".to_string());
/// let row = Value::Matrix(Matrix::row_vector(vec![1.0, 2.0, 3.0]));
/// assert_eq!(row.type_name(), "Matrix");
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// No value: `()`, an unset `let`, a bare `return`
    Empty,

    /// Double-precision number; comparisons produce 1 or 0
    Scalar(f64),

    /// UTF-8 string
    String(String),

    /// Dense numeric matrix
    Matrix(Matrix),

    /// Script closure or a named overload set
    Function(Function),

    /// Host-defined value registered by a plugin
    Custom(Rc<dyn CustomValue>),
}

/// Values a host plugin adds to the language.
///
/// Only `type_name` is required. Operators that are not overridden report an
/// unsupported-operator error.
pub trait CustomValue: fmt::Debug + fmt::Display {
    /// Name used for overload matching and error messages.
    fn type_name(&self) -> &str;

    fn is_truthy(&self) -> bool {
        true
    }

    fn equals(&self, _other: &Value) -> bool {
        false
    }

    /// `self op other`, or `other op self` when `reversed` is set.
    fn binary(&self, _op: BinOp, _other: &Value, _reversed: bool) -> Option<Result<Value, ValueError>> {
        None
    }

    fn negate(&self) -> Option<Value> {
        None
    }

    fn member(&self, _name: &str) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    Closure(Rc<Closure>),
    Overloads(Rc<OverloadSet>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => closure.def.display_name(),
            Function::Overloads(set) => set.name(),
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Closure(a), Function::Closure(b)) => Rc::ptr_eq(a, b),
            (Function::Overloads(a), Function::Overloads(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A function definition together with the scope it was created in.
#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("operator '{op}' is not supported between {left} and {right}")]
    UnsupportedOperator {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("operator '{op}' is not supported on {operand}")]
    UnsupportedUnary { op: &'static str, operand: String },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("index ({index}) is out of bounds for a {rows}x{columns} matrix")]
    IndexOutOfBounds {
        index: String,
        rows: usize,
        columns: usize,
    },

    #[error("invalid index {0}: indices must be positive integers")]
    InvalidIndex(String),

    #[error("{0} has no member '{1}'")]
    NoMember(String, String),

    #[error("{0} cannot be indexed")]
    NotIndexable(String),

    #[error("{0}")]
    Invalid(String),
}

impl Value {
    pub fn from_bool(b: bool) -> Value {
        Value::Scalar(if b { 1.0 } else { 0.0 })
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Empty => "Empty",
            Value::Scalar(_) => "Scalar",
            Value::String(_) => "String",
            Value::Matrix(_) => "Matrix",
            Value::Function(_) => "Function",
            Value::Custom(custom) => custom.type_name(),
        }
    }

    /// Check if the value is truthy (for conditions)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Scalar(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Matrix(m) => m.is_truthy(),
            Value::Function(_) => true,
            Value::Custom(custom) => custom.is_truthy(),
        }
    }

    /// Numeric value of a scalar or a 1x1 matrix.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(n) => Some(*n),
            Value::Matrix(m) => m.as_scalar(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content as a matrix; scalars become 1x1, `Empty` becomes `[]`.
    pub fn to_matrix(&self) -> Result<Matrix, ValueError> {
        match self {
            Value::Empty => Ok(Matrix::empty()),
            Value::Scalar(n) => Ok(Matrix::scalar(*n)),
            Value::Matrix(m) => Ok(m.clone()),
            other => Err(ValueError::Invalid(format!(
                "{} cannot be placed in a matrix",
                other.type_name()
            ))),
        }
    }

    pub fn negate(&self) -> Result<Value, ValueError> {
        match self {
            Value::Scalar(n) => Ok(Value::Scalar(-n)),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|x| -x))),
            Value::Custom(custom) => custom.negate().ok_or_else(|| unsupported_unary("-", self)),
            other => Err(unsupported_unary("-", other)),
        }
    }

    pub fn not(&self) -> Value {
        match self {
            Value::Matrix(m) => Value::Matrix(m.map(|x| if x == 0.0 { 1.0 } else { 0.0 })),
            other => Value::from_bool(!other.is_truthy()),
        }
    }

    pub fn abs(&self) -> Result<Value, ValueError> {
        match self {
            Value::Scalar(n) => Ok(Value::Scalar(n.abs())),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(f64::abs))),
            other => Err(unsupported_unary("|...|", other)),
        }
    }

    pub fn transpose(&self) -> Result<Value, ValueError> {
        match self {
            Value::Scalar(_) | Value::Empty => Ok(self.clone()),
            Value::Matrix(m) => Ok(Value::Matrix(m.transpose())),
            other => Err(unsupported_unary("'", other)),
        }
    }

    pub fn factorial(&self) -> Result<Value, ValueError> {
        match self {
            Value::Scalar(n) => factorial(*n).map(Value::Scalar),
            Value::Matrix(m) => {
                for &x in m.as_slice() {
                    factorial(x)?;
                }
                Ok(Value::Matrix(m.map(|x| factorial(x).unwrap_or(f64::NAN))))
            }
            other => Err(unsupported_unary("!", other)),
        }
    }

    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;

        match (self, rhs) {
            (Custom(custom), _) => custom
                .binary(op, rhs, false)
                .unwrap_or_else(|| Err(unsupported(op, self, rhs))),
            (_, Custom(custom)) => custom
                .binary(op, self, true)
                .unwrap_or_else(|| Err(unsupported(op, self, rhs))),

            (_, _) if op == BinOp::And => Ok(Value::from_bool(self.is_truthy() && rhs.is_truthy())),
            (_, _) if op == BinOp::Or => Ok(Value::from_bool(self.is_truthy() || rhs.is_truthy())),

            (Scalar(a), Scalar(b)) => Ok(Scalar(scalar_op(op, *a, *b))),

            (String(a), String(b)) => match op {
                BinOp::Add => Ok(String(format!("{a}{b}"))),
                BinOp::Equal => Ok(Value::from_bool(a == b)),
                BinOp::NotEqual => Ok(Value::from_bool(a != b)),
                BinOp::LessThan => Ok(Value::from_bool(a < b)),
                BinOp::GreaterThan => Ok(Value::from_bool(a > b)),
                BinOp::LessEqual => Ok(Value::from_bool(a <= b)),
                BinOp::GreaterEqual => Ok(Value::from_bool(a >= b)),
                _ => Err(unsupported(op, self, rhs)),
            },
            (String(a), Scalar(_)) if op == BinOp::Add => Ok(String(format!("{a}{rhs}"))),
            (Scalar(_), String(b)) if op == BinOp::Add => Ok(String(format!("{self}{b}"))),

            (Matrix(a), Matrix(b)) => Ok(Matrix(a.binary(op, b)?)),
            (Matrix(a), Scalar(b)) => Ok(Matrix(a.binary(op, &matrix::Matrix::scalar(*b))?)),
            (Scalar(a), Matrix(b)) => Ok(Matrix(matrix::Matrix::scalar(*a).binary(op, b)?)),

            (Empty, Empty) if op == BinOp::Equal => Ok(Value::from_bool(true)),
            (Empty, Empty) if op == BinOp::NotEqual => Ok(Value::from_bool(false)),
            (Empty, _) | (_, Empty) if op == BinOp::Equal => Ok(Value::from_bool(false)),
            (Empty, _) | (_, Empty) if op == BinOp::NotEqual => Ok(Value::from_bool(true)),

            (Function(a), Function(b)) if op == BinOp::Equal => Ok(Value::from_bool(a.ptr_eq(b))),
            (Function(a), Function(b)) if op == BinOp::NotEqual => {
                Ok(Value::from_bool(!a.ptr_eq(b)))
            }

            _ => Err(unsupported(op, self, rhs)),
        }
    }

    /// `value.name`
    pub fn member(&self, name: &str) -> Result<Value, ValueError> {
        let found = match (self, name) {
            (Value::Matrix(m), "rows") => Some(Value::Scalar(m.rows() as f64)),
            (Value::Matrix(m), "columns") => Some(Value::Scalar(m.columns() as f64)),
            (Value::Matrix(m), "length") => {
                Some(Value::Scalar(m.rows().max(m.columns()) as f64))
            }
            (Value::Scalar(_), "rows" | "columns" | "length") => Some(Value::Scalar(1.0)),
            (Value::String(s), "length") => Some(Value::Scalar(s.chars().count() as f64)),
            (Value::Custom(custom), _) => custom.member(name),
            _ => None,
        };
        found.ok_or_else(|| ValueError::NoMember(self.type_name().to_string(), name.to_string()))
    }

    /// `value(i)` or `value(i, j)` on something that is not a function.
    pub fn index(&self, args: &[Value]) -> Result<Value, ValueError> {
        let indices = to_indices(args)?;
        match self {
            Value::Matrix(m) => m.index(&indices).map(Value::Scalar),
            Value::Scalar(n) => matrix::Matrix::scalar(*n).index(&indices).map(Value::Scalar),
            Value::String(s) => match indices.as_slice() {
                [k] => s
                    .chars()
                    .nth(k - 1)
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| ValueError::IndexOutOfBounds {
                        index: k.to_string(),
                        rows: 1,
                        columns: s.chars().count(),
                    }),
                _ => Err(ValueError::Invalid("strings take a single index".to_string())),
            },
            other => Err(ValueError::NotIndexable(other.type_name().to_string())),
        }
    }
}

/// Converts script index values to 1-based positions.
pub fn to_indices(args: &[Value]) -> Result<Vec<usize>, ValueError> {
    args.iter()
        .map(|arg| match arg.as_scalar() {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n.is_finite() => Ok(n as usize),
            Some(n) => Err(ValueError::InvalidIndex(format_number(n))),
            None => Err(ValueError::InvalidIndex(arg.type_name().to_string())),
        })
        .collect()
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> ValueError {
    ValueError::UnsupportedOperator {
        op: op.symbol(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

fn unsupported_unary(op: &'static str, operand: &Value) -> ValueError {
    ValueError::UnsupportedUnary {
        op,
        operand: operand.type_name().to_string(),
    }
}

fn factorial(n: f64) -> Result<f64, ValueError> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(ValueError::Invalid(format!(
            "factorial needs a non-negative integer, got {}",
            format_number(n)
        )));
    }
    Ok((1..=n.min(171.0) as u64).fold(1.0, |acc, k| acc * k as f64))
}

/// Decimal arithmetic keeps results like `100 * (1 - 0.1)` exact. Operands
/// outside this magnitude band go straight to `f64`.
fn decimal_operand(x: f64) -> Option<Decimal> {
    if x == 0.0 || (1e-9..1e15).contains(&x.abs()) {
        Decimal::from_f64(x)
    } else {
        None
    }
}

fn decimal_arith(op: BinOp, a: f64, b: f64) -> Option<f64> {
    let (ad, bd) = (decimal_operand(a)?, decimal_operand(b)?);
    let rd = match op {
        BinOp::Add => ad.checked_add(bd)?,
        BinOp::Subtract => ad.checked_sub(bd)?,
        BinOp::Multiply | BinOp::ElementMultiply => ad.checked_mul(bd)?,
        BinOp::Divide | BinOp::ElementDivide => ad.checked_div(bd)?,
        _ => return None,
    };
    rd.to_f64()
}

/// Scalar semantics of every binary operator. Comparisons yield 1 or 0.
pub(crate) fn scalar_op(op: BinOp, a: f64, b: f64) -> f64 {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        BinOp::Add
        | BinOp::Subtract
        | BinOp::Multiply
        | BinOp::ElementMultiply
        | BinOp::Divide
        | BinOp::ElementDivide => decimal_arith(op, a, b).unwrap_or(match op {
            BinOp::Add => a + b,
            BinOp::Subtract => a - b,
            BinOp::Multiply | BinOp::ElementMultiply => a * b,
            _ => a / b,
        }),
        BinOp::LeftDivide => scalar_op(BinOp::Divide, b, a),
        BinOp::Power | BinOp::ElementPower => a.powf(b),
        BinOp::Equal => truth(a == b),
        BinOp::NotEqual => truth(a != b),
        BinOp::LessThan => truth(a < b),
        BinOp::GreaterThan => truth(a > b),
        BinOp::LessEqual => truth(a <= b),
        BinOp::GreaterEqual => truth(a >= b),
        BinOp::And => truth(a != 0.0 && b != 0.0),
        BinOp::Or => truth(a != 0.0 || b != 0.0),
    }
}

/// Whole numbers print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Matrix(a), Value::Matrix(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Custom(a), _) => a.equals(other),
            (_, Value::Custom(b)) => b.equals(self),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Scalar(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Matrix(m) => write!(f, "{m}"),
            Value::Function(function) => write!(f, "<function {}>", function.name()),
            Value::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Scalar(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Matrix> for Value {
    fn from(m: Matrix) -> Self {
        Value::Matrix(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_assisted_arithmetic_is_exact() {
        assert_eq!(scalar_op(BinOp::Multiply, 100.0, scalar_op(BinOp::Subtract, 1.0, 0.1)), 90.0);
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert_eq!(scalar_op(BinOp::Divide, 1.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        let v = Value::Scalar(2.0).binary(BinOp::LessThan, &Value::Scalar(3.0));
        assert_eq!(v, Ok(Value::Scalar(1.0)));
    }

    #[test]
    fn string_concatenation_formats_numbers() {
        let v = Value::from("n = ").binary(BinOp::Add, &Value::Scalar(4.0));
        assert_eq!(v, Ok(Value::from("n = 4")));
    }

    #[test]
    fn matrix_members() {
        let m = Value::Matrix(Matrix::zeros(2, 3).unwrap());
        assert_eq!(m.member("rows"), Ok(Value::Scalar(2.0)));
        assert_eq!(m.member("length"), Ok(Value::Scalar(3.0)));
        assert!(m.member("depth").is_err());
    }

    #[test]
    fn empty_is_falsy() {
        assert!(!Value::Empty.is_truthy());
        assert!(Value::Scalar(-1.0).is_truthy());
        assert!(!Value::Matrix(Matrix::empty()).is_truthy());
    }
}
