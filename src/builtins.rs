//! The core plugin: constants and elementary functions every engine starts
//! with unless [`EngineConfig::install_core`](crate::config::EngineConfig) is
//! turned off.

use crate::plugin::{Plugin, Registrar};
use crate::resolver::{ANY, Signature};
use crate::value::{Matrix, Value, ValueError, format_number};

pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn register(&self, r: &mut Registrar<'_>) {
        register_constants(r);
        register_elementwise(r);
        register_shape(r);
        register_reductions(r);
        register_conversions(r);
    }
}

fn register_constants(r: &mut Registrar<'_>) {
    r.constant("PiConstant", Value::Scalar(std::f64::consts::PI))
        .constant("EConstant", Value::Scalar(std::f64::consts::E))
        .constant("InfConstant", Value::Scalar(f64::INFINITY))
        .constant("NanConstant", Value::Scalar(f64::NAN))
        .constant("EpsConstant", Value::Scalar(f64::EPSILON))
        .constant("TrueConstant", Value::Scalar(1.0))
        .constant("FalseConstant", Value::Scalar(0.0));
}

fn scalar(args: &[Value], position: usize) -> Result<f64, ValueError> {
    args.get(position)
        .and_then(Value::as_scalar)
        .ok_or_else(|| ValueError::Invalid(format!("argument {} must be a scalar", position + 1)))
}

fn matrix(args: &[Value], position: usize) -> Result<Matrix, ValueError> {
    match args.get(position) {
        Some(value) => value.to_matrix(),
        None => Err(ValueError::Invalid(format!(
            "argument {} is missing",
            position + 1
        ))),
    }
}

fn dimension(n: f64) -> Result<usize, ValueError> {
    if n >= 0.0 && n.fract() == 0.0 && n.is_finite() {
        Ok(n as usize)
    } else {
        Err(ValueError::Invalid(format!(
            "dimension must be a non-negative integer, got {}",
            format_number(n)
        )))
    }
}

/// One-argument numeric functions with a scalar and a matrix overload.
fn register_elementwise(r: &mut Registrar<'_>) {
    let table: [(&str, fn(f64) -> f64); 10] = [
        ("AbsFunction", f64::abs),
        ("SqrtFunction", f64::sqrt),
        ("ExpFunction", f64::exp),
        ("LogFunction", f64::ln),
        ("FloorFunction", f64::floor),
        ("CeilFunction", f64::ceil),
        ("RoundFunction", f64::round),
        ("SinFunction", f64::sin),
        ("CosFunction", f64::cos),
        ("TanFunction", f64::tan),
    ];
    for (name, f) in table {
        r.function(name, Signature::new(["Scalar"]), move |args| {
            Ok(Value::Scalar(f(scalar(args, 0)?)))
        })
        .function(name, Signature::new(["Matrix"]), move |args| {
            Ok(Value::Matrix(matrix(args, 0)?.map(f)))
        });
    }
}

fn register_shape(r: &mut Registrar<'_>) {
    r.function("LengthFunction", Signature::new(["Matrix"]), |args| {
        let m = matrix(args, 0)?;
        let length = if m.is_empty() { 0 } else { m.rows().max(m.columns()) };
        Ok(Value::Scalar(length as f64))
    })
    .function("LengthFunction", Signature::new(["String"]), |args| {
        let length = args.first().and_then(Value::as_str).map_or(0, |s| s.chars().count());
        Ok(Value::Scalar(length as f64))
    })
    .function("NumelFunction", Signature::new(["Matrix"]), |args| {
        Ok(Value::Scalar(matrix(args, 0)?.len() as f64))
    })
    .function("IsemptyFunction", Signature::new([ANY]), |args| {
        let empty = match args.first() {
            Some(Value::Empty) | None => true,
            Some(Value::Matrix(m)) => m.is_empty(),
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        Ok(Value::from_bool(empty))
    })
    .function("SizeFunction", Signature::new(["Matrix"]), |args| {
        let m = matrix(args, 0)?;
        Ok(Value::Matrix(Matrix::row_vector(vec![
            m.rows() as f64,
            m.columns() as f64,
        ])))
    });

    for (name, fill) in [("ZerosFunction", 0.0), ("OnesFunction", 1.0)] {
        r.function(
            name,
            Signature::new(["Scalar", "Scalar"]).variadic(0, Some(1)),
            move |args| {
                let rows = dimension(scalar(args, 0)?)?;
                let columns = match args.len() {
                    1 => rows,
                    _ => dimension(scalar(args, 1)?)?,
                };
                Ok(Value::Matrix(Matrix::filled(rows, columns, fill)?))
            },
        );
    }

    r.function("EyeFunction", Signature::new(["Scalar"]), |args| {
        Ok(Value::Matrix(Matrix::identity(dimension(scalar(args, 0)?)?)?))
    });
}

/// Reduces a vector to a scalar, or each column of a matrix to one entry of
/// a row vector.
fn reduce(m: &Matrix, init: f64, f: impl Fn(f64, f64) -> f64) -> Value {
    if m.is_vector() || m.is_empty() {
        return Value::Scalar(m.as_slice().iter().copied().fold(init, &f));
    }
    let sums = (0..m.columns())
        .map(|c| {
            (0..m.rows())
                .filter_map(|r| m.get(r, c))
                .fold(init, &f)
        })
        .collect();
    Value::Matrix(Matrix::row_vector(sums))
}

fn register_reductions(r: &mut Registrar<'_>) {
    r.function("SumFunction", Signature::new(["Matrix"]), |args| {
        Ok(reduce(&matrix(args, 0)?, 0.0, |a, b| a + b))
    })
    .function("ProdFunction", Signature::new(["Matrix"]), |args| {
        Ok(reduce(&matrix(args, 0)?, 1.0, |a, b| a * b))
    });

    let extrema: [(&str, f64, fn(f64, f64) -> f64); 2] = [
        ("MaxFunction", f64::NEG_INFINITY, f64::max),
        ("MinFunction", f64::INFINITY, f64::min),
    ];
    for (name, init, pick) in extrema {
        r.function(name, Signature::new(["Matrix"]), move |args| {
            let m = matrix(args, 0)?;
            if m.is_empty() {
                return Ok(Value::Matrix(Matrix::empty()));
            }
            Ok(reduce(&m, init, pick))
        })
        .function(
            name,
            Signature::new(["Scalar"]).variadic(2, None),
            move |args| {
                let mut best = init;
                for position in 0..args.len() {
                    best = pick(best, scalar(args, position)?);
                }
                Ok(Value::Scalar(best))
            },
        );
    }
}

fn register_conversions(r: &mut Registrar<'_>) {
    r.function("Num2strFunction", Signature::new([ANY]), |args| {
        Ok(Value::String(
            args.first().map(ToString::to_string).unwrap_or_default(),
        ))
    })
    .function("Str2numFunction", Signature::new(["String"]), |args| {
        let text = args.first().and_then(Value::as_str).unwrap_or_default().trim();
        text.parse::<f64>()
            .map(Value::Scalar)
            .map_err(|_| ValueError::Invalid(format!("'{text}' is not a number")))
    })
    .function("TypeofFunction", Signature::new([ANY]), |args| {
        Ok(Value::String(
            args.first().map_or("Empty", Value::type_name).to_string(),
        ))
    });
}
