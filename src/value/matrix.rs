use std::fmt;

use crate::ast::BinOp;

use super::{ValueError, format_number, scalar_op};

/// Dense row-major matrix of numbers.
///
/// Indices exposed to scripts are 1-based; the accessors here that take
/// `usize` pairs are 0-based unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

/// Matrices and ranges with more elements than this are rejected instead
/// of allocated.
const MAX_ELEMENTS: usize = 10_000_000;

fn element_count(rows: usize, columns: usize) -> Result<usize, ValueError> {
    rows.checked_mul(columns)
        .filter(|&count| count <= MAX_ELEMENTS)
        .ok_or_else(|| ValueError::Invalid(format!("a {rows}x{columns} matrix is too large")))
}

impl Matrix {
    pub fn empty() -> Self {
        Matrix::default()
    }

    pub fn filled(rows: usize, columns: usize, value: f64) -> Result<Self, ValueError> {
        if rows == 0 || columns == 0 {
            return Ok(Matrix::empty());
        }
        Ok(Matrix {
            rows,
            columns,
            data: vec![value; element_count(rows, columns)?],
        })
    }

    pub fn zeros(rows: usize, columns: usize) -> Result<Self, ValueError> {
        Self::filled(rows, columns, 0.0)
    }

    pub fn identity(n: usize) -> Result<Self, ValueError> {
        let mut m = Self::zeros(n, n)?;
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        Ok(m)
    }

    pub fn scalar(value: f64) -> Self {
        Matrix {
            rows: 1,
            columns: 1,
            data: vec![value],
        }
    }

    pub fn row_vector(data: Vec<f64>) -> Self {
        if data.is_empty() {
            return Matrix::empty();
        }
        Matrix {
            rows: 1,
            columns: data.len(),
            data,
        }
    }

    pub fn column_vector(data: Vec<f64>) -> Self {
        Self::row_vector(data).transpose()
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ValueError> {
        let mut result = Matrix::empty();
        for row in rows {
            result = result.vcat(&Matrix::row_vector(row))?;
        }
        Ok(result)
    }

    /// `start:step:end`, inclusive of `end` when the steps land on it.
    pub fn range(start: f64, step: f64, end: f64) -> Result<Self, ValueError> {
        if step == 0.0 || !(start.is_finite() && step.is_finite() && end.is_finite()) {
            return Ok(Matrix::empty());
        }
        let span = (end - start) / step;
        if span < 0.0 {
            return Ok(Matrix::empty());
        }
        let count = (span + 1e-10).floor() as usize + 1;
        if count > MAX_ELEMENTS {
            return Err(ValueError::Invalid(format!(
                "range of {count} elements is too large"
            )));
        }
        Ok(Matrix::row_vector(
            (0..count).map(|i| start + step * i as f64).collect(),
        ))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_vector(&self) -> bool {
        self.rows == 1 || self.columns == 1
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The single element of a 1x1 matrix.
    pub fn as_scalar(&self) -> Option<f64> {
        match self.data.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row < self.rows && column < self.columns {
            self.data.get(row * self.columns + column).copied()
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            Some(&self.data[row * self.columns..(row + 1) * self.columns])
        } else {
            None
        }
    }

    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.columns {
            for r in 0..self.rows {
                data.push(self.data[r * self.columns + c]);
            }
        }
        Matrix {
            rows: self.columns,
            columns: self.rows,
            data,
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Matrix {
            rows: self.rows,
            columns: self.columns,
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.data.is_empty() && self.data.iter().all(|&x| x != 0.0 && !x.is_nan())
    }

    /// Horizontal concatenation. Empty operands are skipped.
    pub fn hcat(&self, other: &Matrix) -> Result<Self, ValueError> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.rows != other.rows {
            return Err(ValueError::DimensionMismatch(format!(
                "cannot place {}x{} beside {}x{}",
                other.rows, other.columns, self.rows, self.columns
            )));
        }
        let columns = self.columns + other.columns;
        let mut data = Vec::with_capacity(self.rows * columns);
        for r in 0..self.rows {
            data.extend_from_slice(&self.data[r * self.columns..(r + 1) * self.columns]);
            data.extend_from_slice(&other.data[r * other.columns..(r + 1) * other.columns]);
        }
        Ok(Matrix {
            rows: self.rows,
            columns,
            data,
        })
    }

    /// Vertical concatenation. Empty operands are skipped.
    pub fn vcat(&self, other: &Matrix) -> Result<Self, ValueError> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.columns != other.columns {
            return Err(ValueError::DimensionMismatch(format!(
                "cannot stack {}x{} below {}x{}",
                other.rows, other.columns, self.rows, self.columns
            )));
        }
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Ok(Matrix {
            rows: self.rows + other.rows,
            columns: self.columns,
            data,
        })
    }

    fn zip_with(&self, other: &Matrix, op: BinOp) -> Result<Self, ValueError> {
        if let Some(s) = other.as_scalar() {
            return Ok(self.map(|x| scalar_op(op, x, s)));
        }
        if let Some(s) = self.as_scalar() {
            return Ok(other.map(|x| scalar_op(op, s, x)));
        }
        if self.rows != other.rows || self.columns != other.columns {
            return Err(ValueError::DimensionMismatch(format!(
                "'{op}' needs equal sizes, got {}x{} and {}x{}",
                self.rows, self.columns, other.rows, other.columns
            )));
        }
        Ok(Matrix {
            rows: self.rows,
            columns: self.columns,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| scalar_op(op, a, b))
                .collect(),
        })
    }

    pub fn matmul(&self, other: &Matrix) -> Result<Self, ValueError> {
        if self.as_scalar().is_some() || other.as_scalar().is_some() {
            return self.zip_with(other, BinOp::Multiply);
        }
        if self.columns != other.rows {
            return Err(ValueError::DimensionMismatch(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.columns, other.rows, other.columns
            )));
        }
        let mut result = Matrix::zeros(self.rows, other.columns)?;
        for r in 0..self.rows {
            for c in 0..other.columns {
                let mut sum = 0.0;
                for k in 0..self.columns {
                    sum += self.data[r * self.columns + k] * other.data[k * other.columns + c];
                }
                result.data[r * other.columns + c] = sum;
            }
        }
        Ok(result)
    }

    fn power(&self, exponent: f64) -> Result<Self, ValueError> {
        if self.rows != self.columns || exponent < 0.0 || exponent.fract() != 0.0 {
            return Err(ValueError::Invalid(format!(
                "matrix power needs a square matrix and a non-negative integer exponent, got {}x{} ^ {}",
                self.rows,
                self.columns,
                format_number(exponent)
            )));
        }
        let mut result = Matrix::identity(self.rows)?;
        for _ in 0..exponent as u64 {
            result = result.matmul(self)?;
        }
        Ok(result)
    }

    pub fn binary(&self, op: BinOp, other: &Matrix) -> Result<Self, ValueError> {
        match op {
            BinOp::Multiply => self.matmul(other),
            BinOp::Divide if other.as_scalar().is_none() => Err(unsupported(op)),
            BinOp::LeftDivide if self.as_scalar().is_none() => Err(unsupported(op)),
            BinOp::Power => match (self.as_scalar(), other.as_scalar()) {
                (_, Some(exponent)) if self.as_scalar().is_none() => self.power(exponent),
                (Some(_), _) | (_, Some(_)) => self.zip_with(other, op),
                _ => Err(unsupported(op)),
            },
            _ => self.zip_with(other, op),
        }
    }

    /// 1-based element read. One index reads in column-major order, two
    /// read by row and column.
    pub fn index(&self, indices: &[usize]) -> Result<f64, ValueError> {
        let found = match *indices {
            [k] => self.linear_offset(k).and_then(|i| self.data.get(i).copied()),
            [r, c] if r >= 1 && c >= 1 => self.get(r - 1, c - 1),
            _ => {
                return Err(ValueError::Invalid(format!(
                    "matrices take one or two indices, got {}",
                    indices.len()
                )));
            }
        };
        found.ok_or_else(|| ValueError::IndexOutOfBounds {
            index: indices
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            rows: self.rows,
            columns: self.columns,
        })
    }

    fn linear_offset(&self, k: usize) -> Option<usize> {
        if k == 0 || k > self.data.len() {
            return None;
        }
        let k = k - 1;
        let (row, column) = (k % self.rows, k / self.rows);
        Some(row * self.columns + column)
    }

    /// 1-based element write, growing the matrix with zeros as needed.
    /// A linear index grows vectors along their length; a full matrix only
    /// grows through two indices.
    pub fn set(&mut self, indices: &[usize], value: f64) -> Result<(), ValueError> {
        match *indices {
            [k] if k >= 1 => {
                if k <= self.data.len() {
                    if let Some(i) = self.linear_offset(k) {
                        self.data[i] = value;
                    }
                    return Ok(());
                }
                if self.rows > 1 && self.columns == 1 {
                    self.resize(k, 1)?;
                    self.data[k - 1] = value;
                } else if self.rows <= 1 {
                    self.resize(1, k)?;
                    self.data[k - 1] = value;
                } else {
                    return Err(ValueError::IndexOutOfBounds {
                        index: k.to_string(),
                        rows: self.rows,
                        columns: self.columns,
                    });
                }
                Ok(())
            }
            [r, c] if r >= 1 && c >= 1 => {
                self.resize(self.rows.max(r), self.columns.max(c))?;
                let columns = self.columns;
                self.data[(r - 1) * columns + (c - 1)] = value;
                Ok(())
            }
            _ => Err(ValueError::Invalid(format!(
                "matrices take one or two positive indices, got {}",
                indices.len()
            ))),
        }
    }

    fn resize(&mut self, rows: usize, columns: usize) -> Result<(), ValueError> {
        if rows == self.rows && columns == self.columns {
            return Ok(());
        }
        let mut data = vec![0.0; element_count(rows, columns)?];
        for r in 0..self.rows.min(rows) {
            for c in 0..self.columns.min(columns) {
                data[r * columns + c] = self.data[r * self.columns + c];
            }
        }
        self.rows = rows;
        self.columns = columns;
        self.data = data;
        Ok(())
    }
}

fn unsupported(op: BinOp) -> ValueError {
    ValueError::UnsupportedOperator {
        op: op.symbol(),
        left: "Matrix".to_string(),
        right: "Matrix".to_string(),
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for r in 0..self.rows {
            if r > 0 {
                write!(f, "; ")?;
            }
            let row = &self.data[r * self.columns..(r + 1) * self.columns];
            let cells: Vec<String> = row.iter().map(|&x| format_number(x)).collect();
            write!(f, "{}", cells.join(" "))?;
        }
        write!(f, "]")
    }
}
