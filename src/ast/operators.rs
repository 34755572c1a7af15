use std::fmt;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Comparison
    /// Equal (`==`)
    Equal,
    /// Not equal (`~=` or `!=`)
    NotEqual,
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,

    // Arithmetic
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Matrix or scalar multiplication (`*`)
    Multiply,
    /// Right division (`/`)
    Divide,
    /// Left division (`\`), `a \ b` is `b / a` for scalars
    LeftDivide,
    /// Power (`^`)
    Power,
    /// Element-wise multiplication (`.*`)
    ElementMultiply,
    /// Element-wise division (`./`)
    ElementDivide,
    /// Element-wise power (`.^`)
    ElementPower,

    // Logical
    /// Short-circuit AND (`&&`)
    And,
    /// Short-circuit OR (`||`)
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Equal => "==",
            BinOp::NotEqual => "~=",
            BinOp::LessThan => "<",
            BinOp::GreaterThan => ">",
            BinOp::LessEqual => "<=",
            BinOp::GreaterEqual => ">=",
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::LeftDivide => "\\",
            BinOp::Power => "^",
            BinOp::ElementMultiply => ".*",
            BinOp::ElementDivide => "./",
            BinOp::ElementPower => ".^",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::GreaterThan
                | BinOp::LessEqual
                | BinOp::GreaterEqual
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Prefix operators. Runs of `+`/`-` are folded by the parser, so only an odd
/// number of minus signs produces a `Negate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    /// `~x` or `!x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    /// `x'`
    Transpose,
    /// `x!`
    Factorial,
}

/// Plain and compound assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl AssignOp {
    /// The operator a compound assignment applies before storing.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Subtract => Some(BinOp::Subtract),
            AssignOp::Multiply => Some(BinOp::Multiply),
            AssignOp::Divide => Some(BinOp::Divide),
            AssignOp::Power => Some(BinOp::Power),
        }
    }
}

/// What the operator pattern registry recognises at an operator position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorToken {
    Binary(BinOp),
    Assign(AssignOp),
    Postfix(PostfixOp),
    /// `++`
    Increment,
    /// `--`
    Decrement,
    /// `.name`
    Member,
    /// `:`
    Range,
    /// `|`, closing an absolute value
    Bar,
    /// `=>` outside a lambda header
    Arrow,
}
