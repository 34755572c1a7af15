//! # Abstract Syntax Tree
//!
//! A parsed query is a list of [`Statement`]s. Statements are either plain
//! expressions, brace blocks, or keyword constructs; expressions are a tagged
//! tree of [`Expr`] nodes.
//!
//! ## Submodules
//!
//! - **[expressions]** - Expression nodes (literals, symbols, calls, operators)
//! - **[operators]** - Binary, unary, postfix and assignment operators
//! - **[statements]** - Statements and their termination flags
//! - **[keywords]** - Keyword constructs (`if`, `while`, `for`, `function`, ...)
//! - **[function]** - Function definitions shared by named functions and lambdas
//! - **[query]** - A complete parsed query with its diagnostics
//!
//! ## Statement Termination
//!
//! ```text
//! x = 1;      // muted: the value is not observable
//! x + 1       // unmuted: the query result is 2
//! ```
//!
//! A statement ending in `;` is *muted*. The result of a query is the value of
//! its last unmuted top-level statement, or of a top-level `return`.
//!
//! ## Brackets
//!
//! ```text
//! (1 + 2)       // grouping
//! [1 2; 3 4]    // matrix: whitespace or ',' separate columns, ';' or newline rows
//! { a; b }      // block, statement position only
//! |x - 3|       // absolute value
//! ```
pub mod expressions;
pub mod function;
pub mod keywords;
pub mod operators;
pub mod query;
pub mod statements;

pub use expressions::{Bracket, Expr, ExprKind};
pub use function::{FunctionBody, FunctionDef};
pub use keywords::{Keyword, KeywordKind};
pub use operators::{AssignOp, BinOp, OperatorToken, PostfixOp, UnaryOp};
pub use query::Query;
pub use statements::{Statement, StatementKind};
