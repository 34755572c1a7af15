//! An embeddable scripting engine for a small numeric language.
//!
//! Source text is parsed into a statement tree ([`Parser`], [`Query`]) and
//! interpreted against a scope chain by an [`Evaluator`]. Hosts extend the
//! language with [`plugin`]s that add functions, constants and value types.
//!
//! ```
//! use mathscript::{Evaluator, Value};
//!
//! let mut engine = Evaluator::new();
//! let source = "x = []; y = 0; for(k = 1; k <= 10; k+=1) { y+=k; x(k) = y; } x(10) - x(9)";
//! assert_eq!(engine.eval_str(source).unwrap(), Value::Scalar(10.0));
//! ```

pub mod assign;
pub mod ast;
pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod evaluator;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod patterns;
pub mod plugin;
pub mod resolver;
pub mod scope;
pub mod value;

pub use ast::{BinOp, Expr, ExprKind, Keyword, KeywordKind, Query, Statement, StatementKind};
pub use config::EngineConfig;
pub use diagnostics::Diagnostic;
pub use evaluator::{EvalContext, EvalError, EvalErrorKind, Evaluator, Flow, RunError};
pub use lexer::{LexError, Lexer, Position, Span};
pub use output::{to_json, to_json_pretty};
pub use parser::{ParseError, ParseErrorKind, Parser};
pub use plugin::{Plugin, PluginRecord};
pub use value::Value;
