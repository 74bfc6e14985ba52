//! Abstract syntax tree for mapped-statement SQL bodies.
//!
//! Covers the full dynamic-SQL node set: literal text, bound parameters
//! (`#{}`), raw text substitution (`${}`), conditionals, iteration, the
//! whitespace-trimming shorthand tags (`where`/`set`/`trim`), reusable
//! fragments (`include`) and local bindings (`bind`).
//!
//! `#{}` and `${}` are distinct node kinds on purpose: a `Param` always
//! emits a driver placeholder and travels to the database as a bound
//! value, while a `Substitute` is expanded into the SQL text itself
//! before the statement is ever handed to a driver.

use crate::sql::expr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Param {
        expr: String,
        jdbc_type: Option<String>,
    },
    Substitute(String),
    If {
        test: Expr,
        body: Vec<Node>,
    },
    Choose {
        whens: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Where(Vec<Node>),
    Set(Vec<Node>),
    Trim {
        prefix: Option<String>,
        suffix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
        body: Vec<Node>,
    },
    Foreach {
        item: String,
        index: Option<String>,
        collection: String,
        open: String,
        separator: String,
        close: String,
        body: Vec<Node>,
    },
    Bind {
        name: String,
        expr: Expr,
    },
    Include {
        refid: String,
    },
}
