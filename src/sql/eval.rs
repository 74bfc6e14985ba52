//! Evaluates a parsed dynamic SQL tree against a parameter context,
//! producing the final SQL string and its positional bindings.

use crate::error::SqlweaveError;
use crate::reflector::{self, PropertyPath};
use crate::sql::ast::Node;
use crate::sql::expr::{Expr, Op};
use crate::udbc::driver::Driver;
use crate::value::Value;
use std::collections::HashMap;

/// The product of rendering a mapped statement's SQL tree: driver-ready
/// SQL text plus the values bound to its placeholders, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub bindings: Vec<(String, Value)>,
}

/// Named dynamic-SQL fragments (`<sql id="...">`) addressable by
/// `<include refid="...">`.
pub type Fragments = HashMap<String, Vec<Node>>;

/// The parameter scope a tree is rendered against: the root parameter
/// object plus whatever `<bind>`/`<foreach>` locals are currently in
/// scope, searched innermost-first.
pub struct RenderContext<'a> {
    root: &'a Value,
    locals: Vec<(String, Value)>,
}

impl<'a> RenderContext<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            locals: Vec::new(),
        }
    }

    fn push(&mut self, key: &str, value: Value) {
        self.locals.push((key.to_string(), value));
    }

    fn pop(&mut self) {
        self.locals.pop();
    }

    fn local(&self, key: &str) -> Option<&Value> {
        self.locals.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Resolves a property expression against the first matching local
    /// (with the rest of the path, if any, resolved against that local's
    /// value), falling back to the root parameter object.
    fn resolve_against(&self, expr: &str) -> Result<Value, SqlweaveError> {
        let head_end = expr
            .find(|c: char| c == '.' || c == '[')
            .unwrap_or(expr.len());
        let head = &expr[..head_end];
        if let Some(local_value) = self.local(head) {
            if head_end == expr.len() {
                return Ok(local_value.clone());
            }
            let rest = &expr[head_end..];
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            return PropertyPath::parse(rest)?
                .resolve(local_value)
                .cloned();
        }
        // A lone scalar parameter has no properties to look up; every
        // `#{}`/`${}` expression just means "the
        // parameter itself", mirroring how a single simple-type argument
        // is bound regardless of the placeholder's name.
        if !matches!(self.root, Value::Map(_)) {
            return Ok(self.root.clone());
        }
        reflector::resolve(self.root, expr)
    }

    /// Non-failing lookup for truthy/comparison evaluation: an
    /// unresolved path is `Value::Null`, not an error.
    fn lookup(&self, expr: &str) -> Value {
        self.resolve_against(expr).unwrap_or(Value::Null)
    }

    /// Resolves a `#{}`/`${}` binding expression or a `<foreach>`
    /// collection; a missing property here is a binding error.
    fn resolve_bind(&self, expr: &str) -> Result<Value, SqlweaveError> {
        self.resolve_against(expr)
    }
}

fn is_truthy(v: &Value) -> bool {
    !matches!(v, Value::Null | Value::Bool(false))
}

fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::I8(n) => Some(*n as f64),
        Value::I16(n) => Some(*n as f64),
        Value::I32(n) => Some(*n as f64),
        Value::I64(n) => Some(*n as f64),
        Value::U8(n) => Some(*n as f64),
        Value::U16(n) => Some(*n as f64),
        Value::U32(n) => Some(*n as f64),
        Value::U64(n) => Some(*n as f64),
        Value::F32(n) => Some(*n as f64),
        Value::F64(n) => Some(*n),
        _ => None,
    }
}

fn resolve_val(expr: &Expr, ctx: &RenderContext) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Var(name) => ctx.lookup(name),
        Expr::Binary(..) => Value::Bool(eval_bool(expr, ctx)),
    }
}

fn eval_bool(expr: &Expr, ctx: &RenderContext) -> bool {
    match expr {
        Expr::Binary(Op::And, left, right) => eval_bool(left, ctx) && eval_bool(right, ctx),
        Expr::Binary(Op::Or, left, right) => eval_bool(left, ctx) || eval_bool(right, ctx),
        Expr::Binary(op, left, right) => {
            let l = resolve_val(left, ctx);
            let r = resolve_val(right, ctx);
            let (lf, rf) = (to_f64(&l), to_f64(&r));
            match op {
                Op::Eq => lf.zip(rf).map(|(l, r)| (l - r).abs() < f64::EPSILON).unwrap_or(l == r),
                Op::Ne => lf.zip(rf).map(|(l, r)| (l - r).abs() > f64::EPSILON).unwrap_or(l != r),
                Op::Gt => lf.zip(rf).is_some_and(|(l, r)| l > r),
                Op::Ge => lf.zip(rf).is_some_and(|(l, r)| l >= r),
                Op::Lt => lf.zip(rf).is_some_and(|(l, r)| l < r),
                Op::Le => lf.zip(rf).is_some_and(|(l, r)| l <= r),
                Op::And | Op::Or => unreachable!("handled above"),
            }
        }
        Expr::Literal(v) => is_truthy(v),
        Expr::Var(name) => is_truthy(&ctx.lookup(name)),
    }
}

fn value_to_sql_text(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::I8(n) => n.to_string(),
        Value::I16(n) => n.to_string(),
        Value::I32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::I128(n) => n.to_string(),
        Value::U8(n) => n.to_string(),
        Value::U16(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        Value::U128(n) => n.to_string(),
        Value::F32(n) => n.to_string(),
        Value::F64(n) => n.to_string(),
        Value::Char(c) => c.to_string(),
        Value::Str(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

fn trim_prefix_keywords(s: &str, keywords: &[String]) -> String {
    let trimmed = s.trim_start();
    for kw in keywords {
        let kwt = kw.trim();
        if kwt.is_empty() {
            continue;
        }
        if trimmed.len() >= kwt.len() && trimmed[..kwt.len()].eq_ignore_ascii_case(kwt) {
            return trimmed[kwt.len()..].trim_start().to_string();
        }
    }
    trimmed.to_string()
}

fn trim_suffix_keywords(s: &str, keywords: &[String]) -> String {
    let trimmed = s.trim_end();
    for kw in keywords {
        let kwt = kw.trim();
        if kwt.is_empty() {
            continue;
        }
        if trimmed.len() >= kwt.len() && trimmed[trimmed.len() - kwt.len()..].eq_ignore_ascii_case(kwt) {
            return trimmed[..trimmed.len() - kwt.len()].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn apply_where(body: &str) -> String {
    let stripped = trim_prefix_keywords(body.trim(), &["AND".to_string(), "OR".to_string()]);
    if stripped.trim().is_empty() {
        String::new()
    } else {
        format!("WHERE {}", stripped.trim())
    }
}

fn apply_set(body: &str) -> String {
    let stripped = trim_suffix_keywords(body.trim(), &[",".to_string()]);
    if stripped.trim().is_empty() {
        String::new()
    } else {
        format!("SET {}", stripped.trim())
    }
}

fn apply_trim(
    body: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
    prefix_overrides: &[String],
    suffix_overrides: &[String],
) -> String {
    let mut text = body.trim().to_string();
    if !prefix_overrides.is_empty() {
        text = trim_prefix_keywords(&text, prefix_overrides);
    }
    if !suffix_overrides.is_empty() {
        text = trim_suffix_keywords(&text, suffix_overrides);
    }
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    if let Some(p) = prefix {
        out.push_str(p);
        out.push(' ');
    }
    out.push_str(text);
    if let Some(s) = suffix {
        out.push(' ');
        out.push_str(s);
    }
    out
}

/// Renders a parsed SQL tree into driver-ready SQL plus ordered bindings.
pub struct Renderer<'d> {
    driver: &'d dyn Driver,
    param_count: usize,
    bindings: Vec<(String, Value)>,
}

impl<'d> Renderer<'d> {
    pub fn new(driver: &'d dyn Driver) -> Self {
        Self {
            driver,
            param_count: 0,
            bindings: Vec::new(),
        }
    }

    pub fn render(
        mut self,
        nodes: &[Node],
        ctx: &mut RenderContext,
        fragments: &Fragments,
    ) -> Result<BoundSql, SqlweaveError> {
        let sql = self.render_nodes(nodes, ctx, fragments)?;
        Ok(BoundSql {
            sql,
            bindings: self.bindings,
        })
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        ctx: &mut RenderContext,
        fragments: &Fragments,
    ) -> Result<String, SqlweaveError> {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Param { expr, .. } => {
                    let value = ctx.resolve_bind(expr)?;
                    self.param_count += 1;
                    out.push_str(&self.driver.placeholder(self.param_count, expr));
                    self.bindings.push((expr.clone(), value));
                }
                Node::Substitute(expr) => {
                    let value = ctx.resolve_bind(expr)?;
                    out.push_str(&value_to_sql_text(&value));
                }
                Node::If { test, body } => {
                    if eval_bool(test, ctx) {
                        out.push_str(&self.render_nodes(body, ctx, fragments)?);
                    }
                }
                Node::Choose { whens, otherwise } => {
                    let mut matched = false;
                    for (test, body) in whens {
                        if eval_bool(test, ctx) {
                            out.push_str(&self.render_nodes(body, ctx, fragments)?);
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        out.push_str(&self.render_nodes(otherwise, ctx, fragments)?);
                    }
                }
                Node::Where(body) => {
                    let inner = self.render_nodes(body, ctx, fragments)?;
                    out.push_str(&apply_where(&inner));
                }
                Node::Set(body) => {
                    let inner = self.render_nodes(body, ctx, fragments)?;
                    out.push_str(&apply_set(&inner));
                }
                Node::Trim {
                    prefix,
                    suffix,
                    prefix_overrides,
                    suffix_overrides,
                    body,
                } => {
                    let inner = self.render_nodes(body, ctx, fragments)?;
                    out.push_str(&apply_trim(
                        &inner,
                        prefix.as_deref(),
                        suffix.as_deref(),
                        prefix_overrides,
                        suffix_overrides,
                    ));
                }
                Node::Foreach {
                    item,
                    index,
                    collection,
                    open,
                    separator,
                    close,
                    body,
                } => {
                    let items = match ctx.resolve_bind(collection)? {
                        Value::List(items) => items,
                        other => {
                            return Err(SqlweaveError::Binding(format!(
                                "'{collection}' is not iterable (got {other:?})"
                            )));
                        }
                    };
                    if !items.is_empty() {
                        out.push_str(open);
                        for (i, value) in items.into_iter().enumerate() {
                            if i > 0 {
                                out.push_str(separator);
                            }
                            ctx.push(item, value);
                            if let Some(index_name) = index {
                                ctx.push(index_name, Value::I64(i as i64));
                            }
                            out.push_str(&self.render_nodes(body, ctx, fragments)?);
                            if index.is_some() {
                                ctx.pop();
                            }
                            ctx.pop();
                        }
                        out.push_str(close);
                    }
                }
                Node::Bind { name, expr } => {
                    let value = resolve_val(expr, ctx);
                    ctx.push(name, value);
                }
                Node::Include { refid } => {
                    let fragment = fragments.get(refid).ok_or_else(|| {
                        SqlweaveError::IncompleteElement(format!(
                            "unresolved sql fragment '{refid}'"
                        ))
                    })?;
                    out.push_str(&self.render_nodes(fragment, ctx, fragments)?);
                }
            }
        }
        Ok(out)
    }
}

/// Renders `nodes` against `params` in one call.
pub fn render(
    nodes: &[Node],
    params: &Value,
    driver: &dyn Driver,
    fragments: &Fragments,
) -> Result<BoundSql, SqlweaveError> {
    let mut ctx = RenderContext::new(params);
    Renderer::new(driver).render(nodes, &mut ctx, fragments)
}
