//! Script Runtime Bridge (C12).
//!
//! One small expression language shared by update-by-script, script-sort,
//! script-fields, bucket-script and scripted-metric, so all five script
//! call sites get the same parse/execute/error behavior (spec §4.12). This
//! is deliberately not a general-purpose VM: field paths, arithmetic,
//! comparisons and `params.x`/bare-identifier lookups are enough to cover
//! the aggregation and field scripting this system exposes.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::{Document, Value};

/// A parsed script: currently the source is re-tokenised on every
/// `execute` call (scripts here are short and executed at most
/// once-per-document-batch, not once-per-document-at-scale).
#[derive(Debug, Clone)]
pub struct Script {
    pub source: String,
    pub lang: String,
    pub params: Json,
}

impl Script {
    /// Parse `{"source"|"inline": "...", "lang": "...", "params": {...}}`
    /// or a bare string shorthand.
    pub fn parse(spec: &Json) -> Result<Script> {
        if let Some(s) = spec.as_str() {
            return Ok(Script { source: s.to_string(), lang: "expr".to_string(), params: Json::Null });
        }
        let obj = spec.as_object().ok_or_else(|| Error::InvalidQuery("script must be a string or object".to_string()))?;
        let source = obj
            .get("source")
            .or_else(|| obj.get("inline"))
            .and_then(Json::as_str)
            .ok_or_else(|| Error::MissingField("source".to_string()))?
            .to_string();
        let lang = obj.get("lang").and_then(Json::as_str).unwrap_or("expr").to_string();
        let params = obj.get("params").cloned().unwrap_or(Json::Null);
        Ok(Script { source, lang, params })
    }
}

/// Execution context: the document map, its own `_source`, the hit score,
/// user params, plus a free-form binding table used by aggregation call
/// sites (bucket-script's resolved sibling values, scripted-metric's
/// per-stage state) that have no natural home in `doc`/`source`.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub doc: Option<Document>,
    pub source: Option<Json>,
    pub score: f32,
    pub params: Json,
    pub bindings: BTreeMap<String, Value>,
}

impl Context {
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }
}

/// Execute a parsed script against a context, returning the resulting value.
pub fn execute(script: &Script, ctx: &Context) -> Result<Value> {
    let expr = parse_expr(&script.source)?;
    eval_expr(&expr, ctx)
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Ident(String),
    FieldPath(Vec<String>),
    BinOp(Box<Expr>, Op, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

/// A minimal Pratt-style parser: `term (op term)*`, left-associative, no
/// precedence climbing beyond a single binary level (scripts here are one
/// arithmetic or comparison expression, not nested programs).
fn parse_expr(src: &str) -> Result<Expr> {
    let tokens = tokenize(src);
    let mut pos = 0;
    let lhs = parse_term(&tokens, &mut pos)?;
    if pos >= tokens.len() {
        return Ok(lhs);
    }
    let op = match tokens[pos].as_str() {
        "+" => Op::Add,
        "-" => Op::Sub,
        "*" => Op::Mul,
        "/" => Op::Div,
        "<" => Op::Lt,
        "<=" => Op::Lte,
        ">" => Op::Gt,
        ">=" => Op::Gte,
        "==" => Op::Eq,
        other => return Err(Error::InvalidQuery(format!("unsupported script operator: {other}"))),
    };
    pos += 1;
    let rhs = parse_term(&tokens, &mut pos)?;
    Ok(Expr::BinOp(Box::new(lhs), op, Box::new(rhs)))
}

fn parse_term(tokens: &[String], pos: &mut usize) -> Result<Expr> {
    let tok = tokens.get(*pos).ok_or_else(|| Error::InvalidQuery("unexpected end of script".to_string()))?;
    *pos += 1;
    if let Ok(n) = tok.parse::<f64>() {
        return Ok(Expr::Literal(Value::Float(n)));
    }
    if tok.starts_with('\'') && tok.ends_with('\'') && tok.len() >= 2 {
        return Ok(Expr::Literal(Value::String(tok[1..tok.len() - 1].to_string())));
    }
    if tok.contains('.') {
        return Ok(Expr::FieldPath(tok.split('.').map(str::to_string).collect()));
    }
    Ok(Expr::Ident(tok.clone()))
}

fn tokenize(src: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if "+-*/<>=".contains(c) {
            let mut op = String::new();
            op.push(c);
            chars.next();
            if let Some(&next) = chars.peek() {
                if next == '=' && (c == '<' || c == '>' || c == '=') {
                    op.push(next);
                    chars.next();
                }
            }
            tokens.push(op);
            continue;
        }
        if c == '\'' {
            let mut lit = String::new();
            lit.push(c);
            chars.next();
            for next in chars.by_ref() {
                lit.push(next);
                if next == '\'' {
                    break;
                }
            }
            tokens.push(lit);
            continue;
        }
        let mut ident = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || "+-*/<>=".contains(c) {
                break;
            }
            ident.push(c);
            chars.next();
        }
        tokens.push(ident);
    }
    tokens
}

fn eval_expr(expr: &Expr, ctx: &Context) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => resolve_ident(name, ctx),
        Expr::FieldPath(parts) => resolve_path(parts, ctx),
        Expr::BinOp(lhs, op, rhs) => {
            let lhs = eval_expr(lhs, ctx)?;
            let rhs = eval_expr(rhs, ctx)?;
            apply_op(*op, &lhs, &rhs)
        }
    }
}

fn resolve_ident(name: &str, ctx: &Context) -> Result<Value> {
    match name {
        "score" => Ok(Value::Float(ctx.score as f64)),
        "doc" => Ok(ctx.doc.as_ref().map(|d| Value::Object(d.fields.clone().into_iter().collect())).unwrap_or(Value::Null)),
        "source" => Ok(Value::from_json(ctx.source.as_ref().unwrap_or(&Json::Null))),
        "params" => Ok(Value::from_json(&ctx.params)),
        other => ctx
            .bindings
            .get(other)
            .cloned()
            .ok_or_else(|| Error::InvalidQuery(format!("unknown script identifier: {other}"))),
    }
}

fn resolve_path(parts: &[String], ctx: &Context) -> Result<Value> {
    let (head, rest) = parts.split_first().expect("non-empty field path");
    let mut current = resolve_ident(head, ctx).or_else(|_| {
        ctx.doc
            .as_ref()
            .and_then(|d| d.get(head))
            .cloned()
            .ok_or_else(|| Error::InvalidQuery(format!("unknown script identifier: {head}")))
    })?;
    for key in rest {
        current = match current {
            Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    Ok(current)
}

fn apply_op(op: Op, lhs: &Value, rhs: &Value) -> Result<Value> {
    use std::cmp::Ordering;
    if matches!(op, Op::Eq | Op::Lt | Op::Lte | Op::Gt | Op::Gte) {
        let ord = lhs.cmp_canonical(rhs);
        return Ok(Value::Bool(match op {
            Op::Eq => ord == Ordering::Equal,
            Op::Lt => ord == Ordering::Less,
            Op::Lte => ord != Ordering::Greater,
            Op::Gt => ord == Ordering::Greater,
            Op::Gte => ord != Ordering::Less,
            Op::Add | Op::Sub | Op::Mul | Op::Div => unreachable!(),
        }));
    }
    let a = lhs.as_f64().ok_or_else(|| Error::InvalidQuery("script arithmetic on non-numeric value".to_string()))?;
    let b = rhs.as_f64().ok_or_else(|| Error::InvalidQuery("script arithmetic on non-numeric value".to_string()))?;
    let result = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}
