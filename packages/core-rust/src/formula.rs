//! Arithmetic formulas for computed and aggregated fields.
//!
//! A [`Formula`] is a flat token list (numbers, dot-path references, the
//! operators `+ - * /` and parentheses) evaluated with the two-stack
//! shunting algorithm. Evaluation is total: unresolvable references coerce to
//! `0` (see [`coerce_number`]), division by zero yields `0`, and a malformed
//! token list never panics.

use serde_json::{json, Value};

use crate::field::{AggregateFn, FieldDescriptor};
use crate::structure::Structure;
use crate::types::{coerce_number, finite_or_zero, lookup_path, number_value, Layouts, Row};

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        let result = match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div if rhs == 0.0 => 0.0,
            Self::Div => lhs / rhs,
        };
        finite_or_zero(result)
    }
}

/// One formula token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Dot-path lookup into the evaluation context.
    Ref(String),
    Op(Operator),
    LParen,
    RParen,
}

impl Token {
    /// Classifies a string token: operator symbol, numeric literal, or reference.
    #[must_use]
    pub fn classify(text: &str) -> Option<Self> {
        let text = text.trim();
        let token = match text {
            "" => return None,
            "+" => Self::Op(Operator::Add),
            "-" => Self::Op(Operator::Sub),
            "*" => Self::Op(Operator::Mul),
            "/" => Self::Op(Operator::Div),
            "(" => Self::LParen,
            ")" => Self::RParen,
            other => match other.parse::<f64>() {
                Ok(n) if n.is_finite() => Self::Number(n),
                _ => Self::Ref(other.to_string()),
            },
        };
        Some(token)
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => number_value(*n),
            Self::Ref(path) => json!(path),
            Self::Op(op) => json!(op.symbol()),
            Self::LParen => json!("("),
            Self::RParen => json!(")"),
        }
    }
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

/// Token sequence of a computed-field definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formula {
    tokens: Vec<Token>,
}

impl Formula {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Builds a formula from a metadata value: an array of string/number
    /// tokens, or a single expression string.
    ///
    /// Returns `None` for anything that yields no tokens.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let tokens: Vec<Token> = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Number(n) => n.as_f64().map(Token::Number),
                    Value::String(s) => Token::classify(s),
                    _ => None,
                })
                .collect(),
            Value::String(s) => Self::parse(s).tokens,
            Value::Number(n) => n.as_f64().map(Token::Number).into_iter().collect(),
            _ => Vec::new(),
        };
        (!tokens.is_empty()).then(|| Self::new(tokens))
    }

    /// Lexes an expression string such as `"(sueldo_base + bonos) * 0.1"`.
    ///
    /// Identifiers may contain letters, digits, `_` and `.`; anything that is
    /// not an identifier, number, operator or parenthesis is skipped.
    #[must_use]
    pub fn parse(expr: &str) -> Self {
        let mut tokens = Vec::new();
        let chars: Vec<char> = expr.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.extend(Token::classify(&word));
                continue;
            }
            tokens.extend(Token::classify(&ch.to_string()).filter(|t| !matches!(t, Token::Ref(_))));
            i += 1;
        }
        Self::new(tokens)
    }

    /// Serializes to the token-array form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(self.tokens.iter().map(Token::to_json).collect())
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

enum StackOp {
    Op(Operator),
    Paren,
}

fn reduce(ops: &mut Vec<StackOp>, values: &mut Vec<f64>) {
    if let Some(StackOp::Op(op)) = ops.pop() {
        apply_top(op, values);
    }
}

fn apply_top(op: Operator, values: &mut Vec<f64>) {
    let rhs = values.pop().unwrap_or(0.0);
    let lhs = values.pop().unwrap_or(0.0);
    values.push(op.apply(lhs, rhs));
}

/// Evaluates a formula against a row.
///
/// Returns `None` only when the formula produces no operand at all (an empty
/// list, or operators and parentheses alone). A missing operand around a
/// binary operator counts as `0`, so `["-", 5]` evaluates to `-5`.
#[must_use]
pub fn evaluate(formula: &Formula, context: &Row) -> Option<f64> {
    let mut ops: Vec<StackOp> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    let mut saw_operand = false;

    for token in formula.tokens() {
        match token {
            Token::Number(n) => {
                values.push(finite_or_zero(*n));
                saw_operand = true;
            }
            Token::Ref(path) => {
                values.push(coerce_number(lookup_path(context, path)));
                saw_operand = true;
            }
            Token::LParen => ops.push(StackOp::Paren),
            Token::RParen => {
                while matches!(ops.last(), Some(StackOp::Op(_))) {
                    reduce(&mut ops, &mut values);
                }
                // Drops the matching "(" or ignores a stray ")".
                ops.pop();
            }
            Token::Op(op) => {
                while let Some(StackOp::Op(top)) = ops.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    reduce(&mut ops, &mut values);
                }
                ops.push(StackOp::Op(*op));
            }
        }
    }
    // Unclosed "(" are dropped.
    while let Some(top) = ops.pop() {
        if let StackOp::Op(op) = top {
            apply_top(op, &mut values);
        }
    }

    if saw_operand {
        values.pop().map(finite_or_zero)
    } else {
        None
    }
}

/// Evaluates a cross-row aggregate field.
///
/// The row formula (`fields_agg`) is evaluated for every row of the tab
/// named by `agg_over_layout`, then reduced with the descriptor's
/// [`AggregateFn`]. A missing tab or an empty collection yields `0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn evaluate_aggregate(descriptor: &FieldDescriptor, layouts: &Layouts) -> f64 {
    let Some(rows) = descriptor
        .agg_over_layout
        .as_deref()
        .and_then(|layout| layouts.get(layout))
    else {
        return 0.0;
    };
    if rows.is_empty() {
        return 0.0;
    }
    let empty = Formula::default();
    let formula = descriptor.fields_agg.as_ref().unwrap_or(&empty);
    let total: f64 = rows
        .iter()
        .map(|row| evaluate(formula, row).unwrap_or(0.0))
        .sum();
    let result = match descriptor.aggregate_fn() {
        AggregateFn::Sum => total,
        AggregateFn::Average => total / rows.len() as f64,
    };
    finite_or_zero(result)
}

/// Computes every formula-bearing field of a structure in declaration order.
///
/// Each computed value is written back into the evaluation context before the
/// next field is evaluated, so a formula may reference any computed field
/// declared before it. There is no dependency resolution: a reference to a
/// field declared later sees that field's current (input) value.
///
/// Returns only the computed fields.
#[must_use]
pub fn calculate_field_values(structure: &Structure, values: &Row, layouts: &Layouts) -> Row {
    let mut context = values.clone();
    let mut computed = Row::new();
    for descriptor in structure.fields() {
        let result = if let Some(func) = &descriptor.func {
            evaluate(func, &context)
        } else if descriptor.is_aggregate() {
            Some(evaluate_aggregate(descriptor, layouts))
        } else {
            None
        };
        if let Some(result) = result {
            let value = number_value(result);
            context.insert(descriptor.field.clone(), value.clone());
            computed.insert(descriptor.field.clone(), value);
        }
    }
    computed
}
