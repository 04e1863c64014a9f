// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Condition expressions attached to dependencies, exports and groups.
//!
//! A condition is parsed once into an [`Expr`] tree and can then be
//! evaluated any number of times against a [`ConditionContext`].
//!
//! ```text
//! $ROS_VERSION == 2 and ($ROS_DISTRO != foxy or not $LEGACY)
//! os_name == "linux"
//! ```
//!
//! Operands are `$VARIABLES`, quoted strings, numbers and bare words.
//! Undefined variables evaluate to the empty string. A bare word on the
//! right of a comparison is a plain value, so `$ROS_DISTRO == humble` reads
//! naturally. Anywhere else a bare word is read from the context like a
//! variable, so `os_name == "linux"` and `$os_name == "linux"` agree.
//!
//! Comparisons are textual: `"10" < "9"` holds.

use std::cmp::Ordering;
use std::fmt;

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, opt, value, verify};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, tuple};

use crate::context::ConditionContext;
use crate::error::ConditionError;

#[cfg(test)]
#[path = "./condition_test.rs"]
mod condition_test;

const KEYWORDS: &[&str] = &["and", "or", "not", "true", "false"];

/// Parse `expression` and evaluate it against `context` in one step.
pub fn evaluate_condition(
    expression: &str,
    context: &ConditionContext,
) -> Result<bool, ConditionError> {
    Ok(Condition::parse(expression)?.evaluate(context))
}

/// A parsed condition together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(expression: &str) -> Result<Self, ConditionError> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(ConditionError::Empty);
        }
        let expr = match all_consuming(ws(or_expr))(source) {
            Ok((_, expr)) => expr,
            Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
                return Err(ConditionError::Malformed {
                    expression: source.to_string(),
                    offset: source.len() - err.input.len(),
                });
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(ConditionError::Malformed {
                    expression: source.to_string(),
                    offset: source.len(),
                });
            }
        };
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn evaluate(&self, context: &ConditionContext) -> bool {
        self.expr.evaluate(context)
    }

    /// The expression text as it appeared in the manifest.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Expression tree of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Bool(bool),
    /// A lone operand, true when it resolves to something other than
    /// `""`, `"0"` or `"false"`.
    Truthy(Operand),
    Compare {
        lhs: Operand,
        op: CompareOp,
        rhs: Operand,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn evaluate(&self, context: &ConditionContext) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Truthy(operand) => {
                let value = operand.resolve(context);
                !(value.is_empty() || value == "0" || value == "false")
            }
            Self::Compare { lhs, op, rhs } => {
                op.apply(lhs.resolve(context), rhs.resolve_value(context))
            }
            Self::Not(inner) => !inner.evaluate(context),
            Self::And(items) => items.iter().all(|item| item.evaluate(context)),
            Self::Or(items) => items.iter().any(|item| item.evaluate(context)),
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(_) | Self::Or(_) => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }

    fn fmt_joined(items: &[Expr], keyword: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                write!(f, " {keyword} ")?;
            }
            item.fmt_nested(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Truthy(operand) => write!(f, "{operand}"),
            Self::Compare { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::Not(inner) => {
                f.write_str("not ")?;
                inner.fmt_nested(f)
            }
            Self::And(items) => Self::fmt_joined(items, "and", f),
            Self::Or(items) => Self::fmt_joined(items, "or", f),
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `$NAME`, always looked up in the context.
    Variable(String),
    /// A bare word: a context lookup, or a plain value on the right of a
    /// comparison.
    Word(String),
    /// A quoted string or a number.
    Literal(String),
}

impl Operand {
    fn resolve<'a>(&'a self, context: &'a ConditionContext) -> &'a str {
        match self {
            Self::Variable(name) | Self::Word(name) => context.get(name).unwrap_or(""),
            Self::Literal(text) => text,
        }
    }

    fn resolve_value<'a>(&'a self, context: &'a ConditionContext) -> &'a str {
        match self {
            Self::Word(word) => word,
            other => other.resolve(context),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "${name}"),
            Self::Word(word) => f.write_str(word),
            Self::Literal(text)
                if text.starts_with(|c: char| c.is_ascii_digit()) && text.chars().all(is_word_char) =>
            {
                f.write_str(text)
            }
            Self::Literal(text) if text.contains('"') => write!(f, "'{text}'"),
            Self::Literal(text) => write!(f, "\"{text}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Compare the two texts lexically, numbers included.
    pub fn apply(self, lhs: &str, rhs: &str) -> bool {
        let ordering = lhs.cmp(rhs);
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(input)
}

fn keyword<'a>(expected: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    verify(word, move |found: &str| found == expected)
}

fn variable(input: &str) -> IResult<&str, Operand> {
    map(preceded(char('$'), word), |name: &str| {
        Operand::Variable(name.to_string())
    })(input)
}

fn quoted(input: &str) -> IResult<&str, Operand> {
    map(
        alt((
            delimited(char('"'), opt(is_not("\"")), char('"')),
            delimited(char('\''), opt(is_not("'")), char('\'')),
        )),
        |text: Option<&str>| Operand::Literal(text.unwrap_or_default().to_string()),
    )(input)
}

fn bare(input: &str) -> IResult<&str, Operand> {
    map(
        verify(word, |found: &str| !KEYWORDS.contains(&found)),
        |found: &str| {
            if found.starts_with(|c: char| c.is_ascii_digit()) {
                Operand::Literal(found.to_string())
            } else {
                Operand::Word(found.to_string())
            }
        },
    )(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((variable, quoted, bare))(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((ws(operand), compare_op, ws(operand))),
        |(lhs, op, rhs)| Expr::Compare { lhs, op, rhs },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(ws(char('(')), or_expr, ws(char(')'))),
        comparison,
        value(Expr::Bool(true), ws(keyword("true"))),
        value(Expr::Bool(false), ws(keyword("false"))),
        map(ws(operand), Expr::Truthy),
    ))(input)
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("not")), not_expr), |inner| {
            Expr::Not(Box::new(inner))
        }),
        primary,
    ))(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), not_expr))(input)?;
    Ok((input, combine(first, rest, Expr::And)))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), and_expr))(input)?;
    Ok((input, combine(first, rest, Expr::Or)))
}

fn combine(first: Expr, rest: Vec<Expr>, join: fn(Vec<Expr>) -> Expr) -> Expr {
    if rest.is_empty() {
        return first;
    }
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(first);
    items.extend(rest);
    join(items)
}
