//! MSBuild condition parser and evaluator.
//!
//! Parses and evaluates the `Condition` attributes found on `<PropertyGroup>`,
//! property elements, `<Import>` and `<ImportGroup>` in `.csproj` / `.vbproj`
//! files, for example:
//!
//! - `'$(Configuration)|$(Platform)'=='Debug|AnyCPU'`
//! - `'$(TargetFramework)' == 'net8.0' And '$(CI)' != ''`
//! - `!Exists('$(MSBuildThisFileDirectory)local.props')`
//! - `$(IsPackable)`
//!
//! Uses [`chumsky`] for the parsing grammar.
//!
//! ## Grammar (case-insensitive keywords)
//!
//! ```text
//! expr       = or_expr
//! or_expr    = and_expr ('or' and_expr)*
//! and_expr   = atom ('and' atom)*
//! atom       = '!'? (comparison | exists | '(' expr ')' | operand)
//! comparison = operand op operand
//! op         = '==' | '!=' | '<=' | '>=' | '<' | '>'
//! exists     = 'Exists' '(' operand ')'
//! operand    = "'" chars "'" | bare
//! ```

use chumsky::prelude::*;
use std::collections::HashMap;
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
//  AST
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed MSBuild condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `'lhs' op 'rhs'`.
    Compare {
        lhs: Vec<ExprValue>,
        op: CompareOp,
        rhs: Vec<ExprValue>,
    },
    /// `Exists('path')`, resolved against the directory of the file that
    /// declares the condition.
    Exists(Vec<ExprValue>),
    /// A lone operand such as `true` or `$(IsPackable)`; holds when it
    /// expands to `true` (case-insensitive).
    Truthy(Vec<ExprValue>),
    /// `!expr`
    Not(Box<Expression>),
    /// `a and b` (case-insensitive keyword).
    And(Box<Expression>, Box<Expression>),
    /// `a or b` (case-insensitive keyword).
    Or(Box<Expression>, Box<Expression>),
}

/// Comparison operator used inside an [`Expression::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

/// A fragment of a string value that may contain `$(Property)` references.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// Literal text (no expansion needed).
    Literal(String),
    /// A `$(Name)` reference that will be expanded during evaluation.
    Property(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property lookup
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of property values for `$(Name)` expansion.
///
/// Unknown properties expand to the empty string, as in MSBuild.
pub trait PropertyLookup {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl PropertyLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// Split raw text into [`ExprValue`] fragments.
///
/// `$(Name)` sequences become [`ExprValue::Property`]; everything else
/// becomes [`ExprValue::Literal`]. The reference ends at the `)` that
/// balances its opening `(`, skipping parentheses inside `'...'`, so a
/// property function like `$([MSBuild]::Escape('a)b'))` stays one
/// reference. An unterminated `$(` swallows the rest of the input as the
/// property name.
pub(crate) fn parse_string_parts(s: &str) -> Vec<ExprValue> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'(') {
            if !literal.is_empty() {
                parts.push(ExprValue::Literal(std::mem::take(&mut literal)));
            }
            chars.next(); // consume '('
            let mut name = String::new();
            let mut depth = 0usize;
            let mut in_quotes = false;
            for ch in chars.by_ref() {
                match ch {
                    '\'' => in_quotes = !in_quotes,
                    '(' if !in_quotes => depth += 1,
                    ')' if !in_quotes && depth == 0 => break,
                    ')' if !in_quotes => depth -= 1,
                    _ => {}
                }
                name.push(ch);
            }
            parts.push(ExprValue::Property(name.trim().to_string()));
        } else {
            literal.push(c);
        }
    }

    if !literal.is_empty() {
        parts.push(ExprValue::Literal(literal));
    }

    parts
}

fn expand_parts<P: PropertyLookup + ?Sized>(parts: &[ExprValue], props: &P) -> String {
    parts
        .iter()
        .map(|part| match part {
            ExprValue::Literal(s) => s.as_str(),
            ExprValue::Property(name) => props.lookup(name).unwrap_or(""),
        })
        .collect()
}

/// Expand every `$(Name)` reference in `s`.
pub fn expand<P: PropertyLookup + ?Sized>(s: &str, props: &P) -> String {
    if !s.contains("$(") {
        return s.to_string();
    }
    expand_parts(&parse_string_parts(s), props)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

fn condition_parser<'a>() -> impl Parser<'a, &'a str, Expression, extra::Err<Simple<'a, char>>> {
    recursive(|expr| {
        // ── Operands ─────────────────────────────────────────────────────

        // `$(...)` up to its balancing `)`. Property functions nest
        // parentheses and quoted arguments: `$([MSBuild]::Fn('$(X)'))`.
        let balanced = recursive(|balanced| {
            choice((
                just('\'')
                    .then(none_of('\'').repeated())
                    .then(just('\''))
                    .ignored(),
                just('(')
                    .then(balanced.repeated())
                    .then(just(')'))
                    .ignored(),
                none_of("()'").ignored(),
            ))
        });
        let property_ref = just("$(")
            .then(balanced.repeated())
            .then(just(')'))
            .ignored();

        let quoted = just('\'')
            .ignore_then(
                property_ref
                    .clone()
                    .or(none_of('\'').ignored())
                    .repeated()
                    .to_slice(),
            )
            .then_ignore(just('\''))
            .map(parse_string_parts);

        // Unquoted text; `$(Name)` is kept whole so its parens don't end
        // the operand.
        let bare = property_ref
            .or(none_of(" \t\r\n()=!<>'").ignored())
            .repeated()
            .at_least(1)
            .to_slice()
            .map(parse_string_parts);

        let operand = quoted.or(bare);

        // ── Comparison operators (two-char forms first) ──────────────────
        let cmp_op = choice((
            just("==").to(CompareOp::Equal),
            just("!=").to(CompareOp::NotEqual),
            just("<=").to(CompareOp::LessOrEqual),
            just(">=").to(CompareOp::GreaterOrEqual),
            just("<").to(CompareOp::Less),
            just(">").to(CompareOp::Greater),
        ));

        let comparison = operand
            .clone()
            .padded()
            .then(cmp_op.padded())
            .then(operand.clone().padded())
            .map(|((lhs, op), rhs)| Expression::Compare { lhs, op, rhs });

        // ── Case-insensitive keyword matching ────────────────────────────
        let alpha_word = any()
            .filter(|c: &char| c.is_ascii_alphabetic())
            .repeated()
            .at_least(1)
            .to_slice();

        let exists = alpha_word
            .filter(|s: &&str| s.eq_ignore_ascii_case("exists"))
            .ignore_then(just('(').padded())
            .ignore_then(operand.clone().padded())
            .then_ignore(just(')').padded())
            .map(Expression::Exists);

        let paren_expr = expr.delimited_by(just('(').padded(), just(')').padded());

        let truthy = operand.padded().map(Expression::Truthy);

        let base = choice((comparison, exists, paren_expr, truthy));

        let atom = just('!')
            .padded()
            .or_not()
            .then(base)
            .map(|(bang, e)| match bang {
                Some(_) => Expression::Not(Box::new(e)),
                None => e,
            })
            .padded();

        // ── 'and' binds tighter than 'or' ────────────────────────────────
        let and_kw = alpha_word
            .filter(|s: &&str| s.eq_ignore_ascii_case("and"))
            .padded();

        let and_expr = atom.clone().foldl(
            and_kw.ignore_then(atom).repeated(),
            |lhs, rhs| Expression::And(Box::new(lhs), Box::new(rhs)),
        );

        let or_kw = alpha_word
            .filter(|s: &&str| s.eq_ignore_ascii_case("or"))
            .padded();

        and_expr.clone().foldl(
            or_kw.ignore_then(and_expr).repeated(),
            |lhs, rhs| Expression::Or(Box::new(lhs), Box::new(rhs)),
        )
    })
}

/// Parse a condition attribute string into an [`Expression`].
pub fn parse_condition(input: &str) -> Result<Expression, String> {
    condition_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| {
            let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
            format!(
                "Failed to parse condition '{}': {}",
                input,
                messages.join("; ")
            )
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

fn compare(l: &str, op: CompareOp, r: &str) -> bool {
    // Ordering operators are numeric only; anything else is false.
    let numeric = || match (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => Some((l, r)),
        _ => None,
    };
    match op {
        CompareOp::Equal => l.eq_ignore_ascii_case(r),
        CompareOp::NotEqual => !l.eq_ignore_ascii_case(r),
        CompareOp::Less => numeric().is_some_and(|(l, r)| l < r),
        CompareOp::LessOrEqual => numeric().is_some_and(|(l, r)| l <= r),
        CompareOp::Greater => numeric().is_some_and(|(l, r)| l > r),
        CompareOp::GreaterOrEqual => numeric().is_some_and(|(l, r)| l >= r),
    }
}

fn path_exists(raw: &str, base_dir: Option<&Path>) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    // Project files are authored with Windows separators.
    let normalized = if std::path::MAIN_SEPARATOR == '\\' {
        raw.to_string()
    } else {
        raw.replace('\\', "/")
    };
    let path = Path::new(&normalized);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path).exists(),
        _ => path.exists(),
    }
}

/// Evaluate a condition expression against a property source.
///
/// Relative paths in `Exists(…)` are resolved against `base_dir`.
pub fn evaluate<P: PropertyLookup + ?Sized>(
    expr: &Expression,
    props: &P,
    base_dir: Option<&Path>,
) -> bool {
    match expr {
        Expression::Compare { lhs, op, rhs } => {
            compare(&expand_parts(lhs, props), *op, &expand_parts(rhs, props))
        }
        Expression::Exists(parts) => path_exists(&expand_parts(parts, props), base_dir),
        Expression::Truthy(parts) => expand_parts(parts, props).trim().eq_ignore_ascii_case("true"),
        Expression::Not(inner) => !evaluate(inner, props, base_dir),
        Expression::And(a, b) => evaluate(a, props, base_dir) && evaluate(b, props, base_dir),
        Expression::Or(a, b) => evaluate(a, props, base_dir) || evaluate(b, props, base_dir),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
