//! C3: Expression Evaluator.
//!
//! A [`Expr`] tree is the linked form of a rule's `FORMULA`. Evaluating one
//! against a request's claims never panics and never blocks on descriptor
//! data: any leaf that reaches into a descriptor (a fragment attribute,
//! see [`crate::fragment`]) cannot be resolved at this stage, since the
//! descriptor row doesn't exist yet when a request is being authorized
//! ahead of the query. Such leaves evaluate to [`Tri::Undetermined`] and
//! propagate through the tree using three-valued (Kleene) logic; the
//! authorizer (C6) turns a formula that bottoms out in `Undetermined` into
//! a conditional allow backed by a SQL filter instead of a hard decision.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::fragment::Fragment;

/// A concrete attribute value, the result of resolving a claim, global, or
/// literal leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Num(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Null,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => write!(f, "{s}"),
            AttributeValue::Num(n) => write!(f, "{n}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            AttributeValue::Null => write!(f, ""),
        }
    }
}

/// Where an attribute leaf's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeRef {
    /// A claim on the caller's authenticated identity.
    Claim(String),
    /// A server-side global (e.g. current time), not tied to the caller.
    Global(String),
    /// A descriptor field reached via fragment path; never resolvable
    /// during request-time evaluation, only during SQL lowering.
    Fragment(Fragment),
}

/// A linked boolean/value expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    StrVal(String),
    NumVal(f64),
    BoolVal(bool),
    DateTimeVal(DateTime<Utc>),
    Attribute(AttributeRef),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Regex(Box<Expr>, Box<Expr>),
    Contains(Box<Expr>, Box<Expr>),
    StartsWith(Box<Expr>, Box<Expr>),
    EndsWith(Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
}

/// Tri-state evaluation result (Kleene logic): `Undetermined` means the
/// node bottomed out on a fragment attribute that can only be resolved by
/// a SQL predicate over the target descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Undetermined,
}

impl Tri {
    #[must_use]
    pub fn negate(self) -> Tri {
        match self {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Undetermined => Tri::Undetermined,
        }
    }

    #[must_use]
    pub fn and(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::False, _) | (_, Tri::False) => Tri::False,
            (Tri::True, Tri::True) => Tri::True,
            _ => Tri::Undetermined,
        }
    }

    #[must_use]
    pub fn or(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::True, _) | (_, Tri::True) => Tri::True,
            (Tri::False, Tri::False) => Tri::False,
            _ => Tri::Undetermined,
        }
    }

    #[must_use]
    pub fn from_bool(b: bool) -> Tri {
        if b {
            Tri::True
        } else {
            Tri::False
        }
    }
}

/// Request-time evaluation context: the caller's authenticated claims plus
/// server-side globals. Fragment attributes are never present here.
#[derive(Debug, Default, Clone)]
pub struct EvalContext {
    pub claims: HashMap<String, AttributeValue>,
    pub globals: HashMap<String, AttributeValue>,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.claims.insert(key.into(), value);
        self
    }
}

/// Leaf value resolution: `Undetermined` for any fragment attribute.
enum LeafValue {
    Determined(AttributeValue),
    Undetermined,
}

fn resolve_leaf(expr: &Expr, ctx: &EvalContext) -> LeafValue {
    match expr {
        Expr::StrVal(s) => LeafValue::Determined(AttributeValue::Str(s.clone())),
        Expr::NumVal(n) => LeafValue::Determined(AttributeValue::Num(*n)),
        Expr::BoolVal(b) => LeafValue::Determined(AttributeValue::Bool(*b)),
        Expr::DateTimeVal(dt) => LeafValue::Determined(AttributeValue::DateTime(*dt)),
        Expr::Attribute(AttributeRef::Claim(key)) => LeafValue::Determined(
            ctx.claims.get(key).cloned().unwrap_or(AttributeValue::Null),
        ),
        Expr::Attribute(AttributeRef::Global(key)) => LeafValue::Determined(
            ctx.globals.get(key).cloned().unwrap_or(AttributeValue::Null),
        ),
        Expr::Attribute(AttributeRef::Fragment(_)) => LeafValue::Undetermined,
        // Any other node used in value position (e.g. a boolean subexpression
        // inside $eq) is evaluated as a boolean and lifted back to a value.
        other => match eval(other, ctx) {
            Tri::True => LeafValue::Determined(AttributeValue::Bool(true)),
            Tri::False => LeafValue::Determined(AttributeValue::Bool(false)),
            Tri::Undetermined => LeafValue::Undetermined,
        },
    }
}

/// Ordering across possibly-mismatched attribute value types. Same-type
/// pairs compare natively; mismatched non-null pairs fall back to a
/// lexicographic string comparison (logged at debug), matching spec's
/// explicit resolution for comparing e.g. a number against a timestamp
/// literal. `Null` never orders against anything.
fn ordering(a: &AttributeValue, b: &AttributeValue) -> Option<std::cmp::Ordering> {
    use AttributeValue::{Bool, DateTime as Dt, Null, Num, Str};
    match (a, b) {
        (Null, _) | (_, Null) => None,
        (Num(x), Num(y)) => x.partial_cmp(y),
        (Dt(x), Dt(y)) => Some(x.cmp(y)),
        (Str(x), Str(y)) => Some(x.cmp(y)),
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        _ => {
            tracing::debug!(left = %a, right = %b, "comparing mismatched attribute types, falling back to lexicographic order");
            Some(a.to_string().cmp(&b.to_string()))
        }
    }
}

fn values_equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    use AttributeValue::Null;
    match (a, b) {
        (Null, Null) => true,
        (Null, _) | (_, Null) => false,
        _ => ordering(a, b) == Some(std::cmp::Ordering::Equal),
    }
}

fn as_str(v: &AttributeValue) -> Option<&str> {
    match v {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn eval_binary_compare(
    left: &Expr,
    right: &Expr,
    ctx: &EvalContext,
    cmp: impl Fn(std::cmp::Ordering) -> bool,
) -> Tri {
    match (resolve_leaf(left, ctx), resolve_leaf(right, ctx)) {
        (LeafValue::Determined(a), LeafValue::Determined(b)) => {
            ordering(&a, &b).map_or(Tri::False, |ord| Tri::from_bool(cmp(ord)))
        }
        _ => Tri::Undetermined,
    }
}

/// Evaluate a formula against a request-time context. Never panics:
/// malformed regexes, type mismatches and unresolvable attributes all
/// degrade to a determinate `false` or to `Undetermined`, never an error.
#[must_use]
pub fn eval(expr: &Expr, ctx: &EvalContext) -> Tri {
    match expr {
        Expr::StrVal(_) | Expr::NumVal(_) | Expr::DateTimeVal(_) => Tri::Undetermined,
        Expr::BoolVal(b) => Tri::from_bool(*b),
        Expr::Attribute(_) => match resolve_leaf(expr, ctx) {
            LeafValue::Determined(AttributeValue::Bool(b)) => Tri::from_bool(b),
            LeafValue::Determined(_) => Tri::False,
            LeafValue::Undetermined => Tri::Undetermined,
        },
        Expr::Not(inner) => eval(inner, ctx).negate(),
        Expr::And(items) => {
            // Empty $and is true.
            items.iter().fold(Tri::True, |acc, e| acc.and(eval(e, ctx)))
        }
        Expr::Or(items) => {
            // Empty $or is false.
            items.iter().fold(Tri::False, |acc, e| acc.or(eval(e, ctx)))
        }
        Expr::Eq(a, b) => match (resolve_leaf(a, ctx), resolve_leaf(b, ctx)) {
            (LeafValue::Determined(x), LeafValue::Determined(y)) => {
                Tri::from_bool(values_equal(&x, &y))
            }
            _ => Tri::Undetermined,
        },
        Expr::Ne(a, b) => match (resolve_leaf(a, ctx), resolve_leaf(b, ctx)) {
            (LeafValue::Determined(x), LeafValue::Determined(y)) => {
                Tri::from_bool(!values_equal(&x, &y))
            }
            _ => Tri::Undetermined,
        },
        Expr::Gt(a, b) => eval_binary_compare(a, b, ctx, |ord| ord.is_gt()),
        Expr::Ge(a, b) => eval_binary_compare(a, b, ctx, |ord| ord.is_ge()),
        Expr::Lt(a, b) => eval_binary_compare(a, b, ctx, |ord| ord.is_lt()),
        Expr::Le(a, b) => eval_binary_compare(a, b, ctx, |ord| ord.is_le()),
        Expr::Regex(subject, pattern) => {
            match (resolve_leaf(subject, ctx), resolve_leaf(pattern, ctx)) {
                (LeafValue::Determined(s), LeafValue::Determined(p)) => {
                    match (as_str(&s), as_str(&p)) {
                        (Some(s), Some(p)) => match Regex::new(p) {
                            Ok(re) => Tri::from_bool(re.is_match(s)),
                            Err(err) => {
                                tracing::debug!(pattern = p, error = %err, "invalid $regex pattern, evaluating to false");
                                Tri::False
                            }
                        },
                        _ => Tri::False,
                    }
                }
                _ => Tri::Undetermined,
            }
        }
        Expr::Contains(a, b) => eval_str_binary(a, b, ctx, |x, y| x.contains(y)),
        Expr::StartsWith(a, b) => eval_str_binary(a, b, ctx, |x, y| x.starts_with(y)),
        Expr::EndsWith(a, b) => eval_str_binary(a, b, ctx, |x, y| x.ends_with(y)),
        Expr::In(needle, haystack) => {
            if haystack.is_empty() {
                // Empty $in is false.
                return Tri::False;
            }
            match resolve_leaf(needle, ctx) {
                LeafValue::Undetermined => Tri::Undetermined,
                LeafValue::Determined(needle_val) => {
                    let mut undetermined = false;
                    for candidate in haystack {
                        match resolve_leaf(candidate, ctx) {
                            LeafValue::Determined(v) if values_equal(&needle_val, &v) => {
                                return Tri::True
                            }
                            LeafValue::Determined(_) => {}
                            LeafValue::Undetermined => undetermined = true,
                        }
                    }
                    if undetermined {
                        Tri::Undetermined
                    } else {
                        Tri::False
                    }
                }
            }
        }
    }
}

fn eval_str_binary(
    a: &Expr,
    b: &Expr,
    ctx: &EvalContext,
    op: impl Fn(&str, &str) -> bool,
) -> Tri {
    match (resolve_leaf(a, ctx), resolve_leaf(b, ctx)) {
        (LeafValue::Determined(x), LeafValue::Determined(y)) => match (as_str(&x), as_str(&y)) {
            (Some(x), Some(y)) => Tri::from_bool(op(x, y)),
            _ => Tri::False,
        },
        _ => Tri::Undetermined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_role(role: &str) -> EvalContext {
        EvalContext::new().with_claim("role", AttributeValue::Str(role.to_string()))
    }

    #[test]
    fn empty_and_is_true() {
        assert_eq!(eval(&Expr::And(vec![]), &EvalContext::new()), Tri::True);
    }

    #[test]
    fn empty_or_is_false() {
        assert_eq!(eval(&Expr::Or(vec![]), &EvalContext::new()), Tri::False);
    }

    #[test]
    fn empty_in_is_false() {
        let expr = Expr::In(Box::new(Expr::StrVal("x".into())), vec![]);
        assert_eq!(eval(&expr, &EvalContext::new()), Tri::False);
    }

    #[test]
    fn claim_equality() {
        let expr = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Claim("role".into()))),
            Box::new(Expr::StrVal("admin".into())),
        );
        assert_eq!(eval(&expr, &ctx_with_role("admin")), Tri::True);
        assert_eq!(eval(&expr, &ctx_with_role("viewer")), Tri::False);
    }

    #[test]
    fn fragment_attribute_is_undetermined() {
        let frag = Fragment::parse(crate::fragment::FragmentRoot::AasDesc, "idShort").unwrap();
        let expr = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("pump-1".into())),
        );
        assert_eq!(eval(&expr, &EvalContext::new()), Tri::Undetermined);
    }

    #[test]
    fn and_with_undetermined_and_false_is_false() {
        let frag = Fragment::parse(crate::fragment::FragmentRoot::AasDesc, "idShort").unwrap();
        let expr = Expr::And(vec![
            Expr::Eq(
                Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
                Box::new(Expr::StrVal("pump-1".into())),
            ),
            Expr::BoolVal(false),
        ]);
        assert_eq!(eval(&expr, &EvalContext::new()), Tri::False);
    }

    #[test]
    fn and_with_undetermined_and_true_is_undetermined() {
        let frag = Fragment::parse(crate::fragment::FragmentRoot::AasDesc, "idShort").unwrap();
        let expr = Expr::And(vec![
            Expr::Eq(
                Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
                Box::new(Expr::StrVal("pump-1".into())),
            ),
            Expr::BoolVal(true),
        ]);
        assert_eq!(eval(&expr, &EvalContext::new()), Tri::Undetermined);
    }

    #[test]
    fn invalid_regex_is_false_not_panic() {
        let expr = Expr::Regex(
            Box::new(Expr::StrVal("abc".into())),
            Box::new(Expr::StrVal("(unclosed".into())),
        );
        assert_eq!(eval(&expr, &EvalContext::new()), Tri::False);
    }

    #[test]
    fn mismatched_types_fall_back_to_lexicographic_order() {
        let expr = Expr::Gt(
            Box::new(Expr::NumVal(5.0)),
            Box::new(Expr::DateTimeVal(Utc::now())),
        );
        // Must not panic; result is whatever the lexicographic fallback gives.
        let _ = eval(&expr, &EvalContext::new());
    }

    #[test]
    fn starts_with_and_contains() {
        let ctx = ctx_with_role("admin-readonly");
        let starts = Expr::StartsWith(
            Box::new(Expr::Attribute(AttributeRef::Claim("role".into()))),
            Box::new(Expr::StrVal("admin".into())),
        );
        assert_eq!(eval(&starts, &ctx), Tri::True);

        let contains = Expr::Contains(
            Box::new(Expr::Attribute(AttributeRef::Claim("role".into()))),
            Box::new(Expr::StrVal("readonly".into())),
        );
        assert_eq!(eval(&contains, &ctx), Tri::True);
    }
}
