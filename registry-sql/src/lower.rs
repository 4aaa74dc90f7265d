//! C5: SQL Lowering.
//!
//! Turns a linked formula into a boolean SQL fragment, its ordered bind
//! parameters, and the joins needed to evaluate it. Claim/global
//! attributes are folded in as bind parameters (their values are already
//! known at request time); fragment attributes become column references,
//! pulling in whatever joins are needed to reach them. Joins are deduped
//! by alias so two predicates touching the same array nesting share one
//! join (minimal join inclusion).

use registry_abac::expr::{eval, AttributeRef, AttributeValue, EvalContext, Expr, Tri};

use crate::catalog::{self, JoinClause};
use crate::value::SqlValue;

/// The result of lowering one formula: ready to drop into a `WHERE`
/// clause (or an `EXISTS (...)` subquery body) alongside `joins` and
/// `binds`.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub sql: String,
    pub binds: Vec<SqlValue>,
    pub joins: Vec<JoinClause>,
}

enum Operand {
    Column(String),
    Bind(usize),
}

fn operand_sql(op: &Operand) -> String {
    match op {
        Operand::Column(c) => c.clone(),
        Operand::Bind(idx) => format!("${idx}"),
    }
}

fn push_bind(binds: &mut Vec<SqlValue>, value: SqlValue) -> Operand {
    binds.push(value);
    Operand::Bind(binds.len())
}

fn push_join(joins: &mut Vec<JoinClause>, join: JoinClause) {
    if !joins.iter().any(|j| j.alias == join.alias) {
        joins.push(join);
    }
}

fn resolve_operand(
    expr: &Expr,
    ctx: &EvalContext,
    binds: &mut Vec<SqlValue>,
    joins: &mut Vec<JoinClause>,
) -> Operand {
    match expr {
        Expr::StrVal(s) => push_bind(binds, SqlValue::Str(s.clone())),
        Expr::NumVal(n) => push_bind(binds, SqlValue::Num(*n)),
        Expr::BoolVal(b) => push_bind(binds, SqlValue::Bool(*b)),
        Expr::DateTimeVal(dt) => push_bind(binds, SqlValue::DateTime(*dt)),
        Expr::Attribute(AttributeRef::Claim(key)) => {
            let value = ctx.claims.get(key).cloned().unwrap_or(AttributeValue::Null);
            push_bind(binds, value.into())
        }
        Expr::Attribute(AttributeRef::Global(key)) => {
            let value = ctx.globals.get(key).cloned().unwrap_or(AttributeValue::Null);
            push_bind(binds, value.into())
        }
        Expr::Attribute(AttributeRef::Fragment(fragment)) => {
            let resolved = catalog::resolve(fragment);
            for join in resolved.joins {
                push_join(joins, join);
            }
            Operand::Column(resolved.column)
        }
        // A nested boolean expression used in value position (rare, but the
        // grammar doesn't forbid it): fold it to whatever it determines to,
        // never to a SQL subexpression, since comparisons only make sense
        // between leaf values.
        other => match eval(other, ctx) {
            Tri::True => push_bind(binds, SqlValue::Bool(true)),
            Tri::False | Tri::Undetermined => push_bind(binds, SqlValue::Bool(false)),
        },
    }
}

fn compare(
    op: &str,
    a: &Expr,
    b: &Expr,
    ctx: &EvalContext,
    binds: &mut Vec<SqlValue>,
    joins: &mut Vec<JoinClause>,
) -> String {
    let left = resolve_operand(a, ctx, binds, joins);
    let right = resolve_operand(b, ctx, binds, joins);
    format!("({} {op} {})", operand_sql(&left), operand_sql(&right))
}

fn ilike(
    pattern: &str,
    a: &Expr,
    b: &Expr,
    ctx: &EvalContext,
    binds: &mut Vec<SqlValue>,
    joins: &mut Vec<JoinClause>,
) -> String {
    let left = resolve_operand(a, ctx, binds, joins);
    let right = operand_sql(&resolve_operand(b, ctx, binds, joins));
    let expr = pattern.replace("{}", &right);
    format!("({} ILIKE {expr})", operand_sql(&left))
}

fn in_predicate(
    needle: &Expr,
    haystack: &[Expr],
    ctx: &EvalContext,
    binds: &mut Vec<SqlValue>,
    joins: &mut Vec<JoinClause>,
) -> String {
    if haystack.is_empty() {
        return "FALSE".to_string();
    }
    let left = operand_sql(&resolve_operand(needle, ctx, binds, joins));

    let all_str_literals = haystack.iter().all(|e| matches!(e, Expr::StrVal(_)));
    if all_str_literals {
        let values = haystack
            .iter()
            .map(|e| match e {
                Expr::StrVal(s) => s.clone(),
                _ => unreachable!("checked by all_str_literals"),
            })
            .collect();
        let idx = match push_bind(binds, SqlValue::StrArray(values)) {
            Operand::Bind(idx) => idx,
            Operand::Column(_) => unreachable!("push_bind always returns Bind"),
        };
        return format!("({left} = ANY(${idx}::text[]))");
    }

    let arms: Vec<String> = haystack
        .iter()
        .map(|e| {
            let right = operand_sql(&resolve_operand(e, ctx, binds, joins));
            format!("({left} = {right})")
        })
        .collect();
    format!("({})", arms.join(" OR "))
}

fn lower_bool(
    expr: &Expr,
    ctx: &EvalContext,
    binds: &mut Vec<SqlValue>,
    joins: &mut Vec<JoinClause>,
) -> String {
    match expr {
        Expr::BoolVal(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Expr::Not(inner) => format!("(NOT {})", lower_bool(inner, ctx, binds, joins)),
        Expr::And(items) => {
            if items.is_empty() {
                return "TRUE".to_string();
            }
            let parts: Vec<String> = items.iter().map(|e| lower_bool(e, ctx, binds, joins)).collect();
            format!("({})", parts.join(" AND "))
        }
        Expr::Or(items) => {
            if items.is_empty() {
                return "FALSE".to_string();
            }
            let parts: Vec<String> = items.iter().map(|e| lower_bool(e, ctx, binds, joins)).collect();
            format!("({})", parts.join(" OR "))
        }
        Expr::Eq(a, b) => compare("=", a, b, ctx, binds, joins),
        Expr::Ne(a, b) => compare("<>", a, b, ctx, binds, joins),
        Expr::Gt(a, b) => compare(">", a, b, ctx, binds, joins),
        Expr::Ge(a, b) => compare(">=", a, b, ctx, binds, joins),
        Expr::Lt(a, b) => compare("<", a, b, ctx, binds, joins),
        Expr::Le(a, b) => compare("<=", a, b, ctx, binds, joins),
        Expr::Regex(a, b) => compare("~", a, b, ctx, binds, joins),
        Expr::Contains(a, b) => ilike("'%' || {} || '%'", a, b, ctx, binds, joins),
        Expr::StartsWith(a, b) => ilike("{} || '%'", a, b, ctx, binds, joins),
        Expr::EndsWith(a, b) => ilike("'%' || {}", a, b, ctx, binds, joins),
        Expr::In(needle, haystack) => in_predicate(needle, haystack, ctx, binds, joins),
        // A bare attribute reference in boolean position: true only if the
        // underlying column/claim is the boolean `TRUE`.
        Expr::Attribute(_) => {
            let operand = resolve_operand(expr, ctx, binds, joins);
            match operand {
                Operand::Column(c) => format!("({c} IS TRUE)"),
                Operand::Bind(idx) => format!("(${idx} IS TRUE)"),
            }
        }
        Expr::StrVal(_) | Expr::NumVal(_) | Expr::DateTimeVal(_) => {
            tracing::debug!("non-boolean literal used in boolean position, treating as false");
            "FALSE".to_string()
        }
    }
}

/// Lower a formula into a standalone boolean SQL fragment.
///
/// `ctx` supplies claim/global values already known for the request; any
/// fragment attribute found becomes a real column reference with its
/// joins appended to `Lowered::joins`.
#[must_use]
pub fn lower_formula(expr: &Expr, ctx: &EvalContext) -> Lowered {
    let mut binds = Vec::new();
    let mut joins = Vec::new();
    let sql = lower_bool(expr, ctx, &mut binds, &mut joins);
    Lowered { sql, binds, joins }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_abac::fragment::{Fragment, FragmentRoot};

    #[test]
    fn lowers_fragment_equality() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "idShort").unwrap();
        let expr = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("pump-1".into())),
        );
        let lowered = lower_formula(&expr, &EvalContext::new());
        assert_eq!(lowered.sql, "(aasdesc.id_short = $1)");
        assert_eq!(lowered.binds, vec![SqlValue::Str("pump-1".into())]);
        assert!(lowered.joins.is_empty());
    }

    #[test]
    fn lowers_array_fragment_with_join() {
        let frag =
            Fragment::parse(FragmentRoot::AasDesc, "submodelDescriptors[].semanticId").unwrap();
        let expr = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("urn:x".into())),
        );
        let lowered = lower_formula(&expr, &EvalContext::new());
        assert_eq!(lowered.joins.len(), 1);
        assert_eq!(lowered.sql, "(aasdesc_submodel_descriptors.semantic_id = $1)");
    }

    #[test]
    fn deduplicates_joins_across_predicates() {
        let frag_a = Fragment::parse(FragmentRoot::AasDesc, "submodelDescriptors[].id").unwrap();
        let frag_b =
            Fragment::parse(FragmentRoot::AasDesc, "submodelDescriptors[].semanticId").unwrap();
        let expr = Expr::And(vec![
            Expr::Eq(
                Box::new(Expr::Attribute(AttributeRef::Fragment(frag_a))),
                Box::new(Expr::StrVal("sm-1".into())),
            ),
            Expr::Eq(
                Box::new(Expr::Attribute(AttributeRef::Fragment(frag_b))),
                Box::new(Expr::StrVal("urn:x".into())),
            ),
        ]);
        let lowered = lower_formula(&expr, &EvalContext::new());
        assert_eq!(lowered.joins.len(), 1);
    }

    #[test]
    fn in_with_string_literals_uses_any_array() {
        let ctx = EvalContext::new().with_claim("role", AttributeValue::Str("editor".into()));
        let expr = Expr::In(
            Box::new(Expr::Attribute(AttributeRef::Claim("role".into()))),
            vec![Expr::StrVal("admin".into()), Expr::StrVal("editor".into())],
        );
        let lowered = lower_formula(&expr, &ctx);
        assert_eq!(lowered.sql, "($1 = ANY($2::text[]))");
        assert_eq!(
            lowered.binds,
            vec![
                SqlValue::Str("editor".into()),
                SqlValue::StrArray(vec!["admin".into(), "editor".into()])
            ]
        );
    }

    #[test]
    fn claim_equality_pre_resolved_as_bind() {
        let ctx = EvalContext::new().with_claim("role", AttributeValue::Str("admin".into()));
        let expr = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Claim("role".into()))),
            Box::new(Expr::StrVal("admin".into())),
        );
        let lowered = lower_formula(&expr, &ctx);
        assert_eq!(lowered.sql, "($1 = $2)");
        assert_eq!(
            lowered.binds,
            vec![SqlValue::Str("admin".into()), SqlValue::Str("admin".into())]
        );
    }
}
