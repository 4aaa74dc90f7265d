//! C6: Authorizer.
//!
//! Combines every rule matching a request's right/subject/object into a
//! single decision using deny-overrides-allow: a deny rule whose formula
//! resolves `true` wins outright; a deny rule whose formula can't be
//! resolved without descriptor data (fragment-gated) instead contributes
//! a negated predicate to the eventual query filter, rather than forcing
//! a hard deny (see `SPEC_FULL.md`'s Open Question resolution on this
//! point — a rule that *might* deny shouldn't block rows it doesn't
//! apply to).

use std::fmt;
use std::sync::Arc;

use registry_abac::expr::{eval, AttributeValue, EvalContext, Expr, Tri};
use registry_abac::policy::{Access, Policy, Right, Rule, SubjectPredicate};
use registry_sql::{lower_formula, QueryFilter};

/// The request-time facts the authorizer matches rules against.
#[derive(Debug, Clone)]
pub struct AuthzRequest {
    pub claims: EvalContext,
    pub right: Right,
    pub route_path: String,
    pub object_id: Option<String>,
}

/// Why a decision came out the way it did, per the Authorizer's
/// `(ok, reason, qf?)` contract. Every `Decision` variant maps to exactly
/// one reason; see [`Decision::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    AllowDirect,
    AllowConditional,
    /// An applicable deny rule's formula resolved unconditionally true.
    DenyExplicit,
    /// At least one rule covers this route/object, but none of them
    /// grants the right for this caller.
    DenyNoRule,
    /// No rule's OBJECTS cover this route/object at all.
    DenyRoute,
    /// The authorizer reached a state its own invariants say is
    /// unreachable; treated as a deny rather than panicking.
    DenyMalformed,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::AllowDirect => "AllowDirect",
            DecisionReason::AllowConditional => "AllowConditional",
            DecisionReason::DenyExplicit => "DenyExplicit",
            DecisionReason::DenyNoRule => "DenyNoRule",
            DecisionReason::DenyRoute => "DenyRoute",
            DecisionReason::DenyMalformed => "DenyMalformed",
        };
        f.write_str(s)
    }
}

/// The outcome of combining every applicable rule.
#[derive(Debug, Clone)]
pub enum Decision {
    /// No applicable rule allows the right, a deny rule resolved true, or
    /// no rule covers this route/object at all.
    Denied(DecisionReason),
    /// At least one allow rule resolved true with no deny rule in play.
    AllowDirect,
    /// The right is granted only for rows matching `QueryFilter`.
    AllowConditional(QueryFilter),
}

impl Decision {
    #[must_use]
    pub fn reason(&self) -> DecisionReason {
        match self {
            Decision::Denied(reason) => *reason,
            Decision::AllowDirect => DecisionReason::AllowDirect,
            Decision::AllowConditional(_) => DecisionReason::AllowConditional,
        }
    }
}

fn subjects_match(subjects: &[SubjectPredicate], claims: &EvalContext) -> bool {
    subjects.iter().any(|subject| match subject {
        SubjectPredicate::AnyAuthenticated => true,
        SubjectPredicate::Role(role) => {
            claims.claims.get("role") == Some(&AttributeValue::Str(role.clone()))
        }
        SubjectPredicate::Claim { key, value } => {
            claims.claims.get(key) == Some(&AttributeValue::Str(value.clone()))
        }
    })
}

/// A rule with a non-empty `fields` list doesn't gate row existence; it
/// only contributes to the per-field mask plan (see [`field_gates`]).
fn gates_rows(rule: &Rule) -> bool {
    rule.fields.is_empty()
}

fn applicable_rules<'a>(policy: &'a Policy, req: &AuthzRequest) -> (Vec<&'a Rule>, Vec<&'a Rule>) {
    let mut allow = Vec::new();
    let mut deny = Vec::new();
    for rule in &policy.rules {
        if !gates_rows(rule) {
            continue;
        }
        if !rule.acl.grants_right(req.right) {
            continue;
        }
        if !subjects_match(&rule.acl.subjects, &req.claims) {
            continue;
        }
        if !rule.matches_object(req.object_id.as_deref(), &req.route_path, req.right) {
            continue;
        }
        match rule.acl.access {
            Access::Allow => allow.push(rule),
            Access::Deny => deny.push(rule),
        }
    }
    (allow, deny)
}

/// Rules scoped to specific response fields (`FIELDS`) don't gate row
/// visibility; they gate the visibility of those fields on rows that
/// already passed the row-level decision. Deny access is expressed as
/// the negation of the formula (visible unless it resolves true).
#[must_use]
pub fn field_gates(policy: &Policy, req: &AuthzRequest) -> Vec<crate::mask::FieldGate> {
    let mut gates = Vec::new();
    for rule in &policy.rules {
        if rule.fields.is_empty() {
            continue;
        }
        if !rule.acl.grants_right(req.right) {
            continue;
        }
        if !subjects_match(&rule.acl.subjects, &req.claims) {
            continue;
        }
        if !rule.matches_object(req.object_id.as_deref(), &req.route_path, req.right) {
            continue;
        }
        let formula = match rule.acl.access {
            Access::Allow => rule.formula.clone(),
            Access::Deny => Arc::new(Expr::Not(Box::new((*rule.formula).clone()))),
        };
        for field in &rule.fields {
            gates.push(crate::mask::FieldGate {
                field: field.clone(),
                formula: formula.clone(),
            });
        }
    }
    gates
}

fn rule_filter(rule: &Rule, claims: &EvalContext) -> QueryFilter {
    let lowered = lower_formula(&rule.formula, claims);
    QueryFilter {
        joins: lowered.joins,
        where_sql: Some(lowered.sql),
        binds: lowered.binds,
    }
}

/// Combine every rule applicable to `req` into one [`Decision`].
#[must_use]
pub fn authorize(policy: &Policy, req: &AuthzRequest) -> Decision {
    let route_covered = policy.rules.iter().any(|rule| {
        gates_rows(rule) && rule.matches_object(req.object_id.as_deref(), &req.route_path, req.right)
    });
    if !route_covered {
        tracing::debug!(path = %req.route_path, "no rule's OBJECTS cover this request");
        return Decision::Denied(DecisionReason::DenyRoute);
    }

    let (allow_rules, deny_rules) = applicable_rules(policy, req);
    if allow_rules.is_empty() {
        tracing::debug!(right = ?req.right, path = %req.route_path, "no allow rule grants this right");
        return Decision::Denied(DecisionReason::DenyNoRule);
    }

    let mut allow_unconditional = false;
    let mut allow_filter: Option<QueryFilter> = None;
    for rule in &allow_rules {
        match eval(&rule.formula, &req.claims) {
            Tri::True => allow_unconditional = true,
            Tri::Undetermined => {
                let filter = rule_filter(rule, &req.claims);
                allow_filter = Some(match allow_filter {
                    Some(existing) => existing.or(filter),
                    None => filter,
                });
            }
            Tri::False => {}
        }
    }

    if !allow_unconditional && allow_filter.is_none() {
        return Decision::Denied(DecisionReason::DenyNoRule);
    }

    let mut deny_filter: Option<QueryFilter> = None;
    for rule in &deny_rules {
        match eval(&rule.formula, &req.claims) {
            Tri::True => {
                tracing::debug!(right = ?req.right, path = %req.route_path, "deny rule resolved unconditionally");
                return Decision::Denied(DecisionReason::DenyExplicit);
            }
            Tri::Undetermined => {
                let filter = rule_filter(rule, &req.claims);
                deny_filter = Some(match deny_filter {
                    Some(existing) => existing.or(filter),
                    None => filter,
                });
            }
            Tri::False => {}
        }
    }

    if allow_unconditional && deny_filter.is_none() {
        return Decision::AllowDirect;
    }

    let base = match (allow_unconditional, allow_filter) {
        (true, _) => QueryFilter::unrestricted(),
        (false, Some(filter)) => filter,
        (false, None) => {
            tracing::error!(
                right = ?req.right, path = %req.route_path,
                "authorizer reached an allow branch with neither an unconditional allow nor a filter"
            );
            return Decision::Denied(DecisionReason::DenyMalformed);
        }
    };

    let combined = match deny_filter {
        Some(deny) => base.and(deny.negate()),
        None => base,
    };

    Decision::AllowConditional(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_abac::fragment::{Fragment, FragmentRoot};
    use registry_abac::policy::{Acl, ObjectMatcher};
    use registry_abac::expr::{AttributeRef, Expr};
    use std::sync::Arc;

    fn rule(access: Access, formula: Expr, right: Right) -> Rule {
        Rule {
            acl: Acl {
                access,
                rights: vec![right],
                subjects: vec![SubjectPredicate::AnyAuthenticated],
            },
            objects: vec![ObjectMatcher::All],
            formula: Arc::new(formula),
            fields: Vec::new(),
        }
    }

    fn req(right: Right) -> AuthzRequest {
        AuthzRequest {
            claims: EvalContext::new(),
            right,
            route_path: "/shell-descriptors".to_string(),
            object_id: None,
        }
    }

    #[test]
    fn allows_direct_when_one_allow_rule_resolves_true() {
        let policy = Policy {
            rules: vec![rule(Access::Allow, Expr::BoolVal(true), Right::Read)],
        };
        assert!(matches!(
            authorize(&policy, &req(Right::Read)),
            Decision::AllowDirect
        ));
    }

    #[test]
    fn denies_when_no_rule_grants_the_right() {
        let policy = Policy {
            rules: vec![rule(Access::Allow, Expr::BoolVal(true), Right::Read)],
        };
        assert!(matches!(
            authorize(&policy, &req(Right::Delete)),
            Decision::Denied(DecisionReason::DenyNoRule)
        ));
    }

    #[test]
    fn hard_deny_wins_over_direct_allow() {
        let policy = Policy {
            rules: vec![
                rule(Access::Allow, Expr::BoolVal(true), Right::Read),
                rule(Access::Deny, Expr::BoolVal(true), Right::Read),
            ],
        };
        assert!(matches!(
            authorize(&policy, &req(Right::Read)),
            Decision::Denied(DecisionReason::DenyExplicit)
        ));
    }

    #[test]
    fn no_rule_covering_the_route_is_deny_route() {
        let policy = Policy {
            rules: vec![Rule {
                acl: Acl {
                    access: Access::Allow,
                    rights: vec![Right::Read],
                    subjects: vec![SubjectPredicate::AnyAuthenticated],
                },
                objects: vec![ObjectMatcher::Route {
                    path: "/policies/{name}".to_string(),
                    right: None,
                }],
                formula: Arc::new(Expr::BoolVal(true)),
                fields: Vec::new(),
            }],
        };
        assert!(matches!(
            authorize(&policy, &req(Right::Read)),
            Decision::Denied(DecisionReason::DenyRoute)
        ));
    }

    #[test]
    fn fields_scoped_rule_does_not_gate_rows() {
        let mut gated = rule(Access::Allow, Expr::BoolVal(false), Right::Read);
        gated.fields = vec!["assetKind".to_string()];
        let policy = Policy {
            rules: vec![rule(Access::Allow, Expr::BoolVal(true), Right::Read), gated],
        };
        assert!(matches!(
            authorize(&policy, &req(Right::Read)),
            Decision::AllowDirect
        ));
    }

    #[test]
    fn fragment_gated_allow_becomes_conditional() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "idShort").unwrap();
        let formula = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("pump-1".into())),
        );
        let policy = Policy {
            rules: vec![rule(Access::Allow, formula, Right::Read)],
        };
        match authorize(&policy, &req(Right::Read)) {
            Decision::AllowConditional(filter) => {
                assert_eq!(filter.where_sql.unwrap(), "(aasdesc.id_short = $1)");
            }
            other => panic!("expected AllowConditional, got {other:?}"),
        }
    }

    #[test]
    fn deny_with_deferred_formula_negates_rather_than_hard_denies() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "assetKind").unwrap();
        let deny_formula = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("Instance".into())),
        );
        let policy = Policy {
            rules: vec![
                rule(Access::Allow, Expr::BoolVal(true), Right::Read),
                rule(Access::Deny, deny_formula, Right::Read),
            ],
        };
        match authorize(&policy, &req(Right::Read)) {
            Decision::AllowConditional(filter) => {
                assert!(filter.where_sql.unwrap().contains("NOT"));
            }
            other => panic!("expected AllowConditional, got {other:?}"),
        }
    }
}
