//! `BuildSharedFragmentMaskPlan` (C7): per-field visibility gating for
//! rows a conditional allow already let through. A rule can conditionally
//! allow the request as a whole while only conditionally allowing
//! individual fields on each row (e.g. "may list shells, but `assetKind`
//! is only visible for the caller's own tenant"); the mask plan is what
//! the response serializer consults to null those fields out per row.

use std::sync::Arc;

use registry_abac::expr::{eval, EvalContext, Expr, Tri};
use registry_sql::{lower_formula, MaskFlag};

/// One field this response may need to redact, gated by its own formula.
/// Owned rather than borrowed because a DENY-scoped rule's gate is
/// `Expr::Not` wrapped around the rule's formula, a value that has to be
/// constructed fresh rather than borrowed out of the `Policy`.
#[derive(Debug, Clone)]
pub struct FieldGate {
    pub field: String,
    pub formula: Arc<Expr>,
}

/// Build the mask plan for a set of field gates against the caller's
/// claims. A field whose gate resolves unconditionally true is omitted
/// from the plan (never masked); one that resolves unconditionally false
/// is always masked (`FALSE`); one that stays fragment-gated gets a
/// lowered SQL predicate, with its binds, that the caller splices into
/// the query that produces the row being serialized.
#[must_use]
pub fn build_mask_plan(gates: &[FieldGate], claims: &EvalContext) -> Vec<MaskFlag> {
    let mut plan = Vec::new();
    for gate in gates {
        match eval(&gate.formula, claims) {
            Tri::True => {}
            Tri::False => plan.push(MaskFlag {
                field: gate.field.clone(),
                predicate_sql: "FALSE".to_string(),
                binds: Vec::new(),
            }),
            Tri::Undetermined => {
                let lowered = lower_formula(&gate.formula, claims);
                plan.push(MaskFlag {
                    field: gate.field.clone(),
                    predicate_sql: lowered.sql,
                    binds: lowered.binds,
                });
            }
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_abac::fragment::{Fragment, FragmentRoot};
    use registry_abac::expr::AttributeRef;

    #[test]
    fn unconditionally_visible_field_is_not_masked() {
        let gates = [FieldGate {
            field: "idShort".to_string(),
            formula: Arc::new(Expr::BoolVal(true)),
        }];
        assert!(build_mask_plan(&gates, &EvalContext::new()).is_empty());
    }

    #[test]
    fn fragment_gated_field_produces_predicate_with_its_bind() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "assetKind").unwrap();
        let formula = Expr::Eq(
            Box::new(Expr::Attribute(AttributeRef::Fragment(frag))),
            Box::new(Expr::StrVal("Instance".into())),
        );
        let gates = [FieldGate {
            field: "assetKind".to_string(),
            formula: Arc::new(formula),
        }];
        let plan = build_mask_plan(&gates, &EvalContext::new());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].field, "assetKind");
        assert_eq!(plan[0].predicate_sql, "(aasdesc.asset_kind = $1)");
        assert_eq!(plan[0].binds.len(), 1);
    }

    #[test]
    fn unconditionally_masked_field_has_no_binds() {
        let gates = [FieldGate {
            field: "assetKind".to_string(),
            formula: Arc::new(Expr::BoolVal(false)),
        }];
        let plan = build_mask_plan(&gates, &EvalContext::new());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].predicate_sql, "FALSE");
        assert!(plan[0].binds.is_empty());
    }
}
