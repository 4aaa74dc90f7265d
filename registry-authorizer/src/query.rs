//! C7: Query Filter Integration.
//!
//! The hooks the descriptor repositories call before running a list/get
//! query: resolve a [`Decision`] down to the [`QueryFilter`] that must be
//! spliced onto the base query, short-circuiting on a hard deny so the
//! repository never even builds SQL for a request with no chance of
//! returning rows.

use registry_sql::QueryFilter;

use crate::decision::Decision;

/// `AddFilterQueryFromContext`: turn an authorization decision into the
/// filter a descriptor list/get query must apply. A hard deny becomes a
/// filter that can never match, so the caller can uniformly append it to
/// a query rather than branching on the decision.
#[must_use]
pub fn filter_for_decision(decision: &Decision) -> QueryFilter {
    match decision {
        Decision::Denied(_) => QueryFilter::none_match(),
        Decision::AllowDirect => QueryFilter::unrestricted(),
        Decision::AllowConditional(filter) => filter.clone(),
    }
}

/// `AddFormulaQueryFromContext`: like [`filter_for_decision`], but
/// combines the right-specific filter into an already in-progress query
/// filter being built across multiple rights (e.g. a batch endpoint
/// checking `READ` across several resource kinds in one query).
#[must_use]
pub fn and_formula_query(base: QueryFilter, decision: &Decision) -> QueryFilter {
    base.and(filter_for_decision(decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionReason;

    #[test]
    fn denied_decision_is_never_satisfiable() {
        let filter = filter_for_decision(&Decision::Denied(DecisionReason::DenyNoRule));
        assert_eq!(filter.where_sql.unwrap(), "FALSE");
    }

    #[test]
    fn direct_allow_has_no_restriction() {
        let filter = filter_for_decision(&Decision::AllowDirect);
        assert!(filter.where_sql.is_none());
    }
}
