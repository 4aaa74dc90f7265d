//! The query-side artifact SQL lowering produces: a `WHERE`-compatible
//! filter plus, where a rule only conditionally allows a field, a mask
//! plan the response layer uses to null out fields the caller isn't
//! entitled to see (C7).

use crate::catalog::JoinClause;
use crate::value::SqlValue;

/// A lowered formula ready to be spliced into a descriptor list/get query.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub joins: Vec<JoinClause>,
    /// `None` means "no restriction" (an unconditional allow).
    pub where_sql: Option<String>,
    pub binds: Vec<SqlValue>,
}

impl QueryFilter {
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn none_match() -> Self {
        Self {
            joins: Vec::new(),
            where_sql: Some("FALSE".to_string()),
            binds: Vec::new(),
        }
    }

    /// Combine this filter with another using `AND`, merging joins and
    /// renumbering `other`'s bind placeholders to follow this filter's.
    #[must_use]
    pub fn and(mut self, other: QueryFilter) -> Self {
        let offset = self.binds.len();
        for join in other.joins {
            if !self.joins.iter().any(|j| j.alias == join.alias) {
                self.joins.push(join);
            }
        }
        self.binds.extend(other.binds);
        self.where_sql = match (self.where_sql.take(), other.where_sql) {
            (None, None) => None,
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(renumber(&b, offset)),
            (Some(a), Some(b)) => Some(format!("({a} AND {})", renumber(&b, offset))),
        };
        self
    }

    /// Negate this filter's predicate in place, keeping its joins and
    /// binds (a deny rule's filter negated into an allow's combined
    /// predicate still needs the same joins to evaluate).
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.where_sql = self.where_sql.map(|sql| format!("(NOT {sql})"));
        self
    }

    /// Combine this filter with another using `OR` (two distinct rules
    /// each conditionally allowing the request contribute alternative
    /// ways to satisfy it).
    #[must_use]
    pub fn or(mut self, other: QueryFilter) -> Self {
        let offset = self.binds.len();
        for join in other.joins {
            if !self.joins.iter().any(|j| j.alias == join.alias) {
                self.joins.push(join);
            }
        }
        self.binds.extend(other.binds);
        self.where_sql = match (self.where_sql.take(), other.where_sql) {
            (None, _) | (_, None) => None,
            (Some(a), Some(b)) => Some(format!("({a} OR {})", renumber(&b, offset))),
        };
        self
    }
}

/// Shifts every `$n` placeholder in `sql` up by `offset`. Exposed so
/// `registry-storage` can splice a filter's `where_sql` after binds of its
/// own (a cursor predicate, an id lookup) without renumbering by hand.
#[must_use]
pub fn renumber_placeholders(sql: &str, offset: usize) -> String {
    renumber(sql, offset)
}

fn renumber(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '$' {
            let mut digits = String::new();
            while let Some((_, d)) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    chars.next();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                out.push('$');
            } else {
                let n: usize = digits.parse().unwrap_or(0);
                out.push('$');
                out.push_str(&(n + offset).to_string());
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// One field that must be nulled out of a response unless `predicate_sql`
/// holds for the row being serialized, per C7's shared fragment mask
/// plan: a rule whose formula only conditionally resolves true still lets
/// the row through (it may satisfy another rule), but the field it gates
/// is masked row-by-row.
#[derive(Debug, Clone)]
pub struct MaskFlag {
    pub field: String,
    pub predicate_sql: String,
    pub binds: Vec<SqlValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_merges_and_renumbers_binds() {
        let a = QueryFilter {
            joins: vec![],
            where_sql: Some("(x.a = $1)".into()),
            binds: vec![SqlValue::Str("one".into())],
        };
        let b = QueryFilter {
            joins: vec![],
            where_sql: Some("(x.b = $1)".into()),
            binds: vec![SqlValue::Str("two".into())],
        };
        let combined = a.and(b);
        assert_eq!(combined.where_sql.unwrap(), "((x.a = $1) AND (x.b = $2))");
        assert_eq!(combined.binds.len(), 2);
    }

    #[test]
    fn none_match_is_always_false() {
        assert_eq!(QueryFilter::none_match().where_sql.unwrap(), "FALSE");
    }
}
