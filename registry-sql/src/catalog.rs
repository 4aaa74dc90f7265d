//! Fragment-to-column resolution: the part of C5 that turns a
//! [`Fragment`](registry_abac::fragment::Fragment) into a concrete table
//! alias, column, and the joins needed to reach it.
//!
//! Column names follow `snake_case` of the fragment segment name; array
//! segments join into a child table named after the segment (also
//! `snake_case`), aliased by the path walked so far so two rules
//! referencing the same array nesting share one join.

use registry_abac::fragment::{Fragment, FragmentRoot, Segment};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    pub on: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// `<alias>.<column>`, ready to drop into a WHERE clause.
    pub column: String,
    /// Joins required to reach `column`, in dependency order. Each join's
    /// alias is stable for a given fragment path so repeated references
    /// collapse to the same join when deduplicated by the caller.
    pub joins: Vec<JoinClause>,
}

fn root_table(root: FragmentRoot) -> &'static str {
    match root {
        FragmentRoot::AasDesc => "aas_descriptors",
        FragmentRoot::SmDesc => "submodel_descriptors",
        FragmentRoot::Bd => "basic_descriptors",
        FragmentRoot::Sm => "submodels",
        FragmentRoot::Aas => "shells",
    }
}

fn camel_to_snake(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolve a fragment into a column reference plus the joins needed to
/// reach it. The root is always included as the driving table under its
/// own alias (e.g. `aasdesc`); the caller is responsible for adding the
/// root table itself to the `FROM` clause.
#[must_use]
pub fn resolve(fragment: &Fragment) -> ResolvedField {
    let mut alias = fragment.root.as_str().to_string();
    let mut joins = Vec::new();
    let segments: &[Segment] = &fragment.segments;

    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx == segments.len() - 1;
        let snake = camel_to_snake(&segment.name);

        if segment.is_array {
            let child_alias = format!("{alias}_{snake}");
            let parent_singular = singular(&alias);
            joins.push(JoinClause {
                table: snake.clone(),
                alias: child_alias.clone(),
                on: format!("{child_alias}.{parent_singular}_id = {alias}.id"),
            });
            alias = child_alias;
            if is_last {
                // The array itself is the target: existence of at least one
                // row is what the predicate checks against.
                return ResolvedField {
                    column: format!("{alias}.id"),
                    joins,
                };
            }
        } else if is_last {
            return ResolvedField {
                column: format!("{alias}.{snake}"),
                joins,
            };
        }
        // Non-terminal, non-array segments (nested object fields) keep
        // walking under the same alias; the registry's descriptor schema
        // doesn't nest anonymous objects more than one level deep.
    }

    // A root with no segments resolves to its id column.
    ResolvedField {
        column: format!("{alias}.id"),
        joins,
    }
}

fn singular(alias: &str) -> String {
    alias.strip_suffix('s').unwrap_or(alias).to_string()
}

#[must_use]
pub fn root_from_clause(root: FragmentRoot) -> String {
    format!("{} {}", root_table(root), root.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_abac::fragment::FragmentRoot;

    #[test]
    fn resolves_simple_field() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "idShort").expect("valid");
        let resolved = resolve(&frag);
        assert_eq!(resolved.column, "aasdesc.id_short");
        assert!(resolved.joins.is_empty());
    }

    #[test]
    fn resolves_array_field_with_join() {
        let frag =
            Fragment::parse(FragmentRoot::AasDesc, "submodelDescriptors[].semanticId")
                .expect("valid");
        let resolved = resolve(&frag);
        assert_eq!(resolved.column, "aasdesc_submodel_descriptors.semantic_id");
        assert_eq!(resolved.joins.len(), 1);
        assert_eq!(resolved.joins[0].table, "submodel_descriptors");
        assert_eq!(
            resolved.joins[0].on,
            "aasdesc_submodel_descriptors.aasdesc_id = aasdesc.id"
        );
    }

    #[test]
    fn resolves_endpoints_interface() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "endpoints[].interface").expect("valid");
        let resolved = resolve(&frag);
        assert_eq!(resolved.column, "aasdesc_endpoints.interface");
    }
}
