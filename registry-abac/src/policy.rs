//! C1: Policy Model.
//!
//! The types in this module are the *linked* representation of a policy
//! document: every `USEACL`/`USEFORMULA`/`USEATTRIBUTES`/`USEOBJECTS`
//! indirection has already been resolved by the parser/linker (C2, see
//! [`crate::parser`]). Nothing downstream of this module ever sees a
//! `USE*` reference again.

use std::sync::Arc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// The five rights a rule's ACL can grant or deny, matching
/// `registry_types::request::Operation` one for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Right {
    Create,
    Read,
    Update,
    Delete,
    Execute,
}

impl FromStr for Right {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "READ" => Ok(Self::Read),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "EXECUTE" => Ok(Self::Execute),
            other => Err(format!("unknown right \"{other}\"")),
        }
    }
}

/// Whether an ACL entry grants or denies the rights it lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Allow,
    Deny,
}

/// A predicate matching the caller's authenticated claims. A rule's ACL
/// matches a request if any subject predicate in its list matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectPredicate {
    /// Matches a caller whose claims contain a `role` claim with this value.
    Role(String),
    /// Matches a caller whose claims contain `key` with exactly this value.
    Claim { key: String, value: String },
    /// Matches any authenticated caller.
    AnyAuthenticated,
}

/// A rule's access-control clause: an access decision, the rights it
/// applies to, and the subjects it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub access: Access,
    pub rights: Vec<Right>,
    pub subjects: Vec<SubjectPredicate>,
}

impl Acl {
    #[must_use]
    pub fn grants_right(&self, right: Right) -> bool {
        self.rights.contains(&right)
    }
}

/// What a rule's `OBJECTS` entry matches against the incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectMatcher {
    /// Matches a request whose route path matches `path` (a route template
    /// such as `/shell-descriptors/{aasIdentifier}`), optionally restricted
    /// to one HTTP-level operation.
    Route {
        path: String,
        right: Option<Right>,
    },
    /// Matches a request addressing a single identifiable resource by id,
    /// independent of route shape.
    Identifiable { id: String },
    /// Matches every request; used for blanket rules.
    All,
}

/// One linked rule: an access-control clause, the set of objects it
/// applies to, and the boolean formula gating it. `formula` is reference
/// counted rather than cloned because many rules typically share one
/// `DEFFORMULAS` entry via `USEFORMULA`.
///
/// A rule with a non-empty `fields` list is scoped to those response
/// fields rather than to row existence: it never excludes a row, only
/// contributes a per-field visibility gate to C7's mask plan (see
/// `registry_authorizer::field_gates`).
#[derive(Debug, Clone)]
pub struct Rule {
    pub acl: Acl,
    pub objects: Vec<ObjectMatcher>,
    pub formula: Arc<Expr>,
    pub fields: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn matches_object(&self, object_id: Option<&str>, route_path: &str, right: Right) -> bool {
        self.objects.iter().any(|object| match object {
            ObjectMatcher::All => true,
            ObjectMatcher::Identifiable { id } => object_id == Some(id.as_str()),
            ObjectMatcher::Route {
                path,
                right: restrict,
            } => route_matches(path, route_path) && restrict.is_none_or(|r| r == right),
        })
    }
}

/// A linked policy document: an ordered list of rules. Order matters only
/// in that it determines evaluation order within a right's allow/deny set;
/// the combination algorithm (C6) is deny-overrides-allow regardless of
/// order.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub rules: Vec<Rule>,
}

/// Route template matching supporting `{param}` placeholders, matching one
/// path segment each.
fn route_matches(template: &str, path: &str) -> bool {
    let template_segments = template.split('/').filter(|s| !s.is_empty());
    let path_segments = path.split('/').filter(|s| !s.is_empty());

    let mut template_segments = template_segments.peekable();
    let mut path_segments = path_segments.peekable();

    loop {
        match (template_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(t), Some(_)) if t.starts_with('{') && t.ends_with('}') => continue,
            (Some(t), Some(p)) if t == p => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_matches_with_params() {
        assert!(route_matches(
            "/shell-descriptors/{aasIdentifier}",
            "/shell-descriptors/abc123"
        ));
        assert!(!route_matches(
            "/shell-descriptors/{aasIdentifier}",
            "/shell-descriptors/abc123/submodel-descriptors"
        ));
        assert!(!route_matches("/shell-descriptors/{id}", "/submodels/x"));
    }

    #[test]
    fn rule_matches_object_all() {
        let rule = Rule {
            acl: Acl {
                access: Access::Allow,
                rights: vec![Right::Read],
                subjects: vec![SubjectPredicate::AnyAuthenticated],
            },
            objects: vec![ObjectMatcher::All],
            formula: Arc::new(Expr::BoolVal(true)),
            fields: Vec::new(),
        };
        assert!(rule.matches_object(None, "/anything", Right::Read));
    }

    #[test]
    fn right_from_str_roundtrip() {
        assert_eq!(Right::from_str("read"), Ok(Right::Read));
        assert_eq!(Right::from_str("EXECUTE"), Ok(Right::Execute));
        assert!(Right::from_str("frobnicate").is_err());
    }
}
