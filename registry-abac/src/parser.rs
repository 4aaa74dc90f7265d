//! C2: Policy Parser/Linker.
//!
//! Deserializes a policy document's wire format (the `$`-prefixed formula
//! DSL plus the `DEFACLS`/`DEFFORMULAS`/`DEFATTRIBUTES`/`DEFOBJECTS`
//! definition tables) and links every `USE*` indirection into the fully
//! resolved [`Policy`](crate::policy::Policy) C1 model. Linking is a two
//! pass algorithm: first the definition tables are resolved against each
//! other (with DFS three-color cycle detection on `DEFOBJECTS`, since only
//! that table can reference itself), then each top-level rule is resolved
//! against the linked tables.

use std::collections::HashMap;
use std::sync::Arc;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::PolicyError;
use crate::expr::{AttributeRef, Expr};
use crate::fragment::{Fragment, FragmentRoot};
use crate::policy::{Acl, Access, ObjectMatcher, Policy, Right, Rule, SubjectPredicate};

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(rename = "AllAccessPermissionRules")]
    all_access_permission_rules: RawAllAccessPermissionRules,
}

#[derive(Debug, Deserialize)]
struct RawAllAccessPermissionRules {
    rules: Vec<RawRule>,
    #[serde(default, rename = "DEFACLS")]
    defacls: Vec<RawNamedAcl>,
    #[serde(default, rename = "DEFFORMULAS")]
    defformulas: Vec<RawNamedFormula>,
    #[serde(default, rename = "DEFATTRIBUTES")]
    defattributes: Vec<RawNamedAttribute>,
    #[serde(default, rename = "DEFOBJECTS")]
    defobjects: Vec<RawNamedObjects>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "ACL", default)]
    acl: Option<RawAcl>,
    #[serde(rename = "USEACL", default)]
    use_acl: Option<String>,
    #[serde(rename = "FORMULA", default)]
    formula: Option<RawExpr>,
    #[serde(rename = "USEFORMULA", default)]
    use_formula: Option<String>,
    #[serde(rename = "OBJECTS", default)]
    objects: Option<Vec<RawObject>>,
    #[serde(rename = "USEOBJECTS", default)]
    use_objects: Option<String>,
    /// Response field names this rule gates instead of row existence; see
    /// [`crate::policy::Rule::fields`].
    #[serde(rename = "FIELDS", default)]
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawNamedAcl {
    name: String,
    #[serde(rename = "ACL")]
    acl: RawAcl,
}

#[derive(Debug, Deserialize)]
struct RawNamedFormula {
    name: String,
    #[serde(rename = "FORMULA")]
    formula: RawExpr,
}

#[derive(Debug, Deserialize)]
struct RawNamedAttribute {
    name: String,
    #[serde(rename = "ATTRIBUTE")]
    attribute: String,
}

#[derive(Debug, Deserialize)]
struct RawNamedObjects {
    name: String,
    #[serde(rename = "OBJECTS", default)]
    objects: Option<Vec<RawObject>>,
    #[serde(rename = "USEOBJECTS", default)]
    use_objects: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAcl {
    access: String,
    rights: Vec<String>,
    subjects: Vec<RawSubject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawSubject {
    Any,
    Role(String),
    Claim { key: String, value: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawObject {
    Route {
        path: String,
        #[serde(default)]
        right: Option<String>,
    },
    Identifiable {
        id: String,
    },
    All,
}

#[derive(Debug, Deserialize)]
enum RawExpr {
    #[serde(rename = "$strVal")]
    StrVal(String),
    #[serde(rename = "$numVal")]
    NumVal(f64),
    #[serde(rename = "$boolVal")]
    BoolVal(bool),
    #[serde(rename = "$dateTimeVal")]
    DateTimeVal(String),
    #[serde(rename = "$attribute")]
    Attribute(String),
    #[serde(rename = "$useAttribute")]
    UseAttribute(String),
    #[serde(rename = "$not")]
    Not(Box<RawExpr>),
    #[serde(rename = "$and")]
    And(Vec<RawExpr>),
    #[serde(rename = "$or")]
    Or(Vec<RawExpr>),
    #[serde(rename = "$eq")]
    Eq(Vec<RawExpr>),
    #[serde(rename = "$ne")]
    Ne(Vec<RawExpr>),
    #[serde(rename = "$gt")]
    Gt(Vec<RawExpr>),
    #[serde(rename = "$ge")]
    Ge(Vec<RawExpr>),
    #[serde(rename = "$lt")]
    Lt(Vec<RawExpr>),
    #[serde(rename = "$le")]
    Le(Vec<RawExpr>),
    #[serde(rename = "$regex")]
    Regex(Vec<RawExpr>),
    #[serde(rename = "$contains")]
    Contains(Vec<RawExpr>),
    #[serde(rename = "$starts-with")]
    StartsWith(Vec<RawExpr>),
    #[serde(rename = "$ends-with")]
    EndsWith(Vec<RawExpr>),
    #[serde(rename = "$in")]
    In(Vec<RawExpr>),
}

/// Parse and link a policy document's JSON text into a C1 [`Policy`].
///
/// # Errors
///
/// Returns [`PolicyError`] if the document is malformed JSON, a rule is
/// missing required fields, a `USE*` reference can't be resolved, or the
/// `DEFOBJECTS` table contains a circular reference.
pub fn parse_policy(json: &str) -> Result<Policy, anyhow::Error> {
    let doc: RawDocument = serde_json::from_str(json)?;
    Ok(link(doc.all_access_permission_rules)?)
}

fn link(raw: RawAllAccessPermissionRules) -> Result<Policy, PolicyError> {
    // An explicit `"rules": []` links to a valid deny-all Policy; only an
    // absent `AllAccessPermissionRules` key is an error, and serde already
    // reports that case (the field is required) before `link` ever runs.
    let acl_table = index_by_name(raw.defacls.iter().map(|e| (&e.name, &e.acl)), |n| {
        PolicyError::DuplicateDefAcl(n)
    })?;

    let attr_table = link_attributes(&raw.defattributes)?;

    let formula_table =
        index_by_name(raw.defformulas.iter().map(|e| (&e.name, &e.formula)), |n| {
            PolicyError::DuplicateDefFormula(n)
        })?;
    // Convert once up front so USEFORMULA lookups are O(1) linked expressions.
    let mut linked_formulas: HashMap<String, Arc<Expr>> = HashMap::new();
    for (name, raw_expr) in &formula_table {
        linked_formulas.insert(name.clone(), Arc::new(convert_expr(raw_expr, &attr_table)?));
    }

    let objects_table = link_defobjects(&raw.defobjects)?;

    let mut rules = Vec::with_capacity(raw.rules.len());
    for raw_rule in &raw.rules {
        rules.push(link_rule(raw_rule, &acl_table, &attr_table, &linked_formulas, &objects_table)?);
    }

    Ok(Policy { rules })
}

fn index_by_name<'a, T: 'a>(
    entries: impl Iterator<Item = (&'a String, &'a T)>,
    dup_err: impl Fn(String) -> PolicyError,
) -> Result<HashMap<String, &'a T>, PolicyError> {
    let mut table = HashMap::new();
    for (name, value) in entries {
        if table.insert(name.clone(), value).is_some() {
            return Err(dup_err(name.clone()));
        }
    }
    Ok(table)
}

fn link_attributes(
    defattributes: &[RawNamedAttribute],
) -> Result<HashMap<String, AttributeRef>, PolicyError> {
    let mut table = HashMap::new();
    for entry in defattributes {
        if table.contains_key(&entry.name) {
            return Err(PolicyError::DuplicateDefAttribute(entry.name.clone()));
        }
        table.insert(entry.name.clone(), parse_attribute_ref(&entry.attribute)?);
    }
    Ok(table)
}

/// Parses the `$<root>#<path>` / `claim:<key>` / `global:<key>` attribute
/// reference grammar.
fn parse_attribute_ref(raw: &str) -> Result<AttributeRef, PolicyError> {
    if let Some(key) = raw.strip_prefix("claim:") {
        return Ok(AttributeRef::Claim(key.to_string()));
    }
    if let Some(key) = raw.strip_prefix("global:") {
        return Ok(AttributeRef::Global(key.to_string()));
    }
    if let Some(rest) = raw.strip_prefix('$') {
        let (root, path) = rest
            .split_once('#')
            .ok_or_else(|| PolicyError::MalformedAttributeRef(raw.to_string()))?;
        let root = match root {
            "aasdesc" => FragmentRoot::AasDesc,
            "smdesc" => FragmentRoot::SmDesc,
            "bd" => FragmentRoot::Bd,
            "sm" => FragmentRoot::Sm,
            "aas" => FragmentRoot::Aas,
            other => return Err(PolicyError::UnknownFragmentRoot(other.to_string())),
        };
        let fragment = Fragment::parse(root, path)?;
        return Ok(AttributeRef::Fragment(fragment));
    }
    Err(PolicyError::MalformedAttributeRef(raw.to_string()))
}

fn arity2<'a>(op: &str, items: &'a [RawExpr]) -> Result<(&'a RawExpr, &'a RawExpr), PolicyError> {
    match items {
        [a, b] => Ok((a, b)),
        other => Err(PolicyError::ArityMismatch {
            op: op.to_string(),
            expected: "2".to_string(),
            got: other.len(),
        }),
    }
}

fn convert_expr(
    raw: &RawExpr,
    attrs: &HashMap<String, AttributeRef>,
) -> Result<Expr, PolicyError> {
    let boxed = |e: &RawExpr| -> Result<Box<Expr>, PolicyError> {
        Ok(Box::new(convert_expr(e, attrs)?))
    };

    Ok(match raw {
        RawExpr::StrVal(s) => Expr::StrVal(s.clone()),
        RawExpr::NumVal(n) => Expr::NumVal(*n),
        RawExpr::BoolVal(b) => Expr::BoolVal(*b),
        RawExpr::DateTimeVal(s) => {
            let dt: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
                .map_err(|_| PolicyError::InvalidTimestamp(s.clone()))?
                .with_timezone(&Utc);
            Expr::DateTimeVal(dt)
        }
        RawExpr::Attribute(raw_ref) => Expr::Attribute(parse_attribute_ref(raw_ref)?),
        RawExpr::UseAttribute(name) => Expr::Attribute(
            attrs
                .get(name)
                .cloned()
                .ok_or_else(|| PolicyError::UseAttributeNotFound(name.clone()))?,
        ),
        RawExpr::Not(inner) => Expr::Not(boxed(inner)?),
        RawExpr::And(items) => Expr::And(
            items
                .iter()
                .map(|e| convert_expr(e, attrs))
                .collect::<Result<_, _>>()?,
        ),
        RawExpr::Or(items) => Expr::Or(
            items
                .iter()
                .map(|e| convert_expr(e, attrs))
                .collect::<Result<_, _>>()?,
        ),
        RawExpr::Eq(items) => {
            let (a, b) = arity2("$eq", items)?;
            Expr::Eq(boxed(a)?, boxed(b)?)
        }
        RawExpr::Ne(items) => {
            let (a, b) = arity2("$ne", items)?;
            Expr::Ne(boxed(a)?, boxed(b)?)
        }
        RawExpr::Gt(items) => {
            let (a, b) = arity2("$gt", items)?;
            Expr::Gt(boxed(a)?, boxed(b)?)
        }
        RawExpr::Ge(items) => {
            let (a, b) = arity2("$ge", items)?;
            Expr::Ge(boxed(a)?, boxed(b)?)
        }
        RawExpr::Lt(items) => {
            let (a, b) = arity2("$lt", items)?;
            Expr::Lt(boxed(a)?, boxed(b)?)
        }
        RawExpr::Le(items) => {
            let (a, b) = arity2("$le", items)?;
            Expr::Le(boxed(a)?, boxed(b)?)
        }
        RawExpr::Regex(items) => {
            let (a, b) = arity2("$regex", items)?;
            Expr::Regex(boxed(a)?, boxed(b)?)
        }
        RawExpr::Contains(items) => {
            let (a, b) = arity2("$contains", items)?;
            Expr::Contains(boxed(a)?, boxed(b)?)
        }
        RawExpr::StartsWith(items) => {
            let (a, b) = arity2("$starts-with", items)?;
            Expr::StartsWith(boxed(a)?, boxed(b)?)
        }
        RawExpr::EndsWith(items) => {
            let (a, b) = arity2("$ends-with", items)?;
            Expr::EndsWith(boxed(a)?, boxed(b)?)
        }
        RawExpr::In(items) => {
            let (needle, haystack) = items.split_first().ok_or_else(|| PolicyError::ArityMismatch {
                op: "$in".to_string(),
                expected: "at least 1".to_string(),
                got: 0,
            })?;
            Expr::In(
                Box::new(convert_expr(needle, attrs)?),
                haystack
                    .iter()
                    .map(|e| convert_expr(e, attrs))
                    .collect::<Result<_, _>>()?,
            )
        }
    })
}

fn convert_acl(raw: &RawAcl) -> Result<Acl, PolicyError> {
    let access = match raw.access.to_lowercase().as_str() {
        "allow" => Access::Allow,
        "deny" => Access::Deny,
        other => return Err(PolicyError::InvalidRight(other.to_string())),
    };
    if raw.rights.is_empty() {
        return Err(PolicyError::EmptyRights);
    }
    if raw.subjects.is_empty() {
        return Err(PolicyError::EmptySubjects);
    }
    let rights = raw
        .rights
        .iter()
        .map(|r| Right::from_str(r).map_err(PolicyError::InvalidRight))
        .collect::<Result<_, _>>()?;
    let subjects = raw
        .subjects
        .iter()
        .map(|s| match s {
            RawSubject::Any => SubjectPredicate::AnyAuthenticated,
            RawSubject::Role(role) => SubjectPredicate::Role(role.clone()),
            RawSubject::Claim { key, value } => SubjectPredicate::Claim {
                key: key.clone(),
                value: value.clone(),
            },
        })
        .collect();
    Ok(Acl {
        access,
        rights,
        subjects,
    })
}

fn convert_object(raw: &RawObject) -> Result<ObjectMatcher, PolicyError> {
    Ok(match raw {
        RawObject::Route { path, right } => ObjectMatcher::Route {
            path: path.clone(),
            right: right
                .as_deref()
                .map(|r| Right::from_str(r).map_err(PolicyError::InvalidRight))
                .transpose()?,
        },
        RawObject::Identifiable { id } => ObjectMatcher::Identifiable { id: id.clone() },
        RawObject::All => ObjectMatcher::All,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Gray,
    Black,
}

fn link_defobjects(
    raw_defobjects: &[RawNamedObjects],
) -> Result<HashMap<String, Vec<ObjectMatcher>>, PolicyError> {
    let mut by_name: HashMap<&str, &RawNamedObjects> = HashMap::new();
    for entry in raw_defobjects {
        if by_name.insert(&entry.name, entry).is_some() {
            return Err(PolicyError::DuplicateDefObjects(entry.name.clone()));
        }
    }

    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut resolved: HashMap<String, Vec<ObjectMatcher>> = HashMap::new();

    for entry in raw_defobjects {
        resolve_defobjects_entry(&entry.name, &by_name, &mut marks, &mut resolved)?;
    }

    Ok(resolved)
}

fn resolve_defobjects_entry(
    name: &str,
    by_name: &HashMap<&str, &RawNamedObjects>,
    marks: &mut HashMap<String, Mark>,
    resolved: &mut HashMap<String, Vec<ObjectMatcher>>,
) -> Result<Vec<ObjectMatcher>, PolicyError> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    match marks.get(name) {
        Some(Mark::Gray) => return Err(PolicyError::CircularUseObjects(name.to_string())),
        Some(Mark::Black) => unreachable!("black-marked entries are always in `resolved`"),
        None => {}
    }
    marks.insert(name.to_string(), Mark::Gray);

    let entry = by_name
        .get(name)
        .ok_or_else(|| PolicyError::UseObjectsNotFound(name.to_string()))?;

    let value = if let Some(objects) = &entry.objects {
        objects
            .iter()
            .map(convert_object)
            .collect::<Result<Vec<_>, _>>()?
    } else if let Some(use_name) = &entry.use_objects {
        resolve_defobjects_entry(use_name, by_name, marks, resolved)?
    } else {
        Vec::new()
    };

    marks.insert(name.to_string(), Mark::Black);
    resolved.insert(name.to_string(), value.clone());
    Ok(value)
}

fn link_rule(
    raw: &RawRule,
    acl_table: &HashMap<String, &RawAcl>,
    attr_table: &HashMap<String, AttributeRef>,
    formula_table: &HashMap<String, Arc<Expr>>,
    objects_table: &HashMap<String, Vec<ObjectMatcher>>,
) -> Result<Rule, PolicyError> {
    let acl = match (&raw.acl, &raw.use_acl) {
        (Some(acl), None) => convert_acl(acl)?,
        (None, Some(name)) => convert_acl(
            acl_table
                .get(name)
                .ok_or_else(|| PolicyError::UseAclNotFound(name.clone()))?,
        )?,
        _ => return Err(PolicyError::AclXorUseAcl),
    };

    let formula = match (&raw.formula, &raw.use_formula) {
        (Some(expr), None) => Arc::new(convert_expr(expr, attr_table)?),
        (None, Some(name)) => formula_table
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::UseFormulaNotFound(name.clone()))?,
        _ => return Err(PolicyError::FormulaXorUseFormula),
    };

    let objects = match (&raw.objects, &raw.use_objects) {
        (Some(objects), None) => objects
            .iter()
            .map(convert_object)
            .collect::<Result<Vec<_>, _>>()?,
        (None, Some(name)) => objects_table
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::UseObjectsNotFound(name.clone()))?,
        (None, None) => return Err(PolicyError::EmptyObjects),
        (Some(_), Some(_)) => return Err(PolicyError::EmptyObjects),
    };
    if objects.is_empty() {
        return Err(PolicyError::EmptyObjects);
    }

    Ok(Rule {
        acl,
        objects,
        formula,
        fields: raw.fields.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(rules: &str, defs: &str) -> String {
        format!(
            r#"{{"AllAccessPermissionRules": {{"rules": [{rules}] {defs}}}}}"#
        )
    }

    #[test]
    fn parses_minimal_allow_rule() {
        let json = doc(
            r#"{
                "ACL": {"access": "allow", "rights": ["READ"], "subjects": ["any"]},
                "OBJECTS": [{"all": null}],
                "FORMULA": {"$boolVal": true}
            }"#,
            "",
        );
        let policy = parse_policy(&json).unwrap();
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].acl.access, Access::Allow);
        assert_eq!(policy.rules[0].objects, vec![ObjectMatcher::All]);
    }

    #[test]
    fn rejects_both_acl_and_useacl() {
        let json = doc(
            r#"{
                "ACL": {"access": "allow", "rights": ["READ"], "subjects": ["any"]},
                "USEACL": "x",
                "OBJECTS": [{"all": null}],
                "FORMULA": {"$boolVal": true}
            }"#,
            "",
        );
        let err = parse_policy(&json).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::AclXorUseAcl)
        );
    }

    #[test]
    fn use_acl_not_found_is_reported() {
        let json = doc(
            r#"{
                "USEACL": "missing",
                "OBJECTS": [{"all": null}],
                "FORMULA": {"$boolVal": true}
            }"#,
            "",
        );
        let err = parse_policy(&json).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::UseAclNotFound("missing".to_string()))
        );
    }

    #[test]
    fn detects_circular_defobjects() {
        let json = doc(
            r#"{
                "ACL": {"access": "allow", "rights": ["READ"], "subjects": ["any"]},
                "USEOBJECTS": "a",
                "FORMULA": {"$boolVal": true}
            }"#,
            r#", "DEFOBJECTS": [
                {"name": "a", "USEOBJECTS": "b"},
                {"name": "b", "USEOBJECTS": "a"}
            ]"#,
        );
        let err = parse_policy(&json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::CircularUseObjects(_))
        ));
    }

    #[test]
    fn resolves_useattributes_indirection() {
        let json = doc(
            r#"{
                "ACL": {"access": "allow", "rights": ["READ"], "subjects": ["any"]},
                "OBJECTS": [{"all": null}],
                "FORMULA": {"$eq": [{"$useAttribute": "idShort"}, {"$strVal": "pump-1"}]}
            }"#,
            r#", "DEFATTRIBUTES": [
                {"name": "idShort", "ATTRIBUTE": "$aasdesc#idShort"}
            ]"#,
        );
        let policy = parse_policy(&json).unwrap();
        match policy.rules[0].formula.as_ref() {
            Expr::Eq(left, _) => {
                assert!(matches!(
                    left.as_ref(),
                    Expr::Attribute(AttributeRef::Fragment(_))
                ));
            }
            other => panic!("unexpected formula shape: {other:?}"),
        }
    }

    #[test]
    fn explicit_empty_rules_links_to_deny_all_policy() {
        let json = r#"{"AllAccessPermissionRules": {"rules": []}}"#;
        let policy = parse_policy(json).unwrap();
        assert!(policy.rules.is_empty());
    }

    #[test]
    fn missing_all_access_permission_rules_key_is_a_parse_error() {
        let err = parse_policy("{}").unwrap_err();
        assert!(err.to_string().contains("AllAccessPermissionRules"));
    }

    #[test]
    fn rejects_empty_objects() {
        let json = doc(
            r#"{
                "ACL": {"access": "allow", "rights": ["READ"], "subjects": ["any"]},
                "OBJECTS": [],
                "FORMULA": {"$boolVal": true}
            }"#,
            "",
        );
        let err = parse_policy(&json).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::EmptyObjects)
        );
    }
}
