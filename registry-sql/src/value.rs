use chrono::{DateTime, Utc};

/// A bind parameter produced by lowering. `registry-storage` binds these
/// positionally (`$1`, `$2`, ...) onto a `sqlx::query`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Str(String),
    Num(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    /// Used for `= ANY($n::text[])` predicates produced by `$in`.
    StrArray(Vec<String>),
    /// A missing claim/global. Binds a real SQL `NULL`, matching
    /// `AttributeValue::Null`'s evaluator semantics (never equal to
    /// anything, including an empty string).
    Null,
}

impl From<registry_abac::expr::AttributeValue> for SqlValue {
    fn from(value: registry_abac::expr::AttributeValue) -> Self {
        use registry_abac::expr::AttributeValue as Av;
        match value {
            Av::Str(s) => SqlValue::Str(s),
            Av::Num(n) => SqlValue::Num(n),
            Av::Bool(b) => SqlValue::Bool(b),
            Av::DateTime(dt) => SqlValue::DateTime(dt),
            Av::Null => SqlValue::Null,
        }
    }
}
