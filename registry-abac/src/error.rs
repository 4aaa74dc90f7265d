use thiserror::Error;

/// Errors raised while parsing and linking a policy document (C1/C2).
///
/// Every variant's message is part of the observable contract: operators
/// read these directly when a policy document fails to load.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("rule must specify exactly one of ACL or USEACL")]
    AclXorUseAcl,

    #[error("rule must specify exactly one of FORMULA or USEFORMULA")]
    FormulaXorUseFormula,

    #[error("rule must specify a non-empty OBJECTS list")]
    EmptyObjects,

    #[error("USEACL \"{0}\" not found")]
    UseAclNotFound(String),

    #[error("USEFORMULA \"{0}\" not found")]
    UseFormulaNotFound(String),

    #[error("USEATTRIBUTES \"{0}\" not found")]
    UseAttributeNotFound(String),

    #[error("USEOBJECTS \"{0}\" not found")]
    UseObjectsNotFound(String),

    #[error("circular USEOBJECTS reference involving \"{0}\"")]
    CircularUseObjects(String),

    #[error("DEFACLS: duplicate name \"{0}\"")]
    DuplicateDefAcl(String),

    #[error("DEFFORMULAS: duplicate name \"{0}\"")]
    DuplicateDefFormula(String),

    #[error("DEFATTRIBUTES: duplicate name \"{0}\"")]
    DuplicateDefAttribute(String),

    #[error("DEFOBJECTS: duplicate name \"{0}\"")]
    DuplicateDefObjects(String),

    #[error("invalid fragment path: {0}")]
    Fragment(#[from] crate::fragment::FragmentError),

    #[error("malformed timestamp literal \"{0}\"")]
    InvalidTimestamp(String),

    #[error("unknown fragment root \"{0}\"")]
    UnknownFragmentRoot(String),

    #[error("malformed attribute reference \"{0}\"")]
    MalformedAttributeRef(String),

    #[error("empty subjects list in ACL entry")]
    EmptySubjects,

    #[error("empty rights list in ACL entry")]
    EmptyRights,

    #[error("unknown right \"{0}\"")]
    InvalidRight(String),

    #[error("expected {expected} operand(s) for {op}, got {got}")]
    ArityMismatch {
        op: String,
        expected: String,
        got: usize,
    },
}
