#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![deny(clippy::get_unwrap)]
#![allow(clippy::module_name_repetitions)]

//! SQL lowering: turns linked ABAC formulas into PostgreSQL predicates,
//! joins and bind parameters (C5), and the query filter/mask plan the
//! authorizer attaches to a descriptor query (C7's persistence side).

pub mod catalog;
pub mod filter;
pub mod lower;
pub mod value;

pub use catalog::{resolve as resolve_fragment, JoinClause, ResolvedField};
pub use filter::{renumber_placeholders, MaskFlag, QueryFilter};
pub use lower::{lower_formula, Lowered};
pub use value::SqlValue;
