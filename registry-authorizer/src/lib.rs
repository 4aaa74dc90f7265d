#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![deny(clippy::get_unwrap)]
#![allow(clippy::module_name_repetitions)]

//! Authorization: combines linked ABAC rules into a decision (C6) and
//! turns that decision into the query filter and field mask plan the
//! persistence layer applies (C7).

pub mod decision;
pub mod mask;
pub mod query;

pub use decision::{authorize, field_gates, AuthzRequest, Decision, DecisionReason};
pub use mask::{build_mask_plan, FieldGate};
pub use query::{and_formula_query, filter_for_decision};
