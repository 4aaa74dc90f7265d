#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![deny(clippy::get_unwrap)]
#![allow(clippy::module_name_repetitions)]

//! Postgres-backed persistence: connection pool setup and migrations
//! (`pool`, `migrator`), pagination cursors (`cursor`), and the descriptor
//! and policy repositories that consume the `QueryFilter` the authorizer
//! (`registry-authorizer`) resolves for a caller.

pub mod cursor;
pub mod migrator;
pub mod pool;
pub mod repos;

pub use pool::connect;
pub use repos::{descriptor::DescriptorRepo, policy::PolicyRepo, Repos};
