#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![deny(clippy::get_unwrap)]
#![allow(clippy::module_name_repetitions)]

//! Ambient HTTP scaffolding shared by registry services: request
//! extraction ([`extract`]), a `matchit`-based [`Router`], per-operation
//! dispatch ([`MethodRouter`]), and a [`SyncService`] adapter for handlers
//! that must run one at a time. Domain-agnostic; the ABAC authorization
//! layer and descriptor/policy handlers live in `registry-server`.

pub mod extract;
mod handler;
mod method_router;
mod router;
mod sync_service;

pub use handler::Handler;
pub use method_router::*;
pub use router::Router;
pub use sync_service::SyncService;
