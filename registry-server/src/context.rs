use std::sync::Arc;

use arc_swap::ArcSwap;
use registry_abac::policy::Policy;
use registry_storage::Repos;

use crate::config::Config;

/// Shared state handed to every handler and layer. The policy snapshot is
/// swapped wholesale on reload (see `system::policy::handle_reload_policy`)
/// rather than mutated in place, so a reader that already holds a clone of
/// the `Arc<Policy>` keeps seeing a consistent, immutable view of it.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub repos: Repos,
    policy: Arc<ArcSwap<Policy>>,
}

impl Context {
    #[must_use]
    pub fn new(config: Arc<Config>, repos: Repos, policy: Policy) -> Self {
        Self {
            config,
            repos,
            policy: Arc::new(ArcSwap::new(Arc::new(policy))),
        }
    }

    #[must_use]
    pub fn policy(&self) -> Arc<Policy> {
        self.policy.load_full()
    }

    pub fn reload_policy(&self, policy: Policy) {
        self.policy.store(Arc::new(policy));
    }
}
