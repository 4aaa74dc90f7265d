use std::sync::Arc;

use sqlx::PgPool;

use self::{descriptor::DescriptorRepo, policy::PolicyRepo};

pub mod descriptor;
pub mod policy;

#[derive(Clone)]
pub struct Repos {
    pub descriptor: DescriptorRepo,
    pub policy: PolicyRepo,
    pub pool: Arc<PgPool>,
}

impl Repos {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            descriptor: DescriptorRepo::new(Arc::clone(&pool)),
            policy: PolicyRepo::new(Arc::clone(&pool)),
            pool,
        }
    }
}
