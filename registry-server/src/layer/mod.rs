pub mod abac;
pub mod claims_extension;
pub mod request_mapper;

pub use abac::AbacLayer;
pub use claims_extension::ClaimsExtensionLayer;
pub use request_mapper::LogicalRequestResponseLayer;
