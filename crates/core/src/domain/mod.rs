pub mod actor;
pub mod claim;
pub mod role;
