pub mod catalog;
pub mod registry;
pub mod toggle;

pub use catalog::{
    parse_permission_keys, system_roles, Permission, PermissionCategory, CATALOG_VERSION,
};
pub use registry::RoleRegistry;
pub use toggle::{category_fully_granted, toggle_category, toggle_permission};
