use std::collections::BTreeSet;

use crate::permissions::catalog::{Permission, PermissionCategory};

/// Flips a single permission in the set.
pub fn toggle_permission(
    current: &BTreeSet<Permission>,
    permission: Permission,
) -> BTreeSet<Permission> {
    let mut next = current.clone();
    if !next.remove(&permission) {
        next.insert(permission);
    }
    next
}

/// All-or-none toggle for one category: when every key of the category is already
/// granted they are all cleared, otherwise all of them are granted. Keys from other
/// categories are left untouched.
pub fn toggle_category(
    current: &BTreeSet<Permission>,
    category: PermissionCategory,
) -> BTreeSet<Permission> {
    let category_keys = category.permission_set();
    if category_keys.is_subset(current) {
        current.difference(&category_keys).copied().collect()
    } else {
        current.union(&category_keys).copied().collect()
    }
}

/// True when every key of the category is granted.
pub fn category_fully_granted(current: &BTreeSet<Permission>, category: PermissionCategory) -> bool {
    category.permissions().all(|permission| current.contains(&permission))
}
