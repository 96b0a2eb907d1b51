use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz::RoleSnapshot;
use crate::domain::role::{
    RoleDefinition, RoleId, RolePatch, RoleSpec, MAX_ROLE_LEVEL, MIN_ROLE_LEVEL,
};
use crate::errors::{ConflictError, CoreError, ValidationError};
use crate::permissions::catalog::{parse_permission_keys, Permission, PermissionCategory};
use crate::permissions::toggle::{toggle_category, toggle_permission};
use crate::store::{RoleStore, StoreError};

/// Role administration on top of a [`RoleStore`].
///
/// System roles are read-only here; they only enter a store through seeding.
#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn RoleStore>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleDefinition>, CoreError> {
        let mut roles = self.store.list_roles().await?;
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    pub async fn snapshot(&self) -> Result<RoleSnapshot, CoreError> {
        Ok(RoleSnapshot::new(self.store.list_roles().await?))
    }

    pub async fn create_role(&self, spec: RoleSpec) -> Result<RoleDefinition, CoreError> {
        let name = required_name(&spec.name)?;
        validate_level(spec.level)?;
        let permissions = parse_permission_keys(&spec.permissions)?;

        let existing = self.store.list_roles().await?;
        ensure_name_available(&existing, &name, None)?;
        let id = role_id_for(&name);
        if let Some(clash) = existing.iter().find(|role| role.id == id) {
            return Err(name_clash(clash, &name));
        }

        let now = Utc::now();
        let role = RoleDefinition {
            id,
            name,
            description: spec.description.trim().to_string(),
            level: spec.level,
            permissions,
            is_system_role: false,
            assigned_actor_count: 0,
            created_at: now,
            updated_at: now,
        };
        let created = self.store.insert_role(role).await?;
        info!(
            event_name = "registry.role_created",
            role_id = %created.id,
            permissions = created.permissions.len(),
            "role created"
        );
        Ok(created)
    }

    pub async fn update_role(&self, id: &RoleId, patch: RolePatch) -> Result<RoleDefinition, CoreError> {
        let mut role = self.mutable_role(id).await?;

        if let Some(name) = patch.name {
            let name = required_name(&name)?;
            let existing = self.store.list_roles().await?;
            ensure_name_available(&existing, &name, Some(id))?;
            role.name = name;
        }
        if let Some(description) = patch.description {
            role.description = description.trim().to_string();
        }
        if let Some(level) = patch.level {
            validate_level(level)?;
            role.level = level;
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = parse_permission_keys(&permissions)?;
        }

        self.save(role).await
    }

    pub async fn delete_role(&self, id: &RoleId) -> Result<(), CoreError> {
        let role = self.mutable_role(id).await?;
        if role.is_in_use() {
            warn!(
                event_name = "registry.role_delete_blocked",
                role_id = %role.id,
                assigned = role.assigned_actor_count,
                "role still assigned"
            );
            return Err(ConflictError::RoleInUse {
                role: role.id,
                assigned: role.assigned_actor_count,
            }
            .into());
        }
        self.store.delete_role(id).await?;
        info!(event_name = "registry.role_deleted", role_id = %id, "role deleted");
        Ok(())
    }

    pub async fn toggle_permission(
        &self,
        id: &RoleId,
        permission_key: &str,
    ) -> Result<RoleDefinition, CoreError> {
        let permission: Permission = permission_key.parse()?;
        let mut role = self.mutable_role(id).await?;
        role.permissions = toggle_permission(&role.permissions, permission);
        self.save(role).await
    }

    pub async fn toggle_category_permissions(
        &self,
        id: &RoleId,
        category: PermissionCategory,
    ) -> Result<RoleDefinition, CoreError> {
        let mut role = self.mutable_role(id).await?;
        role.permissions = toggle_category(&role.permissions, category);
        self.save(role).await
    }

    async fn mutable_role(&self, id: &RoleId) -> Result<RoleDefinition, CoreError> {
        let role = self
            .store
            .find_role(id)
            .await?
            .ok_or_else(|| StoreError::not_found("role", id.0.clone()))?;
        if role.is_system_role {
            return Err(ValidationError::SystemRoleImmutable { role: role.id }.into());
        }
        Ok(role)
    }

    async fn save(&self, mut role: RoleDefinition) -> Result<RoleDefinition, CoreError> {
        role.updated_at = Utc::now();
        let saved = self.store.update_role(role).await?;
        info!(event_name = "registry.role_updated", role_id = %saved.id, "role updated");
        Ok(saved)
    }
}

fn required_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingRoleName);
    }
    Ok(name.to_string())
}

pub fn validate_level(level: u8) -> Result<(), ValidationError> {
    if (MIN_ROLE_LEVEL..=MAX_ROLE_LEVEL).contains(&level) {
        return Ok(());
    }
    Err(ValidationError::InvalidRoleLevel { level })
}

fn ensure_name_available(
    existing: &[RoleDefinition],
    name: &str,
    except: Option<&RoleId>,
) -> Result<(), CoreError> {
    let clash = existing
        .iter()
        .filter(|role| Some(&role.id) != except)
        .find(|role| role.name.eq_ignore_ascii_case(name));
    match clash {
        Some(role) => Err(name_clash(role, name)),
        None => Ok(()),
    }
}

fn name_clash(role: &RoleDefinition, name: &str) -> CoreError {
    if role.is_system_role {
        return ValidationError::SystemRoleImmutable { role: role.id.clone() }.into();
    }
    ConflictError::RoleNameTaken { name: name.to_string() }.into()
}

/// Slug of the name, or a generated id when the name has no ASCII letters or digits.
fn role_id_for(name: &str) -> RoleId {
    let slug = slugify(name);
    if slug.is_empty() {
        let generated = Uuid::new_v4().simple().to_string();
        return RoleId(format!("role-{}", &generated[..12]));
    }
    RoleId(slug)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Permissions of `role` restricted to one category, for display.
pub fn granted_in_category(role: &RoleDefinition, category: PermissionCategory) -> BTreeSet<Permission> {
    role.permissions.iter().copied().filter(|permission| permission.category() == category).collect()
}
