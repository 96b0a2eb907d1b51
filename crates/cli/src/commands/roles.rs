use clap::Subcommand;
use claimdesk_core::config::LoadOptions;
use claimdesk_core::domain::role::{RoleDefinition, RoleId, RolePatch, RoleSpec};
use claimdesk_core::errors::CoreError;
use claimdesk_core::permissions::{Permission, PermissionCategory, RoleRegistry};
use serde::Serialize;
use uuid::Uuid;

use crate::commands::stores::Stores;
use crate::commands::{load_config, runtime, CommandResult, Failure};

#[derive(Debug, Subcommand)]
pub enum RolesAction {
    #[command(about = "List roles by level, highest first, with assignment counts")]
    List,
    #[command(about = "Show the permission catalog grouped by category")]
    Catalog,
    #[command(about = "Create a custom role")]
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        level: u8,
        /// Permission key, repeatable (e.g. `claims.approve`).
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    #[command(about = "Update a custom role")]
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        level: Option<u8>,
        /// Replaces the whole permission set when given.
        #[arg(long = "permission")]
        permissions: Option<Vec<String>>,
    },
    #[command(about = "Delete a custom role that no actor is assigned to")]
    Delete { id: String },
    #[command(about = "Grant or revoke one permission on a custom role")]
    Toggle { id: String, permission: String },
    #[command(about = "Grant a whole category, or revoke it when already fully granted")]
    ToggleCategory { id: String, category: String },
}

impl RolesAction {
    fn command_name(&self) -> &'static str {
        match self {
            Self::List => "roles.list",
            Self::Catalog => "roles.catalog",
            Self::Create { .. } => "roles.create",
            Self::Update { .. } => "roles.update",
            Self::Delete { .. } => "roles.delete",
            Self::Toggle { .. } => "roles.toggle",
            Self::ToggleCategory { .. } => "roles.toggle_category",
        }
    }
}

#[derive(Debug, Serialize)]
struct CatalogCategory {
    category: PermissionCategory,
    permissions: Vec<Permission>,
}

enum Outcome {
    Roles(Vec<RoleDefinition>),
    Role(RoleDefinition),
    Deleted(RoleId),
}

pub fn run(options: &LoadOptions, action: RolesAction) -> CommandResult {
    let command = action.command_name();
    let correlation_id = Uuid::new_v4().to_string();
    if matches!(action, RolesAction::Catalog) {
        return CommandResult::success_with_data(command, "permission catalog", &catalog());
    }

    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result(command),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return failure.into_result(command),
    };

    let result = runtime.block_on(async {
        let stores = Stores::open(&config).await?;
        let outcome = execute(&stores.registry, action).await;
        stores.close().await;
        Ok::<_, Failure>(outcome)
    });

    match result {
        Ok(Ok(Outcome::Roles(roles))) => {
            CommandResult::success_with_data(command, format!("{} role(s)", roles.len()), &roles)
        }
        Ok(Ok(Outcome::Role(role))) => CommandResult::success_with_data(
            command,
            format!("role {} has {} permission(s)", role.id, role.permissions.len()),
            &role,
        ),
        Ok(Ok(Outcome::Deleted(id))) => CommandResult::success(command, format!("role {id} deleted")),
        Ok(Err(error)) => CommandResult::from_core_error(command, error, &correlation_id),
        Err(failure) => failure.into_result(command),
    }
}

async fn execute(registry: &RoleRegistry, action: RolesAction) -> Result<Outcome, CoreError> {
    let outcome = match action {
        RolesAction::List | RolesAction::Catalog => Outcome::Roles(registry.list_roles().await?),
        RolesAction::Create { name, description, level, permissions } => Outcome::Role(
            registry.create_role(RoleSpec { name, description, level, permissions }).await?,
        ),
        RolesAction::Update { id, name, description, level, permissions } => Outcome::Role(
            registry
                .update_role(&RoleId(id), RolePatch { name, description, level, permissions })
                .await?,
        ),
        RolesAction::Delete { id } => {
            let id = RoleId(id);
            registry.delete_role(&id).await?;
            Outcome::Deleted(id)
        }
        RolesAction::Toggle { id, permission } => {
            Outcome::Role(registry.toggle_permission(&RoleId(id), &permission).await?)
        }
        RolesAction::ToggleCategory { id, category } => {
            let category = category.parse::<PermissionCategory>()?;
            Outcome::Role(registry.toggle_category_permissions(&RoleId(id), category).await?)
        }
    };
    Ok(outcome)
}

fn catalog() -> Vec<CatalogCategory> {
    PermissionCategory::ALL
        .into_iter()
        .map(|category| CatalogCategory { category, permissions: category.permissions().collect() })
        .collect()
}

#[cfg(test)]
mod tests {
    use claimdesk_core::permissions::{Permission, PermissionCategory};

    use super::catalog;

    #[test]
    fn catalog_covers_every_permission_once() {
        let groups = catalog();
        assert_eq!(groups.len(), PermissionCategory::ALL.len());

        let total: usize = groups.iter().map(|group| group.permissions.len()).sum();
        assert_eq!(total, Permission::ALL.len());
        assert!(groups
            .iter()
            .all(|group| group.permissions.iter().all(|p| p.category() == group.category)));
    }
}
