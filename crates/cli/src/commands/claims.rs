use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use claimdesk_core::config::LoadOptions;
use claimdesk_core::domain::actor::ActorId;
use claimdesk_core::domain::claim::{
    AttachmentRef, ClaimDraft, ClaimId, ClaimPatch, ExpenseCategory, ExpenseClaim,
};
use claimdesk_core::errors::CoreError;
use claimdesk_core::money::parse_decimal_input;
use claimdesk_core::service::{ClaimService, RequestContext};
use rust_decimal::Decimal;

use crate::commands::stores::Stores;
use crate::commands::{load_config, runtime, CommandResult, Failure};

#[derive(Debug, Args)]
pub struct ClaimsArgs {
    /// Actor performing the operation.
    #[arg(long = "as", value_name = "ACTOR_ID")]
    pub actor: String,
    /// Correlation id attached to logs and audit events; generated when absent.
    #[arg(long)]
    pub correlation_id: Option<String>,
    #[command(subcommand)]
    pub action: ClaimsAction,
}

#[derive(Debug, Subcommand)]
pub enum ClaimsAction {
    #[command(about = "List the claims visible to the actor, newest first")]
    List,
    #[command(about = "Submit a new claim in the pending state")]
    Submit(SubmitArgs),
    #[command(about = "Approve a pending claim")]
    Approve { id: String },
    #[command(about = "Reject a pending claim with an optional reason")]
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    #[command(about = "Mark an approved claim as paid")]
    Pay { id: String },
    #[command(about = "Edit the fields of a pending claim")]
    Edit(EditArgs),
    #[command(about = "Delete a pending claim")]
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub project: String,
    /// Claim date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub amount: Option<String>,
    #[arg(long)]
    pub distance: Option<String>,
    #[arg(long)]
    pub rate: Option<String>,
    /// Receipt file to attach.
    #[arg(long)]
    pub receipt: Option<PathBuf>,
    #[arg(long)]
    pub approver: Option<String>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub amount: Option<String>,
    #[arg(long)]
    pub distance: Option<String>,
    #[arg(long)]
    pub rate: Option<String>,
    #[arg(long, conflicts_with = "clear_receipt")]
    pub receipt: Option<PathBuf>,
    #[arg(long)]
    pub clear_receipt: bool,
    #[arg(long, conflicts_with = "clear_approver")]
    pub approver: Option<String>,
    #[arg(long)]
    pub clear_approver: bool,
}

enum Outcome {
    Claims(Vec<ExpenseClaim>),
    Claim(ExpenseClaim),
    Deleted(ClaimId),
}

impl ClaimsAction {
    fn command_name(&self) -> &'static str {
        match self {
            Self::List => "claims.list",
            Self::Submit(_) => "claims.submit",
            Self::Approve { .. } => "claims.approve",
            Self::Reject { .. } => "claims.reject",
            Self::Pay { .. } => "claims.pay",
            Self::Edit(_) => "claims.edit",
            Self::Delete { .. } => "claims.delete",
        }
    }
}

pub fn run(options: &LoadOptions, args: ClaimsArgs) -> CommandResult {
    let command = args.action.command_name();
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result(command),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return failure.into_result(command),
    };

    let ctx = match args.correlation_id {
        Some(correlation_id) => RequestContext::new(ActorId(args.actor), correlation_id),
        None => RequestContext::for_actor(ActorId(args.actor)),
    }
    .with_local_date(Local::now().date_naive());

    let result = runtime.block_on(async {
        let stores = Stores::open(&config).await?;
        let outcome = execute(&stores.service, &ctx, args.action).await;
        stores.close().await;
        Ok::<_, Failure>(outcome)
    });

    match result {
        Ok(Ok(Outcome::Claims(claims))) => CommandResult::success_with_data(
            command,
            format!("{} claim(s) visible to {}", claims.len(), ctx.actor_id),
            &claims,
        ),
        Ok(Ok(Outcome::Claim(claim))) => CommandResult::success_with_data(
            command,
            format!("claim {} is {}", claim.id, claim.state),
            &claim,
        ),
        Ok(Ok(Outcome::Deleted(id))) => {
            CommandResult::success(command, format!("claim {id} deleted"))
        }
        Ok(Err(ActionError::Core(error))) => {
            CommandResult::from_core_error(command, error, &ctx.correlation_id)
        }
        Ok(Err(ActionError::Input(failure))) | Err(failure) => failure.into_result(command),
    }
}

enum ActionError {
    Core(CoreError),
    Input(Failure),
}

impl From<CoreError> for ActionError {
    fn from(value: CoreError) -> Self {
        Self::Core(value)
    }
}

impl From<Failure> for ActionError {
    fn from(value: Failure) -> Self {
        Self::Input(value)
    }
}

async fn execute(
    service: &ClaimService,
    ctx: &RequestContext,
    action: ClaimsAction,
) -> Result<Outcome, ActionError> {
    let outcome = match action {
        ClaimsAction::List => Outcome::Claims(service.list_claims(ctx).await?),
        ClaimsAction::Submit(args) => {
            let draft = draft_from_args(args)?;
            Outcome::Claim(service.submit(ctx, draft).await?)
        }
        ClaimsAction::Approve { id } => Outcome::Claim(service.approve(ctx, &ClaimId(id)).await?),
        ClaimsAction::Reject { id, reason } => {
            Outcome::Claim(service.reject(ctx, &ClaimId(id), reason).await?)
        }
        ClaimsAction::Pay { id } => Outcome::Claim(service.mark_paid(ctx, &ClaimId(id)).await?),
        ClaimsAction::Edit(args) => {
            let id = ClaimId(args.id.clone());
            let patch = patch_from_args(args)?;
            Outcome::Claim(service.edit(ctx, &id, patch).await?)
        }
        ClaimsAction::Delete { id } => {
            let id = ClaimId(id);
            service.delete(ctx, &id).await?;
            Outcome::Deleted(id)
        }
    };
    Ok(outcome)
}

fn draft_from_args(args: SubmitArgs) -> Result<ClaimDraft, Failure> {
    Ok(ClaimDraft {
        category: Some(parse_category(&args.category)?),
        description: args.description,
        project: args.project,
        date: Some(args.date.unwrap_or_else(|| Local::now().date_naive())),
        amount: parse_optional_decimal("amount", args.amount.as_deref())?,
        distance: parse_optional_decimal("distance", args.distance.as_deref())?,
        rate_per_unit: parse_optional_decimal("rate", args.rate.as_deref())?,
        attachments: args.receipt.as_deref().map(receipt_ref).transpose()?.into_iter().collect(),
        assigned_approver: args.approver.map(ActorId),
    })
}

fn patch_from_args(args: EditArgs) -> Result<ClaimPatch, Failure> {
    let attachment = if args.clear_receipt {
        Some(None)
    } else {
        args.receipt.as_deref().map(receipt_ref).transpose()?.map(Some)
    };
    let assigned_approver = if args.clear_approver {
        Some(None)
    } else {
        args.approver.map(|approver| Some(ActorId(approver)))
    };

    let patch = ClaimPatch {
        category: args.category.as_deref().map(parse_category).transpose()?,
        description: args.description,
        project: args.project,
        date: args.date,
        amount: parse_optional_decimal("amount", args.amount.as_deref())?,
        distance: parse_optional_decimal("distance", args.distance.as_deref())?,
        rate_per_unit: parse_optional_decimal("rate", args.rate.as_deref())?,
        attachment,
        assigned_approver,
    };
    if patch.is_empty() {
        return Err(Failure::invalid_input("nothing to edit; pass at least one field"));
    }
    Ok(patch)
}

fn parse_category(raw: &str) -> Result<ExpenseCategory, Failure> {
    raw.parse::<ExpenseCategory>().map_err(|error| Failure::invalid_input(error.to_string()))
}

fn parse_optional_decimal(field: &str, raw: Option<&str>) -> Result<Option<Decimal>, Failure> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_decimal_input(raw)
            .map(Some)
            .ok_or_else(|| Failure::invalid_input(format!("{field} `{raw}` is not a number"))),
    }
}

fn receipt_ref(path: &Path) -> Result<AttachmentRef, Failure> {
    let metadata = fs::metadata(path).map_err(|error| {
        Failure::invalid_input(format!("cannot read receipt `{}`: {error}", path.display()))
    })?;
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(AttachmentRef {
        content_type: content_type_for(path).to_string(),
        file_name,
        size_bytes: metadata.len(),
        uri: format!("file://{}", absolute.display()),
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
