//! Edit suggestion commands.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use verdant_core::config::AppConfig;
use verdant_core::error::AppError;
use verdant_core::types::id::{UserId, VegetableId};
use verdant_database::DatabasePool;
use verdant_entity::suggestion::{EditSuggestion, ReviewDecision, SuggestionStatus};
use verdant_entity::vegetable::Vegetable;
use verdant_service::{RequestContext, UserRole};

use crate::output::{self, OutputFormat};

/// Arguments for suggestion commands
#[derive(Debug, Args)]
pub struct SuggestionArgs {
    /// Suggestion subcommand
    #[command(subcommand)]
    pub command: SuggestionCommand,
}

/// Suggestion subcommands
#[derive(Debug, Subcommand)]
pub enum SuggestionCommand {
    /// Show a suggestion replayed onto the live vegetable
    Show {
        /// Suggestion ID
        id: String,
    },
    /// List suggestions for a vegetable, newest first
    List {
        /// Target vegetable ID
        #[arg(long)]
        target: String,
        /// Only list suggestions in this status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },
    /// Propose an edit from a JSON file holding the full updated vegetable
    Propose {
        /// Target vegetable ID
        #[arg(long)]
        target: String,
        /// Path to the updated vegetable JSON
        #[arg(long)]
        updated: String,
        /// Contributor user ID
        #[arg(long)]
        author: String,
    },
    /// Approve or reject a pending suggestion
    Review {
        /// Suggestion ID
        id: String,
        /// Merge the suggestion
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,
        /// Decline the suggestion
        #[arg(long)]
        reject: bool,
        /// Reviewer user ID
        #[arg(long)]
        reviewer: String,
    },
}

/// Status filter for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    /// Waiting for review
    Pending,
    /// Merged into the vegetable
    Merged,
    /// Declined
    Rejected,
}

impl From<StatusFilter> for SuggestionStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => Self::PendingReview,
            StatusFilter::Merged => Self::Merged,
            StatusFilter::Rejected => Self::Rejected,
        }
    }
}

/// Table row for a suggestion
#[derive(Debug, Serialize, Tabled)]
struct SuggestionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Changes")]
    changes: usize,
    #[tabled(rename = "Author")]
    created_by: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&EditSuggestion> for SuggestionRow {
    fn from(s: &EditSuggestion) -> Self {
        Self {
            id: s.id.to_string(),
            status: s.status.to_string(),
            changes: s.diff.iter().map(|op| op.count()).sum(),
            created_by: s.created_by.to_string(),
            created_at: s.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Execute suggestion commands
pub async fn execute(
    args: &SuggestionArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::connect(config).await?;
    let result = run(args, config, format, &db).await;
    db.close().await;
    result
}

async fn run(
    args: &SuggestionArgs,
    config: &AppConfig,
    format: OutputFormat,
    db: &DatabasePool,
) -> Result<(), AppError> {
    let service = super::build_service(config, db).await?;

    match &args.command {
        SuggestionCommand::Show { id } => {
            let ctx = RequestContext::new(uuid::Uuid::nil(), UserRole::Reviewer);
            let screen = service.preview(&ctx, id).await?;
            match format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "suggestion": screen.suggestion,
                    "base_revision": screen.preview.base_revision,
                    "data_that_changed": screen.preview.data_that_changed,
                    "to_render": screen.preview.to_render,
                    "friends": screen.friends,
                })),
                OutputFormat::Table => {
                    let s = &screen.suggestion;
                    output::print_kv("ID", &s.id.to_string());
                    output::print_kv("Target", &s.target_id.to_string());
                    output::print_kv("Status", s.status.as_str());
                    output::print_kv("Author", &s.created_by.to_string());
                    output::print_kv("Base revision", &screen.preview.base_revision.to_string());
                    for (field, value) in &screen.preview.data_that_changed {
                        output::print_kv(&format!("changes.{field}"), &value.to_string());
                    }
                    for friend in &screen.friends {
                        output::print_kv("Friend", &friend.handle);
                    }
                }
            }
            Ok(())
        }
        SuggestionCommand::List { target, status } => {
            let suggestions = service
                .list_for_target(target, status.map(SuggestionStatus::from))
                .await?;
            let rows: Vec<SuggestionRow> = suggestions.iter().map(SuggestionRow::from).collect();
            output::print_list(&rows, format);
            Ok(())
        }
        SuggestionCommand::Propose {
            target,
            updated,
            author,
        } => {
            let target = VegetableId::parse(target)?;
            let author = UserId::parse(author)?;
            let current = service.vegetable(target.into_uuid()).await?;
            let raw = tokio::fs::read_to_string(updated).await?;
            let updated: Vegetable = serde_json::from_str(&raw)?;

            let ctx = RequestContext::new(author.into_uuid(), UserRole::Contributor);
            let outcome = service.propose_edit(&ctx, &current, updated).await;
            match (outcome.error_code, outcome.suggestion_id) {
                (None, Some(id)) => {
                    output::print_success(&format!("Suggestion {id} created"));
                    if let Some(redirect) = &outcome.redirect {
                        output::print_kv("Redirect", redirect);
                    }
                    Ok(())
                }
                (code, _) => Err(AppError::unknown(format!(
                    "Proposal refused: {}",
                    code.unwrap_or("UNKNOWN_ERROR")
                ))),
            }
        }
        SuggestionCommand::Review {
            id,
            approve,
            reviewer,
            ..
        } => {
            let reviewer = UserId::parse(reviewer)?;
            let decision = if *approve {
                ReviewDecision::Approve
            } else {
                ReviewDecision::Reject
            };

            let ctx = RequestContext::new(reviewer.into_uuid(), UserRole::Reviewer);
            let outcome = service.review_suggestion(&ctx, id, decision).await;
            match (outcome.error_code, outcome.status) {
                (None, Some(status)) => {
                    output::print_success(&format!("Suggestion {id} is now {status}"));
                    if let Some(redirect) = &outcome.redirect {
                        output::print_kv("Redirect", redirect);
                    }
                    Ok(())
                }
                (code, _) => Err(AppError::unknown(format!(
                    "Review refused: {}",
                    code.unwrap_or("UNKNOWN_ERROR")
                ))),
            }
        }
    }
}
