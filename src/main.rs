// Entry point for the Workspace automation binary.
//
// **Architecture Overview:**
// - `core/` = Business logic (no HTTP, no SQL)
// - `infra/` = Implementations of core traits (Google APIs, OpenRouter, SQLite)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Dispatch the requested command
//
// Commands:
//   schedule                                   register the daily job alert run and wait (default)
//   run-once                                   run the job alert pipeline once
//   set-api-key <key>                          store the OpenRouter API key
//   has-api-key                                print whether a key is stored
//   ask-doc <doc> <question> [--insert]        ask about a Google Doc
//   ask-sheet <id> <range> <question> [--insert]  ask about a spreadsheet range

#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

use crate::config::{AssistantSettings, JobAlertSettings};
use crate::core::assistant::{
    AssistantConfig, AssistantService, ChatMessage, WorkspaceContext,
};
use crate::core::job_alerts::{JobAlertConfig, JobAlertService};
use crate::core::schedule::{DailySchedule, TriggerRegistry, JOB_ALERT_HOUR};
use crate::infra::ai::OpenRouterClient;
use crate::infra::google::service_account_auth::{ASSISTANT_SCOPES, JOB_ALERT_SCOPES};
use crate::infra::google::{
    DocumentContext, GmailClient, GoogleDocsClient, ServiceAccountAuth, SheetsClient,
    SheetsJobStore, SpreadsheetContext,
};
use crate::infra::secrets::SqliteSecretStore;

const JOB_ALERT_TRIGGER: &str = "job-alerts";

type JobAlerts = JobAlertService<GmailClient, SheetsJobStore, GmailClient>;
type Assistant = AssistantService<OpenRouterClient, SqliteSecretStore>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists) before logging
    // so RUST_LOG can live there too.
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let insert = args.iter().any(|a| a == "--insert");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| *a != "--insert")
        .map(String::as_str)
        .collect();

    // Each command loads only the settings and credentials of its own feature.
    match positional.as_slice() {
        [] | ["schedule"] => {
            let settings = JobAlertSettings::from_env()?;
            let (job_alerts, store, auth) = build_job_alerts(&settings).await?;
            schedule_job_alerts(&settings, &auth, &store, Arc::new(job_alerts)).await
        }
        ["run-once"] => {
            let settings = JobAlertSettings::from_env()?;
            let (job_alerts, store, _) = build_job_alerts(&settings).await?;
            store.ensure_header().await?;
            let result = job_alerts.run().await?;
            println!(
                "Scanned {} message(s), added {} posting(s), skipped {} duplicate(s).",
                result.messages_scanned,
                result.added_records.len(),
                result.duplicates_skipped
            );
            Ok(())
        }
        ["set-api-key", key] => {
            let settings = AssistantSettings::from_env();
            build_assistant(&settings).await?.save_api_key(key).await?;
            println!("API key saved.");
            Ok(())
        }
        ["has-api-key"] => {
            let settings = AssistantSettings::from_env();
            let present = build_assistant(&settings).await?.has_api_key().await?;
            println!("{}", present);
            Ok(())
        }
        ["ask-doc", document, question @ ..] if !question.is_empty() => {
            let settings = AssistantSettings::from_env();
            let document_id = GoogleDocsClient::extract_doc_id(document)
                .ok_or_else(|| anyhow!("Could not extract document ID from: {}", document))?;
            let auth = assistant_auth(&settings).await?;
            let docs = Arc::new(GoogleDocsClient::new(auth));
            let context = DocumentContext::new(docs, document_id, None);
            ask(&settings, &context, &question.join(" "), insert).await
        }
        ["ask-sheet", spreadsheet_id, range, question @ ..] if !question.is_empty() => {
            let settings = AssistantSettings::from_env();
            let sheets = Arc::new(SheetsClient::new(assistant_auth(&settings).await?));
            let context = SpreadsheetContext::new(sheets, *spreadsheet_id, *range, None);
            ask(&settings, &context, &question.join(" "), insert).await
        }
        other => bail!("Unknown command: {}", other.join(" ")),
    }
}

// ============================================================================
// DEPENDENCY INJECTION
// ============================================================================

/// Gmail needs domain-wide delegation, so job alert tokens impersonate the mailbox.
async fn build_job_alerts(
    settings: &JobAlertSettings,
) -> Result<(JobAlerts, SheetsJobStore, Arc<ServiceAccountAuth>)> {
    let auth = Arc::new(
        ServiceAccountAuth::from_env(&JOB_ALERT_SCOPES, Some(settings.mailbox.clone()))
            .await
            .map_err(|e| anyhow!("Failed to load service account: {}", e))?,
    );
    let sheets = Arc::new(SheetsClient::new(Arc::clone(&auth)));
    let store = || SheetsJobStore::new(Arc::clone(&sheets), settings.spreadsheet_id.clone());

    let job_alerts = JobAlertService::new(
        GmailClient::new(Arc::clone(&auth), settings.mailbox.clone()),
        store(),
        GmailClient::new(Arc::clone(&auth), settings.mailbox.clone()),
        JobAlertConfig::for_mailbox(settings.mailbox.clone()),
    );

    Ok((job_alerts, store(), auth))
}

async fn assistant_auth(settings: &AssistantSettings) -> Result<Arc<ServiceAccountAuth>> {
    let auth = ServiceAccountAuth::from_env(&ASSISTANT_SCOPES, settings.delegated_user.clone())
        .await
        .map_err(|e| anyhow!("Failed to load service account: {}", e))?;
    Ok(Arc::new(auth))
}

async fn build_assistant(settings: &AssistantSettings) -> Result<Assistant> {
    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    if let Some(parent) = Path::new(&settings.properties_db_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }

    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", settings.properties_db_path))
        .await
        .context("Failed to open properties database")?;
    let secrets = SqliteSecretStore::new(pool);
    secrets.migrate().await?;

    let assistant_config = AssistantConfig {
        model: settings.openrouter_model.clone(),
        ..AssistantConfig::default()
    };

    Ok(AssistantService::new(
        OpenRouterClient::new(),
        secrets,
        assistant_config,
    ))
}

async fn ask(
    settings: &AssistantSettings,
    context: &dyn WorkspaceContext,
    question: &str,
    insert: bool,
) -> Result<()> {
    let assistant = build_assistant(settings).await?;

    match assistant.ask(context, &[ChatMessage::user(question)]).await {
        Ok(reply) => {
            println!("{}", reply);
            if insert {
                assistant.insert_reply(context, &reply).await?;
                tracing::info!(kind = context.kind().label(), "Inserted reply");
            }
        }
        Err(e) => {
            tracing::warn!("Assistant request failed: {}", e);
            println!("{}", e.user_message());
        }
    }

    Ok(())
}

async fn schedule_job_alerts(
    settings: &JobAlertSettings,
    auth: &ServiceAccountAuth,
    store: &SheetsJobStore,
    job_alerts: Arc<JobAlerts>,
) -> Result<()> {
    store.ensure_header().await?;

    tracing::info!(
        account = auth.service_account_email(),
        mailbox = %settings.mailbox,
        "Job alert tracker starting"
    );

    let registry = TriggerRegistry::new();
    let schedule = DailySchedule::new(JOB_ALERT_HOUR, settings.timezone);

    registry.register(JOB_ALERT_TRIGGER, schedule, move || {
        let job_alerts = Arc::clone(&job_alerts);
        async move {
            match job_alerts.run().await {
                Ok(result) => tracing::info!(
                    added = result.added_records.len(),
                    messages = result.messages_scanned,
                    "Job alert run finished"
                ),
                Err(e) => tracing::error!("Job alert run failed: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    registry.unregister(JOB_ALERT_TRIGGER);
    tracing::info!("Shutting down");
    Ok(())
}
