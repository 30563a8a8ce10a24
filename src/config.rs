// Runtime configuration, read from the environment (and `.env`).
//
// The job alert tracker and the document assistant are configured separately
// so each command only needs the variables of the feature it runs. Fixed
// behaviour (query, batch cap, sheet layout, schedule hour) stays as constants
// next to the code using it.

use anyhow::{anyhow, Result};
use chrono_tz::Tz;

use crate::core::assistant::models::DEFAULT_MODEL;

/// Settings for `schedule` and `run-once`.
#[derive(Debug, Clone)]
pub struct JobAlertSettings {
    /// Mailbox the alerts are read from and the digest is sent to.
    pub mailbox: String,
    pub spreadsheet_id: String,
    pub timezone: Tz,
}

impl JobAlertSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Same as `from_env` but reads through `lookup`, so tests don't touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            non_empty(&lookup, name).ok_or_else(|| anyhow!("Missing {} environment variable", name))
        };

        let timezone = match non_empty(&lookup, "JOB_ALERTS_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .ok()
                .ok_or_else(|| anyhow!("Invalid JOB_ALERTS_TIMEZONE '{}'", name))?,
            None => chrono_tz::UTC,
        };

        Ok(Self {
            mailbox: required("JOB_ALERTS_MAILBOX")?,
            spreadsheet_id: required("JOB_ALERTS_SPREADSHEET_ID")?,
            timezone,
        })
    }
}

/// Settings for the assistant commands. Nothing here is required.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub properties_db_path: String,
    pub openrouter_model: String,
    /// Workspace user to impersonate when reading Docs and Sheets. Without it
    /// the service account reads files shared with it directly.
    pub delegated_user: Option<String>,
}

impl AssistantSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            properties_db_path: non_empty(&lookup, "PROPERTIES_DB_PATH")
                .unwrap_or_else(|| "data/properties.db".to_string()),
            openrouter_model: non_empty(&lookup, "OPENROUTER_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            delegated_user: non_empty(&lookup, "ASSISTANT_DELEGATED_USER"),
        }
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
