// Gmail REST client: reads job alert mails and sends the digest.
//
// Both directions act on the impersonated mailbox (`users/me`), which is why
// the digest always lands in the same inbox the alerts came from.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::Message;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::service_account_auth::ServiceAccountAuth;
use crate::core::job_alerts::{JobAlertError, MailSender, MailSource, OutgoingMail, RawMessage};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<[^>]+>").expect("tag pattern is valid"));

// =============================================================================
// GMAIL API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    /// Milliseconds since the epoch, as a string.
    internal_date: Option<String>,
    payload: Option<MessagePart>,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    body: Option<MessagePartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePartBody {
    data: Option<String>,
}

// =============================================================================
// GMAIL CLIENT
// =============================================================================

pub struct GmailClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
    /// Address used in the `From` header of outgoing mail.
    mailbox: String,
}

impl GmailClient {
    pub fn new(auth: Arc<ServiceAccountAuth>, mailbox: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: GMAIL_BASE_URL.to_string(),
            mailbox: mailbox.into(),
        }
    }

    async fn token(&self) -> Result<String, JobAlertError> {
        self.auth
            .get_access_token()
            .await
            .map_err(|e| JobAlertError::MailSource(format!("authentication failed: {}", e)))
    }

    async fn list_ids(
        &self,
        token: &str,
        query: &str,
        max: usize,
    ) -> Result<Vec<String>, JobAlertError> {
        let max_results = max.to_string();
        let response = self
            .client
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(token)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await
            .map_err(|e| JobAlertError::MailSource(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(JobAlertError::MailSource(format!(
                "Gmail list failed ({}): {}",
                status, text
            )));
        }

        let list: ListMessagesResponse = response
            .json()
            .await
            .map_err(|e| JobAlertError::MailSource(e.to_string()))?;

        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<GmailMessage, JobAlertError> {
        let response = self
            .client
            .get(format!("{}/messages/{}", self.base_url, id))
            .bearer_auth(token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| JobAlertError::MailSource(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(JobAlertError::MailSource(format!(
                "Gmail get {} failed ({}): {}",
                id, status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| JobAlertError::MailSource(e.to_string()))
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn fetch_messages(
        &self,
        query: &str,
        max: usize,
    ) -> Result<Vec<RawMessage>, JobAlertError> {
        let token = self.token().await?;
        let ids = self.list_ids(&token, query, max).await?;
        tracing::debug!(count = ids.len(), query, "Listed job alert messages");

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids.iter().take(max) {
            let message = self.get_message(&token, id).await?;
            messages.push(to_raw_message(message));
        }

        Ok(messages)
    }
}

#[async_trait]
impl MailSender for GmailClient {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), JobAlertError> {
        let raw = build_mime(&self.mailbox, mail)?;
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|e| JobAlertError::Notify(format!("authentication failed: {}", e)))?;

        let response = self
            .client
            .post(format!("{}/messages/send", self.base_url))
            .bearer_auth(token)
            .json(&json!({ "raw": URL_SAFE.encode(raw) }))
            .send()
            .await
            .map_err(|e| JobAlertError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(JobAlertError::Notify(format!(
                "Gmail send failed ({}): {}",
                status, text
            )));
        }

        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn to_raw_message(message: GmailMessage) -> RawMessage {
    let received_at = parse_internal_date(message.internal_date.as_deref()).unwrap_or_else(|| {
        tracing::warn!(
            id = %message.id,
            internal_date = ?message.internal_date,
            "Message has no usable internalDate; using current time"
        );
        Utc::now()
    });

    let plain_text = message
        .payload
        .as_ref()
        .and_then(plain_text_of)
        .unwrap_or_else(|| {
            tracing::warn!(id = %message.id, "Message has no readable body; using snippet");
            message.snippet.clone()
        });

    RawMessage {
        received_at,
        plain_text,
    }
}

/// Gmail reports `internalDate` as epoch milliseconds in a string.
fn parse_internal_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|ms| ms.trim().parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Prefers a `text/plain` part anywhere in the tree and falls back to a
/// tag-stripped `text/html` part.
fn plain_text_of(part: &MessagePart) -> Option<String> {
    find_part(part, "text/plain")
        .or_else(|| find_part(part, "text/html").map(|html| html_to_text(&html)))
}

fn find_part(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type) {
        if let Some(text) = part
            .body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .and_then(decode_body)
        {
            return Some(text);
        }
    }

    part.parts
        .iter()
        .find_map(|child| find_part(child, mime_type))
}

/// Gmail body data is base64url, with or without padding.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn html_to_text(html: &str) -> String {
    let stripped = HTML_TAG.replace_all(html, "\n");
    html_escape::decode_html_entities(&stripped).into_owned()
}

/// Renders `mail` as an RFC 5322 `multipart/alternative` message.
fn build_mime(from: &str, mail: &OutgoingMail) -> Result<Vec<u8>, JobAlertError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| JobAlertError::Notify(format!("invalid sender address: {}", e)))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| JobAlertError::Notify(format!("invalid recipient address: {}", e)))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            mail.plain_body.clone(),
            mail.html_body.clone(),
        ))
        .map_err(|e| JobAlertError::Notify(format!("failed to build message: {}", e)))?;

    Ok(message.formatted())
}
