use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use super::digest::format_digest;
use super::extractor::extract;
use super::job_models::{AppendResult, JobPosting, OutgoingMail, RawMessage};
use super::processed_index::ProcessedIndex;

/// Gmail search used to find alert mails: sender, label and recency window.
pub const JOB_ALERT_QUERY: &str =
    "from:jobalerts-noreply@linkedin.com label:job-alerts newer_than:1d";

/// Upper bound on messages fetched per run.
pub const MAX_MESSAGES_PER_RUN: usize = 50;

/// Errors that end a job alert run.
///
/// Malformed segments and empty batches are not errors; they are handled
/// inside the run.
#[derive(Debug, Error)]
pub enum JobAlertError {
    #[error("Mail source error: {0}")]
    MailSource(String),
    #[error("Job store error: {0}")]
    Store(String),
    #[error("Failed to send digest: {0}")]
    Notify(String),
    #[error("A job alert run is already in progress")]
    RunInProgress,
}

/// Where alert mails come from.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Returns up to `max` messages matching `query`, in the source's order.
    async fn fetch_messages(
        &self,
        query: &str,
        max: usize,
    ) -> Result<Vec<RawMessage>, JobAlertError>;
}

/// Append-only tabular store holding one row per posting.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every cell of the URL column, header included.
    async fn read_url_column(&self) -> Result<Vec<String>, JobAlertError>;

    /// Appends rows after the last existing row. Existing rows are never touched.
    async fn append_rows(&self, postings: &[JobPosting]) -> Result<(), JobAlertError>;
}

/// Outbound mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), JobAlertError>;
}

/// Settings for a run, passed in at construction instead of read from globals.
#[derive(Debug, Clone)]
pub struct JobAlertConfig {
    pub query: String,
    pub max_messages: usize,
    /// Digest recipient. This is the mailbox the alerts are read from.
    pub recipient: String,
}

impl JobAlertConfig {
    pub fn for_mailbox(recipient: impl Into<String>) -> Self {
        Self {
            query: JOB_ALERT_QUERY.to_string(),
            max_messages: MAX_MESSAGES_PER_RUN,
            recipient: recipient.into(),
        }
    }
}

/// Runs the extract → dedup → append → notify pipeline.
///
/// Collaborator failures are returned as-is: there is no retry and rows
/// appended before a later failure stay in the sheet. The next scheduled run
/// picks up whatever is left, and the dedup index keeps it from doubling rows.
pub struct JobAlertService<M: MailSource, S: JobStore, N: MailSender> {
    mail: M,
    store: S,
    sender: N,
    config: JobAlertConfig,
    running: AtomicBool,
}

impl<M, S, N> JobAlertService<M, S, N>
where
    M: MailSource,
    S: JobStore,
    N: MailSender,
{
    pub fn new(mail: M, store: S, sender: N, config: JobAlertConfig) -> Self {
        Self {
            mail,
            store,
            sender,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// One full run. A second call while a run is in flight is refused.
    pub async fn run(&self) -> Result<AppendResult, JobAlertError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JobAlertError::RunInProgress);
        }

        let result = self.run_guarded().await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_guarded(&self) -> Result<AppendResult, JobAlertError> {
        let batch = self
            .mail
            .fetch_messages(&self.config.query, self.config.max_messages)
            .await?;

        if batch.is_empty() {
            tracing::info!("No job alert messages matched; nothing to do");
            return Ok(AppendResult::default());
        }

        let mut index = ProcessedIndex::build(self.store.read_url_column().await?);
        tracing::debug!(known = index.len(), "Rebuilt processed index");

        let result = Self::run_batch(&batch, &mut index);

        if result.added_records.is_empty() {
            tracing::info!(
                messages = result.messages_scanned,
                duplicates = result.duplicates_skipped,
                "No new job postings"
            );
            return Ok(result);
        }

        self.store.append_rows(&result.added_records).await?;
        tracing::info!(
            added = result.added_records.len(),
            duplicates = result.duplicates_skipped,
            messages = result.messages_scanned,
            "Appended new job postings"
        );

        self.notify(&result.added_records).await?;
        Ok(result)
    }

    /// Extracts every message in order and keeps the postings whose URL is
    /// not yet in `index`. Accepted URLs are added to the index right away so
    /// a posting repeated later in the batch is dropped too.
    pub fn run_batch(batch: &[RawMessage], index: &mut ProcessedIndex) -> AppendResult {
        let mut result = AppendResult {
            messages_scanned: batch.len(),
            ..AppendResult::default()
        };

        for posting in extract(batch) {
            if index.contains(&posting.url) {
                result.duplicates_skipped += 1;
                continue;
            }
            index.insert(&posting.url);
            result.added_records.push(posting);
        }

        result
    }

    async fn notify(&self, added: &[JobPosting]) -> Result<(), JobAlertError> {
        let digest = format_digest(added);
        let mail = OutgoingMail {
            to: self.config.recipient.clone(),
            subject: digest.subject,
            plain_body: digest.plain_body,
            html_body: digest.html_body,
        };

        self.sender.send(&mail).await?;
        tracing::info!(to = %mail.to, "Sent job digest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job_alerts::job_models::{SHEET_HEADERS, URL_COLUMN_INDEX};
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    // Test doubles ----------------------------------------------------------

    #[derive(Clone, Default)]
    struct MockMailSource {
        messages: Vec<RawMessage>,
        fail: bool,
    }

    #[async_trait]
    impl MailSource for MockMailSource {
        async fn fetch_messages(
            &self,
            _query: &str,
            max: usize,
        ) -> Result<Vec<RawMessage>, JobAlertError> {
            if self.fail {
                return Err(JobAlertError::MailSource("offline".to_string()));
            }
            Ok(self.messages.iter().take(max).cloned().collect())
        }
    }

    /// Sheet stand-in: row 0 is the header.
    #[derive(Clone)]
    struct MockSheet {
        rows: Arc<Mutex<Vec<Vec<String>>>>,
        append_calls: Arc<Mutex<usize>>,
    }

    impl MockSheet {
        fn with_urls(urls: &[&str]) -> Self {
            let mut rows = vec![SHEET_HEADERS.iter().map(|h| h.to_string()).collect()];
            for url in urls {
                let mut row = vec![String::new(); SHEET_HEADERS.len()];
                row[URL_COLUMN_INDEX] = url.to_string();
                rows.push(row);
            }
            Self {
                rows: Arc::new(Mutex::new(rows)),
                append_calls: Arc::new(Mutex::new(0)),
            }
        }

        fn rows(&self) -> Vec<Vec<String>> {
            self.rows.lock().unwrap().clone()
        }

        fn append_calls(&self) -> usize {
            *self.append_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl JobStore for MockSheet {
        async fn read_url_column(&self) -> Result<Vec<String>, JobAlertError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|row| row[URL_COLUMN_INDEX].clone())
                .collect())
        }

        async fn append_rows(&self, postings: &[JobPosting]) -> Result<(), JobAlertError> {
            *self.append_calls.lock().unwrap() += 1;
            let mut rows = self.rows.lock().unwrap();
            rows.extend(postings.iter().map(JobPosting::to_row));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockSender {
        sent: Arc<Mutex<Vec<OutgoingMail>>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for MockSender {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), JobAlertError> {
            if self.fail {
                return Err(JobAlertError::Notify("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    // Helpers ----------------------------------------------------------------

    fn alert(ids: &[&str]) -> RawMessage {
        let mut body = String::from("Your job alert\n");
        for id in ids {
            body.push_str(&format!(
                "Role {id}\nCompany {id}\nRemote\nView job: https://www.linkedin.com/comm/jobs/view/{id}/?trk=x\n"
            ));
        }
        RawMessage {
            received_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            plain_text: body,
        }
    }

    fn url(id: &str) -> String {
        format!("https://www.linkedin.com/jobs/view/{}/", id)
    }

    fn service(
        messages: Vec<RawMessage>,
        sheet: MockSheet,
        sender: MockSender,
    ) -> JobAlertService<MockMailSource, MockSheet, MockSender> {
        JobAlertService::new(
            MockMailSource {
                messages,
                fail: false,
            },
            sheet,
            sender,
            JobAlertConfig::for_mailbox("me@example.com"),
        )
    }

    // Tests ------------------------------------------------------------------

    #[tokio::test]
    async fn test_second_run_appends_nothing() {
        let sheet = MockSheet::with_urls(&[]);
        let sender = MockSender::default();
        let service = service(vec![alert(&["1", "2"])], sheet.clone(), sender.clone());

        let first = service.run().await.unwrap();
        assert_eq!(first.added_records.len(), 2);

        let second = service.run().await.unwrap();
        assert!(second.added_records.is_empty());
        assert_eq!(second.duplicates_skipped, 2);

        assert_eq!(sheet.rows().len(), 3);
        assert_eq!(sheet.append_calls(), 1);
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_posting_in_two_messages_is_added_once() {
        let sheet = MockSheet::with_urls(&[]);
        let service = service(
            vec![alert(&["7"]), alert(&["7"])],
            sheet.clone(),
            MockSender::default(),
        );

        let result = service.run().await.unwrap();
        assert_eq!(result.added_records.len(), 1);
        assert_eq!(sheet.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_store_append_scenario() {
        let a = url("100");
        let b = url("200");
        let sheet = MockSheet::with_urls(&[&a, &b]);
        let service = service(
            vec![alert(&["200", "300"]), alert(&["300"])],
            sheet.clone(),
            MockSender::default(),
        );

        let result = service.run().await.unwrap();
        assert_eq!(result.added_records.len(), 1);
        assert_eq!(result.duplicates_skipped, 2);

        let rows = sheet.rows();
        assert_eq!(rows.len(), 4);
        // Row 4 in sheet terms is index 3 here.
        assert_eq!(rows[3][URL_COLUMN_INDEX], url("300"));
        assert_eq!(rows[3][1], "Role 300");
        assert_eq!(rows[3][5], "New");
        assert_eq!(rows[1][URL_COLUMN_INDEX], a);
        assert_eq!(rows[2][URL_COLUMN_INDEX], b);
    }

    #[tokio::test]
    async fn test_nothing_new_means_no_append_and_no_mail() {
        let existing = url("5");
        let sheet = MockSheet::with_urls(&[&existing]);
        let sender = MockSender::default();
        let service = service(vec![alert(&["5"])], sheet.clone(), sender.clone());

        let result = service.run().await.unwrap();
        assert!(result.added_records.is_empty());
        assert_eq!(sheet.append_calls(), 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let sheet = MockSheet::with_urls(&[]);
        let sender = MockSender::default();
        let service = service(Vec::new(), sheet.clone(), sender.clone());

        let result = service.run().await.unwrap();
        assert_eq!(result.messages_scanned, 0);
        assert_eq!(sheet.append_calls(), 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_digest_goes_to_own_mailbox() {
        let sender = MockSender::default();
        let service = service(
            vec![alert(&["11", "12", "13"])],
            MockSheet::with_urls(&[]),
            sender.clone(),
        );

        service.run().await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "me@example.com");
        assert_eq!(sent[0].subject, "3 new jobs added to your tracker");
    }

    #[tokio::test]
    async fn test_mail_source_failure_propagates() {
        let sheet = MockSheet::with_urls(&[]);
        let service = JobAlertService::new(
            MockMailSource {
                messages: Vec::new(),
                fail: true,
            },
            sheet.clone(),
            MockSender::default(),
            JobAlertConfig::for_mailbox("me@example.com"),
        );

        let err = service.run().await.unwrap_err();
        assert!(matches!(err, JobAlertError::MailSource(_)));
        assert_eq!(sheet.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_appended_rows() {
        let sheet = MockSheet::with_urls(&[]);
        let sender = MockSender {
            fail: true,
            ..MockSender::default()
        };
        let service = service(vec![alert(&["42"])], sheet.clone(), sender);

        let err = service.run().await.unwrap_err();
        assert!(matches!(err, JobAlertError::Notify(_)));
        assert_eq!(sheet.rows().len(), 2);

        // The guard is released after a failed run.
        assert!(!service.running.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_refused() {
        let service = service(
            vec![alert(&["1"])],
            MockSheet::with_urls(&[]),
            MockSender::default(),
        );
        service.running.store(true, Ordering::Release);

        let err = service.run().await.unwrap_err();
        assert!(matches!(err, JobAlertError::RunInProgress));
    }

    #[test]
    fn test_run_batch_skips_known_urls_and_marks_accepted_ones() {
        type Service = JobAlertService<MockMailSource, MockSheet, MockSender>;

        let mut index = ProcessedIndex::build(["URL".to_string(), url("100")]);
        let batch = vec![alert(&["100", "200"]), alert(&["200", "300"])];

        let result = Service::run_batch(&batch, &mut index);

        let added: Vec<&str> = result.added_records.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(added, vec![url("200"), url("300")]);
        assert_eq!(result.duplicates_skipped, 2);
        assert_eq!(result.messages_scanned, 2);
        assert!(index.contains(&url("200")));
        assert!(index.contains(&url("300")));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_batch_cap_is_respected_by_config() {
        let config = JobAlertConfig::for_mailbox("x@example.com");
        assert_eq!(config.max_messages, MAX_MESSAGES_PER_RUN);
        assert_eq!(config.query, JOB_ALERT_QUERY);
    }
}
