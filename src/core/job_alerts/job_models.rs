use chrono::{DateTime, Utc};

/// Canonical posting URL. Every record built from the same id gets the same bytes.
const JOB_URL_PREFIX: &str = "https://www.linkedin.com/jobs/view/";

/// Column layout of the tracking sheet. The URL column doubles as the dedup key.
pub const SHEET_HEADERS: [&str; 6] = ["Date", "Job Title", "Company", "Location", "URL", "Status"];

/// Zero-based position of the URL column inside `SHEET_HEADERS`.
pub const URL_COLUMN_INDEX: usize = 4;

/// Format used for the `Date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds the canonical posting URL for a platform id.
pub fn job_url(external_id: &str) -> String {
    format!("{}{}/", JOB_URL_PREFIX, external_id)
}

/// Application status written to the sheet. New rows always start as `New`;
/// later states are edited by hand in the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    New,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "New",
        }
    }
}

/// One job listing recovered from an alert email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPosting {
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl JobPosting {
    /// Creates a fresh posting. The URL is always derived from the id.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        let external_id = external_id.into();
        let url = job_url(&external_id);
        Self {
            external_id,
            title: title.into(),
            company: company.into(),
            location: location.into(),
            url,
            discovered_at,
            status: JobStatus::New,
        }
    }

    /// Renders the posting as a sheet row in `SHEET_HEADERS` order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.discovered_at.format(DATE_FORMAT).to_string(),
            self.title.clone(),
            self.company.clone(),
            self.location.clone(),
            self.url.clone(),
            self.status.as_str().to_string(),
        ]
    }
}

/// A fetched alert email: plain-text rendering plus its timestamp.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub received_at: DateTime<Utc>,
    pub plain_text: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct AppendResult {
    /// Postings appended to the store, in encounter order.
    pub added_records: Vec<JobPosting>,
    /// Number of messages that were fetched for the run.
    pub messages_scanned: usize,
    /// Candidates dropped because their URL was already known.
    pub duplicates_skipped: usize,
}

/// Mail ready to hand to the mail sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn url_is_derived_from_id() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let a = JobPosting::new("123456789", "A", "B", "C", at);
        let b = JobPosting::new("123456789", "", "", "", at);
        assert_eq!(a.url, "https://www.linkedin.com/jobs/view/123456789/");
        assert_eq!(a.url.as_bytes(), b.url.as_bytes());
        assert_eq!(a.status, JobStatus::New);
    }

    #[test]
    fn row_follows_sheet_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let posting = JobPosting::new("42", "Engineer", "Acme", "Remote", at);
        let row = posting.to_row();

        assert_eq!(row.len(), SHEET_HEADERS.len());
        assert_eq!(row[0], "2024-03-01 09:30:00");
        assert_eq!(row[URL_COLUMN_INDEX], posting.url);
        assert_eq!(row[5], "New");
    }
}
