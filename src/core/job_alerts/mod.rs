// Job alert tracking: parse alert mails, keep the sheet free of duplicates,
// mail a digest of what was added.

pub mod digest;
pub mod extractor;
pub mod job_alert_service;
pub mod job_models;
pub mod processed_index;

pub use job_alert_service::{
    JobAlertConfig, JobAlertError, JobAlertService, JobStore, MailSender, MailSource,
};
pub use job_models::{JobPosting, OutgoingMail, RawMessage, SHEET_HEADERS};
