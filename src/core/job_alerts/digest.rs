//! Formatting for the daily digest email.
//!
//! Pure string building; sending is the mail sender's job.

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::job_models::JobPosting;

/// Subject and both bodies of a digest mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// Builds the digest for the postings added in one run.
///
/// Wording is singular for exactly one posting and plural otherwise.
///
/// # Example Output
/// ```text
/// Subject: 2 new jobs added to your tracker
///
/// 2 new job postings were added to your tracker:
///
/// - Senior Engineer at Acme Corp (Remote)
///   https://www.linkedin.com/jobs/view/123456789/
/// ```
pub fn format_digest(records: &[JobPosting]) -> DigestEmail {
    let single = records.len() == 1;

    let subject = if single {
        "1 new job added to your tracker".to_string()
    } else {
        format!("{} new jobs added to your tracker", records.len())
    };

    let intro = if single {
        "1 new job posting was added to your tracker:".to_string()
    } else {
        format!(
            "{} new job postings were added to your tracker:",
            records.len()
        )
    };

    let mut plain_body = format!("{}\n\n", intro);
    for record in records {
        plain_body.push_str(&format!("- {}\n  {}\n", headline(record), record.url));
    }

    let mut html_body = format!("<p>{}</p>\n<ul>\n", encode_text(&intro));
    for record in records {
        html_body.push_str(&format!(
            "  <li><a href=\"{}\">{}</a>{}</li>\n",
            encode_double_quoted_attribute(&record.url),
            encode_text(display_title(record)),
            encode_text(&details(record)),
        ));
    }
    html_body.push_str("</ul>\n");

    DigestEmail {
        subject,
        plain_body,
        html_body,
    }
}

fn display_title(record: &JobPosting) -> &str {
    if record.title.is_empty() {
        "Untitled posting"
    } else {
        &record.title
    }
}

/// " at Company (Location)" with empty parts left out.
fn details(record: &JobPosting) -> String {
    let mut out = String::new();
    if !record.company.is_empty() {
        out.push_str(&format!(" at {}", record.company));
    }
    if !record.location.is_empty() {
        out.push_str(&format!(" ({})", record.location));
    }
    out
}

fn headline(record: &JobPosting) -> String {
    format!("{}{}", display_title(record), details(record))
}
