//! Recovers job postings from the plain-text body of LinkedIn job-alert emails.
//!
//! The alert mail has no machine-readable structure. Every posting ends with a
//! `View job:` marker followed by its link, and the descriptive lines (title,
//! company, location and optional social-proof lines) sit right above the
//! marker. Splitting on the marker therefore yields segments where segment `n`
//! starts with the link of posting `n` and ends with the description of posting
//! `n + 1`.
//!
//! Extraction never fails: segments that cannot be understood are reported as
//! skipped so layout drift shows up in the logs instead of aborting a run.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::job_models::{JobPosting, RawMessage};

/// Literal token the alert mail puts in front of every posting link.
pub const POSTING_MARKER: &str = "View job:";

static POSTING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/jobs/view/([0-9]+)").expect("posting id pattern is valid"));

// "14 school alumni", "3 connections", "2 company alumni", "1 school"
static SOCIAL_PROOF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9]+\s+(?:(?:school|company)\s+)?(?:connections?|alumni|alumnus|schools?)\b")
        .expect("social proof pattern is valid")
});

/// Why a segment did not produce a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The link after the marker carries no numeric posting id.
    MissingIdentifier,
    /// The id was already emitted earlier in the same message.
    DuplicateInMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSegment {
    /// Segment position inside the message (1-based, segment 0 is the header).
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of parsing a single message.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub postings: Vec<JobPosting>,
    pub skipped: Vec<SkippedSegment>,
}

/// Extracts postings from a batch, preserving message order and, within a
/// message, marker order. Skipped segments are logged at debug level.
pub fn extract(messages: &[RawMessage]) -> Vec<JobPosting> {
    let mut postings = Vec::new();

    for (position, message) in messages.iter().enumerate() {
        let extraction = extract_message(message);
        for skipped in &extraction.skipped {
            tracing::debug!(
                message = position,
                segment = skipped.index,
                reason = ?skipped.reason,
                "Skipped job alert segment"
            );
        }
        postings.extend(extraction.postings);
    }

    postings
}

/// Extracts postings from one message.
pub fn extract_message(message: &RawMessage) -> Extraction {
    let segments: Vec<&str> = message.plain_text.split(POSTING_MARKER).collect();
    let mut extraction = Extraction::default();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for index in 1..segments.len() {
        let Some(external_id) = posting_id(segments[index]) else {
            extraction.skipped.push(SkippedSegment {
                index,
                reason: SkipReason::MissingIdentifier,
            });
            continue;
        };

        if !seen_ids.insert(external_id.clone()) {
            extraction.skipped.push(SkippedSegment {
                index,
                reason: SkipReason::DuplicateInMessage,
            });
            continue;
        }

        let description = if index == 1 {
            segments[0]
        } else {
            strip_link(segments[index - 1])
        };
        let (title, company, location) = describe(description);

        extraction.postings.push(JobPosting::new(
            external_id,
            title,
            company,
            location,
            message.received_at,
        ));
    }

    extraction
}

/// Pulls the numeric id out of the link that immediately follows the marker.
fn posting_id(segment: &str) -> Option<String> {
    let link = segment.split_whitespace().next()?;
    POSTING_ID
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Drops the leading link token of a posting segment.
fn strip_link(segment: &str) -> &str {
    let trimmed = segment.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(end) => &trimmed[end..],
        None => "",
    }
}

fn is_social_proof(line: &str) -> bool {
    SOCIAL_PROOF.is_match(line)
}

/// Reads (title, company, location) from the trailing lines of a description.
fn describe(text: &str) -> (String, String, String) {
    let mut lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    while lines.last().is_some_and(|line| is_social_proof(line)) {
        lines.pop();
    }

    let location = lines.pop().unwrap_or_default().to_string();
    let company = lines.pop().unwrap_or_default().to_string();
    let title = lines.pop().unwrap_or_default().to_string();

    (title, company, location)
}
