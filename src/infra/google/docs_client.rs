// =============================================================================
// GOOGLE DOCS CLIENT
// =============================================================================
//
// Reads a document's body as plain text and inserts text into it. Used by the
// assistant through `DocumentContext`.
//
// The REST API has no notion of the user's cursor. A caller that knows where
// the cursor is passes its index; otherwise text is appended as a new
// paragraph at the end of the body.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::service_account_auth::ServiceAccountAuth;
use crate::core::assistant::{AssistantError, ContainerKind, WorkspaceContext};

const DOCS_BASE_URL: &str = "https://docs.googleapis.com/v1/documents";

// =============================================================================
// GOOGLE DOCS API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    title: String,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    paragraph: Option<Paragraph>,
    table: Option<Table>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    #[serde(default)]
    table_rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    #[serde(default)]
    table_cells: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct GoogleDocsClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
}

impl GoogleDocsClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }

    /// Extracts the document ID from a Google Docs URL, or passes a bare ID through.
    pub fn extract_doc_id(url_or_id: &str) -> Option<String> {
        if url_or_id.contains("docs.google.com") {
            let start = url_or_id.find("/document/d/")?;
            let after_d = &url_or_id[start + 12..];
            let end = after_d.find('/').unwrap_or(after_d.len());
            let id = &after_d[..end];
            (!id.is_empty()).then(|| id.to_string())
        } else if !url_or_id.is_empty() && !url_or_id.contains('/') && !url_or_id.contains(' ') {
            Some(url_or_id.to_string())
        } else {
            None
        }
    }

    pub async fn get_document_text(
        &self,
        document_id: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .client
            .get(format!("{}/{}", DOCS_BASE_URL, document_id))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!(
                "Google Docs API error ({}): {}. \
                 Make sure the document is shared with your service account email.",
                status, text
            )
            .into());
        }

        let document: Document = response.json().await?;
        let text = document_text(&document);

        tracing::debug!(
            title = %document.title,
            chars = text.len(),
            "Fetched Google Doc"
        );

        Ok(text)
    }

    pub async fn insert_text(
        &self,
        document_id: &str,
        cursor_index: Option<u64>,
        text: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .client
            .post(format!("{}/{}:batchUpdate", DOCS_BASE_URL, document_id))
            .bearer_auth(token)
            .json(&json!({ "requests": [insert_request(cursor_index, text)] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Google Docs insert failed ({}): {}", status, text).into());
        }

        Ok(())
    }
}

/// One `insertText` request: at the cursor when known, else as a new
/// paragraph at the end of the body.
fn insert_request(cursor_index: Option<u64>, text: &str) -> Value {
    match cursor_index {
        Some(index) => json!({
            "insertText": { "text": text, "location": { "index": index } }
        }),
        None => json!({
            "insertText": { "text": format!("\n{}", text), "endOfSegmentLocation": {} }
        }),
    }
}

fn document_text(document: &Document) -> String {
    let mut output = String::new();
    if let Some(body) = &document.body {
        for element in &body.content {
            element_text(element, &mut output);
        }
    }
    output
}

fn element_text(element: &StructuralElement, output: &mut String) {
    if let Some(paragraph) = &element.paragraph {
        for run in paragraph.elements.iter().filter_map(|e| e.text_run.as_ref()) {
            if let Some(content) = &run.content {
                output.push_str(content);
            }
        }
    }

    if let Some(table) = &element.table {
        for row in &table.table_rows {
            let cells: Vec<String> = row
                .table_cells
                .iter()
                .map(|cell| {
                    let mut cell_text = String::new();
                    for inner in &cell.content {
                        element_text(inner, &mut cell_text);
                    }
                    cell_text.trim().to_string()
                })
                .collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
    }
}

// =============================================================================
// DOCUMENT CONTEXT
// =============================================================================

/// A Google Doc as seen by the assistant.
pub struct DocumentContext {
    client: Arc<GoogleDocsClient>,
    document_id: String,
    cursor_index: Option<u64>,
}

impl DocumentContext {
    pub fn new(
        client: Arc<GoogleDocsClient>,
        document_id: impl Into<String>,
        cursor_index: Option<u64>,
    ) -> Self {
        Self {
            client,
            document_id: document_id.into(),
            cursor_index,
        }
    }
}

#[async_trait]
impl WorkspaceContext for DocumentContext {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Document
    }

    async fn content(&self) -> Result<String, AssistantError> {
        self.client
            .get_document_text(&self.document_id)
            .await
            .map_err(|e| AssistantError::Workspace(e.to_string()))
    }

    async fn insert_at_cursor(&self, text: &str) -> Result<(), AssistantError> {
        self.client
            .insert_text(&self.document_id, self.cursor_index, text)
            .await
            .map_err(|e| AssistantError::Workspace(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_doc_id_from_url() {
        let url = "https://docs.google.com/document/d/1abc123xyz/edit";
        assert_eq!(
            GoogleDocsClient::extract_doc_id(url),
            Some("1abc123xyz".to_string())
        );
        assert_eq!(
            GoogleDocsClient::extract_doc_id("1abc123xyz"),
            Some("1abc123xyz".to_string())
        );
        assert_eq!(GoogleDocsClient::extract_doc_id("not an id"), None);
    }

    #[test]
    fn test_document_text_flattens_paragraphs_and_tables() {
        let document: Document = serde_json::from_value(json!({
            "documentId": "d1",
            "title": "Plan",
            "body": { "content": [
                { "sectionBreak": {} },
                { "paragraph": { "elements": [
                    { "textRun": { "content": "Goals " } },
                    { "textRun": { "content": "for Q3\n" } }
                ] } },
                { "table": { "tableRows": [
                    { "tableCells": [
                        { "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "Owner\n" } } ] } } ] },
                        { "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "Ada\n" } } ] } } ] }
                    ] }
                ] } }
            ] }
        }))
        .unwrap();

        assert_eq!(document_text(&document), "Goals for Q3\n| Owner | Ada |\n");
    }

    #[test]
    fn test_insert_request_uses_cursor_when_known() {
        let request = insert_request(Some(17), "hello");
        assert_eq!(request["insertText"]["location"]["index"], 17);
        assert_eq!(request["insertText"]["text"], "hello");
    }

    #[test]
    fn test_insert_request_appends_paragraph_without_cursor() {
        let request = insert_request(None, "hello");
        assert!(request["insertText"]["endOfSegmentLocation"].is_object());
        assert_eq!(request["insertText"]["text"], "\nhello");
    }
}
