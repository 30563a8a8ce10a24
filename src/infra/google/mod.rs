// Google Workspace infra.
// - `service_account_auth.rs` mints access tokens shared by every client.
// - `gmail_client.rs` reads alert mail and sends the digest.
// - `sheets_client.rs` backs the job tracker and the spreadsheet context.
// - `docs_client.rs` backs the document context.

pub mod docs_client;
pub mod gmail_client;
pub mod service_account_auth;
pub mod sheets_client;

pub use docs_client::{DocumentContext, GoogleDocsClient};
pub use gmail_client::GmailClient;
pub use service_account_auth::ServiceAccountAuth;
pub use sheets_client::{SheetsClient, SheetsJobStore, SpreadsheetContext};
