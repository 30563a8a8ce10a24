// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "google/mod.rs"]
pub mod google;

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "secrets/sqlite_secret_store.rs"]
pub mod secrets;
