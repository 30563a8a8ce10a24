// The core module contains all business logic.
// Each feature gets its own submodule; nothing in here talks HTTP or SQL.

#[path = "job_alerts/mod.rs"]
pub mod job_alerts;

#[path = "assistant/mod.rs"]
pub mod assistant;

#[path = "schedule/daily_trigger.rs"]
pub mod schedule;
