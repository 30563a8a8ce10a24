// Daily triggers. A trigger runs a job once per day at a fixed local hour.
// Registering a trigger under a name that is already taken replaces the old
// one, so re-running setup never leaves two loops firing the same job.

use std::future::Future;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Hour of day (local time) at which the job alert run fires.
pub const JOB_ALERT_HOUR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub hour: u32,
    pub timezone: Tz,
}

impl DailySchedule {
    pub fn new(hour: u32, timezone: Tz) -> Self {
        Self {
            hour: hour.min(23),
            timezone,
        }
    }

    /// First firing time strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.timezone).date_naive();

        // Two days ahead is enough even if today's slot falls into a DST gap.
        for offset in 0..3 {
            let Some(day) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            if let Some(candidate) = self.fire_time_on(day) {
                if candidate > now {
                    return candidate;
                }
            }
        }

        now + chrono::Duration::hours(24)
    }

    fn fire_time_on(&self, day: NaiveDate) -> Option<DateTime<Utc>> {
        let local = day.and_hms_opt(self.hour, 0, 0)?;
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Named daily triggers backed by tokio tasks.
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: DashMap<String, JoinHandle<()>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` to run daily. An existing trigger with the same name
    /// is aborted first.
    pub fn register<F, Fut>(&self, name: &str, schedule: DailySchedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some((_, previous)) = self.triggers.remove(name) {
            previous.abort();
            tracing::info!(trigger = name, "Replaced existing trigger");
        }

        let trigger_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = schedule.next_run_after(now);
                tracing::info!(trigger = %trigger_name, next_run = %next, "Trigger scheduled");

                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                tracing::info!(trigger = %trigger_name, "Trigger firing");
                job().await;
            }
        });

        self.triggers.insert(name.to_string(), handle);
    }

    /// Stops and forgets a trigger. Returns whether one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        match self.triggers.remove(name) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl TriggerRegistry {
    fn is_registered(&self, name: &str) -> bool {
        self.triggers.contains_key(name)
    }

    fn len(&self) -> usize {
        self.triggers.len()
    }

    fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        for entry in self.triggers.iter() {
            entry.value().abort();
        }
    }
}
