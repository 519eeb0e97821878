use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;
use std::sync::{
    atomic::{
        AtomicI64,
        Ordering,
    },
    Arc,
};

/// Time of the last successful publish, shared between the publisher and the status endpoint.
///
/// Starts out at the time it was created so a fresh process is not reported as stale.
#[derive(Debug, Clone)]
pub struct PushHealth {
    last_push_millis: Arc<AtomicI64>,
}

impl Default for PushHealth {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl PushHealth {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            last_push_millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn record(&self, at: DateTime<Utc>) {
        self.last_push_millis.fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_push_millis(&self) -> i64 {
        self.last_push_millis.load(Ordering::Relaxed)
    }

    /// Whole minutes since the last push, rounded up.
    pub fn minutes_since_last_push(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now.timestamp_millis() - self.last_push_millis()).abs();
        (elapsed + 59_999) / 60_000
    }

    pub fn status(&self, now: DateTime<Utc>, stale_after_minutes: u64) -> PushStatus {
        let minutes = self.minutes_since_last_push(now);
        PushStatus {
            result: u64::try_from(minutes).is_ok_and(|minutes| minutes < stale_after_minutes),
            last_upload: self.last_push_millis(),
            diff_complete_minutes: minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStatus {
    pub result: bool,
    pub last_upload: i64,
    pub diff_complete_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn reports_minutes_rounded_up() {
        let start = Utc::now();
        let health = PushHealth::new(start);
        assert_eq!(health.minutes_since_last_push(start), 0);
        assert_eq!(health.minutes_since_last_push(start + Duration::seconds(1)), 1);
        assert_eq!(health.minutes_since_last_push(start + Duration::seconds(60)), 1);
        assert_eq!(health.minutes_since_last_push(start + Duration::seconds(61)), 2);
    }

    #[test]
    fn goes_stale_without_pushes() {
        let start = Utc::now();
        let health = PushHealth::new(start);
        let later = start + Duration::minutes(300);

        assert_eq!(
            health.status(later, 300),
            PushStatus {
                result: false,
                last_upload: start.timestamp_millis(),
                diff_complete_minutes: 300,
            }
        );

        health.record(later - Duration::minutes(2));
        assert!(health.status(later, 300).result);
        assert_eq!(
            serde_json::to_value(health.status(later, 300)).unwrap(),
            serde_json::json!({
                "result": true,
                "lastUpload": (later - Duration::minutes(2)).timestamp_millis(),
                "diffCompleteMinutes": 2
            })
        );
    }
}
