use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the job event channel. Slow subscribers see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A lifecycle change published by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    Admitted {
        job_id: String,
    },
    Progress {
        job_id: String,
        progress: u8,
    },
    Completed {
        job_id: String,
        actual_time_ms: i64,
    },
    Failed {
        job_id: String,
        error: String,
    },
    Cancelled {
        job_id: String,
    },
    Retried {
        job_id: String,
    },
    EffectCreated {
        job_id: String,
        effect_id: String,
    },
    ConcurrencyChanged {
        max_concurrent: usize,
    },
    Paused,
    Resumed,
}

impl JobEvent {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Admitted { job_id }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id }
            | Self::Retried { job_id }
            | Self::EffectCreated { job_id, .. } => Some(job_id),
            Self::ConcurrencyChanged { .. } | Self::Paused | Self::Resumed => None,
        }
    }
}

/// Publish an event. Returns silently when nobody is subscribed.
pub fn publish(tx: &broadcast::Sender<JobEvent>, event: JobEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = JobEvent::Progress {
            job_id: "abc".into(),
            progress: 40,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"progress\":40"));
    }

    #[test]
    fn test_unit_event_serialization() {
        let json = serde_json::to_string(&JobEvent::Paused).unwrap();
        assert_eq!(json, "{\"type\":\"Paused\"}");
    }

    #[test]
    fn test_job_id_accessor() {
        let event = JobEvent::EffectCreated {
            job_id: "j1".into(),
            effect_id: "e1".into(),
        };
        assert_eq!(event.job_id(), Some("j1"));
        assert_eq!(JobEvent::Resumed.job_id(), None);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        publish(&tx, JobEvent::Resumed);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let (tx, mut rx) = broadcast::channel(4);
        publish(&tx, JobEvent::Cancelled { job_id: "j9".into() });
        assert_eq!(rx.recv().await.unwrap(), JobEvent::Cancelled { job_id: "j9".into() });
    }
}
