use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NOTES_LEN: usize = 2000;

/// Administratively tracked completion of tasks the platform cannot observe.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskProgress {
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub completion_percentage: f64,
    pub validated: bool,
    pub manual_notes: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
}

/// Raw reviewer input; every field falls back to the stored record.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskProgressInput {
    pub total_tasks: Option<i32>,
    pub completed_tasks: Option<i32>,
    pub completion_percentage: Option<f64>,
    pub validated: Option<bool>,
    pub manual_notes: Option<String>,
}

impl TaskProgress {
    /// Merges reviewer input over the previous record and restores the invariants
    /// `completed_tasks <= total_tasks` and `completion_percentage` in 0..=100.
    pub fn merge(
        previous: &TaskProgress,
        input: &TaskProgressInput,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> TaskProgress {
        let total_tasks = input.total_tasks.unwrap_or(previous.total_tasks).max(0);
        let completed_tasks = input
            .completed_tasks
            .unwrap_or(previous.completed_tasks)
            .max(0)
            .min(total_tasks);

        let from_count = if total_tasks > 0 {
            f64::from(completed_tasks) / f64::from(total_tasks) * 100.0
        } else {
            0.0
        };
        let requested = match input.completion_percentage {
            Some(value) if value.is_finite() => value,
            Some(_) => from_count,
            None if input.total_tasks.is_some() || input.completed_tasks.is_some() => from_count,
            None => previous.completion_percentage,
        };
        let completion_percentage = (requested.clamp(0.0, 100.0) * 100.0).round() / 100.0;

        let validated = input.validated.unwrap_or(previous.validated);
        let manual_notes = input
            .manual_notes
            .as_ref()
            .or(previous.manual_notes.as_ref())
            .map(|notes| notes.trim().chars().take(MAX_NOTES_LEN).collect::<String>())
            .filter(|notes| !notes.is_empty());

        let (validated_at, validated_by) = if validated {
            (
                previous.validated_at.or(Some(now)),
                previous
                    .validated_by
                    .clone()
                    .filter(|_| previous.validated)
                    .or_else(|| Some(reviewer.to_string())),
            )
        } else {
            (None, None)
        };

        TaskProgress {
            total_tasks,
            completed_tasks,
            completion_percentage,
            validated,
            manual_notes,
            validated_at,
            validated_by,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion_percentage >= 100.0
    }

    /// Validated and above the threshold: the certificate may be downloaded.
    pub fn unlocks_certificate(&self, threshold: f64) -> bool {
        self.validated && self.completion_percentage >= threshold
    }
}
