use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModuleProgress {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub status: ProgressStatus,
    pub progress_percentage: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: i32,
    pub quiz_score: Option<f64>,
    pub quiz_passed: bool,
    pub quiz_attempts: i32,
    /// Bumped on every write; guards read-modify-write cycles.
    pub version: i64,
}

impl ModuleProgress {
    pub fn new(user_id: &str, course_id: &str, module_id: &str) -> Self {
        ModuleProgress {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            status: ProgressStatus::NotStarted,
            progress_percentage: 0,
            is_completed: false,
            completed_at: None,
            last_accessed_at: None,
            time_spent_minutes: 0,
            quiz_score: None,
            quiz_passed: false,
            quiz_attempts: 0,
            version: 0,
        }
    }

    /// Completion is sticky: the timestamp is only set the first time.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ProgressStatus::Completed;
        self.progress_percentage = 100;
        self.is_completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Applies a percentage without ever regressing a completed record.
    pub fn apply_percentage(&mut self, percentage: i32) {
        if self.is_completed {
            return;
        }
        self.progress_percentage = percentage.clamp(0, 100);
        if self.progress_percentage > 0 {
            self.status = ProgressStatus::InProgress;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LessonProgress {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub lesson_id: String,
    pub status: ProgressStatus,
    pub progress_percentage: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: i32,
    pub last_position_seconds: i32,
    pub notes: Option<String>,
    pub version: i64,
}

impl LessonProgress {
    pub fn new(user_id: &str, course_id: &str, module_id: &str, lesson_id: &str) -> Self {
        LessonProgress {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            lesson_id: lesson_id.to_string(),
            status: ProgressStatus::NotStarted,
            progress_percentage: 0,
            is_completed: false,
            completed_at: None,
            last_accessed_at: None,
            time_spent_minutes: 0,
            last_position_seconds: 0,
            notes: None,
            version: 0,
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ProgressStatus::Completed;
        self.progress_percentage = 100;
        self.is_completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Playback or reading percentage; reaching 100 completes the lesson.
    pub fn apply_percentage(&mut self, percentage: i32, now: DateTime<Utc>) {
        if self.is_completed {
            return;
        }
        let percentage = percentage.clamp(0, 100);
        if percentage >= 100 {
            self.mark_completed(now);
            return;
        }
        self.progress_percentage = self.progress_percentage.max(percentage);
        if self.progress_percentage > 0 {
            self.status = ProgressStatus::InProgress;
        }
    }
}

/// Rounded share of `completed` in `total`, as a whole percentage.
pub fn completion_percentage(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed as f64 / total as f64) * 100.0).round() as i32
}
