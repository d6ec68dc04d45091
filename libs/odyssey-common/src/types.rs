use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::store::Document;

/// Sentinel shown in place of the description of a non-visible test case
pub const HIDDEN_TEST_DESCRIPTION: &str = "Hidden Test Case";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub description: String,
}

/// Running aggregate over every graded submission of an exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseMetadata {
    pub total_attempts: u32,
    pub total_completions: u32,
    /// Integer percentage, truncated. Zero until the first attempt.
    pub success_rate: u32,
}

impl ExerciseMetadata {
    /// Count one graded attempt. Calling this twice for the same
    /// submission double-counts.
    pub fn record_attempt(&mut self, succeeded: bool) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        if succeeded {
            self.total_completions = self.total_completions.saturating_add(1);
        }
        self.success_rate = success_rate(self.total_completions, self.total_attempts);
    }
}

fn success_rate(completions: u32, attempts: u32) -> u32 {
    if attempts == 0 {
        return 0;
    }
    (u64::from(completions) * 100 / u64::from(attempts)) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub language: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub points_value: u32,
    #[serde(default)]
    pub metadata: ExerciseMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
}

impl Exercise {
    /// Copy suitable for learners: no solution, and hidden test cases keep
    /// only their position.
    pub fn for_learner(&self) -> Self {
        let test_cases = self
            .test_cases
            .iter()
            .map(|tc| {
                if tc.is_visible {
                    tc.clone()
                } else {
                    TestCase {
                        input: String::new(),
                        expected_output: String::new(),
                        is_visible: false,
                        description: HIDDEN_TEST_DESCRIPTION.to_string(),
                    }
                }
            })
            .collect();

        Self {
            solution: None,
            test_cases,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    pub tests_passed: u32,
    pub total_tests: u32,
}

/// One grading attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSubmission {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub exercise_id: String,
    pub code: String,
    pub language: String,
    pub successful: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExecutionMetrics>,
}

/// Per-test verdict returned to the caller, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub description: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExecutionResponse {
    pub success: bool,
    pub test_results: Vec<TestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: String,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_exercises: BTreeSet<String>,
    #[serde(default)]
    pub lesson_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_id: String,
    pub completed: bool,
    #[serde(default)]
    pub overall_module_progress: f64,
    #[serde(default)]
    pub lessons_progress: Vec<LessonProgress>,
}

/// A learner's completion tree for one course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub status: ProgressStatus,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overall_progress: f64,
    #[serde(default)]
    pub modules_progress: Vec<ModuleProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub lesson_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructor_id: String,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default)]
    pub id: String,
    pub course_id: String,
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub exercise_ids: Vec<String>,
    #[serde(default)]
    pub required_lesson_ids: Vec<String>,
}

/// One page of a listing, zero-based
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Job handed to an external executor through the runner queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: Uuid,
    pub language: String,
    pub source_code: String,
    pub input: String,
    pub timeout_ms: u64,
}

/// Raw reply of the external executor for one `RunRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub job_id: Uuid,
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub timed_out: bool,
}

macro_rules! document {
    ($ty:ty, $collection:literal) => {
        impl Document for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn assign_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

document!(Exercise, "exercises");
document!(CodeSubmission, "code_submissions");
document!(Progress, "progress");
document!(Course, "courses");
document!(Lesson, "lessons");
