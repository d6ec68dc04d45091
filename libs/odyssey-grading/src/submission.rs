//! Submission pipeline
//!
//! `submit` is the only path that grades against a stored exercise:
//! evaluate -> persist exactly one `CodeSubmission` -> count it in the
//! exercise metadata -> on success, cascade into the learner's progress.
//!
//! Runner failures are absorbed by the evaluator and never abort the
//! pipeline. Store failures do, and are returned to the caller.

use chrono::Utc;
use odyssey_common::config::MAX_HISTORY_PAGE_SIZE;
use odyssey_common::store::Collection;
use odyssey_common::types::{
    CodeExecutionResponse, CodeSubmission, ExecutionMetrics, Exercise, Page, TestCase,
};
use odyssey_common::{OdysseyError, Result};
use tracing::{info, instrument};

use crate::evaluator::{Evaluation, Evaluator};
use crate::progress::ProgressTracker;
use crate::stats::{ExerciseStatistics, ExerciseStats};

#[derive(Clone)]
pub struct SubmissionService {
    evaluator: Evaluator,
    exercises: Collection<Exercise>,
    submissions: Collection<CodeSubmission>,
    stats: ExerciseStats,
    progress: ProgressTracker,
}

impl SubmissionService {
    pub fn new(
        evaluator: Evaluator,
        exercises: Collection<Exercise>,
        submissions: Collection<CodeSubmission>,
        stats: ExerciseStats,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            evaluator,
            exercises,
            submissions,
            stats,
            progress,
        }
    }

    /// Ad hoc run against caller-supplied test cases. Nothing is persisted.
    pub async fn execute(
        &self,
        code: &str,
        language: &str,
        test_cases: &[TestCase],
    ) -> CodeExecutionResponse {
        self.evaluator
            .evaluate(code, language, test_cases)
            .await
            .into_response(None)
    }

    /// Grade `code` against a stored exercise and record the attempt
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn submit(
        &self,
        exercise_id: &str,
        code: &str,
        user_id: &str,
    ) -> Result<CodeExecutionResponse> {
        let exercise = self
            .exercises
            .find_by_id(exercise_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Exercise", exercise_id))?;

        let evaluation = self
            .evaluator
            .evaluate(code, &exercise.language, &exercise.test_cases)
            .await;
        let succeeded = evaluation.all_passed;

        let submission = self
            .submissions
            .save(build_submission(&exercise, code, user_id, &evaluation))
            .await?;

        info!(
            submission_id = %submission.id,
            passed = evaluation.tests_passed,
            total = evaluation.total_tests(),
            succeeded,
            "Submission recorded"
        );

        self.stats.record(&exercise.id, succeeded).await?;

        if succeeded {
            if let Some(lesson_id) = &exercise.lesson_id {
                self.progress
                    .mark_exercise_complete(user_id, lesson_id, &exercise.id)
                    .await?;
            }
        }

        let score = if succeeded { exercise.points_value } else { 0 };
        Ok(evaluation.into_response(Some(score)))
    }

    /// The user's submissions, newest first, `page` zero-based
    pub async fn history(
        &self,
        user_id: &str,
        page: usize,
        size: usize,
    ) -> Result<Page<CodeSubmission>> {
        let size = size.clamp(1, MAX_HISTORY_PAGE_SIZE);
        let mut all = self.submissions.find_by(|s| s.user_id == user_id).await?;
        all.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .collect();

        Ok(Page {
            items,
            page,
            size,
            total,
        })
    }

    pub async fn exercise_submissions(&self, exercise_id: &str) -> Result<Vec<CodeSubmission>> {
        self.submissions
            .find_by(|s| s.exercise_id == exercise_id)
            .await
    }

    pub async fn statistics(&self, exercise_id: &str) -> Result<ExerciseStatistics> {
        let exercise = self
            .exercises
            .find_by_id(exercise_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Exercise", exercise_id))?;
        let submissions = self.exercise_submissions(exercise_id).await?;
        Ok(ExerciseStatistics::from_submissions(&exercise, &submissions))
    }
}

fn build_submission(
    exercise: &Exercise,
    code: &str,
    user_id: &str,
    evaluation: &Evaluation,
) -> CodeSubmission {
    CodeSubmission {
        id: String::new(),
        user_id: user_id.to_string(),
        exercise_id: exercise.id.clone(),
        code: code.to_string(),
        language: exercise.language.clone(),
        successful: evaluation.all_passed,
        submitted_at: Utc::now(),
        metrics: Some(ExecutionMetrics {
            execution_time_ms: evaluation.elapsed_ms,
            memory_used_bytes: None,
            tests_passed: evaluation.tests_passed,
            total_tests: evaluation.total_tests(),
        }),
    }
}
