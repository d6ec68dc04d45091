// Exercise statistics: the running attempt/completion counters on each
// exercise, plus the submission-derived view served by the statistics
// endpoint.

use odyssey_common::store::Collection;
use odyssey_common::types::{CodeSubmission, Exercise, ExerciseMetadata};
use odyssey_common::{OdysseyError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::locks::{exercise_key, KeyedLocks};

#[derive(Clone)]
pub struct ExerciseStats {
    exercises: Collection<Exercise>,
    locks: Arc<KeyedLocks>,
}

impl ExerciseStats {
    pub fn new(exercises: Collection<Exercise>, locks: Arc<KeyedLocks>) -> Self {
        Self { exercises, locks }
    }

    /// Count one graded submission against the exercise's metadata
    ///
    /// Must be invoked exactly once per submission. Concurrent calls for the
    /// same exercise are serialized, so no increment is lost.
    #[instrument(skip(self))]
    pub async fn record(&self, exercise_id: &str, succeeded: bool) -> Result<ExerciseMetadata> {
        let _guard = self.locks.lock(&exercise_key(exercise_id)).await;

        let mut exercise = self
            .exercises
            .find_by_id(exercise_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Exercise", exercise_id))?;

        exercise.metadata.record_attempt(succeeded);
        let metadata = exercise.metadata;
        self.exercises.save(exercise).await?;

        debug!(
            total_attempts = metadata.total_attempts,
            total_completions = metadata.total_completions,
            success_rate = metadata.success_rate,
            "Exercise metadata updated"
        );
        Ok(metadata)
    }
}

/// Aggregate over the stored submissions of one exercise
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseStatistics {
    pub exercise_id: String,
    pub total_submissions: usize,
    pub successful_submissions: usize,
    /// Percentage as a ratio, not truncated; 0 when nothing was submitted
    pub success_rate: f64,
    pub metadata: ExerciseMetadata,
}

impl ExerciseStatistics {
    pub fn from_submissions(exercise: &Exercise, submissions: &[CodeSubmission]) -> Self {
        let total_submissions = submissions.len();
        let successful_submissions = submissions.iter().filter(|s| s.successful).count();
        let success_rate = if total_submissions > 0 {
            successful_submissions as f64 / total_submissions as f64 * 100.0
        } else {
            0.0
        };

        Self {
            exercise_id: exercise.id.clone(),
            total_submissions,
            successful_submissions,
            success_rate,
            metadata: exercise.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, sum_exercise};
    use chrono::Utc;

    async fn stats_with_exercise(id: &str) -> (ExerciseStats, Collection<Exercise>) {
        let exercises: Collection<Exercise> = Collection::new(memory_store());
        exercises.save(sum_exercise(id, None)).await.unwrap();
        let stats = ExerciseStats::new(exercises.clone(), Arc::new(KeyedLocks::new()));
        (stats, exercises)
    }

    #[tokio::test]
    async fn test_fail_pass_pass() {
        let (stats, exercises) = stats_with_exercise("ex-1").await;

        stats.record("ex-1", false).await.unwrap();
        stats.record("ex-1", true).await.unwrap();
        let metadata = stats.record("ex-1", true).await.unwrap();

        assert_eq!(metadata.total_attempts, 3);
        assert_eq!(metadata.total_completions, 2);
        assert_eq!(metadata.success_rate, 66);

        let stored = exercises.find_by_id("ex-1").await.unwrap().unwrap();
        assert_eq!(stored.metadata, metadata);
    }

    #[tokio::test]
    async fn test_unknown_exercise_is_not_found() {
        let (stats, _) = stats_with_exercise("ex-1").await;
        let err = stats.record("missing", true).await.unwrap_err();
        assert!(matches!(err, OdysseyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_records_lose_nothing() {
        let (stats, exercises) = stats_with_exercise("ex-1").await;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move { stats.record("ex-1", true).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = exercises.find_by_id("ex-1").await.unwrap().unwrap();
        assert_eq!(stored.metadata.total_attempts, 50);
        assert_eq!(stored.metadata.total_completions, 50);
        assert_eq!(stored.metadata.success_rate, 100);
    }

    #[test]
    fn test_statistics_from_submissions() {
        let exercise = sum_exercise("ex-1", None);
        let submission = |successful| CodeSubmission {
            id: String::new(),
            user_id: "u1".to_string(),
            exercise_id: "ex-1".to_string(),
            code: String::new(),
            language: "python".to_string(),
            successful,
            submitted_at: Utc::now(),
            metrics: None,
        };

        let stats = ExerciseStatistics::from_submissions(
            &exercise,
            &[submission(false), submission(true), submission(true)],
        );
        assert_eq!(stats.total_submissions, 3);
        assert_eq!(stats.successful_submissions, 2);
        assert!((stats.success_rate - 66.666).abs() < 0.01);

        let empty = ExerciseStatistics::from_submissions(&exercise, &[]);
        assert_eq!(empty.success_rate, 0.0);
    }
}
