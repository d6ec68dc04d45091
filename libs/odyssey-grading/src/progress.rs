//! Progress Tracker - hierarchical course completion
//!
//! One `Progress` document per (user, course), holding a snapshot of the
//! course's module/lesson tree taken when the course was started.
//!
//! **State machine:** NOT_STARTED -> IN_PROGRESS (at start) -> COMPLETED.
//! COMPLETED is terminal and its `completed_at` is stamped exactly once.
//!
//! **Cascade:** exercise -> lesson -> module -> course. A lesson completes
//! once every exercise currently configured on it has been solved; a module completes when all its lessons have; the course
//! completes when all its modules have.
//!
//! **Dangling references:** the tree is never re-synced with the course.
//! Lessons added after start are unreachable for that learner. A lesson id
//! present in the tree but missing from the store still records the
//! exercise, but cannot cascade since its exercise count is unknown.

use chrono::{DateTime, Utc};
use odyssey_common::store::Collection;
use odyssey_common::types::{
    Course, Lesson, LessonProgress, ModuleProgress, Progress, ProgressStatus,
};
use odyssey_common::{OdysseyError, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::locks::{progress_key, KeyedLocks};

#[derive(Clone)]
pub struct ProgressTracker {
    progress: Collection<Progress>,
    courses: Collection<Course>,
    lessons: Collection<Lesson>,
    locks: Arc<KeyedLocks>,
}

impl ProgressTracker {
    pub fn new(
        progress: Collection<Progress>,
        courses: Collection<Course>,
        lessons: Collection<Lesson>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            progress,
            courses,
            lessons,
            locks,
        }
    }

    /// Enroll `user_id` in `course_id`
    ///
    /// Fails with `Conflict` when the user already started this course.
    #[instrument(skip(self))]
    pub async fn start_course(&self, user_id: &str, course_id: &str) -> Result<Progress> {
        let _guard = self.locks.lock(&progress_key(user_id, course_id)).await;

        if self.find_for(user_id, course_id).await?.is_some() {
            return Err(OdysseyError::Conflict(format!(
                "Course {} already started by user {}",
                course_id, user_id
            )));
        }

        let course = self
            .courses
            .find_by_id(course_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Course", course_id))?;

        let modules_progress = course
            .modules
            .iter()
            .map(|module| ModuleProgress {
                module_id: module.id.clone(),
                completed: false,
                overall_module_progress: 0.0,
                lessons_progress: module
                    .lesson_ids
                    .iter()
                    .map(|lesson_id| LessonProgress {
                        lesson_id: lesson_id.clone(),
                        status: ProgressStatus::NotStarted,
                        ..Default::default()
                    })
                    .collect(),
            })
            .collect();

        let progress = Progress {
            id: String::new(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            status: ProgressStatus::InProgress,
            start_date: Utc::now(),
            completed_at: None,
            overall_progress: 0.0,
            modules_progress,
        };

        let progress = self.progress.save(progress).await?;
        info!(progress_id = %progress.id, modules = course.modules.len(), "Course started");
        Ok(progress)
    }

    pub async fn get_progress(&self, user_id: &str, course_id: &str) -> Result<Progress> {
        self.find_for(user_id, course_id)
            .await?
            .ok_or_else(|| OdysseyError::NotFound("Progress not found".to_string()))
    }

    pub async fn user_progress(&self, user_id: &str) -> Result<Vec<Progress>> {
        self.progress.find_by(|p| p.user_id == user_id).await
    }

    /// Record `exercise_id` as solved in every course of the user that
    /// contains `lesson_id`, cascading when the lesson becomes complete.
    ///
    /// Idempotent per exercise id. Users without a matching progress record
    /// are silently ignored.
    #[instrument(skip(self))]
    pub async fn mark_exercise_complete(
        &self,
        user_id: &str,
        lesson_id: &str,
        exercise_id: &str,
    ) -> Result<()> {
        let lesson = self.lessons.find_by_id(lesson_id).await?;
        if lesson.is_none() {
            warn!("Lesson missing from store; exercise recorded without cascade");
        }

        let candidates: Vec<String> = self
            .user_progress(user_id)
            .await?
            .into_iter()
            .filter(|p| locate_lesson(p, lesson_id).is_some())
            .map(|p| p.course_id)
            .collect();

        for course_id in candidates {
            let _guard = self.locks.lock(&progress_key(user_id, &course_id)).await;

            // Re-read under the lock; the snapshot above may be stale
            let Some(mut progress) = self.find_for(user_id, &course_id).await? else {
                continue;
            };
            let Some((m, l)) = locate_lesson(&progress, lesson_id) else {
                continue;
            };

            let lesson_progress = &mut progress.modules_progress[m].lessons_progress[l];
            lesson_progress.completed_exercises.insert(exercise_id.to_string());
            if lesson_progress.status == ProgressStatus::NotStarted {
                lesson_progress.status = ProgressStatus::InProgress;
            }

            let module_id = progress.modules_progress[m].module_id.clone();
            let now = Utc::now();
            match &lesson {
                Some(lesson) => {
                    let lesson_progress = &mut progress.modules_progress[m].lessons_progress[l];
                    // Ids no longer configured on the lesson do not count
                    let done = lesson
                        .exercise_ids
                        .iter()
                        .filter(|id| lesson_progress.completed_exercises.contains(*id))
                        .count();
                    let required = lesson.exercise_ids.len();
                    lesson_progress.lesson_progress = exercise_ratio(done, required);

                    if done >= required {
                        debug!(course_id = %course_id, done, required, "Lesson requirement met");
                        complete_lesson(&mut progress, &module_id, lesson_id, now);
                    }
                }
                None => refresh_ratios(&mut progress),
            }

            self.progress.save(progress).await?;
        }

        Ok(())
    }

    /// Mark a lesson complete and propagate to its module and course
    #[instrument(skip(self))]
    pub async fn complete_lesson_and_cascade(
        &self,
        user_id: &str,
        course_id: &str,
        module_id: &str,
        lesson_id: &str,
    ) -> Result<Progress> {
        let _guard = self.locks.lock(&progress_key(user_id, course_id)).await;

        let mut progress = self.get_progress(user_id, course_id).await?;
        if !complete_lesson(&mut progress, module_id, lesson_id, Utc::now()) {
            return Err(OdysseyError::NotFound(format!(
                "Lesson {} not part of module {} in this progress",
                lesson_id, module_id
            )));
        }
        self.progress.save(progress).await
    }

    /// True iff the lesson is COMPLETED in any of the user's courses.
    /// Absence of a record is not an error.
    pub async fn is_lesson_completed(&self, user_id: &str, lesson_id: &str) -> Result<bool> {
        Ok(self.user_progress(user_id).await?.iter().any(|progress| {
            progress
                .modules_progress
                .iter()
                .flat_map(|m| m.lessons_progress.iter())
                .any(|lp| lp.lesson_id == lesson_id && lp.status == ProgressStatus::Completed)
        }))
    }

    /// Access predicate: the user has started the course
    pub async fn has_access_to_course(&self, user_id: &str, course_id: &str) -> Result<bool> {
        Ok(self.find_for(user_id, course_id).await?.is_some())
    }

    /// Every lesson required by `lesson_id` is completed for the user
    pub async fn check_prerequisites(&self, user_id: &str, lesson_id: &str) -> Result<bool> {
        let lesson = self
            .lessons
            .find_by_id(lesson_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Lesson", lesson_id))?;

        for required in &lesson.required_lesson_ids {
            if !self.is_lesson_completed(user_id, required).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn find_for(&self, user_id: &str, course_id: &str) -> Result<Option<Progress>> {
        Ok(self
            .progress
            .find_by(|p| p.user_id == user_id && p.course_id == course_id)
            .await?
            .into_iter()
            .next())
    }
}

/// (module index, lesson index) of `lesson_id` in the tree
fn locate_lesson(progress: &Progress, lesson_id: &str) -> Option<(usize, usize)> {
    progress
        .modules_progress
        .iter()
        .enumerate()
        .find_map(|(m, module)| {
            module
                .lessons_progress
                .iter()
                .position(|lp| lp.lesson_id == lesson_id)
                .map(|l| (m, l))
        })
}

fn exercise_ratio(done: usize, required: usize) -> f64 {
    if required == 0 {
        return if done > 0 { 1.0 } else { 0.0 };
    }
    (done as f64 / required as f64).min(1.0)
}

fn completed_ratio(lessons: &[&LessonProgress]) -> f64 {
    if lessons.is_empty() {
        return 0.0;
    }
    let completed = lessons
        .iter()
        .filter(|lp| lp.status == ProgressStatus::Completed)
        .count();
    completed as f64 / lessons.len() as f64
}

fn refresh_ratios(progress: &mut Progress) {
    for module in progress.modules_progress.iter_mut() {
        let lessons: Vec<&LessonProgress> = module.lessons_progress.iter().collect();
        module.overall_module_progress = completed_ratio(&lessons);
    }
    let all_lessons: Vec<&LessonProgress> = progress
        .modules_progress
        .iter()
        .flat_map(|m| m.lessons_progress.iter())
        .collect();
    progress.overall_progress = completed_ratio(&all_lessons);
}

/// Complete one lesson in place and recompute module and course state.
/// Returns false when the module/lesson pair is not in the tree.
fn complete_lesson(
    progress: &mut Progress,
    module_id: &str,
    lesson_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some(module) = progress
        .modules_progress
        .iter_mut()
        .find(|m| m.module_id == module_id)
    else {
        return false;
    };
    let Some(lesson) = module
        .lessons_progress
        .iter_mut()
        .find(|lp| lp.lesson_id == lesson_id)
    else {
        return false;
    };

    if lesson.status != ProgressStatus::Completed {
        lesson.status = ProgressStatus::Completed;
        lesson.completed_at = Some(now);
    }
    lesson.lesson_progress = 1.0;

    module.completed = module
        .lessons_progress
        .iter()
        .all(|lp| lp.status == ProgressStatus::Completed);

    refresh_ratios(progress);

    let all_modules_completed = progress.modules_progress.iter().all(|m| m.completed);
    if all_modules_completed && progress.status != ProgressStatus::Completed {
        progress.status = ProgressStatus::Completed;
        progress.completed_at = Some(now);
        info!(course_id = %progress.course_id, user_id = %progress.user_id, "Course completed");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, seed_course, Layout};
    use odyssey_common::store::DocumentStore;

    struct Harness {
        store: Arc<dyn DocumentStore>,
        tracker: ProgressTracker,
    }

    fn harness() -> Harness {
        let store = memory_store();
        let tracker = ProgressTracker::new(
            Collection::new(store.clone()),
            Collection::new(store.clone()),
            Collection::new(store.clone()),
            Arc::new(KeyedLocks::new()),
        );
        Harness { store, tracker }
    }

    /// 1 module, lesson l1 with two exercises, lesson l2 with one
    const TWO_LESSONS: Layout<'static> = &[("m1", &[("l1", &["e1", "e2"]), ("l2", &["e3"])])];

    #[tokio::test]
    async fn test_start_course_seeds_tree() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;

        let progress = h.tracker.start_course("u1", "c1").await.unwrap();

        assert!(!progress.id.is_empty());
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(progress.completed_at, None);
        assert_eq!(progress.modules_progress.len(), 1);
        let module = &progress.modules_progress[0];
        assert_eq!(module.module_id, "m1");
        assert!(!module.completed);
        let lesson_ids: Vec<&str> = module
            .lessons_progress
            .iter()
            .map(|lp| lp.lesson_id.as_str())
            .collect();
        assert_eq!(lesson_ids, vec!["l1", "l2"]);
        assert!(module
            .lessons_progress
            .iter()
            .all(|lp| lp.status == ProgressStatus::NotStarted));
    }

    #[tokio::test]
    async fn test_start_course_twice_conflicts() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;

        h.tracker.start_course("u1", "c1").await.unwrap();
        let err = h.tracker.start_course("u1", "c1").await.unwrap_err();

        assert!(matches!(err, OdysseyError::Conflict(_)));
        assert_eq!(h.tracker.user_progress("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_unknown_course() {
        let h = harness();
        let err = h.tracker.start_course("u1", "nope").await.unwrap_err();
        assert!(matches!(err, OdysseyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cascade_one_module_two_lessons() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();
        h.tracker.mark_exercise_complete("u1", "l1", "e2").await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        assert_eq!(
            progress.modules_progress[0].lessons_progress[0].status,
            ProgressStatus::Completed
        );
        assert!(!progress.modules_progress[0].completed);
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(progress.completed_at, None);
        assert!((progress.overall_progress - 0.5).abs() < f64::EPSILON);

        h.tracker.mark_exercise_complete("u1", "l2", "e3").await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        assert!(progress.modules_progress[0].completed);
        assert_eq!(progress.status, ProgressStatus::Completed);
        let stamped = progress.completed_at.expect("completion must be stamped");
        assert!((progress.overall_progress - 1.0).abs() < f64::EPSILON);

        // Redundant completions leave the stamp alone
        h.tracker.mark_exercise_complete("u1", "l2", "e3").await.unwrap();
        let again = h
            .tracker
            .complete_lesson_and_cascade("u1", "c1", "m1", "l2")
            .await
            .unwrap();
        assert_eq!(again.status, ProgressStatus::Completed);
        assert_eq!(again.completed_at, Some(stamped));
    }

    #[tokio::test]
    async fn test_duplicate_exercise_does_not_complete_lesson() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();
        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        let lesson = &progress.modules_progress[0].lessons_progress[0];
        assert_eq!(lesson.completed_exercises.len(), 1);
        assert_eq!(lesson.status, ProgressStatus::InProgress);
        assert!((lesson.lesson_progress - 0.5).abs() < f64::EPSILON);
        assert!(!h.tracker.is_lesson_completed("u1", "l1").await.unwrap());
    }

    #[tokio::test]
    async fn test_lesson_completion_is_monotonic() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        assert!(!h.tracker.is_lesson_completed("u1", "l2").await.unwrap());

        h.tracker.mark_exercise_complete("u1", "l2", "e3").await.unwrap();
        assert!(h.tracker.is_lesson_completed("u1", "l2").await.unwrap());

        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();
        h.tracker.mark_exercise_complete("u1", "l2", "e3").await.unwrap();
        assert!(h.tracker.is_lesson_completed("u1", "l2").await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_records_are_not_errors() {
        let h = harness();
        assert!(!h.tracker.is_lesson_completed("ghost", "l1").await.unwrap());
        assert!(!h.tracker.has_access_to_course("ghost", "c1").await.unwrap());
        h.tracker.mark_exercise_complete("ghost", "l1", "e1").await.unwrap();
        assert!(h.tracker.user_progress("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_has_access_after_start() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;

        assert!(!h.tracker.has_access_to_course("u1", "c1").await.unwrap());
        h.tracker.start_course("u1", "c1").await.unwrap();
        assert!(h.tracker.has_access_to_course("u1", "c1").await.unwrap());
        assert!(!h.tracker.has_access_to_course("u2", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_only_courses_containing_the_lesson_change() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        seed_course(&h.store, "c2", &[("m9", &[("l9", &["e9"])])]).await;
        h.tracker.start_course("u1", "c1").await.unwrap();
        h.tracker.start_course("u1", "c2").await.unwrap();

        h.tracker.mark_exercise_complete("u1", "l9", "e9").await.unwrap();

        let c1 = h.tracker.get_progress("u1", "c1").await.unwrap();
        let c2 = h.tracker.get_progress("u1", "c2").await.unwrap();
        assert_eq!(c1.status, ProgressStatus::InProgress);
        assert_eq!(c2.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn test_tree_is_a_snapshot() {
        let h = harness();
        let mut course = seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        course.modules[0].lesson_ids.push("l-late".to_string());
        let courses: Collection<Course> = Collection::new(h.store.clone());
        courses.save(course).await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        assert_eq!(progress.modules_progress[0].lessons_progress.len(), 2);
    }

    #[tokio::test]
    async fn test_dangling_lesson_records_without_cascade() {
        let h = harness();
        let mut course = seed_course(&h.store, "c1", &[("m1", &[("l1", &["e1"])])]).await;
        course.modules[0].lesson_ids.push("l-gone".to_string());
        let courses: Collection<Course> = Collection::new(h.store.clone());
        courses.save(course).await.unwrap();
        h.tracker.start_course("u1", "c1").await.unwrap();

        h.tracker.mark_exercise_complete("u1", "l-gone", "e-x").await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        let lesson = &progress.modules_progress[0].lessons_progress[1];
        assert!(lesson.completed_exercises.contains("e-x"));
        assert_eq!(lesson.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn test_complete_lesson_outside_tree_is_not_found() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        let err = h
            .tracker
            .complete_lesson_and_cascade("u1", "c1", "m1", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, OdysseyError::NotFound(_)));

        let err = h
            .tracker
            .complete_lesson_and_cascade("u2", "c1", "m1", "l1")
            .await
            .unwrap_err();
        assert!(matches!(err, OdysseyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_check_prerequisites() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        let lessons: Collection<Lesson> = Collection::new(h.store.clone());
        let mut l2 = lessons.find_by_id("l2").await.unwrap().unwrap();
        l2.required_lesson_ids = vec!["l1".to_string()];
        lessons.save(l2).await.unwrap();
        h.tracker.start_course("u1", "c1").await.unwrap();

        assert!(h.tracker.check_prerequisites("u1", "l1").await.unwrap());
        assert!(!h.tracker.check_prerequisites("u1", "l2").await.unwrap());

        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();
        h.tracker.mark_exercise_complete("u1", "l1", "e2").await.unwrap();
        assert!(h.tracker.check_prerequisites("u1", "l2").await.unwrap());

        let err = h.tracker.check_prerequisites("u1", "nope").await.unwrap_err();
        assert!(matches!(err, OdysseyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_marks_are_all_kept() {
        let h = harness();
        let exercise_ids: Vec<String> = (0..20).map(|i| format!("e{}", i)).collect();
        let refs: Vec<&str> = exercise_ids.iter().map(String::as_str).collect();
        let lessons: &[(&str, &[&str])] = &[("l1", refs.as_slice())];
        seed_course(&h.store, "c1", &[("m1", lessons)]).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        let mut handles = Vec::new();
        for id in exercise_ids.clone() {
            let tracker = h.tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.mark_exercise_complete("u1", "l1", &id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        assert_eq!(progress.modules_progress[0].lessons_progress[0].completed_exercises.len(), 20);
        assert_eq!(progress.status, ProgressStatus::Completed);
    }
    #[tokio::test]
    async fn test_only_configured_exercises_count() {
        let h = harness();
        seed_course(&h.store, "c1", TWO_LESSONS).await;
        h.tracker.start_course("u1", "c1").await.unwrap();

        h.tracker.mark_exercise_complete("u1", "l1", "e1").await.unwrap();
        h.tracker.mark_exercise_complete("u1", "l1", "stray").await.unwrap();

        let progress = h.tracker.get_progress("u1", "c1").await.unwrap();
        let lesson = &progress.modules_progress[0].lessons_progress[0];
        assert_eq!(lesson.completed_exercises.len(), 2);
        assert_eq!(lesson.status, ProgressStatus::InProgress);
        assert!((lesson.lesson_progress - 0.5).abs() < f64::EPSILON);

        h.tracker.mark_exercise_complete("u1", "l1", "e2").await.unwrap();
        assert!(h.tracker.is_lesson_completed("u1", "l1").await.unwrap());
    }
}
