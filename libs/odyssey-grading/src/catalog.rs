// Course, lesson and exercise authoring plus the learner-facing reads.
// Mutations are gated by the role permission table; reads of a course's
// exercises are gated by enrollment.

use chrono::Utc;
use odyssey_common::store::{Collection, Document};
use odyssey_common::types::{Course, Exercise, ExerciseMetadata, Lesson};
use odyssey_common::{OdysseyError, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::{authorize, Permission, Principal, Role};
use crate::locks::{course_key, exercise_key, lesson_key, KeyedLocks};
use crate::progress::ProgressTracker;

#[derive(Clone)]
pub struct Catalog {
    courses: Collection<Course>,
    lessons: Collection<Lesson>,
    exercises: Collection<Exercise>,
    progress: ProgressTracker,
    locks: Arc<KeyedLocks>,
}

impl Catalog {
    pub fn new(
        courses: Collection<Course>,
        lessons: Collection<Lesson>,
        exercises: Collection<Exercise>,
        progress: ProgressTracker,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            courses,
            lessons,
            exercises,
            progress,
            locks,
        }
    }

    #[instrument(skip(self, course), fields(user_id = %principal.user_id))]
    pub async fn create_course(&self, principal: &Principal, mut course: Course) -> Result<Course> {
        authorize(principal, Permission::ManageCourses)?;
        require_non_empty("title", &course.title)?;
        self.ensure_new(&self.courses, &course.id, "Course").await?;

        for module in course.modules.iter_mut() {
            if module.id.is_empty() {
                module.id = Uuid::new_v4().to_string();
            }
        }
        if course.instructor_id.is_empty() {
            course.instructor_id = principal.user_id.clone();
        }
        let now = Utc::now();
        course.created_at = now;
        course.updated_at = now;

        let course = self.courses.save(course).await?;
        info!(course_id = %course.id, modules = course.modules.len(), "Course created");
        Ok(course)
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Course> {
        self.courses
            .find_by_id(course_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Course", course_id))
    }

    /// Replace a course's title, description and module list
    ///
    /// Known module ids keep their lesson links; modules without an id get a
    /// fresh one. A module that still holds lessons cannot be dropped.
    /// Instructors may only update their own courses.
    #[instrument(skip(self, update), fields(user_id = %principal.user_id))]
    pub async fn update_course(
        &self,
        principal: &Principal,
        course_id: &str,
        update: Course,
    ) -> Result<Course> {
        authorize(principal, Permission::ManageCourses)?;
        require_non_empty("title", &update.title)?;

        let _guard = self.locks.lock(&course_key(course_id)).await;
        let mut course = self.get_course(course_id).await?;
        if principal.role != Role::Admin && course.instructor_id != principal.user_id {
            return Err(OdysseyError::Forbidden(format!(
                "Course {} belongs to another instructor",
                course_id
            )));
        }

        let mut modules = Vec::with_capacity(update.modules.len());
        for mut module in update.modules {
            match course.modules.iter().find(|m| m.id == module.id) {
                Some(existing) => module.lesson_ids = existing.lesson_ids.clone(),
                None => {
                    if module.id.is_empty() {
                        module.id = Uuid::new_v4().to_string();
                    }
                    module.lesson_ids.clear();
                }
            }
            modules.push(module);
        }
        if let Some(orphaning) = course
            .modules
            .iter()
            .find(|old| !old.lesson_ids.is_empty() && !modules.iter().any(|m| m.id == old.id))
        {
            return Err(OdysseyError::Validation(format!(
                "Module {} still has lessons",
                orphaning.id
            )));
        }

        course.title = update.title;
        course.description = update.description;
        course.modules = modules;
        course.updated_at = Utc::now();

        let course = self.courses.save(course).await?;
        info!(course_id = %course.id, modules = course.modules.len(), "Course updated");
        Ok(course)
    }

    /// Courses owned by `instructor_id`, oldest first
    pub async fn courses_by_instructor(&self, instructor_id: &str) -> Result<Vec<Course>> {
        let mut courses = self
            .courses
            .find_by(|c| c.instructor_id == instructor_id)
            .await?;
        courses.sort_by_key(|c| c.created_at);
        Ok(courses)
    }

    /// Store a lesson and attach it to its module
    #[instrument(skip(self, lesson), fields(user_id = %principal.user_id))]
    pub async fn create_lesson(&self, principal: &Principal, lesson: Lesson) -> Result<Lesson> {
        authorize(principal, Permission::ManageCourses)?;
        require_non_empty("title", &lesson.title)?;
        self.ensure_new(&self.lessons, &lesson.id, "Lesson").await?;

        // The module's lesson list is shared by every lesson of the course
        let _guard = self.locks.lock(&course_key(&lesson.course_id)).await;
        let mut course = self.get_course(&lesson.course_id).await?;
        let Some(module_idx) = course.modules.iter().position(|m| m.id == lesson.module_id) else {
            return Err(OdysseyError::NotFound(format!(
                "Module {} not found in course {}",
                lesson.module_id, lesson.course_id
            )));
        };

        let lesson = self.lessons.save(lesson).await?;

        let module = &mut course.modules[module_idx];
        if !module.lesson_ids.contains(&lesson.id) {
            module.lesson_ids.push(lesson.id.clone());
            course.updated_at = Utc::now();
            self.courses.save(course).await?;
        }

        info!(lesson_id = %lesson.id, course_id = %lesson.course_id, "Lesson created");
        Ok(lesson)
    }

    pub async fn get_lesson(&self, lesson_id: &str) -> Result<Lesson> {
        self.lessons
            .find_by_id(lesson_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Lesson", lesson_id))
    }

    /// Store an exercise with zeroed metadata and link it to its lesson
    #[instrument(skip(self, exercise), fields(user_id = %principal.user_id))]
    pub async fn create_exercise(
        &self,
        principal: &Principal,
        mut exercise: Exercise,
    ) -> Result<Exercise> {
        authorize(principal, Permission::ManageExercises)?;
        validate_exercise(&exercise)?;
        self.ensure_new(&self.exercises, &exercise.id, "Exercise").await?;
        exercise.metadata = ExerciseMetadata::default();

        let Some(lesson_id) = exercise.lesson_id.clone() else {
            let exercise = self.exercises.save(exercise).await?;
            info!(exercise_id = %exercise.id, "Exercise created");
            return Ok(exercise);
        };

        let _guard = self.locks.lock(&lesson_key(&lesson_id)).await;
        let mut lesson = self.get_lesson(&lesson_id).await?;
        let exercise = self.exercises.save(exercise).await?;

        if !lesson.exercise_ids.contains(&exercise.id) {
            lesson.exercise_ids.push(exercise.id.clone());
            self.lessons.save(lesson).await?;
        }

        info!(exercise_id = %exercise.id, lesson_id = %lesson_id, "Exercise created");
        Ok(exercise)
    }

    /// Replace an exercise's content, keeping its id and metadata
    ///
    /// Moving the exercise to another lesson moves its link as well.
    #[instrument(skip(self, update), fields(user_id = %principal.user_id))]
    pub async fn update_exercise(
        &self,
        principal: &Principal,
        exercise_id: &str,
        mut update: Exercise,
    ) -> Result<Exercise> {
        authorize(principal, Permission::ManageExercises)?;
        validate_exercise(&update)?;
        if let Some(lesson_id) = &update.lesson_id {
            self.get_lesson(lesson_id).await?;
        }

        // Metadata is written concurrently by graded submissions
        let _guard = self.locks.lock(&exercise_key(exercise_id)).await;
        let current = self.get_exercise(exercise_id).await?;

        if current.lesson_id != update.lesson_id {
            self.relink_exercise(
                &current.id,
                current.lesson_id.as_deref(),
                update.lesson_id.as_deref(),
            )
            .await?;
        }

        update.id = current.id;
        update.metadata = current.metadata;
        self.exercises.save(update).await
    }

    /// Move `exercise_id` from one lesson's exercise list to another's
    async fn relink_exercise(
        &self,
        exercise_id: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()> {
        // Fixed lock order across lessons
        let mut keys: Vec<String> = from.into_iter().chain(to).map(lesson_key).collect();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.locks.lock(key).await);
        }

        if let Some(from) = from {
            match self.lessons.find_by_id(from).await? {
                Some(mut lesson) => {
                    lesson.exercise_ids.retain(|id| id != exercise_id);
                    self.lessons.save(lesson).await?;
                }
                None => warn!(lesson_id = %from, "Previous lesson missing; nothing to unlink"),
            }
        }
        if let Some(to) = to {
            let mut lesson = self.get_lesson(to).await?;
            if !lesson.exercise_ids.iter().any(|id| id == exercise_id) {
                lesson.exercise_ids.push(exercise_id.to_string());
                self.lessons.save(lesson).await?;
            }
        }

        info!(exercise_id = %exercise_id, from = ?from, to = ?to, "Exercise moved");
        Ok(())
    }

    pub async fn get_exercise(&self, exercise_id: &str) -> Result<Exercise> {
        self.exercises
            .find_by_id(exercise_id)
            .await?
            .ok_or_else(|| OdysseyError::not_found("Exercise", exercise_id))
    }

    /// Exercise as the caller may see it; learners get the redacted view
    pub async fn view_exercise(&self, principal: &Principal, exercise_id: &str) -> Result<Exercise> {
        let exercise = self.get_exercise(exercise_id).await?;
        if principal.role.allows(Permission::ManageExercises) {
            Ok(exercise)
        } else {
            Ok(exercise.for_learner())
        }
    }

    /// Exercises of every lesson in the course, in lesson order
    ///
    /// Learners must have started the course. Instructors and admins bypass
    /// the check and see solutions.
    pub async fn course_exercises(
        &self,
        principal: &Principal,
        course_id: &str,
    ) -> Result<Vec<Exercise>> {
        let course = self.get_course(course_id).await?;

        let privileged = principal.role.bypasses_enrollment();
        if !privileged
            && !self
                .progress
                .has_access_to_course(&principal.user_id, course_id)
                .await?
        {
            return Err(OdysseyError::Forbidden(
                "Course not started by this user".to_string(),
            ));
        }

        let lesson_ids: Vec<&String> = course
            .modules
            .iter()
            .flat_map(|m| m.lesson_ids.iter())
            .collect();
        let mut exercises = self
            .exercises
            .find_by(|e| {
                e.lesson_id
                    .as_ref()
                    .is_some_and(|lesson_id| lesson_ids.contains(&lesson_id))
            })
            .await?;
        exercises.sort_by_key(|e| {
            e.lesson_id
                .as_ref()
                .and_then(|l| lesson_ids.iter().position(|id| *id == l))
        });

        if privileged {
            Ok(exercises)
        } else {
            Ok(exercises.iter().map(Exercise::for_learner).collect())
        }
    }

    async fn ensure_new<T: Document>(
        &self,
        collection: &Collection<T>,
        id: &str,
        kind: &str,
    ) -> Result<()> {
        if !id.is_empty() && collection.find_by_id(id).await?.is_some() {
            return Err(OdysseyError::Conflict(format!(
                "{} already exists with id: {}",
                kind, id
            )));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OdysseyError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_exercise(exercise: &Exercise) -> Result<()> {
    require_non_empty("title", &exercise.title)?;
    require_non_empty("language", &exercise.language)
}
