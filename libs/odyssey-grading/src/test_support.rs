// Fakes and fixtures shared by the unit tests of this crate

use async_trait::async_trait;
use odyssey_common::store::{Collection, DocumentStore, MemoryStore};
use odyssey_common::types::{
    Course, CourseModule, Difficulty, Exercise, ExerciseMetadata, Lesson, TestCase,
};
use std::sync::Arc;
use std::time::Duration;

use crate::runner::{CodeRunner, RunnerError};

type RunFn = dyn Fn(&str, &str, &str) -> Result<String, RunnerError> + Send + Sync;

/// In-process runner driven by a closure of (code, language, input)
pub(crate) struct FnRunner {
    f: Box<RunFn>,
    delay: Option<Duration>,
}

impl FnRunner {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Result<String, RunnerError> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            delay: None,
        }
    }

    pub(crate) fn slow<F>(delay: Duration, f: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Result<String, RunnerError> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            delay: Some(delay),
        }
    }

    /// Treats the submitted code as the program's output
    pub(crate) fn code_is_output() -> Self {
        Self::new(|code, _, _| Ok(code.to_string()))
    }
}

#[async_trait]
impl CodeRunner for FnRunner {
    async fn run(&self, code: &str, language: &str, input: &str) -> Result<String, RunnerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.f)(code, language, input)
    }
}

pub(crate) fn memory_store() -> Arc<dyn DocumentStore> {
    Arc::new(MemoryStore::new())
}

pub(crate) fn sum_exercise(id: &str, lesson_id: Option<&str>) -> Exercise {
    Exercise {
        id: id.to_string(),
        title: "sum(a,b)".to_string(),
        description: "Return the sum of two numbers".to_string(),
        difficulty: Difficulty::Easy,
        language: "python".to_string(),
        starter_code: "def sum(a, b):\n    pass".to_string(),
        test_cases: vec![TestCase {
            input: "sum(5,3)".to_string(),
            expected_output: "8".to_string(),
            is_visible: true,
            description: "adds two positives".to_string(),
        }],
        solution: Some("def sum(a, b):\n    return a + b".to_string()),
        hints: vec![],
        points_value: 10,
        metadata: ExerciseMetadata::default(),
        lesson_id: lesson_id.map(str::to_string),
    }
}

/// Module layout: (module id, [(lesson id, [exercise ids])])
pub(crate) type Layout<'a> = &'a [(&'a str, &'a [(&'a str, &'a [&'a str])])];

/// Store a course, its lessons and one `sum_exercise` per exercise id
pub(crate) async fn seed_course(
    store: &Arc<dyn DocumentStore>,
    course_id: &str,
    layout: Layout<'_>,
) -> Course {
    let courses: Collection<Course> = Collection::new(store.clone());
    let lessons: Collection<Lesson> = Collection::new(store.clone());
    let exercises: Collection<Exercise> = Collection::new(store.clone());

    let mut modules = Vec::new();
    for (module_id, module_lessons) in layout {
        let mut lesson_ids = Vec::new();
        for (lesson_id, exercise_ids) in module_lessons.iter() {
            lessons
                .save(Lesson {
                    id: lesson_id.to_string(),
                    course_id: course_id.to_string(),
                    module_id: module_id.to_string(),
                    title: format!("Lesson {}", lesson_id),
                    content: String::new(),
                    exercise_ids: exercise_ids.iter().map(|e| e.to_string()).collect(),
                    required_lesson_ids: vec![],
                })
                .await
                .unwrap();
            for exercise_id in exercise_ids.iter() {
                exercises
                    .save(sum_exercise(exercise_id, Some(*lesson_id)))
                    .await
                    .unwrap();
            }
            lesson_ids.push(lesson_id.to_string());
        }
        modules.push(CourseModule {
            id: module_id.to_string(),
            title: format!("Module {}", module_id),
            lesson_ids,
        });
    }

    courses
        .save(Course {
            id: course_id.to_string(),
            title: format!("Course {}", course_id),
            description: String::new(),
            instructor_id: "instructor-1".to_string(),
            modules,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap()
}
