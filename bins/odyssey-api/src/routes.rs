use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/code/execute", post(handlers::execute_code))
        .route("/api/code/submit/:exercise_id", post(handlers::submit_code))
        .route(
            "/api/code/statistics/:exercise_id",
            get(handlers::exercise_statistics),
        )
        .route("/api/code/history", get(handlers::submission_history))
        .route("/api/courses", post(handlers::create_course))
        .route(
            "/api/courses/:id",
            get(handlers::get_course).put(handlers::update_course),
        )
        .route(
            "/api/courses/instructor/:instructor_id",
            get(handlers::instructor_courses),
        )
        .route("/api/courses/:id/exercises", get(handlers::course_exercises))
        .route("/api/lessons", post(handlers::create_lesson))
        .route("/api/lessons/:id/completed", get(handlers::lesson_completed))
        .route(
            "/api/lessons/:id/prerequisites",
            get(handlers::lesson_prerequisites),
        )
        .route("/api/exercises", post(handlers::create_exercise))
        .route(
            "/api/exercises/:id",
            get(handlers::get_exercise).put(handlers::update_exercise),
        )
        .route("/api/progress", get(handlers::user_progress))
        .route("/api/progress/:course_id", get(handlers::course_progress))
        .route("/api/progress/:course_id/start", post(handlers::start_course))
        .route(
            "/api/progress/:course_id/modules/:module_id/lessons/:lesson_id/complete",
            post(handlers::complete_lesson),
        )
        .route("/api/users/:user_id/role", put(handlers::assign_role))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
}
