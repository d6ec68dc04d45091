// HTTP route handlers for the Odyssey API

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use odyssey_common::types::{
    CodeExecutionResponse, CodeSubmission, Course, Exercise, Lesson, Page, Progress, TestCase,
};
use odyssey_common::OdysseyError;
use odyssey_grading::{authorize, ExerciseStatistics, Permission, Role, RoleGrant};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::auth::Authenticated;
use crate::error::{ApiJson, ApiResult};
use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLessonQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCheck {
    pub lesson_id: String,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteCheck {
    pub lesson_id: String,
    pub satisfied: bool,
}

/// POST /api/code/execute - Ad hoc run, nothing persisted
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(payload): ApiJson<ExecuteRequest>,
) -> ApiResult<Json<CodeExecutionResponse>> {
    authorize(&principal, Permission::SubmitCode)?;
    if payload.language.trim().is_empty() {
        return Err(OdysseyError::Validation("language must not be empty".to_string()).into());
    }

    let response = state
        .platform
        .submissions
        .execute(&payload.code, &payload.language, &payload.test_cases)
        .await;
    Ok(Json(response))
}

/// POST /api/code/submit/:exercise_id - Graded, persisted submission
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(exercise_id): Path<String>,
    ApiJson(payload): ApiJson<SubmitRequest>,
) -> ApiResult<Json<CodeExecutionResponse>> {
    authorize(&principal, Permission::SubmitCode)?;

    let started = Instant::now();
    let response = state
        .platform
        .submissions
        .submit(&exercise_id, &payload.code, &principal.user_id)
        .await?;
    metrics::record_submission(response.success, started.elapsed());

    info!(
        exercise_id = %exercise_id,
        user_id = %principal.user_id,
        success = response.success,
        "Submission graded"
    );
    Ok(Json(response))
}

/// GET /api/code/statistics/:exercise_id
pub async fn exercise_statistics(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(exercise_id): Path<String>,
) -> ApiResult<Json<ExerciseStatistics>> {
    authorize(&principal, Permission::ViewStatistics)?;
    Ok(Json(state.platform.submissions.statistics(&exercise_id).await?))
}

/// GET /api/code/history?page&size - Caller's submissions, newest first
pub async fn submission_history(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Page<CodeSubmission>>> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(state.history_page_size);
    Ok(Json(
        state
            .platform
            .submissions
            .history(&principal.user_id, page, size)
            .await?,
    ))
}

/// POST /api/courses
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(course): ApiJson<Course>,
) -> ApiResult<impl IntoResponse> {
    let course = state.platform.catalog.create_course(&principal, course).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/courses/:id
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Authenticated(_): Authenticated,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Course>> {
    Ok(Json(state.platform.catalog.get_course(&course_id).await?))
}

/// PUT /api/courses/:id
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(course_id): Path<String>,
    ApiJson(update): ApiJson<Course>,
) -> ApiResult<Json<Course>> {
    Ok(Json(
        state
            .platform
            .catalog
            .update_course(&principal, &course_id, update)
            .await?,
    ))
}

/// GET /api/courses/instructor/:instructor_id
pub async fn instructor_courses(
    State(state): State<Arc<AppState>>,
    Authenticated(_): Authenticated,
    Path(instructor_id): Path<String>,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(
        state
            .platform
            .catalog
            .courses_by_instructor(&instructor_id)
            .await?,
    ))
}

/// GET /api/courses/:id/exercises - Only for users who started the course
pub async fn course_exercises(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Vec<Exercise>>> {
    Ok(Json(
        state
            .platform
            .catalog
            .course_exercises(&principal, &course_id)
            .await?,
    ))
}

/// POST /api/lessons
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(lesson): ApiJson<Lesson>,
) -> ApiResult<impl IntoResponse> {
    let lesson = state.platform.catalog.create_lesson(&principal, lesson).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// GET /api/lessons/:id/completed
pub async fn lesson_completed(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(lesson_id): Path<String>,
) -> ApiResult<Json<LessonCheck>> {
    let completed = state
        .platform
        .progress
        .is_lesson_completed(&principal.user_id, &lesson_id)
        .await?;
    Ok(Json(LessonCheck {
        lesson_id,
        completed,
    }))
}

/// GET /api/lessons/:id/prerequisites
pub async fn lesson_prerequisites(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(lesson_id): Path<String>,
) -> ApiResult<Json<PrerequisiteCheck>> {
    let satisfied = state
        .platform
        .progress
        .check_prerequisites(&principal.user_id, &lesson_id)
        .await?;
    Ok(Json(PrerequisiteCheck {
        lesson_id,
        satisfied,
    }))
}

/// POST /api/exercises
pub async fn create_exercise(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(exercise): ApiJson<Exercise>,
) -> ApiResult<impl IntoResponse> {
    let exercise = state
        .platform
        .catalog
        .create_exercise(&principal, exercise)
        .await?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

/// GET /api/exercises/:id - Learners get the redacted view
pub async fn get_exercise(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(exercise_id): Path<String>,
) -> ApiResult<Json<Exercise>> {
    Ok(Json(
        state
            .platform
            .catalog
            .view_exercise(&principal, &exercise_id)
            .await?,
    ))
}

/// PUT /api/exercises/:id
pub async fn update_exercise(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(exercise_id): Path<String>,
    ApiJson(update): ApiJson<Exercise>,
) -> ApiResult<Json<Exercise>> {
    Ok(Json(
        state
            .platform
            .catalog
            .update_exercise(&principal, &exercise_id, update)
            .await?,
    ))
}

/// POST /api/progress/:course_id/start
pub async fn start_course(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(course_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let progress = state
        .platform
        .progress
        .start_course(&principal.user_id, &course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(progress)))
}

/// GET /api/progress/:course_id
pub async fn course_progress(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Progress>> {
    Ok(Json(
        state
            .platform
            .progress
            .get_progress(&principal.user_id, &course_id)
            .await?,
    ))
}

/// GET /api/progress - Every course the caller started
pub async fn user_progress(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<Vec<Progress>>> {
    Ok(Json(
        state
            .platform
            .progress
            .user_progress(&principal.user_id)
            .await?,
    ))
}

/// POST /api/progress/:course_id/modules/:module_id/lessons/:lesson_id/complete?userId
///
/// Staff override of the graded path; completes the lesson for `userId`,
/// or for the caller when absent.
pub async fn complete_lesson(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path((course_id, module_id, lesson_id)): Path<(String, String, String)>,
    Query(query): Query<CompleteLessonQuery>,
) -> ApiResult<Json<Progress>> {
    authorize(&principal, Permission::ManageCourses)?;
    let user_id = query.user_id.unwrap_or(principal.user_id);

    let progress = state
        .platform
        .progress
        .complete_lesson_and_cascade(&user_id, &course_id, &module_id, &lesson_id)
        .await?;
    info!(user_id = %user_id, lesson_id = %lesson_id, "Lesson completed by staff");
    Ok(Json(progress))
}

/// PUT /api/users/:user_id/role - Admin only
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(user_id): Path<String>,
    ApiJson(request): ApiJson<RoleRequest>,
) -> ApiResult<Json<RoleGrant>> {
    Ok(Json(
        state
            .platform
            .roles
            .assign_role(&principal, &user_id, request.role)
            .await?,
    ))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
