// CLI commands for operating an Odyssey store
use anyhow::{Context, Result};
use odyssey_common::types::{Course, Exercise, Lesson, Progress};
use odyssey_common::OdysseyError;
use odyssey_grading::{Platform, Principal, Role};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Identity the CLI acts as when writing the catalog
const OPERATOR_ID: &str = "odyssey-cli";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub courses: Vec<Course>,
    pub lessons: Vec<Lesson>,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub created: usize,
    pub skipped: usize,
}

impl SeedSummary {
    /// Count one write; an id that already exists is skipped, anything else aborts
    fn track<T>(&mut self, kind: &str, outcome: Result<T, OdysseyError>) -> Result<()> {
        match outcome {
            Ok(_) => self.created += 1,
            Err(OdysseyError::Conflict(msg)) => {
                println!("⏭️  Skipping {}: {}", kind, msg);
                self.skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to seed {}", kind)),
        }
        Ok(())
    }
}

pub fn parse_seed(content: &str) -> Result<SeedFile> {
    serde_json::from_str(content).context("Failed to parse seed file")
}

/// Write fixtures in dependency order: courses, lessons, exercises
pub async fn apply_seed(platform: &Platform, seed: SeedFile) -> Result<SeedSummary> {
    let operator = Principal::new(OPERATOR_ID, Role::Admin);
    let mut summary = SeedSummary::default();

    for course in seed.courses {
        let outcome = platform.catalog.create_course(&operator, course).await;
        summary.track("course", outcome)?;
    }
    for lesson in seed.lessons {
        let outcome = platform.catalog.create_lesson(&operator, lesson).await;
        summary.track("lesson", outcome)?;
    }
    for exercise in seed.exercises {
        let outcome = platform.catalog.create_exercise(&operator, exercise).await;
        summary.track("exercise", outcome)?;
    }

    Ok(summary)
}

pub async fn seed(platform: &Platform, path: &Path) -> Result<()> {
    println!("🌱 Seeding from {}", path.display());

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let summary = apply_seed(platform, parse_seed(&content)?).await?;

    println!(
        "✅ Seed complete: {} created, {} skipped",
        summary.created, summary.skipped
    );
    Ok(())
}

pub async fn print_statistics(platform: &Platform, exercise_id: &str) -> Result<()> {
    let stats = platform.submissions.statistics(exercise_id).await?;

    println!("📊 Exercise {}\n", stats.exercise_id);
    println!("{:<24} {}", "Submissions", stats.total_submissions);
    println!("{:<24} {}", "Successful", stats.successful_submissions);
    println!("{:<24} {:.2}%", "Success rate", stats.success_rate);
    println!("{}", "─".repeat(40));
    println!("{:<24} {}", "Recorded attempts", stats.metadata.total_attempts);
    println!("{:<24} {}", "Recorded completions", stats.metadata.total_completions);
    println!("{:<24} {}%", "Recorded rate", stats.metadata.success_rate);
    Ok(())
}

pub async fn print_progress(platform: &Platform, user_id: &str, course_id: Option<&str>) -> Result<()> {
    let records = match course_id {
        Some(course_id) => vec![platform.progress.get_progress(user_id, course_id).await?],
        None => platform.progress.user_progress(user_id).await?,
    };

    if records.is_empty() {
        println!("No courses started by {}.", user_id);
        return Ok(());
    }

    for progress in &records {
        print!("{}", render_progress(progress));
    }
    Ok(())
}

fn render_progress(progress: &Progress) -> String {
    let mut out = format!(
        "📋 Course {} [{:?}] {:.0}%\n",
        progress.course_id,
        progress.status,
        progress.overall_progress * 100.0
    );
    if let Some(at) = progress.completed_at {
        out.push_str(&format!("   completed at {}\n", at.to_rfc3339()));
    }
    for module in &progress.modules_progress {
        let mark = if module.completed { "✅" } else { "  " };
        out.push_str(&format!(
            "  {} module {} {:.0}%\n",
            mark,
            module.module_id,
            module.overall_module_progress * 100.0
        ));
        for lesson in &module.lessons_progress {
            out.push_str(&format!(
                "      lesson {:<20} {:?} ({} exercises)\n",
                lesson.lesson_id,
                lesson.status,
                lesson.completed_exercises.len()
            ));
        }
    }
    out
}

pub async fn submit(platform: &Platform, exercise_id: &str, user_id: &str, source: &Path) -> Result<()> {
    let code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let response = platform.submissions.submit(exercise_id, &code, user_id).await?;

    for (idx, result) in response.test_results.iter().enumerate() {
        let mark = if result.passed { "✅" } else { "❌" };
        println!("{} Test {}: {}", mark, idx + 1, result.description);
        if let Some(error) = &result.error_message {
            println!("     {}", error);
        }
    }
    println!(
        "\n{} (score {})",
        response.message.unwrap_or_default(),
        response.score.unwrap_or(0)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use odyssey_common::store::MemoryStore;
    use odyssey_common::types::ProgressStatus;
    use odyssey_grading::PlaceholderRunner;
    use std::sync::Arc;

    const SEED: &str = r#"{
        "courses": [
            {"id": "py-101", "title": "Python 101",
             "modules": [{"id": "basics", "title": "Basics"}]}
        ],
        "lessons": [
            {"id": "functions", "courseId": "py-101", "moduleId": "basics", "title": "Functions"}
        ],
        "exercises": [
            {"id": "sum", "title": "sum(a,b)", "language": "python", "lessonId": "functions",
             "testCases": [{"input": "sum(5,3)", "expectedOutput": "8", "isVisible": true}]}
        ]
    }"#;

    fn platform() -> Platform {
        Platform::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PlaceholderRunner::with_output("8")),
            1000,
        )
    }

    #[tokio::test]
    async fn test_seed_is_rerunnable() {
        let platform = platform();

        let first = apply_seed(&platform, parse_seed(SEED).unwrap()).await.unwrap();
        assert_eq!(first, SeedSummary { created: 3, skipped: 0 });

        let second = apply_seed(&platform, parse_seed(SEED).unwrap()).await.unwrap();
        assert_eq!(second, SeedSummary { created: 0, skipped: 3 });

        let course = platform.catalog.get_course("py-101").await.unwrap();
        assert_eq!(course.modules[0].lesson_ids, vec!["functions".to_string()]);
        let lesson = platform.catalog.get_lesson("functions").await.unwrap();
        assert_eq!(lesson.exercise_ids, vec!["sum".to_string()]);
    }

    #[tokio::test]
    async fn test_seed_aborts_on_broken_reference() {
        let platform = platform();
        let seed = parse_seed(
            r#"{"lessons": [{"courseId": "missing", "moduleId": "m", "title": "Orphan"}]}"#,
        )
        .unwrap();

        assert!(apply_seed(&platform, seed).await.is_err());
    }

    #[test]
    fn test_parse_seed_rejects_garbage() {
        assert!(parse_seed("not json").is_err());
        assert!(parse_seed("{}").unwrap().courses.is_empty());
    }

    #[tokio::test]
    async fn test_render_completed_course() {
        let platform = platform();
        apply_seed(&platform, parse_seed(SEED).unwrap()).await.unwrap();
        platform.progress.start_course("u1", "py-101").await.unwrap();
        platform.submissions.submit("sum", "anything", "u1").await.unwrap();

        let progress = platform.progress.get_progress("u1", "py-101").await.unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);

        let rendered = render_progress(&progress);
        assert!(rendered.contains("Course py-101 [Completed] 100%"));
        assert!(rendered.contains("completed at"));
        assert!(rendered.contains("lesson functions"));
    }
}
