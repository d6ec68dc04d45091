//! Test Evaluator - Language-Agnostic Grading Logic
//!
//! **Core Responsibility:**
//! Run a submission against an ordered list of test cases and decide
//! pass/fail per case and overall.
//!
//! **Critical Properties:**
//! - Knows nothing about how code executes (that is the `CodeRunner`)
//! - Knows nothing about persistence
//! - Runner failures never escape: each becomes a failing `TestResult`
//! - Result order always matches test case order
//!
//! **Normalization Rules (Applied to All Languages):**
//! - Trim leading and trailing whitespace on both sides: YES
//! - Case sensitivity: YES (exact match required)
//! - Internal whitespace: preserved
//!
//! **Visibility:**
//! Hidden test cases report the `Hidden Test Case` sentinel as description
//! and never expose actual/expected output or backend error text,
//! whether they pass or fail.

use odyssey_common::types::{
    CodeExecutionResponse, TestCase, TestResult, HIDDEN_TEST_DESCRIPTION,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::runner::{CodeRunner, RunnerError};

/// Diagnostic shown for hidden test cases that could not produce output
pub const HIDDEN_EXECUTION_FAILED: &str = "Execution failed";
pub const HIDDEN_EXECUTION_TIMED_OUT: &str = "Execution timed out";

/// Normalize output string for comparison
fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Aggregated outcome of one evaluation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// True iff every case passed; vacuously true for zero cases
    pub all_passed: bool,
    pub results: Vec<TestResult>,
    pub tests_passed: u32,
    pub elapsed_ms: u64,
}

impl Evaluation {
    pub fn total_tests(&self) -> u32 {
        self.results.len() as u32
    }

    pub fn summary(&self) -> String {
        if self.all_passed {
            "All tests passed".to_string()
        } else {
            format!("{}/{} tests passed", self.tests_passed, self.total_tests())
        }
    }

    pub fn into_response(self, score: Option<u32>) -> CodeExecutionResponse {
        let message = Some(self.summary());
        CodeExecutionResponse {
            success: self.all_passed,
            test_results: self.results,
            score,
            message,
        }
    }
}

/// Grade a single test case from the runner's outcome
///
/// Visibility of description and outputs follows `test_case.is_visible`
/// only, never the verdict.
pub fn judge(test_case: &TestCase, outcome: Result<String, RunnerError>) -> TestResult {
    let visible = test_case.is_visible;
    let description = if visible {
        test_case.description.clone()
    } else {
        HIDDEN_TEST_DESCRIPTION.to_string()
    };

    match outcome {
        Ok(stdout) => {
            let passed =
                normalize_output(&stdout) == normalize_output(&test_case.expected_output);
            TestResult {
                description,
                passed,
                actual_output: visible.then_some(stdout),
                expected_output: visible.then(|| test_case.expected_output.clone()),
                error_message: None,
            }
        }
        Err(e) => {
            let error_message = if visible {
                format!("Error: {}", e)
            } else if e.is_timeout() {
                HIDDEN_EXECUTION_TIMED_OUT.to_string()
            } else {
                HIDDEN_EXECUTION_FAILED.to_string()
            };
            TestResult {
                description,
                passed: false,
                actual_output: None,
                expected_output: visible.then(|| test_case.expected_output.clone()),
                error_message: Some(error_message),
            }
        }
    }
}

/// Runs test cases sequentially through a `CodeRunner` under a per-case
/// hard timeout.
#[derive(Clone)]
pub struct Evaluator {
    runner: Arc<dyn CodeRunner>,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(runner: Arc<dyn CodeRunner>, timeout_ms: u64) -> Self {
        Self {
            runner,
            timeout: Duration::from_millis(timeout_ms.max(1)),
        }
    }

    /// Evaluate `code` against every test case, in order
    ///
    /// Pure with respect to persisted state.
    pub async fn evaluate(&self, code: &str, language: &str, test_cases: &[TestCase]) -> Evaluation {
        let start = Instant::now();
        let mut results = Vec::with_capacity(test_cases.len());
        let mut tests_passed = 0u32;

        for (idx, test_case) in test_cases.iter().enumerate() {
            let outcome = self.run_case(code, language, &test_case.input).await;
            if let Err(e) = &outcome {
                warn!(test_num = idx + 1, language = %language, error = %e, "Test case execution failed");
            }

            let result = judge(test_case, outcome);
            debug!(test_num = idx + 1, visible = test_case.is_visible, passed = result.passed, "Test result");

            if result.passed {
                tests_passed += 1;
            }
            results.push(result);
        }

        let all_passed = results.iter().all(|r| r.passed);

        Evaluation {
            all_passed,
            results,
            tests_passed,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run_case(&self, code: &str, language: &str, input: &str) -> Result<String, RunnerError> {
        match tokio::time::timeout(self.timeout, self.runner.run(code, language, input)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RunnerError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
