use crate::engine::{ExecutionBackend, ExecutionResult, TestExecutionEngine};
use crate::test_case::{Classification, TestCase};
use anyhow::{anyhow, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Serialize)]
struct SuiteFile {
    #[serde(default)]
    version: Option<String>,
    tests: Vec<TestCase>,
}

/// The batch of test cases a caller is working with.
///
/// Read-only once built; callers address cases by index.
#[derive(Debug, Clone, Default)]
pub struct TestSession {
    cases: Vec<TestCase>,
}

impl TestSession {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }

    /// Load a `tests:` list from YAML, or JSON when the extension is `.json`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // Determine format by extension
        let suite: SuiteFile = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(Self::new(suite.tests))
    }

    pub fn to_yaml(&self) -> Result<String> {
        let suite = SuiteFile {
            version: Some("1".to_string()),
            tests: self.cases.clone(),
        };
        Ok(serde_yaml::to_string(&suite)?)
    }

    pub fn get(&self, index: usize) -> Option<&TestCase> {
        self.cases.get(index)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }
}

#[derive(Debug)]
pub struct CaseResult<'a> {
    pub index: usize,
    pub test_case: &'a TestCase,
    pub result: ExecutionResult,
}

/// Execute the case at `index`.
pub async fn run_one<B: ExecutionBackend>(
    engine: &TestExecutionEngine<B>,
    session: &TestSession,
    index: usize,
) -> Result<ExecutionResult> {
    let test_case = session
        .get(index)
        .ok_or_else(|| anyhow!("No test case at index {} (session has {})", index, session.len()))?;
    Ok(engine.execute(test_case).await)
}

/// Execute every case in index order, one at a time.
pub async fn run_all<'a, B: ExecutionBackend>(
    engine: &TestExecutionEngine<B>,
    session: &'a TestSession,
) -> Vec<CaseResult<'a>> {
    let mut results = Vec::with_capacity(session.len());

    for (index, test_case) in session.iter().enumerate() {
        info!("Running test case {}: {}", index + 1, test_case.description);
        let result = engine.execute(test_case).await;
        info!(
            "Test case {} finished: {} ({})",
            index + 1,
            result.status(),
            result
                .classification
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unclassified".to_string())
        );
        results.push(CaseResult {
            index,
            test_case,
            result,
        });
    }

    results
}

pub async fn run_session<B: ExecutionBackend>(
    engine: &TestExecutionEngine<B>,
    session: &TestSession,
    format: &str,
) -> Result<()> {
    if session.is_empty() {
        return Err(anyhow!("No test cases to run"));
    }

    println!("=== Test Session ===");
    println!("Total Tests: {}", session.len());
    println!();

    let results = run_all(engine, session).await;
    print!("{}", render_report(&results, format)?);
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_tests: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub unclassified: usize,
    pub errored: usize,
}

impl Summary {
    pub fn from_results(results: &[CaseResult<'_>]) -> Self {
        let mut summary = Summary {
            total_tests: results.len(),
            ..Default::default()
        };
        for r in results {
            if !r.result.is_success() {
                summary.errored += 1;
            }
            match r.result.classification {
                Some(Classification::Match) => summary.matched += 1,
                Some(Classification::Mismatch) => summary.mismatched += 1,
                None => summary.unclassified += 1,
            }
        }
        summary
    }
}

pub fn render_report(results: &[CaseResult<'_>], format: &str) -> Result<String> {
    match format {
        "json" => render_json_report(results),
        "csv" => Ok(render_csv_report(results)),
        "text" => Ok(render_text_report(results)),
        other => Err(anyhow!("Unknown report format: {} (expected text, json or csv)", other)),
    }
}

fn classification_label(result: &ExecutionResult) -> &'static str {
    match result.classification {
        Some(Classification::Match) => "MATCH",
        Some(Classification::Mismatch) => "MISMATCH",
        None if result.is_success() => "UNCLASSIFIED",
        None => "ERROR",
    }
}

fn render_text_report(results: &[CaseResult<'_>]) -> String {
    let summary = Summary::from_results(results);
    let mut out = String::new();

    out.push_str("\n=== Test Execution Summary ===\n\n");
    out.push_str(&format!("Total Tests: {}\n", summary.total_tests));
    out.push_str(&format!("Matched: {}\n", summary.matched));
    out.push_str(&format!("Mismatched: {}\n", summary.mismatched));
    out.push_str(&format!("Unclassified: {}\n", summary.unclassified));
    out.push_str(&format!("Errors: {}\n", summary.errored));
    out.push_str(&format!(
        "Execution Time: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    out.push_str("\n=== Test Results ===\n\n");

    for r in results {
        out.push_str(&format!("{}. {}\n", r.index + 1, r.test_case.description));
        out.push_str(&format!("   Type: {}\n", display_or(&r.test_case.test_type, "Unknown")));
        out.push_str(&format!(
            "   Expected: {}\n",
            r.test_case
                .expected_status_code
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
        out.push_str(&format!("   Result: {}\n", classification_label(&r.result)));
        for line in r.result.report().lines() {
            out.push_str("   | ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    out
}

fn render_json_report(results: &[CaseResult<'_>]) -> Result<String> {
    #[derive(Serialize)]
    struct JsonReport<'a> {
        summary: Summary,
        execution_time: String,
        test_results: Vec<JsonCaseResult<'a>>,
    }

    #[derive(Serialize)]
    struct JsonCaseResult<'a> {
        index: usize,
        description: &'a str,
        test_type: &'a str,
        curl_command: &'a str,
        expected_status_code: Option<String>,
        result: &'a ExecutionResult,
    }

    let report = JsonReport {
        summary: Summary::from_results(results),
        execution_time: Local::now().to_rfc3339(),
        test_results: results
            .iter()
            .map(|r| JsonCaseResult {
                index: r.index,
                description: &r.test_case.description,
                test_type: &r.test_case.test_type,
                curl_command: &r.test_case.curl_command,
                expected_status_code: r.test_case.expected_status_code.as_ref().map(|e| e.to_string()),
                result: &r.result,
            })
            .collect(),
    };

    Ok(format!("{}\n", serde_json::to_string_pretty(&report)?))
}

fn render_csv_report(results: &[CaseResult<'_>]) -> String {
    let mut out = String::from("Index,Description,Type,Expected,Actual,Result,Error\n");

    for r in results {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            r.index + 1,
            csv_field(&r.test_case.description),
            csv_field(&r.test_case.test_type),
            r.test_case
                .expected_status_code
                .as_ref()
                .map(|e| csv_field(&e.to_string()))
                .unwrap_or_default(),
            r.result.status_code().map(|c| c.to_string()).unwrap_or_default(),
            classification_label(&r.result),
            csv_field(r.result.error().unwrap_or(""))
        ));
    }

    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
