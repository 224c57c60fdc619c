//! Analysis request handling
//!
//! One request walks the whole pipeline: check the input, read the schema,
//! build the prompt, ask the plan generator for a plan, load the workbook and
//! execute. Every failure becomes an error body with an HTTP-style status
//! code, so callers never see a raw error.

use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use sheetq_core::{
    build_analysis_prompt, extract_schema, Error, Execution, ExecutorOptions, LoadOptions,
    PlanExecutor, PlanGenerator, Result, TabularStore, TextCompleter,
};

/// An analysis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Workbook file or directory
    pub file_path: PathBuf,
    /// Question in plain language
    pub query: String,
}

/// Status code and JSON body of a handled request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    /// 200 on success, otherwise the mapped error status
    pub status_code: u16,
    /// `{status, query, result}` or `{status, query, detail}`
    pub body: JsonValue,
}

impl AnalysisResponse {
    /// Whether the request succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    fn success(query: &str, execution: &Execution) -> Self {
        let mut body = json!({
            "status": "success",
            "query": query,
            "result": execution.output.to_json(),
        });
        if !execution.warnings.is_empty() {
            body["warnings"] = execution
                .warnings
                .iter()
                .map(ToString::to_string)
                .collect();
        }
        Self {
            status_code: 200,
            body,
        }
    }

    fn failure(query: &str, status_code: u16, detail: &str) -> Self {
        Self {
            status_code,
            body: json!({
                "status": "error",
                "query": query,
                "detail": detail,
            }),
        }
    }
}

/// Capabilities and options a request runs with
pub struct Services<'a> {
    /// Turns the prompt into a plan
    pub plan_generator: &'a dyn PlanGenerator,
    /// Backs text analysis steps
    pub completer: &'a dyn TextCompleter,
    /// Workbook loading options
    pub load_options: LoadOptions,
    /// Executor options
    pub executor_options: ExecutorOptions,
}

/// Handle one analysis request
pub fn analyse(request: &AnalysisRequest, services: &Services<'_>) -> AnalysisResponse {
    info!(
        "Analysing '{}' for query: {}",
        request.file_path.display(),
        request.query
    );

    if !request.file_path.exists() {
        let err = Error::FileNotFound(request.file_path.clone());
        warn!("{err}");
        return AnalysisResponse::failure(&request.query, err.status_code(), &err.to_string());
    }

    if request.query.trim().is_empty() {
        warn!("Rejected request with an empty query");
        return AnalysisResponse::failure(&request.query, 400, "Query must not be empty");
    }

    match run_pipeline(request, services) {
        Ok(execution) => {
            for warning in &execution.warnings {
                warn!("{warning}");
            }
            AnalysisResponse::success(&request.query, &execution)
        }
        Err(err) => {
            warn!("Analysis failed ({}): {err}", err.status_code());
            AnalysisResponse::failure(&request.query, err.status_code(), &err.to_string())
        }
    }
}

fn run_pipeline(request: &AnalysisRequest, services: &Services<'_>) -> Result<Execution> {
    let schema = extract_schema(&request.file_path, &services.load_options)?;
    debug!("Schema has {} sheet(s)", schema.len());

    let prompt = build_analysis_prompt(&schema, &request.query);
    let plan = services.plan_generator.generate_plan(&prompt)?;
    debug!(
        "Generated plan: {} operation(s) on '{}'",
        plan.operations.len(),
        plan.target_sheet
    );

    let store = TabularStore::load(&request.file_path, &services.load_options)?;
    PlanExecutor::new(&store)
        .with_completer(services.completer)
        .with_options(services.executor_options.clone())
        .execute(&plan)
}
