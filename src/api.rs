//! JSON payloads for single-shot optimisation and simulation requests.
//!
//! These are transport-agnostic: the CLI feeds them request bodies from files or stdin, and
//! any server front end can do the same.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{DataError, Error, ErrorKind, ValidationError, ValidationIssue};
use crate::optimizer::monte_carlo::{
    AggregateResult, ItemProbability, MonteCarloAggregator, ScheduleProbability, SimulationRun,
};
use crate::optimizer::request::{OptimizationRequest, SimulationRequest};
use crate::optimizer::schedule::{ScheduleOptimizer, SelectedItem, Selection};
use crate::optimizer::solver::SolveStatus;

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeResponse {
    pub status: SolveStatus,
    pub seed: u64,
    pub selection: Vec<SelectedItem>,
    pub total_cost: f64,
    pub total_credit_weight: f64,
    pub total_utility: f64,
    pub objective_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Selection> for OptimizeResponse {
    fn from(selection: Selection) -> Self {
        let message = Some(selection_message(&selection));
        Self {
            status: selection.status,
            seed: selection.seed,
            total_cost: selection.total_cost,
            total_credit_weight: selection.total_credit_weight,
            total_utility: selection.total_utility,
            objective_value: selection.objective_value,
            selection: selection.items,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateResponse {
    pub simulation_id: Uuid,
    pub per_item: Vec<ItemProbability>,
    pub per_schedule: Vec<ScheduleProbability>,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs: Option<Vec<SimulationRun>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SimulateResponse {
    pub fn from_result(result: AggregateResult, include_runs: bool) -> Self {
        let message = simulation_message(&result);
        Self {
            simulation_id: result.simulation_id,
            per_item: result.per_item,
            per_schedule: result.per_schedule,
            total_runs: result.total_runs,
            successful_runs: result.successful_runs,
            failed_runs: result.failed_runs,
            failures_by_kind: result.failures_by_kind,
            runs: include_runs.then_some(result.runs),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrorResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub errors: Vec<ValidationIssue>,
}

impl From<ValidationError> for ValidationErrorResponse {
    fn from(err: ValidationError) -> Self {
        Self {
            status: "error",
            message: "Validation failed",
            errors: err.issues,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub enum PayloadError {
    Parse(serde_json::Error),
    Validation(ValidationErrorResponse),
    Failed(Error),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid request body: {err}"),
            Self::Validation(response) => {
                write!(f, "invalid request")?;
                for (i, issue) in response.errors.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{} {}", issue.field, issue.messages.join(", "))?;
                }
                Ok(())
            }
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<Error> for PayloadError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(validation) => Self::Validation(validation.into()),
            other => Self::Failed(other),
        }
    }
}

impl PayloadError {
    /// JSON body describing this error.
    pub fn to_json(&self) -> String {
        let rendered = match self {
            Self::Validation(response) => serde_json::to_string_pretty(response),
            Self::Parse(err) => serde_json::to_string_pretty(&ErrorResponse {
                status: "error",
                kind: ErrorKind::Validation,
                message: format!("invalid request body: {err}"),
            }),
            Self::Failed(err) => serde_json::to_string_pretty(&ErrorResponse {
                status: "error",
                kind: err.kind(),
                message: err.to_string(),
            }),
        };
        rendered.unwrap_or_else(|_| r#"{"status":"error"}"#.to_string())
    }
}

pub fn optimize_payload(optimizer: &ScheduleOptimizer, body: &str) -> Result<String, PayloadError> {
    let request: OptimizationRequest = serde_json::from_str(body).map_err(PayloadError::Parse)?;
    let selection = optimizer.optimize(&request)?;
    encode(&OptimizeResponse::from(selection))
}

pub fn simulate_payload(
    aggregator: &MonteCarloAggregator,
    body: &str,
) -> Result<String, PayloadError> {
    simulate_payload_with_progress(aggregator, body, |_, _| {})
}

/// Like [simulate_payload] but reports `on_progress(done, total)` between batches.
pub fn simulate_payload_with_progress<F>(
    aggregator: &MonteCarloAggregator,
    body: &str,
    on_progress: F,
) -> Result<String, PayloadError>
where
    F: FnMut(usize, usize),
{
    let request: SimulationRequest = serde_json::from_str(body).map_err(PayloadError::Parse)?;
    let result = aggregator.simulate_with_progress(&request, on_progress)?;
    let response = SimulateResponse::from_result(result, request.include_runs);
    encode(&response)
}

/// Response bodies that fail to encode are engine failures, not bad requests.
fn encode<T: Serialize>(response: &T) -> Result<String, PayloadError> {
    serde_json::to_string_pretty(response)
        .map_err(|err| PayloadError::Failed(DataError::Json(err).into()))
}

fn selection_message(selection: &Selection) -> String {
    match selection.status {
        SolveStatus::Optimal => format!(
            "selected {} of {} courses",
            selection.selected_count(),
            selection.items.len()
        ),
        status => format!("solver finished with status {status}; no courses selected"),
    }
}

fn simulation_message(result: &AggregateResult) -> Option<String> {
    if result.failed_runs == 0 {
        None
    } else if result.successful_runs == 0 {
        Some(format!(
            "all {} runs failed; probabilities are zero",
            result.total_runs
        ))
    } else {
        Some(format!(
            "{} of {} runs failed and were excluded from the probabilities",
            result.failed_runs, result.total_runs
        ))
    }
}
