//! Request shapes for single-shot optimisation and Monte Carlo simulation, plus validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub use crate::data::course::MAX_CREDIT_WEIGHT;
pub const MAX_UTILITY: f64 = 100.0;
/// Default upper bound for `num_runs`.
pub const MAX_RUNS: usize = 1000;

/// A candidate course and how much the student wants it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourseUtility {
    #[serde(alias = "uniqueid")]
    pub id: u32,
    pub utility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub budget: f64,
    #[serde(alias = "max_credits")]
    pub max_credit_weight: f64,
    pub seed: u64,
    #[serde(alias = "courses")]
    pub items: Vec<CourseUtility>,
    /// Ids that must be part of the schedule.
    #[serde(default, alias = "fixed_courses", skip_serializing_if = "Vec::is_empty")]
    pub fixed_items: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub budget: f64,
    #[serde(alias = "max_credits")]
    pub max_credit_weight: f64,
    #[serde(alias = "courses")]
    pub items: Vec<CourseUtility>,
    #[serde(default, alias = "fixed_courses", skip_serializing_if = "Vec::is_empty")]
    pub fixed_items: Vec<u32>,
    #[serde(alias = "num_simulations")]
    pub num_runs: usize,
    /// When absent, run `i` uses seed `i + 1`.
    #[serde(default, alias = "seed")]
    pub base_seed: Option<u64>,
    /// Include every run in the response, not only the aggregate.
    #[serde(default)]
    pub include_runs: bool,
}

/// Server-side limits applied on top of the fixed field ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_runs: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self { max_runs: MAX_RUNS }
    }
}

impl OptimizationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        check_shared(
            &mut errors,
            self.budget,
            self.max_credit_weight,
            &self.items,
            &self.fixed_items,
        );
        errors.into_result()
    }
}

impl SimulationRequest {
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        check_shared(
            &mut errors,
            self.budget,
            self.max_credit_weight,
            &self.items,
            &self.fixed_items,
        );
        if self.num_runs == 0 || self.num_runs > limits.max_runs {
            errors.push(
                "num_runs",
                format!("must be between 1 and {}, got {}", limits.max_runs, self.num_runs),
            );
        }
        errors.into_result()
    }

    /// The single-shot request one run solves, priced with `seed`.
    pub fn run_request(&self, seed: u64) -> OptimizationRequest {
        OptimizationRequest {
            budget: self.budget,
            max_credit_weight: self.max_credit_weight,
            seed,
            items: self.items.clone(),
            fixed_items: self.fixed_items.clone(),
        }
    }
}

fn check_shared(
    errors: &mut ValidationError,
    budget: f64,
    max_credit_weight: f64,
    items: &[CourseUtility],
    fixed_items: &[u32],
) {
    if !budget.is_finite() || budget <= 0.0 {
        errors.push("budget", format!("must be a positive number, got {budget}"));
    }
    if !max_credit_weight.is_finite()
        || max_credit_weight <= 0.0
        || max_credit_weight > MAX_CREDIT_WEIGHT
    {
        errors.push(
            "max_credit_weight",
            format!("must be in (0, {MAX_CREDIT_WEIGHT}], got {max_credit_weight}"),
        );
    }

    if items.is_empty() {
        errors.push("items", "must not be empty");
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id) {
            errors.push("items", format!("duplicate id {}", item.id));
        }
        if !item.utility.is_finite() || !(0.0..=MAX_UTILITY).contains(&item.utility) {
            errors.push(
                "items",
                format!(
                    "utility for {} must be in [0, {MAX_UTILITY}], got {}",
                    item.id, item.utility
                ),
            );
        }
    }

    for id in fixed_items {
        if !seen.contains(id) {
            errors.push("fixed_items", format!("{id} is not one of the requested items"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u32, utility: f64) -> CourseUtility {
        CourseUtility { id, utility }
    }

    fn request() -> OptimizationRequest {
        OptimizationRequest {
            budget: 5000.0,
            max_credit_weight: 5.0,
            seed: 1,
            items: vec![item(1, 80.0), item(2, 60.0)],
            fixed_items: Vec::new(),
        }
    }

    #[test]
    fn well_formed_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn every_problem_is_reported() {
        let mut req = request();
        req.budget = 0.0;
        req.max_credit_weight = 12.0;
        req.items.push(item(1, 101.0));
        req.fixed_items = vec![9];

        let err = req.validate().unwrap_err();
        let fields: Vec<&str> = err.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["budget", "max_credit_weight", "items", "fixed_items"]);
        assert_eq!(err.issues[2].messages.len(), 2);
    }

    #[test]
    fn empty_items_are_rejected() {
        let mut req = request();
        req.items.clear();
        let err = req.validate().unwrap_err();
        assert_eq!(err.issues[0].field, "items");
    }

    #[test]
    fn nan_values_are_rejected() {
        let mut req = request();
        req.budget = f64::NAN;
        req.items[0].utility = f64::NAN;
        assert_eq!(req.validate().unwrap_err().issues.len(), 2);
    }

    #[test]
    fn num_runs_respects_limits() {
        let sim = SimulationRequest {
            budget: 100.0,
            max_credit_weight: 1.0,
            items: vec![item(1, 1.0)],
            fixed_items: Vec::new(),
            num_runs: 0,
            base_seed: None,
            include_runs: false,
        };
        assert!(sim.validate(&RequestLimits::default()).is_err());
        let sim = SimulationRequest { num_runs: 1000, ..sim };
        assert!(sim.validate(&RequestLimits::default()).is_ok());
        assert!(sim.validate(&RequestLimits { max_runs: 10 }).is_err());
    }

    #[test]
    fn original_field_names_are_accepted() {
        let json = r#"{"budget": 4000, "max_credits": 4.5, "seed": 3,
            "courses": [{"uniqueid": 12, "utility": 75}], "fixed_courses": [12]}"#;
        let req: OptimizationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.items, vec![item(12, 75.0)]);
        assert_eq!(req.fixed_items, vec![12]);

        let json = r#"{"budget": 4000, "max_credit_weight": 4.5, "num_simulations": 5,
            "items": [{"id": 12, "utility": 75}], "seed": 0}"#;
        let sim: SimulationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(sim.num_runs, 5);
        assert_eq!(sim.base_seed, Some(0));
        assert!(!sim.include_runs);
    }
}
