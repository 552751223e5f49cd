//! Binary program formulation of one schedule solve.
//!
//! One 0/1 variable per requested course, in request order. Maximise Σ utility × credit weight
//! subject to the budget, the credit cap, at most one section per group and at most one
//! section per time-slot token. Fixed courses are pinned to 1.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::conflict::TimeSlotToken;

/// Slack allowed when checking a returned assignment against its constraints.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// The seed-independent part of a requested course.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCourse {
    pub id: u32,
    pub group_id: String,
    pub credit_weight: f64,
    pub utility: f64,
    pub tokens: BTreeSet<TimeSlotToken>,
    pub fixed: bool,
}

impl PreparedCourse {
    pub fn objective_coefficient(&self) -> f64 {
        self.utility * self.credit_weight
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstraintKind {
    Budget,
    Credits,
    Group(String),
    TimeSlot(TimeSlotToken),
    Fixed(u32),
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Budget => write!(f, "budget"),
            Self::Credits => write!(f, "credits"),
            Self::Group(group) => write!(f, "group {group}"),
            Self::TimeSlot(token) => write!(f, "time slot {token}"),
            Self::Fixed(id) => write!(f, "fixed course {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    AtMost(f64),
    Exactly(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    /// `(variable index, coefficient)` pairs.
    pub terms: Vec<(usize, f64)>,
    pub bound: Bound,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[bool]) -> f64 {
        self.terms
            .iter()
            .filter(|(idx, _)| values.get(*idx).copied().unwrap_or(false))
            .map(|(_, coefficient)| coefficient)
            .sum()
    }

    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        let lhs = self.lhs(values);
        match self.bound {
            Bound::AtMost(rhs) => lhs <= rhs + FEASIBILITY_TOLERANCE,
            Bound::Exactly(rhs) => (lhs - rhs).abs() <= FEASIBILITY_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryProgram {
    /// Objective coefficient per variable.
    pub objective: Vec<f64>,
    pub constraints: Vec<LinearConstraint>,
}

impl BinaryProgram {
    /// Build the program for `courses` priced at `prices` (same order, same length).
    pub fn formulate(
        courses: &[PreparedCourse],
        prices: &[f64],
        budget: f64,
        max_credit_weight: f64,
    ) -> Self {
        debug_assert_eq!(courses.len(), prices.len());

        let objective = courses.iter().map(PreparedCourse::objective_coefficient).collect();
        let mut constraints = vec![
            LinearConstraint {
                kind: ConstraintKind::Budget,
                terms: prices.iter().copied().enumerate().collect(),
                bound: Bound::AtMost(budget),
            },
            LinearConstraint {
                kind: ConstraintKind::Credits,
                terms: courses
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| (idx, c.credit_weight))
                    .collect(),
                bound: Bound::AtMost(max_credit_weight),
            },
        ];

        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut slots: BTreeMap<&TimeSlotToken, Vec<usize>> = BTreeMap::new();
        for (idx, course) in courses.iter().enumerate() {
            groups.entry(course.group_id.as_str()).or_default().push(idx);
            for token in &course.tokens {
                slots.entry(token).or_default().push(idx);
            }
        }

        constraints.extend(
            groups
                .into_iter()
                .filter(|(_, members)| members.len() > 1)
                .map(|(group, members)| {
                    at_most_one(ConstraintKind::Group(group.to_string()), members)
                }),
        );
        constraints.extend(
            slots
                .into_iter()
                .filter(|(_, members)| members.len() > 1)
                .map(|(token, members)| {
                    at_most_one(ConstraintKind::TimeSlot(token.clone()), members)
                }),
        );
        constraints.extend(courses.iter().enumerate().filter(|(_, c)| c.fixed).map(
            |(idx, course)| LinearConstraint {
                kind: ConstraintKind::Fixed(course.id),
                terms: vec![(idx, 1.0)],
                bound: Bound::Exactly(1.0),
            },
        ));

        Self {
            objective,
            constraints,
        }
    }

    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }

    pub fn objective_value(&self, values: &[bool]) -> f64 {
        self.objective
            .iter()
            .zip(values)
            .filter(|(_, &selected)| selected)
            .map(|(coefficient, _)| coefficient)
            .sum()
    }

    /// Constraints the assignment breaks. Empty means feasible.
    pub fn violations(&self, values: &[bool]) -> Vec<&LinearConstraint> {
        self.constraints
            .iter()
            .filter(|constraint| !constraint.is_satisfied(values))
            .collect()
    }
}

fn at_most_one(kind: ConstraintKind, members: Vec<usize>) -> LinearConstraint {
    LinearConstraint {
        kind,
        terms: members.into_iter().map(|idx| (idx, 1.0)).collect(),
        bound: Bound::AtMost(1.0),
    }
}
