//! Course sections (the schedulable items) and the raw record shape they are parsed from.

use std::collections::HashMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Length of the course part of a primary section id, e.g. `ACCT6110` in `ACCT6110001`.
pub const COURSE_ID_LEN: usize = 8;

/// Upper bound for a section's credit weight and for a request's `max_credit_weight`.
pub const MAX_CREDIT_WEIGHT: f64 = 10.0;

/// When and how often a section meets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Part of term: `1`..`4` quarters, `F`/`S` half-years, `M`/`Modular`.
    pub term_part: String,
    /// Day pattern such as `MW`, `TR`, `F`, or `TBA`.
    pub days_code: String,
    pub start_time: NaiveTime,
    pub stop_time: NaiveTime,
}

impl Meeting {
    pub fn new(
        term_part: impl Into<String>,
        days_code: impl Into<String>,
        start_time: &str,
        stop_time: &str,
    ) -> Result<Self, DataError> {
        Ok(Self {
            term_part: term_part.into(),
            days_code: days_code.into(),
            start_time: parse_clock_time(start_time)?,
            stop_time: parse_clock_time(stop_time)?,
        })
    }

    /// Signed length in minutes; negative when the stop time precedes the start.
    pub fn duration_minutes(&self) -> i64 {
        (self.stop_time - self.start_time).num_minutes()
    }
}

/// Parameters of the clearing-price forecast for one section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceParams {
    pub predicted_price: f64,
    pub residual_mean: f64,
    pub residual_stdev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: u32,
    pub section_id: String,
    /// Alternate sections share a group; at most one per group is selected.
    pub group_id: String,
    pub section_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    pub credit_weight: f64,
    pub meeting: Meeting,
    pub price: PriceParams,
}

/// One row of the course export, as found in CSV, XLSX or JSON sources.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseRow {
    #[serde(alias = "id")]
    pub uniqueid: u32,
    pub primary_section_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(alias = "term_part")]
    pub part_of_term: String,
    pub days_code: String,
    #[serde(alias = "start_time")]
    pub start_time_24hr: String,
    #[serde(alias = "stop_time")]
    pub stop_time_24hr: String,
    #[serde(alias = "credits", alias = "credit_weight")]
    pub credit_unit: f64,
    #[serde(alias = "predicted_price")]
    pub price_predicted: f64,
    #[serde(alias = "residual_mean")]
    pub resid_mean: f64,
    #[serde(alias = "residual_stdev")]
    pub resid_stdev: f64,
}

/// Maps course ids to shared group ids for cross-listed and core-alternative courses.
/// Reads from config as a plain `course id: group id` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMapping {
    aliases: HashMap<String, String>,
}

const CROSS_LISTED: &[(&str, &str)] = &[
    ("STAT6130", "FC_STAT"),
    ("STAT6210", "FC_STAT"),
    ("WHCP6160", "FC_WHCP"),
    ("WHCP6180", "FC_WHCP"),
    ("ACCT6110", "FC_ACCT"),
    ("ACCT6130", "FC_ACCT"),
    ("FNCE6110", "FC_FNCE"),
    ("FNCE6210", "FC_FNCE"),
    ("FNCE6130", "FC_MACRO"),
    ("FNCE6230", "FC_MACRO"),
    ("MGMT6110", "FC_MGMT"),
    ("MGMT6120", "FC_MGMT"),
    ("MKTG6120", "FC_MKTG"),
    ("MKTG6130", "FC_MKTG"),
    ("ACCT7970", "TABS"),
    ("FNCE7970", "TABS"),
    ("BEPP7630", "EMAP"),
    ("OIDD7630", "EMAP"),
    ("LGST8050", "AABT"),
    ("MKTG7600", "AABT"),
    ("LGST8060", "NEGO"),
    ("MGMT6910", "NEGO"),
    ("OIDD6910", "NEGO"),
    ("LGST8090", "SBM"),
    ("MGMT8150", "SBM"),
    ("MGMT7290", "IPSIDE"),
    ("LGST7290", "IPSIDE"),
    ("OIDD6900", "MDM"),
    ("MGMT6900", "MDM"),
    ("OIDD6930", "INFL"),
    ("LGST6930", "INFL"),
    ("OIDD7610", "RAEM"),
    ("BEPP7610", "RAEM"),
    ("REAL7080", "HM"),
    ("BEPP7080", "HM"),
    ("REAL7210", "REIAF"),
    ("FNCE7210", "REIAF"),
    ("REAL8040", "REL"),
    ("LGST8040", "REL"),
    ("REAL8360", "IHC"),
    ("BEPP8360", "IHC"),
    ("STAT7770", "IPDS"),
    ("OIDD7770", "IPDS"),
];

impl Default for GroupMapping {
    fn default() -> Self {
        Self {
            aliases: CROSS_LISTED
                .iter()
                .map(|(course, group)| (course.to_string(), group.to_string()))
                .collect(),
        }
    }
}

impl GroupMapping {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn from_aliases<I, K, V>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(course, group)| (course.into(), group.into()))
                .collect(),
        }
    }

    pub fn group_for<'a>(&'a self, course_id: &'a str) -> &'a str {
        self.aliases
            .get(course_id)
            .map(String::as_str)
            .unwrap_or(course_id)
    }

    /// Split `ACCT6110001` into (`FC_ACCT`, `001`).
    pub fn split_section_id(&self, section_id: &str) -> (String, String) {
        let split_at = section_id
            .char_indices()
            .nth(COURSE_ID_LEN)
            .map(|(idx, _)| idx)
            .unwrap_or(section_id.len());
        let (course, section) = section_id.split_at(split_at);
        (self.group_for(course).to_string(), section.to_string())
    }
}

impl Course {
    pub fn from_row(row: CourseRow, groups: &GroupMapping) -> Result<Self, DataError> {
        let section_id = row.primary_section_id.trim().to_string();
        let (derived_group, section_code) = groups.split_section_id(&section_id);
        let group_id = match row.course_id.as_deref().map(str::trim) {
            Some(explicit) if !explicit.is_empty() => groups.group_for(explicit).to_string(),
            _ => derived_group,
        };

        Ok(Self {
            id: row.uniqueid,
            section_id,
            group_id,
            section_code,
            title: row.title.filter(|t| !t.trim().is_empty()),
            instructor: row.instructor.filter(|i| !i.trim().is_empty()),
            credit_weight: row.credit_unit,
            meeting: Meeting::new(
                row.part_of_term.trim(),
                row.days_code.trim(),
                &row.start_time_24hr,
                &row.stop_time_24hr,
            )?,
            price: PriceParams {
                predicted_price: row.price_predicted,
                residual_mean: row.resid_mean,
                residual_stdev: row.resid_stdev,
            },
        })
    }
}

/// Parse `HH:MM` or `HH:MM:SS` (24h). Surrounding whitespace is ignored.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime, DataError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| DataError::InvalidTime(raw.to_string()))
}
