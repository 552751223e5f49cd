//! Seeded clearing-price model.
//!
//! `price = clamp(predicted + residual_mean + z * residual_stdev, 0, ceiling)` where `z` is read
//! from the shared [ZScoreTable] at column `seed`, row `course.id - start_of_index`.

pub mod rng;

use std::sync::Arc;

use crate::data::course::Course;
use crate::data::z_table::ZScoreTable;
use crate::error::PriceError;

/// Highest admissible price. Larger draws are clamped, not rejected.
pub const PRICE_CEILING: f64 = 4851.0;

/// Course ids are 1-based; row 0 of the table belongs to id 1.
pub const DEFAULT_START_OF_INDEX: i64 = 1;

#[derive(Debug, Clone)]
pub struct PriceModel {
    table: Arc<ZScoreTable>,
    start_of_index: i64,
    ceiling: f64,
}

impl PriceModel {
    pub fn new(table: Arc<ZScoreTable>) -> Self {
        Self {
            table,
            start_of_index: DEFAULT_START_OF_INDEX,
            ceiling: PRICE_CEILING,
        }
    }

    pub fn with_start_of_index(mut self, start_of_index: i64) -> Self {
        self.start_of_index = start_of_index;
        self
    }

    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling.max(0.0);
        self
    }

    pub fn table(&self) -> &ZScoreTable {
        &self.table
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Row of the deviate table used for `course`.
    pub fn table_index(&self, course: &Course) -> i64 {
        i64::from(course.id) - self.start_of_index
    }

    pub fn price(&self, course: &Course, seed: u64) -> Result<f64, PriceError> {
        let z = self.table.deviate(seed, self.table_index(course))?;
        let params = &course.price;
        let raw = params.predicted_price + params.residual_mean + z * params.residual_stdev;
        Ok(clamp_price(raw, self.ceiling))
    }
}

fn clamp_price(raw: f64, ceiling: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, ceiling)
}
