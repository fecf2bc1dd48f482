//! Progressive data-volume rollout.
//!
//! The number of raw rows cleaned per run grows linearly from `floor` on
//! `start` to `ceiling` on `end`, so early runs stay cheap while the corpus
//! ramps up.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSchedule {
    pub floor: usize,
    pub ceiling: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for RolloutSchedule {
    fn default() -> Self {
        Self {
            floor: 1000,
            ceiling: 85000,
            start: NaiveDate::from_ymd_opt(2025, 11, 15).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2025, 12, 13).unwrap_or_default(),
        }
    }
}

impl RolloutSchedule {
    pub fn validate(&self) -> Result<()> {
        if self.floor > self.ceiling {
            return Err(Error::Config(format!(
                "rollout floor {} exceeds ceiling {}",
                self.floor, self.ceiling
            )));
        }
        if self.end < self.start {
            return Err(Error::Config(format!(
                "rollout ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }

    /// Row budget for a run on `date`.
    pub fn rows_for(&self, date: NaiveDate) -> usize {
        let elapsed = (date - self.start).num_days();
        let total = (self.end - self.start).num_days();

        if elapsed < 0 {
            return self.floor;
        }
        if elapsed >= total {
            return self.ceiling;
        }

        let span = self.ceiling.saturating_sub(self.floor) as f64;
        let rows = self.floor as f64 + span * elapsed as f64 / total as f64;
        rows.ceil() as usize
    }

    /// Row budget for a run today (local time).
    pub fn rows_for_today(&self) -> usize {
        self.rows_for(chrono::Local::now().date_naive())
    }
}
