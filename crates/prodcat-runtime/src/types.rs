//! Runtime types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a training run.
///
/// Stages only move forward; `Failed` can follow any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    Idle,
    Cleaning,
    Featurizing,
    Splitting,
    Fitting,
    Evaluating,
    Persisting,
    Done,
    Failed,
}

impl TrainingStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether a run in this stage may move to `next`.
    pub fn can_advance_to(&self, next: TrainingStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            _ => next > *self,
        }
    }
}

impl std::fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Cleaning => "cleaning",
            Self::Featurizing => "featurizing",
            Self::Splitting => "splitting",
            Self::Fitting => "fitting",
            Self::Evaluating => "evaluating",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One recorded stage change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: TrainingStage,
    pub to: TrainingStage,
    pub at: DateTime<Utc>,
}

/// Summary returned by a successful training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    /// Always `"done"`.
    pub status: String,
    /// Validation accuracy.
    pub accuracy: f64,
    /// Support-weighted validation F1.
    pub f1: f64,
    pub row_budget: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub classes: usize,
    pub device: String,
    pub duration_ms: u64,
}

/// A category with its predicted probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCategory {
    pub code: i64,
    pub category: String,
    pub probability: f32,
}

/// Classification of one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_code: i64,
    pub category: String,
    /// Best categories, most probable first.
    pub top: Vec<RankedCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        use TrainingStage::*;
        assert!(Idle.can_advance_to(Cleaning));
        assert!(Cleaning.can_advance_to(Featurizing));
        assert!(Splitting.can_advance_to(Failed));
        assert!(!Fitting.can_advance_to(Splitting));
        assert!(!Fitting.can_advance_to(Fitting));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Cleaning));
    }

    #[test]
    fn test_stage_serde() {
        assert_eq!(serde_json::to_string(&TrainingStage::Featurizing).unwrap(), "\"featurizing\"");
        assert_eq!(TrainingStage::Persisting.to_string(), "persisting");
    }

    #[test]
    fn test_report_field_names() {
        let report = TrainingReport {
            status: "done".into(),
            accuracy: 0.9,
            f1: 0.88,
            row_budget: 1000,
            train_rows: 800,
            validation_rows: 200,
            classes: 27,
            device: "single".into(),
            duration_ms: 1234,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["rowBudget"], 1000);
        assert_eq!(json["trainRows"], 800);
        assert_eq!(json["validationRows"], 200);
        assert_eq!(json["durationMs"], 1234);
        assert!(json.get("train_rows").is_none());
    }
}
