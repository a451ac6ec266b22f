// src/classifier.rs - Severity stages and the rule-based grader

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::lesions::LesionCounts;

/// Diabetic-retinopathy severity, ordered from healthy to most advanced.
///
/// The discriminant doubles as the class index of the learned model's
/// 5-way output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityStage {
    NoDR = 0,
    MildNPDR = 1,
    ModerateNPDR = 2,
    SevereNPDR = 3,
    ProliferativeDR = 4,
}

impl SeverityStage {
    pub const ALL: [SeverityStage; 5] = [
        SeverityStage::NoDR,
        SeverityStage::MildNPDR,
        SeverityStage::ModerateNPDR,
        SeverityStage::SevereNPDR,
        SeverityStage::ProliferativeDR,
    ];

    /// Number of stages, i.e. the model head width
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable diagnosis label
    pub fn display_name(self) -> &'static str {
        match self {
            SeverityStage::NoDR => "No DR (Healthy)",
            SeverityStage::MildNPDR => "Mild Nonproliferative DR",
            SeverityStage::ModerateNPDR => "Moderate Nonproliferative DR",
            SeverityStage::SevereNPDR => "Severe Nonproliferative DR",
            SeverityStage::ProliferativeDR => "Proliferative DR",
        }
    }
}

impl fmt::Display for SeverityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A stage with its confidence and an explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub stage: SeverityStage,
    /// Always within [0, 1]
    pub confidence: f64,
    pub detail: String,
}

/// Grade from lesion counts. First matching rule wins.
///
/// Confidences are fixed per stage. Note the Moderate and Severe rules combine
/// the two counts with OR, so a very high exudate count with few hemorrhages
/// still lands in Moderate.
pub fn classify_heuristic(counts: LesionCounts) -> Classification {
    let LesionCounts { hemorrhages: h, exudates: e } = counts;

    let (stage, confidence) = if h == 0 && e == 0 {
        (SeverityStage::NoDR, 0.98)
    } else if h < 5 && e == 0 {
        (SeverityStage::MildNPDR, 0.92)
    } else if h < 15 || e < 5 {
        (SeverityStage::ModerateNPDR, 0.88)
    } else if h < 30 || e < 15 {
        (SeverityStage::SevereNPDR, 0.85)
    } else {
        (SeverityStage::ProliferativeDR, 0.82)
    };

    Classification {
        stage,
        confidence,
        detail: format!(
            "Heuristic grading: {} hemorrhage/microaneurysm candidates, {} exudate candidates.",
            h, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn grade(h: usize, e: usize) -> Classification {
        classify_heuristic(LesionCounts { hemorrhages: h, exudates: e })
    }

    #[test]
    fn decision_table_boundaries() {
        let cases = [
            ((0, 0), SeverityStage::NoDR, 0.98),
            ((4, 0), SeverityStage::MildNPDR, 0.92),
            ((14, 4), SeverityStage::ModerateNPDR, 0.88),
            ((29, 14), SeverityStage::SevereNPDR, 0.85),
            ((30, 15), SeverityStage::ProliferativeDR, 0.82),
        ];

        for ((h, e), stage, confidence) in cases {
            let result = grade(h, e);
            assert_eq!(result.stage, stage, "H={} E={}", h, e);
            assert_approx_eq!(result.confidence, confidence);
        }
    }

    #[test]
    fn or_rules_route_exudate_heavy_images_to_moderate() {
        assert_eq!(grade(0, 100).stage, SeverityStage::ModerateNPDR);
        assert_eq!(grade(5, 0).stage, SeverityStage::ModerateNPDR);
        assert_eq!(grade(100, 4).stage, SeverityStage::ModerateNPDR);
        assert_eq!(grade(15, 14).stage, SeverityStage::SevereNPDR);
        assert_eq!(grade(40, 10).stage, SeverityStage::SevereNPDR);
    }

    #[test]
    fn grading_is_pure() {
        assert_eq!(grade(12, 7), grade(12, 7));
    }

    #[test]
    fn detail_reports_raw_counts() {
        assert_eq!(
            grade(17, 3).detail,
            "Heuristic grading: 17 hemorrhage/microaneurysm candidates, 3 exudate candidates."
        );
    }

    #[test]
    fn stage_index_round_trips() {
        for stage in SeverityStage::ALL {
            assert_eq!(SeverityStage::from_index(stage.index()), Some(stage));
        }
        assert_eq!(SeverityStage::from_index(5), None);
        assert!(SeverityStage::NoDR < SeverityStage::ProliferativeDR);
        assert_eq!(SeverityStage::NoDR.to_string(), "No DR (Healthy)");
    }
}
