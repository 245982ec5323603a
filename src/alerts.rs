//! Alert evaluation
//!
//! Flags localities whose recorded activity misses a required book or falls
//! below the preventive maintenance minimum.

use crate::types::{AlertKind, AlertSet, LocalityReport};
use serde::{Deserialize, Serialize};

pub const ADMINISTRATION_BOOK: &str = "4 - ADMINISTRAÇÃO";
pub const MAINTENANCE_BOOK: &str = "2 - MANUTENÇÃO PREVENTIVA";
pub const FIRE_BRIGADE_BOOK: &str = "4 - BRIGADA DE INCÊNDIO";
pub const MAINTENANCE_MINIMUM: u32 = 8;

/// Book names and thresholds used by the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRules {
    pub administration_book: String,
    pub maintenance_book: String,
    pub maintenance_minimum: u32,
    pub fire_brigade_book: String,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            administration_book: ADMINISTRATION_BOOK.to_string(),
            maintenance_book: MAINTENANCE_BOOK.to_string(),
            maintenance_minimum: MAINTENANCE_MINIMUM,
            fire_brigade_book: FIRE_BRIGADE_BOOK.to_string(),
        }
    }
}

/// Evaluator applying a fixed rule set to locality reports
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    rules: AlertRules,
}

impl AlertEvaluator {
    pub fn new(rules: AlertRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AlertRules {
        &self.rules
    }

    /// Compute the alert flags for one report
    pub fn evaluate(&self, report: &LocalityReport) -> AlertSet {
        let rules = &self.rules;

        AlertSet {
            missing_administration: report.count_of(&rules.administration_book).is_none(),
            insufficient_maintenance: report
                .count_of(&rules.maintenance_book)
                .map_or(true, |count| count < rules.maintenance_minimum),
            missing_fire_brigade: report.count_of(&rules.fire_brigade_book).is_none(),
        }
    }

    /// Human-readable notice for a raised alert
    pub fn notice(&self, kind: AlertKind) -> String {
        match kind {
            AlertKind::MissingAdministration => {
                format!("No entries recorded for {}", self.rules.administration_book)
            }
            AlertKind::InsufficientMaintenance => format!(
                "Fewer than {} entries recorded for {}",
                self.rules.maintenance_minimum, self.rules.maintenance_book
            ),
            AlertKind::MissingFireBrigade => {
                format!("No entries recorded for {}", self.rules.fire_brigade_book)
            }
        }
    }
}

impl AlertSet {
    /// Whether the attention block should be rendered at all
    pub fn has_any_alert(&self) -> bool {
        self.missing_administration || self.insufficient_maintenance || self.missing_fire_brigade
    }

    /// Raised alerts in display order
    pub fn active(&self) -> Vec<AlertKind> {
        let mut kinds = Vec::new();
        if self.missing_administration {
            kinds.push(AlertKind::MissingAdministration);
        }
        if self.insufficient_maintenance {
            kinds.push(AlertKind::InsufficientMaintenance);
        }
        if self.missing_fire_brigade {
            kinds.push(AlertKind::MissingFireBrigade);
        }
        kinds
    }
}
