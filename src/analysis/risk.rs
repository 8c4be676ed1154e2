//! Risk levels with hysteresis

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RiskThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Normal,
    Elevated,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Normal => f.write_str("normal"),
            RiskLevel::Elevated => f.write_str("elevated"),
            RiskLevel::Critical => f.write_str("critical"),
        }
    }
}

/// Tracks one sensor's current risk level.
///
/// A level is entered when the score reaches its rising threshold and left
/// only once the score drops below its falling threshold.
#[derive(Debug, Clone)]
pub struct RiskTracker {
    thresholds: RiskThresholds,
    level: RiskLevel,
}

impl RiskTracker {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self {
            thresholds,
            level: RiskLevel::Normal,
        }
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    /// Feed a score; returns `(previous, new)` when the level changes
    pub fn update(&mut self, score: f64) -> Option<(RiskLevel, RiskLevel)> {
        if !score.is_finite() {
            return None;
        }

        let next = self.classify(score);
        if next == self.level {
            return None;
        }

        let previous = self.level;
        self.level = next;
        Some((previous, next))
    }

    fn classify(&self, score: f64) -> RiskLevel {
        let RiskThresholds { elevated, critical } = self.thresholds;

        match self.level {
            RiskLevel::Normal => {
                if score >= critical.rising {
                    RiskLevel::Critical
                } else if score >= elevated.rising {
                    RiskLevel::Elevated
                } else {
                    RiskLevel::Normal
                }
            }
            RiskLevel::Elevated => {
                if score >= critical.rising {
                    RiskLevel::Critical
                } else if score < elevated.falling {
                    RiskLevel::Normal
                } else {
                    RiskLevel::Elevated
                }
            }
            RiskLevel::Critical => {
                if score >= critical.falling {
                    RiskLevel::Critical
                } else if score >= elevated.falling {
                    RiskLevel::Elevated
                } else {
                    RiskLevel::Normal
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HysteresisBand;

    fn tracker() -> RiskTracker {
        RiskTracker::new(RiskThresholds {
            elevated: HysteresisBand { rising: 1.0, falling: 0.8 },
            critical: HysteresisBand { rising: 3.0, falling: 2.5 },
        })
    }

    #[test]
    fn test_rising_through_levels() {
        let mut risk = tracker();
        assert_eq!(risk.update(0.5), None);
        assert_eq!(risk.update(1.0), Some((RiskLevel::Normal, RiskLevel::Elevated)));
        assert_eq!(risk.update(3.2), Some((RiskLevel::Elevated, RiskLevel::Critical)));
    }

    #[test]
    fn test_hysteresis_suppresses_flapping() {
        let mut risk = tracker();
        assert_eq!(risk.update(1.05), Some((RiskLevel::Normal, RiskLevel::Elevated)));
        // Just below rising, still above falling
        assert_eq!(risk.update(0.99), None);
        assert_eq!(risk.update(1.01), None);
        assert_eq!(risk.update(0.81), None);
        assert_eq!(risk.level(), RiskLevel::Elevated);

        assert_eq!(risk.update(0.79), Some((RiskLevel::Elevated, RiskLevel::Normal)));
    }

    #[test]
    fn test_critical_falls_to_matching_level() {
        let mut risk = tracker();
        risk.update(5.0);
        assert_eq!(risk.update(2.6), None);
        assert_eq!(risk.update(1.5), Some((RiskLevel::Critical, RiskLevel::Elevated)));

        risk.update(5.0);
        assert_eq!(risk.update(0.1), Some((RiskLevel::Critical, RiskLevel::Normal)));
    }

    #[test]
    fn test_non_finite_score_ignored() {
        let mut risk = tracker();
        assert_eq!(risk.update(f64::NAN), None);
        assert_eq!(risk.update(f64::INFINITY), None);
        assert_eq!(risk.level(), RiskLevel::Normal);
    }
}
