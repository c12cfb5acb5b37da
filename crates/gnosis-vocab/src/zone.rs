//! Registry-size zones and the aggressiveness curve derived from them.
//!
//! Aggressiveness is a scalar in `[0, 1]` that tightens both how readily a
//! merge is accepted (the effective merge threshold rises with it) and how
//! readily a brand new type is allowed to be minted (the creation ceiling
//! falls with it), so a crowded registry leans on degraded nearest-match
//! merges rather than letting either avenue stay easy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    Comfort,
    Normal,
    Pressure,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub min_comfort: usize,
    pub soft_max: usize,
    pub hard_max: usize,
    /// Best-match cosine similarity at or above which a suggestion merges
    /// into the matched type instead of becoming (or attempting to become) a
    /// new one. Raised by aggressiveness as the registry fills up.
    pub merge_threshold: f32,
    /// The lowest best-match similarity a zone will still treat as "not
    /// dissimilar enough to create", used as the floor of the creation
    /// ceiling under full aggressiveness. A suggestion whose similarity is
    /// below this is always dissimilar enough to create, regardless of zone.
    pub creation_threshold: f32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            min_comfort: 30,
            soft_max: 90,
            hard_max: 200,
            merge_threshold: 0.92,
            creation_threshold: 0.55,
        }
    }
}

impl ZoneConfig {
    /// `(zone, aggressiveness)` for a registry of `size` entries.
    pub fn zone_for(&self, size: usize) -> (Zone, f32) {
        if size <= self.min_comfort {
            (Zone::Comfort, 0.0)
        } else if size <= self.soft_max {
            let span = (self.soft_max - self.min_comfort).max(1) as f32;
            let frac = (size - self.min_comfort) as f32 / span;
            (Zone::Normal, 0.66 * frac)
        } else if size <= self.hard_max {
            let span = (self.hard_max - self.soft_max).max(1) as f32;
            let frac = (size - self.soft_max) as f32 / span;
            (Zone::Pressure, 0.66 + 0.34 * frac)
        } else {
            (Zone::Emergency, 1.0)
        }
    }

    /// The similarity at or above which a match is accepted as a merge,
    /// raised toward 1.0 as aggressiveness grows.
    pub fn effective_merge_threshold(&self, aggressiveness: f32) -> f32 {
        self.merge_threshold + aggressiveness * (1.0 - self.merge_threshold)
    }

    /// The similarity at or below which a novel type may still be created,
    /// falling from `merge_threshold` (comfort: anything under the merge
    /// bar may be created) toward `creation_threshold` (full pressure: only
    /// a wide-margin outlier may be created).
    pub fn creation_ceiling(&self, aggressiveness: f32) -> f32 {
        self.merge_threshold - aggressiveness * (self.merge_threshold - self.creation_threshold)
    }

    /// Whether `zone` permits minting a new type at all. Emergency never
    /// does, regardless of how dissimilar the suggestion is.
    pub fn permits_creation(&self, zone: Zone, similarity: f32, aggressiveness: f32) -> bool {
        match zone {
            Zone::Emergency => false,
            _ => similarity <= self.creation_ceiling(aggressiveness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfort_zone_has_zero_aggressiveness() {
        let cfg = ZoneConfig::default();
        let (zone, agg) = cfg.zone_for(10);
        assert_eq!(zone, Zone::Comfort);
        assert_eq!(agg, 0.0);
    }

    #[test]
    fn normal_zone_scales_up_to_66_percent() {
        let cfg = ZoneConfig::default();
        let (zone, agg) = cfg.zone_for(90);
        assert_eq!(zone, Zone::Normal);
        assert!((agg - 0.66).abs() < 1e-6);
    }

    #[test]
    fn pressure_zone_reaches_100_percent_at_hard_max() {
        let cfg = ZoneConfig::default();
        let (zone, agg) = cfg.zone_for(200);
        assert_eq!(zone, Zone::Pressure);
        assert!((agg - 1.0).abs() < 1e-6);
    }

    #[test]
    fn beyond_hard_max_is_emergency() {
        let cfg = ZoneConfig::default();
        let (zone, agg) = cfg.zone_for(201);
        assert_eq!(zone, Zone::Emergency);
        assert_eq!(agg, 1.0);
        assert!(!cfg.permits_creation(zone, 0.0, agg));
    }

    #[test]
    fn small_registry_under_pressure_config_blocks_marginal_dissimilarity() {
        // Mirrors the degraded-merge scenario: a tiny registry where
        // hard_max is deliberately set equal to the current size.
        let cfg = ZoneConfig {
            min_comfort: 1,
            soft_max: 2,
            hard_max: 3,
            ..ZoneConfig::default()
        };
        let (zone, agg) = cfg.zone_for(3);
        assert_eq!(zone, Zone::Pressure);
        assert!((agg - 1.0).abs() < 1e-6);
        // 0.62 is not dissimilar enough once the ceiling has collapsed to
        // creation_threshold (0.55) under full pressure aggressiveness.
        assert!(!cfg.permits_creation(zone, 0.62, agg));
        // But a genuinely wide-margin outlier still gets created.
        assert!(cfg.permits_creation(zone, 0.3, agg));
    }
}
