//! Periodontal chart snapshots
//!
//! A patient's periodontal history is an append log of snapshots. An
//! auto-save overwrites the newest snapshot; an explicit save appends a new
//! one, so the log grows once per deliberate save.

use super::tooth::ToothNumber;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Measurement sites per tooth (disto-, mid-, mesio- buccal then lingual)
pub const SITES_PER_TOOTH: usize = 6;

const MAX_POCKET_DEPTH_MM: u8 = 20;

/// Probing depth from which a site counts as a deep pocket
pub const DEEP_POCKET_MM: u8 = 5;

/// How the client saved the periodontal chart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveIntent {
    #[default]
    Auto,
    Explicit,
}

/// Measurements for one tooth
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerioMeasurement {
    /// Probing depth in millimetres
    pub pocket_depths: [u8; SITES_PER_TOOTH],
    /// Gingival recession in millimetres; negative for hyperplasia
    pub recession: [i8; SITES_PER_TOOTH],
    pub bleeding: [bool; SITES_PER_TOOTH],
    pub plaque: [bool; SITES_PER_TOOTH],
    /// Miller grade 0-3
    pub mobility: Option<u8>,
    /// Furcation grade 0-3
    pub furcation: Option<u8>,
}

impl PerioMeasurement {
    fn validate(&self, tooth: ToothNumber) -> Result<()> {
        if let Some(depth) = self.pocket_depths.iter().find(|d| **d > MAX_POCKET_DEPTH_MM) {
            return Err(AppError::Validation {
                message: format!("pocket depth {}mm on tooth {} is implausible", depth, tooth),
                field: Some("pocketDepths".to_string()),
            });
        }
        for (grade, field) in [(self.mobility, "mobility"), (self.furcation, "furcation")] {
            if grade.is_some_and(|g| g > 3) {
                return Err(AppError::Validation {
                    message: format!("{} grade on tooth {} must be 0-3", field, tooth),
                    field: Some(field.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Clinical attachment loss per site
    pub fn attachment_loss(&self) -> [i16; SITES_PER_TOOTH] {
        let mut loss = [0i16; SITES_PER_TOOTH];
        for (i, value) in loss.iter_mut().enumerate() {
            *value = self.pocket_depths[i] as i16 + self.recession[i] as i16;
        }
        loss
    }
}

/// One periodontal chart as saved at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodontalSnapshot {
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub teeth: BTreeMap<ToothNumber, PerioMeasurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PeriodontalSnapshot {
    pub fn validate(&self) -> Result<()> {
        for (tooth, measurement) in &self.teeth {
            measurement.validate(*tooth)?;
        }
        Ok(())
    }

    /// Share of measured sites that bled on probing, in percent
    pub fn bleeding_index(&self) -> f64 {
        let sites = self.teeth.len() * SITES_PER_TOOTH;
        if sites == 0 {
            return 0.0;
        }
        let bleeding = self
            .teeth
            .values()
            .flat_map(|m| m.bleeding.iter())
            .filter(|b| **b)
            .count();
        bleeding as f64 / sites as f64 * 100.0
    }

    /// Share of measured sites with plaque, in percent
    pub fn plaque_index(&self) -> f64 {
        let sites = self.teeth.len() * SITES_PER_TOOTH;
        if sites == 0 {
            return 0.0;
        }
        let plaque = self
            .teeth
            .values()
            .flat_map(|m| m.plaque.iter())
            .filter(|p| **p)
            .count();
        plaque as f64 / sites as f64 * 100.0
    }

    /// Teeth with at least one site probing at or beyond `threshold_mm`
    pub fn deep_pockets(&self, threshold_mm: u8) -> Vec<ToothNumber> {
        self.teeth
            .iter()
            .filter(|(_, m)| m.pocket_depths.iter().any(|d| *d >= threshold_mm))
            .map(|(tooth, _)| *tooth)
            .collect()
    }
}

/// Headline figures of one snapshot, as shown next to the chart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodontalSummary {
    pub recorded_at: DateTime<Utc>,
    pub bleeding_index: f64,
    pub plaque_index: f64,
    pub deep_pockets: Vec<ToothNumber>,
    pub max_attachment_loss: i16,
}

impl PeriodontalSummary {
    pub fn of(snapshot: &PeriodontalSnapshot) -> Self {
        Self {
            recorded_at: snapshot.recorded_at,
            bleeding_index: snapshot.bleeding_index(),
            plaque_index: snapshot.plaque_index(),
            deep_pockets: snapshot.deep_pockets(DEEP_POCKET_MM),
            max_attachment_loss: snapshot
                .teeth
                .values()
                .flat_map(|m| m.attachment_loss())
                .max()
                .unwrap_or(0),
        }
    }
}

/// Apply a save to the snapshot log
pub fn apply_save(log: &mut Vec<PeriodontalSnapshot>, snapshot: PeriodontalSnapshot, intent: SaveIntent) {
    match (intent, log.last_mut()) {
        (SaveIntent::Auto, Some(last)) => *last = snapshot,
        _ => log.push(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(day: u32, depth: u8) -> PeriodontalSnapshot {
        let mut teeth = BTreeMap::new();
        teeth.insert(
            ToothNumber::new(16).unwrap(),
            PerioMeasurement {
                pocket_depths: [depth, 3, 2, 2, 3, 4],
                bleeding: [true, false, false, false, false, true],
                ..Default::default()
            },
        );
        teeth.insert(ToothNumber::new(11).unwrap(), PerioMeasurement::default());

        PeriodontalSnapshot {
            recorded_at: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            teeth,
            notes: None,
        }
    }

    #[test]
    fn test_auto_save_overwrites_last() {
        let mut log = vec![snapshot(1, 3), snapshot(2, 4)];
        apply_save(&mut log, snapshot(3, 5), SaveIntent::Auto);

        assert_eq!(log.len(), 2);
        assert_eq!(log[0], snapshot(1, 3));
        assert_eq!(log[1], snapshot(3, 5));
    }

    #[test]
    fn test_auto_save_on_empty_log_appends() {
        let mut log = Vec::new();
        apply_save(&mut log, snapshot(1, 3), SaveIntent::Auto);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_explicit_save_appends() {
        let mut log = vec![snapshot(1, 3)];
        apply_save(&mut log, snapshot(2, 4), SaveIntent::Explicit);
        apply_save(&mut log, snapshot(3, 4), SaveIntent::Auto);

        assert_eq!(log.len(), 2);
        assert_eq!(log[1].recorded_at.date_naive().to_string(), "2024-01-03");
    }

    #[test]
    fn test_indices() {
        let snap = snapshot(1, 6);
        assert!((snap.bleeding_index() - 2.0 / 12.0 * 100.0).abs() < 1e-9);
        assert_eq!(snap.plaque_index(), 0.0);
        assert_eq!(snap.deep_pockets(5), vec![ToothNumber::new(16).unwrap()]);
        assert!(snap.deep_pockets(7).is_empty());
    }

    #[test]
    fn test_summary_of_latest_snapshot() {
        let mut snap = snapshot(2, 6);
        snap.teeth.get_mut(&ToothNumber::new(16).unwrap()).unwrap().recession = [2, 0, 0, 0, 0, 0];

        let summary = PeriodontalSummary::of(&snap);
        assert_eq!(summary.recorded_at, snap.recorded_at);
        assert_eq!(summary.deep_pockets, vec![ToothNumber::new(16).unwrap()]);
        assert_eq!(summary.max_attachment_loss, 8);
        assert_eq!(summary.plaque_index, 0.0);
    }

    #[test]
    fn test_attachment_loss() {
        let m = PerioMeasurement {
            pocket_depths: [4, 3, 3, 3, 3, 5],
            recession: [1, 0, 0, 0, -1, 2],
            ..Default::default()
        };
        assert_eq!(m.attachment_loss(), [5, 3, 3, 3, 2, 7]);
    }

    #[test]
    fn test_validation() {
        assert!(snapshot(1, 6).validate().is_ok());
        assert!(snapshot(1, 25).validate().is_err());

        let mut snap = snapshot(1, 3);
        snap.teeth.values_mut().next().unwrap().mobility = Some(4);
        assert!(snap.validate().is_err());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::json!({
            "recordedAt": "2024-01-01T09:00:00Z",
            "teeth": { "16": { "pocketDepths": [3, 3, 2, 2, 3, 4], "mobility": 1 } }
        });
        let snap: PeriodontalSnapshot = serde_json::from_value(json).unwrap();
        let m = snap.teeth.get(&ToothNumber::new(16).unwrap()).unwrap();
        assert_eq!(m.mobility, Some(1));
        assert_eq!(m.bleeding, [false; SITES_PER_TOOTH]);
    }
}
