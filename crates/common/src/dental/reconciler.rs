//! Dental chart reconciliation
//!
//! Derives the current state of every tooth from the procedure ledger.
//! The ledger is authoritative: the only outside input is the set of tooth
//! type hints recorded by the client, never disabled/implant/restoration
//! state.
//!
//! Rules, applied in (date, sequence) order with last-write-wins:
//! - extraction and the reserved disable code mark the tooth absent and
//!   clear its restorations
//! - implants restore an absent site
//! - fillings and sealants paint surfaces
//! - crowns and bridges set the whole-tooth descriptor
//!
//! A tooth carrying the reserved disable code is reported absent no matter
//! what was recorded after it.

use super::catalog::{CodeCatalog, Material, ProcedureCategory, ProcedureCode, SurfaceFill};
use super::ledger::{LedgerEntry, ProcedureStatus};
use super::tooth::{Surface, ToothNumber, ToothType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// Externally recorded tooth classifications keyed by tooth
pub type ToothHints = BTreeMap<ToothNumber, ToothType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WholeToothKind {
    Crown,
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeRole {
    Abutment,
    Pontic,
}

/// Restoration covering the whole tooth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WholeTooth {
    pub kind: WholeToothKind,
    pub material: Option<Material>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<BridgeRole>,
    /// Procedure that placed the crown or bridge; shared by all bridge members
    pub group_id: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ToothNumber>,
}

impl WholeTooth {
    fn is_pontic(&self) -> bool {
        self.role == Some(BridgeRole::Pontic)
    }
}

/// Derived state of a single tooth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToothState {
    pub is_disabled: bool,
    pub is_implant: bool,
    pub tooth_type: ToothType,
    pub whole_tooth: Option<WholeTooth>,
    pub surfaces: BTreeMap<Surface, SurfaceFill>,
}

impl ToothState {
    fn new(tooth_type: ToothType) -> Self {
        Self {
            is_disabled: false,
            is_implant: false,
            tooth_type,
            whole_tooth: None,
            surfaces: BTreeMap::new(),
        }
    }

    /// An absent tooth keeps nothing but a bridge pontic standing in for it
    fn mark_absent(&mut self) {
        self.is_disabled = true;
        self.is_implant = false;
        self.surfaces.clear();
        if !self.whole_tooth.as_ref().is_some_and(WholeTooth::is_pontic) {
            self.whole_tooth = None;
        }
    }
}

/// Reconciled chart keyed by tooth number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToothChart(BTreeMap<ToothNumber, ToothState>);

impl ToothChart {
    pub fn get(&self, tooth: ToothNumber) -> Option<&ToothState> {
        self.0.get(&tooth)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy suitable for the stored chart cache: disabled flags are dropped
    /// so a stale cache can never re-disable a tooth.
    pub fn without_disabled_flags(&self) -> ToothChart {
        let mut chart = self.clone();
        for state in chart.0.values_mut() {
            state.is_disabled = false;
        }
        chart
    }
}

/// Pull tooth type hints out of a client-submitted chart blob
///
/// Only each tooth's explicit `toothType` is read. Keys that are not valid
/// tooth numbers or carry no readable `toothType` are skipped; everything
/// else in the blob is ignored.
pub fn hints_from_value(value: &serde_json::Value) -> ToothHints {
    let Some(teeth) = value.as_object() else {
        return ToothHints::new();
    };

    teeth
        .iter()
        .filter_map(|(key, state)| {
            let tooth = key.parse::<u8>().ok().and_then(|raw| ToothNumber::new(raw).ok())?;
            let tooth_type = state
                .get("toothType")
                .and_then(|t| serde_json::from_value::<ToothType>(t.clone()).ok())?;
            Some((tooth, tooth_type))
        })
        .collect()
}

/// Fold submitted hints into the stored set
///
/// Only types that differ from the FDI default are kept; submitting the
/// default type for a tooth clears its hint.
pub fn merge_hints(stored: &mut ToothHints, submitted: ToothHints) {
    for (tooth, tooth_type) in submitted {
        if tooth_type == tooth.default_type() {
            stored.remove(&tooth);
        } else {
            stored.insert(tooth, tooth_type);
        }
    }
}

struct Builder<'a> {
    teeth: BTreeMap<ToothNumber, ToothState>,
    hints: &'a ToothHints,
    reserved_disabled: BTreeSet<ToothNumber>,
}

impl<'a> Builder<'a> {
    fn new(hints: &'a ToothHints) -> Self {
        let teeth = hints
            .iter()
            .map(|(tooth, tooth_type)| (*tooth, ToothState::new(*tooth_type)))
            .collect();

        Self {
            teeth,
            hints,
            reserved_disabled: BTreeSet::new(),
        }
    }

    fn state(&mut self, tooth: ToothNumber) -> &mut ToothState {
        let hints = self.hints;
        self.teeth.entry(tooth).or_insert_with(|| {
            ToothState::new(hints.get(&tooth).copied().unwrap_or_else(|| tooth.default_type()))
        })
    }

    fn apply(&mut self, entry: &LedgerEntry, code: &ProcedureCode) {
        if code.category == ProcedureCategory::Bridge {
            self.apply_bridge(entry, code);
            return;
        }

        let Some(tooth) = entry.tooth_number else {
            return;
        };

        match code.category {
            ProcedureCategory::Extraction => self.state(tooth).mark_absent(),
            ProcedureCategory::Disabled => {
                self.reserved_disabled.insert(tooth);
                self.state(tooth).mark_absent();
            }
            ProcedureCategory::Implant => {
                let state = self.state(tooth);
                state.is_implant = true;
                state.is_disabled = false;
                state.surfaces.clear();
                state.whole_tooth = None;
            }
            ProcedureCategory::Filling | ProcedureCategory::Sealing => {
                let Some(fill) = code.surface_fill() else {
                    return;
                };
                let surfaces: Vec<Surface> = if entry.sub_surfaces.is_empty() {
                    code.primary_surface.into_iter().collect()
                } else {
                    entry.sub_surfaces.clone()
                };

                let state = self.state(tooth);
                if state.is_disabled {
                    return;
                }
                for surface in surfaces {
                    state.surfaces.insert(surface, fill);
                }
            }
            ProcedureCategory::Crown => {
                let state = self.state(tooth);
                if state.is_disabled {
                    return;
                }
                state.whole_tooth = Some(WholeTooth {
                    kind: WholeToothKind::Crown,
                    material: code.material,
                    role: None,
                    group_id: entry.id,
                    members: Vec::new(),
                });
            }
            _ => {
                // No visual effect, but the tooth still shows up on the chart
                self.state(tooth);
            }
        }
    }

    fn apply_bridge(&mut self, entry: &LedgerEntry, code: &ProcedureCode) {
        let members: Vec<ToothNumber> = if entry.bridge_teeth.is_empty() {
            entry.tooth_number.into_iter().collect()
        } else {
            entry.bridge_teeth.clone()
        };

        for tooth in &members {
            let role = if entry.pontic_teeth.contains(tooth) {
                BridgeRole::Pontic
            } else {
                BridgeRole::Abutment
            };

            // An absent tooth can carry a pontic but not an abutment
            let state = self.state(*tooth);
            if role == BridgeRole::Abutment && state.is_disabled {
                continue;
            }

            state.whole_tooth = Some(WholeTooth {
                kind: WholeToothKind::Bridge,
                material: code.material,
                role: Some(role),
                group_id: entry.id,
                members: members.clone(),
            });
        }
    }

    fn finish(mut self) -> ToothChart {
        for tooth in std::mem::take(&mut self.reserved_disabled) {
            self.state(tooth).mark_absent();
        }
        ToothChart(self.teeth)
    }
}

/// Rebuild the chart from the ledger
///
/// Cancelled procedures and procedures whose code is not in the catalog are
/// skipped. Entries are ordered by (date, sequence); input order only
/// matters for entries that tie on both.
pub fn reconcile(entries: &[LedgerEntry], catalog: &CodeCatalog, hints: &ToothHints) -> ToothChart {
    let mut ordered: Vec<(&LedgerEntry, &ProcedureCode)> = entries
        .iter()
        .filter(|entry| entry.status != ProcedureStatus::Cancelled)
        .filter_map(|entry| match catalog.get(&entry.code_id) {
            Some(code) => Some((entry, code)),
            None => {
                debug!(procedure_id = %entry.id, code_id = %entry.code_id, "Skipping procedure with unknown code");
                None
            }
        })
        .collect();

    // sort_by_key is stable
    ordered.sort_by_key(|(entry, _)| (entry.date, entry.sequence));

    let mut builder = Builder::new(hints);
    for (entry, code) in ordered {
        builder.apply(entry, code);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dental::catalog::default_codes;
    use chrono::{NaiveDate, Utc};

    fn catalog() -> CodeCatalog {
        CodeCatalog::new(default_codes())
    }

    fn tooth(raw: u8) -> ToothNumber {
        ToothNumber::new(raw).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(catalog: &CodeCatalog, seq: i64, code: &str, t: u8, surfaces: &[Surface], on: &str) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::from_u128(seq as u128),
            patient_id: Uuid::from_u128(999),
            code_id: catalog.by_code(code).unwrap().id,
            tooth_number: Some(tooth(t)),
            sub_surfaces: surfaces.to_vec(),
            jaw: None,
            bridge_teeth: vec![],
            pontic_teeth: vec![],
            status: ProcedureStatus::Completed,
            date: date(on),
            quantity: 1,
            paid_cents: 0,
            payment_method: None,
            notes: None,
            sequence: seq,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filling_then_disable() {
        let catalog = catalog();
        let entries = vec![
            entry(&catalog, 1, "V93", 21, &[Surface::Mesial, Surface::Distal], "2024-01-01"),
            entry(&catalog, 2, "DISABLED", 21, &[], "2024-02-01"),
        ];

        let chart = reconcile(&entries, &catalog, &ToothHints::new());
        let state = chart.get(tooth(21)).unwrap();

        assert!(state.is_disabled);
        assert!(state.surfaces.is_empty());
        assert!(state.whole_tooth.is_none());

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["21"]["isDisabled"], serde_json::json!(true));
        assert_eq!(json["21"]["surfaces"], serde_json::json!({}));
    }

    #[test]
    fn test_disable_takes_precedence_over_later_fillings() {
        let catalog = catalog();
        let entries = vec![
            entry(&catalog, 1, "DISABLED", 26, &[], "2024-01-01"),
            entry(&catalog, 2, "V91", 26, &[Surface::Occlusal], "2024-02-01"),
            entry(&catalog, 3, "R24", 26, &[], "2024-03-01"),
            entry(&catalog, 4, "J40", 26, &[], "2024-04-01"),
            entry(&catalog, 5, "V91", 26, &[Surface::Buccal], "2024-05-01"),
        ];

        let chart = reconcile(&entries, &catalog, &ToothHints::new());
        let state = chart.get(tooth(26)).unwrap();

        assert!(state.is_disabled);
        assert!(!state.is_implant);
        assert!(state.surfaces.is_empty());
        assert!(state.whole_tooth.is_none());
    }

    #[test]
    fn test_idempotent() {
        let catalog = catalog();
        let entries = vec![
            entry(&catalog, 1, "V92", 36, &[Surface::Mesial, Surface::Occlusal], "2024-01-01"),
            entry(&catalog, 2, "R29", 46, &[], "2024-01-05"),
            entry(&catalog, 3, "H11", 18, &[], "2024-01-09"),
        ];

        let first = reconcile(&entries, &catalog, &ToothHints::new());
        let second = reconcile(&entries, &catalog, &ToothHints::new());
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_later_date_wins_regardless_of_input_order() {
        let catalog = catalog();
        let older = entry(&catalog, 1, "V71", 16, &[Surface::Occlusal], "2023-05-01");
        let newer = entry(&catalog, 2, "V91", 16, &[Surface::Occlusal], "2024-05-01");

        let forward = reconcile(&[older.clone(), newer.clone()], &catalog, &ToothHints::new());
        let backward = reconcile(&[newer, older], &catalog, &ToothHints::new());

        assert_eq!(forward, backward);
        assert_eq!(
            forward.get(tooth(16)).unwrap().surfaces.get(&Surface::Occlusal),
            Some(&SurfaceFill::Composite)
        );
    }

    #[test]
    fn test_same_date_ties_break_on_sequence() {
        let catalog = catalog();
        let first = entry(&catalog, 10, "V71", 16, &[Surface::Occlusal], "2024-05-01");
        let second = entry(&catalog, 11, "V81", 16, &[Surface::Occlusal], "2024-05-01");

        let chart = reconcile(&[second, first], &catalog, &ToothHints::new());
        assert_eq!(
            chart.get(tooth(16)).unwrap().surfaces.get(&Surface::Occlusal),
            Some(&SurfaceFill::GlassIonomer)
        );
    }

    #[test]
    fn test_cancelled_procedures_are_ignored() {
        let catalog = catalog();
        let mut extraction = entry(&catalog, 2, "H11", 31, &[], "2024-02-01");
        extraction.status = ProcedureStatus::Cancelled;
        let filling = entry(&catalog, 1, "V91", 31, &[Surface::Buccal], "2024-01-01");

        let chart = reconcile(&[filling, extraction], &catalog, &ToothHints::new());
        let state = chart.get(tooth(31)).unwrap();
        assert!(!state.is_disabled);
        assert_eq!(state.surfaces.len(), 1);
    }

    #[test]
    fn test_bridge_roles() {
        let catalog = catalog();
        let mut bridge = entry(&catalog, 1, "R40", 14, &[], "2024-01-01");
        bridge.bridge_teeth = vec![tooth(14), tooth(15), tooth(16)];
        bridge.pontic_teeth = vec![tooth(15)];

        let chart = reconcile(&[bridge], &catalog, &ToothHints::new());

        let role = |t: u8| chart.get(tooth(t)).unwrap().whole_tooth.as_ref().unwrap().role;
        assert_eq!(role(14), Some(BridgeRole::Abutment));
        assert_eq!(role(15), Some(BridgeRole::Pontic));
        assert_eq!(role(16), Some(BridgeRole::Abutment));

        let whole = chart.get(tooth(15)).unwrap().whole_tooth.clone().unwrap();
        assert_eq!(whole.kind, WholeToothKind::Bridge);
        assert_eq!(whole.group_id, Uuid::from_u128(1));
        assert_eq!(whole.members, vec![tooth(14), tooth(15), tooth(16)]);

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["15"]["wholeTooth"]["role"], serde_json::json!("pontic"));
    }

    #[test]
    fn test_pontic_survives_on_disabled_tooth() {
        let catalog = catalog();
        let missing = entry(&catalog, 1, "DISABLED", 15, &[], "2023-12-01");
        let mut bridge = entry(&catalog, 2, "R40", 14, &[], "2024-01-01");
        bridge.bridge_teeth = vec![tooth(14), tooth(15), tooth(16)];
        bridge.pontic_teeth = vec![tooth(15)];

        let chart = reconcile(&[missing, bridge], &catalog, &ToothHints::new());
        let state = chart.get(tooth(15)).unwrap();
        assert!(state.is_disabled);
        assert_eq!(state.whole_tooth.as_ref().unwrap().role, Some(BridgeRole::Pontic));
    }

    #[test]
    fn test_implant_restores_extracted_site() {
        let catalog = catalog();
        let entries = vec![
            entry(&catalog, 1, "V91", 36, &[Surface::Occlusal], "2023-01-01"),
            entry(&catalog, 2, "H11", 36, &[], "2023-06-01"),
            entry(&catalog, 3, "J40", 36, &[], "2024-01-01"),
            entry(&catalog, 4, "R29", 36, &[], "2024-04-01"),
        ];

        let chart = reconcile(&entries, &catalog, &ToothHints::new());
        let state = chart.get(tooth(36)).unwrap();
        assert!(state.is_implant);
        assert!(!state.is_disabled);
        assert!(state.surfaces.is_empty());
        assert_eq!(state.whole_tooth.as_ref().unwrap().kind, WholeToothKind::Crown);
        assert_eq!(state.whole_tooth.as_ref().unwrap().material, Some(Material::Zirconia));
    }

    #[test]
    fn test_primary_surface_fill() {
        let catalog = catalog();
        let sealant = entry(&catalog, 1, "V30", 47, &[], "2024-01-01");

        let chart = reconcile(&[sealant], &catalog, &ToothHints::new());
        assert_eq!(
            chart.get(tooth(47)).unwrap().surfaces.get(&Surface::Occlusal),
            Some(&SurfaceFill::Sealant)
        );
    }

    #[test]
    fn test_hints_and_non_visual_procedures() {
        let catalog = catalog();
        let root_canal = entry(&catalog, 1, "E13", 11, &[], "2024-01-01");

        let mut hints = ToothHints::new();
        hints.insert(tooth(11), ToothType::Premolar);
        hints.insert(tooth(48), ToothType::Molar);

        let chart = reconcile(&[root_canal], &catalog, &hints);
        assert_eq!(chart.len(), 2);
        assert_eq!(chart.get(tooth(11)).unwrap().tooth_type, ToothType::Premolar);
        assert_eq!(chart.get(tooth(48)).unwrap(), &ToothState::new(ToothType::Molar));
    }

    #[test]
    fn test_unknown_code_is_skipped() {
        let catalog = catalog();
        let mut stray = entry(&catalog, 1, "V91", 11, &[Surface::Mesial], "2024-01-01");
        stray.code_id = Uuid::from_u128(424242);

        assert!(reconcile(&[stray], &catalog, &ToothHints::new()).is_empty());
    }

    fn disabled_teeth(chart: &ToothChart) -> Vec<ToothNumber> {
        chart
            .0
            .iter()
            .filter(|(_, state)| state.is_disabled)
            .map(|(tooth, _)| *tooth)
            .collect()
    }

    #[test]
    fn test_cache_copy_drops_disabled_flags() {
        let catalog = catalog();
        let entries = vec![entry(&catalog, 1, "DISABLED", 38, &[], "2024-01-01")];

        let chart = reconcile(&entries, &catalog, &ToothHints::new());
        assert_eq!(disabled_teeth(&chart), vec![tooth(38)]);
        assert!(disabled_teeth(&chart.without_disabled_flags()).is_empty());
    }

    #[test]
    fn test_hints_from_stored_blob_ignore_state() {
        let blob = serde_json::json!({
            "21": { "isDisabled": true, "toothType": "premolar", "surfaces": { "mesial": "amalgam" } },
            "36": { "isImplant": true },
            "99": { "toothType": "molar" },
            "notes": "legacy field"
        });

        let hints = hints_from_value(&blob);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints.get(&tooth(21)), Some(&ToothType::Premolar));
        assert!(!hints.contains_key(&tooth(36)));

        let chart = reconcile(&[], &catalog(), &hints);
        assert!(disabled_teeth(&chart).is_empty());
        assert!(chart.get(tooth(36)).is_none());
    }

    #[test]
    fn test_merge_hints_keeps_only_non_default_types() {
        let mut stored = ToothHints::new();
        stored.insert(tooth(18), ToothType::Premolar);

        let mut submitted = ToothHints::new();
        submitted.insert(tooth(18), ToothType::Molar);
        submitted.insert(tooth(11), ToothType::Anterior);
        submitted.insert(tooth(24), ToothType::Molar);
        merge_hints(&mut stored, submitted);

        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get(&tooth(24)), Some(&ToothType::Molar));
    }

    #[test]
    fn test_bridge_skips_abutment_on_extracted_tooth() {
        let catalog = catalog();
        let extraction = entry(&catalog, 1, "H11", 14, &[], "2023-12-01");
        let mut bridge = entry(&catalog, 2, "R40", 14, &[], "2024-01-01");
        bridge.bridge_teeth = vec![tooth(14), tooth(15), tooth(16)];
        bridge.pontic_teeth = vec![tooth(15)];

        let chart = reconcile(&[extraction, bridge], &catalog, &ToothHints::new());

        let extracted = chart.get(tooth(14)).unwrap();
        assert!(extracted.is_disabled);
        assert!(extracted.whole_tooth.is_none());

        let role = |t: u8| chart.get(tooth(t)).unwrap().whole_tooth.as_ref().unwrap().role;
        assert_eq!(role(15), Some(BridgeRole::Pontic));
        assert_eq!(role(16), Some(BridgeRole::Abutment));
    }
}
