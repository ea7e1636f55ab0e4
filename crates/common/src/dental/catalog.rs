//! Procedure code catalog
//!
//! Read-only reference data describing every billable/clinical action:
//! what it needs (tooth, surface, jaw) and how it shows up on the chart.
//! Loaded once at startup from the `procedure_codes` table, which is seeded
//! from [`default_codes`] by the migration crate.

use super::tooth::Surface;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Code reserved for marking a tooth as absent
pub const DISABLED_CODE: &str = "DISABLED";

/// Clinical category of a procedure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureCategory {
    Filling,
    Sealing,
    Crown,
    Bridge,
    Extraction,
    Disabled,
    Implant,
    RootCanal,
    Scaling,
    Consultation,
    Imaging,
    Other,
}

impl ProcedureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureCategory::Filling => "filling",
            ProcedureCategory::Sealing => "sealing",
            ProcedureCategory::Crown => "crown",
            ProcedureCategory::Bridge => "bridge",
            ProcedureCategory::Extraction => "extraction",
            ProcedureCategory::Disabled => "disabled",
            ProcedureCategory::Implant => "implant",
            ProcedureCategory::RootCanal => "root_canal",
            ProcedureCategory::Scaling => "scaling",
            ProcedureCategory::Consultation => "consultation",
            ProcedureCategory::Imaging => "imaging",
            ProcedureCategory::Other => "other",
        }
    }
}

impl From<String> for ProcedureCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "filling" => ProcedureCategory::Filling,
            "sealing" => ProcedureCategory::Sealing,
            "crown" => ProcedureCategory::Crown,
            "bridge" => ProcedureCategory::Bridge,
            "extraction" => ProcedureCategory::Extraction,
            "disabled" => ProcedureCategory::Disabled,
            "implant" => ProcedureCategory::Implant,
            "root_canal" => ProcedureCategory::RootCanal,
            "scaling" => ProcedureCategory::Scaling,
            "consultation" => ProcedureCategory::Consultation,
            "imaging" => ProcedureCategory::Imaging,
            _ => ProcedureCategory::Other,
        }
    }
}

impl From<ProcedureCategory> for String {
    fn from(category: ProcedureCategory) -> Self {
        category.as_str().to_string()
    }
}

/// Restoration material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Composite,
    Amalgam,
    GlassIonomer,
    Ceramic,
    Gold,
    Zirconia,
    Temporary,
}

impl Material {
    pub fn as_str(&self) -> &'static str {
        match self {
            Material::Composite => "composite",
            Material::Amalgam => "amalgam",
            Material::GlassIonomer => "glass_ionomer",
            Material::Ceramic => "ceramic",
            Material::Gold => "gold",
            Material::Zirconia => "zirconia",
            Material::Temporary => "temporary",
        }
    }
}

impl FromStr for Material {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "composite" => Ok(Material::Composite),
            "amalgam" => Ok(Material::Amalgam),
            "glass_ionomer" => Ok(Material::GlassIonomer),
            "ceramic" => Ok(Material::Ceramic),
            "gold" => Ok(Material::Gold),
            "zirconia" => Ok(Material::Zirconia),
            "temporary" => Ok(Material::Temporary),
            other => Err(format!("unknown material '{}'", other)),
        }
    }
}

/// Visual state of a single tooth surface on the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFill {
    Composite,
    Amalgam,
    GlassIonomer,
    Ceramic,
    Gold,
    Zirconia,
    Temporary,
    Sealant,
}

impl From<Material> for SurfaceFill {
    fn from(material: Material) -> Self {
        match material {
            Material::Composite => SurfaceFill::Composite,
            Material::Amalgam => SurfaceFill::Amalgam,
            Material::GlassIonomer => SurfaceFill::GlassIonomer,
            Material::Ceramic => SurfaceFill::Ceramic,
            Material::Gold => SurfaceFill::Gold,
            Material::Zirconia => SurfaceFill::Zirconia,
            Material::Temporary => SurfaceFill::Temporary,
        }
    }
}

/// A procedure code as used by validation and the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureCode {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub category: ProcedureCategory,
    pub material: Option<Material>,
    /// Surface filled when a procedure names no sub-surfaces
    pub primary_surface: Option<Surface>,
    pub requires_tooth: bool,
    pub requires_surface: bool,
    pub requires_jaw: bool,
    pub is_per_element: bool,
    pub rate_cents: i64,
}

impl ProcedureCode {
    /// The fill this code paints onto a surface, if it paints surfaces at all
    pub fn surface_fill(&self) -> Option<SurfaceFill> {
        match self.category {
            ProcedureCategory::Filling => Some(
                self.material
                    .map(SurfaceFill::from)
                    .unwrap_or(SurfaceFill::Composite),
            ),
            ProcedureCategory::Sealing => Some(SurfaceFill::Sealant),
            _ => None,
        }
    }

    pub fn is_reserved_disable(&self) -> bool {
        self.category == ProcedureCategory::Disabled
    }
}

/// In-memory lookup over the procedure code table
#[derive(Debug, Clone, Default)]
pub struct CodeCatalog {
    by_id: HashMap<Uuid, ProcedureCode>,
    id_by_code: HashMap<String, Uuid>,
}

impl CodeCatalog {
    pub fn new(codes: impl IntoIterator<Item = ProcedureCode>) -> Self {
        let mut catalog = Self::default();
        for code in codes {
            catalog.insert(code);
        }
        catalog
    }

    pub fn insert(&mut self, code: ProcedureCode) {
        self.id_by_code.insert(code.code.to_ascii_uppercase(), code.id);
        self.by_id.insert(code.id, code);
    }

    pub fn get(&self, id: &Uuid) -> Option<&ProcedureCode> {
        self.by_id.get(id)
    }

    /// Case-insensitive lookup by code string
    pub fn by_code(&self, code: &str) -> Option<&ProcedureCode> {
        self.id_by_code
            .get(&code.trim().to_ascii_uppercase())
            .and_then(|id| self.by_id.get(id))
    }

    /// The reserved code used to disable teeth
    pub fn disable_code(&self) -> Option<&ProcedureCode> {
        self.by_code(DISABLED_CODE)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All codes sorted by code string
    pub fn codes(&self) -> Vec<&ProcedureCode> {
        let mut codes: Vec<_> = self.by_id.values().collect();
        codes.sort_by(|a, b| a.code.cmp(&b.code));
        codes
    }
}

/// Stable id for a seeded code so seed data and tests agree across runs
pub fn seeded_code_id(code: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    for (i, b) in code.bytes().take(12).enumerate() {
        bytes[4 + i] = b;
    }
    bytes[0..4].copy_from_slice(b"DFPC");
    Uuid::from_bytes(bytes)
}

struct Seed {
    code: &'static str,
    description: &'static str,
    category: ProcedureCategory,
    material: Option<Material>,
    primary_surface: Option<Surface>,
    requires_tooth: bool,
    requires_surface: bool,
    requires_jaw: bool,
    is_per_element: bool,
    rate_cents: i64,
}

const fn filling(code: &'static str, description: &'static str, material: Material, rate_cents: i64) -> Seed {
    Seed {
        code,
        description,
        category: ProcedureCategory::Filling,
        material: Some(material),
        primary_surface: None,
        requires_tooth: true,
        requires_surface: true,
        requires_jaw: false,
        is_per_element: true,
        rate_cents,
    }
}

const fn tooth_level(
    code: &'static str,
    description: &'static str,
    category: ProcedureCategory,
    material: Option<Material>,
    rate_cents: i64,
) -> Seed {
    Seed {
        code,
        description,
        category,
        material,
        primary_surface: None,
        requires_tooth: true,
        requires_surface: false,
        requires_jaw: false,
        is_per_element: true,
        rate_cents,
    }
}

const fn general(code: &'static str, description: &'static str, category: ProcedureCategory, rate_cents: i64) -> Seed {
    Seed {
        code,
        description,
        category,
        material: None,
        primary_surface: None,
        requires_tooth: false,
        requires_surface: false,
        requires_jaw: false,
        is_per_element: false,
        rate_cents,
    }
}

const SEEDS: &[Seed] = &[
    general("C11", "Periodic check-up", ProcedureCategory::Consultation, 2380),
    general("C13", "Problem-oriented consultation", ProcedureCategory::Consultation, 2380),
    general("X10", "Small radiograph", ProcedureCategory::Imaging, 1760),
    general("X21", "Panoramic radiograph", ProcedureCategory::Imaging, 7280),
    Seed {
        code: "M03",
        description: "Scaling and polishing, per 5 minutes",
        category: ProcedureCategory::Scaling,
        material: None,
        primary_surface: None,
        requires_tooth: false,
        requires_surface: false,
        requires_jaw: true,
        is_per_element: false,
        rate_cents: 1450,
    },
    Seed {
        code: "V30",
        description: "Fissure sealant, first element",
        category: ProcedureCategory::Sealing,
        material: None,
        primary_surface: Some(Surface::Occlusal),
        requires_tooth: true,
        requires_surface: false,
        requires_jaw: false,
        is_per_element: true,
        rate_cents: 2630,
    },
    filling("V71", "Amalgam filling, one surface", Material::Amalgam, 3550),
    filling("V72", "Amalgam filling, two surfaces", Material::Amalgam, 5700),
    filling("V73", "Amalgam filling, three surfaces", Material::Amalgam, 7490),
    filling("V74", "Amalgam filling, four or more surfaces", Material::Amalgam, 9870),
    filling("V81", "Glass ionomer filling, one surface", Material::GlassIonomer, 3550),
    filling("V82", "Glass ionomer filling, two surfaces", Material::GlassIonomer, 5700),
    filling("V83", "Glass ionomer filling, three surfaces", Material::GlassIonomer, 7490),
    filling("V84", "Glass ionomer filling, four or more surfaces", Material::GlassIonomer, 9870),
    filling("V91", "Composite filling, one surface", Material::Composite, 4370),
    filling("V92", "Composite filling, two surfaces", Material::Composite, 7150),
    filling("V93", "Composite filling, three surfaces", Material::Composite, 9400),
    filling("V94", "Composite filling, four or more surfaces", Material::Composite, 12080),
    tooth_level("E13", "Root canal treatment, single canal", ProcedureCategory::RootCanal, None, 12690),
    tooth_level("H11", "Extraction", ProcedureCategory::Extraction, None, 5920),
    tooth_level("H35", "Surgical extraction", ProcedureCategory::Extraction, None, 10150),
    tooth_level("J40", "Implant placement", ProcedureCategory::Implant, None, 49500),
    tooth_level("R24", "Ceramic crown", ProcedureCategory::Crown, Some(Material::Ceramic), 44600),
    tooth_level("R29", "Zirconia crown", ProcedureCategory::Crown, Some(Material::Zirconia), 47200),
    tooth_level("R31", "Gold crown", ProcedureCategory::Crown, Some(Material::Gold), 52800),
    tooth_level("R40", "Bridge, per span", ProcedureCategory::Bridge, Some(Material::Ceramic), 88300),
    tooth_level(DISABLED_CODE, "Tooth absent", ProcedureCategory::Disabled, None, 0),
];

/// Built-in catalog used for seeding and tests
pub fn default_codes() -> Vec<ProcedureCode> {
    SEEDS
        .iter()
        .map(|seed| ProcedureCode {
            id: seeded_code_id(seed.code),
            code: seed.code.to_string(),
            description: seed.description.to_string(),
            category: seed.category,
            material: seed.material,
            primary_surface: seed.primary_surface,
            requires_tooth: seed.requires_tooth,
            requires_surface: seed.requires_surface,
            requires_jaw: seed.requires_jaw,
            is_per_element: seed.is_per_element,
            rate_cents: seed.rate_cents,
        })
        .collect()
}
