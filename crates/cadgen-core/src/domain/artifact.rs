//! Generated artifacts and the outcome of executing them.

use serde::{Deserialize, Serialize};

/// Number of disjoint solids a correct artifact produces unless configured
/// otherwise.
pub const DEFAULT_EXPECTED_SOLIDS: u32 = 1;

/// Generated script source together with the model that produced it.
///
/// Never mutated: every repair produces a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub source_text: String,
    pub origin_model_id: String,
}

impl GeneratedArtifact {
    pub fn new(source_text: impl Into<String>, origin_model_id: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            origin_model_id: origin_model_id.into(),
        }
    }
}

/// Axis-aligned bounding box in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Structured measurements reported by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Bounding size (x, y, z) in mm.
    pub size: Option<[f64; 3]>,
    /// Volume in mm³.
    pub volume: Option<f64>,
    pub solid_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl Measurements {
    /// One-line size/volume summary used in critic prompts and logs.
    pub fn summary(&self) -> String {
        let size = match self.size {
            Some([x, y, z]) => format!("{x:.1} x {y:.1} x {z:.1} mm"),
            None => "unknown size".to_string(),
        };
        let volume = match self.volume {
            Some(v) => format!("{v:.1} mm³"),
            None => "unknown volume".to_string(),
        };
        format!("{size}, {volume}")
    }
}

/// Best-effort 2D renderings of the exported solid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedViews {
    pub iso_svg: Option<String>,
    pub front_svg: Option<String>,
}

impl RenderedViews {
    pub fn is_empty(&self) -> bool {
        self.iso_svg.is_none() && self.front_svg.is_none()
    }
}

/// Files exported by a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportedFiles {
    pub step: Vec<u8>,
    pub stl: Option<Vec<u8>>,
    pub views: RenderedViews,
}

/// Result of running one artifact through the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub measurements: Option<Measurements>,
    pub diagnostic_text: Option<String>,
    #[serde(skip)]
    pub exports: Option<ExportedFiles>,
}

impl ExecutionOutcome {
    pub fn succeeded(measurements: Measurements, exports: ExportedFiles) -> Self {
        Self {
            success: true,
            measurements: Some(measurements),
            diagnostic_text: None,
            exports: Some(exports),
        }
    }

    pub fn failed(diagnostic: impl Into<String>, measurements: Option<Measurements>) -> Self {
        Self {
            success: false,
            measurements,
            diagnostic_text: Some(diagnostic.into()),
            exports: None,
        }
    }

    /// Enforce the success invariant: a successful outcome has a positive
    /// volume and exactly `expected_solids` solids. Outcomes that claim
    /// success without meeting it are downgraded to failures.
    pub fn validated(self, expected_solids: u32) -> Self {
        if !self.success {
            return self;
        }
        let Some(m) = self.measurements.clone() else {
            return Self::failed("Code ran but produced no output measurements", None);
        };
        match m.solid_count {
            Some(n) if n == expected_solids => {}
            Some(n) => {
                let noun = if expected_solids == 1 { "solid" } else { "solids" };
                return Self::failed(format!("Expected {expected_solids} {noun}, got {n}"), Some(m));
            }
            None => {
                return Self::failed("Code ran but produced no output solid count", Some(m));
            }
        }
        match m.volume {
            Some(v) if v > 0.0 => self,
            _ => Self::failed("Code ran but produced no output geometry (volume <= 0)", Some(m)),
        }
    }
}
