//! Keyword-scored reference object library.
//!
//! The library is a JSON document of categories, each with a description,
//! a keyword list and a list of items. A category matches a task when any of
//! its keywords occurs in the lower-cased task text; its score is the number
//! of keywords found.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::adapters::ReferenceLookup;
use crate::domain::Result;

/// Header line of every non-empty lookup result.
pub const REFERENCE_HEADER: &str =
    "REFERENCE DIMENSIONS (from Reference Object Library — use these exact values):";

/// Items kept per matching category.
pub const MAX_ITEMS_PER_CATEGORY: usize = 15;

const EMBEDDED_LIBRARY: &str = include_str!("../../data/reference_objects.json");

#[derive(Debug, Clone, Default, Deserialize)]
struct Category {
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

/// Reference dimensions of common hardware, loaded once and read-only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceLibrary {
    #[serde(default)]
    categories: BTreeMap<String, Category>,
}

impl ReferenceLibrary {
    /// Parse a library from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a library file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let lib = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            categories = lib.categories.len(),
            objects = lib.object_count(),
            "loaded reference library"
        );
        Ok(lib)
    }

    /// The library compiled into the binary.
    pub fn embedded() -> &'static ReferenceLibrary {
        static EMBEDDED: OnceLock<ReferenceLibrary> = OnceLock::new();
        EMBEDDED.get_or_init(|| {
            Self::from_json(EMBEDDED_LIBRARY).unwrap_or_else(|e| {
                warn!(error = %e, "embedded reference library is unreadable; using empty library");
                Self::default()
            })
        })
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn object_count(&self) -> usize {
        self.categories.values().map(|c| c.items.len()).sum()
    }

    /// Matching categories formatted for the prompt, or an empty string.
    pub fn find_matching(&self, task_text: &str) -> String {
        let lower = task_text.to_lowercase();
        let mut matches: Vec<(usize, &Category)> = self
            .categories
            .values()
            .filter_map(|cat| {
                let score = cat
                    .keywords
                    .iter()
                    .filter(|kw| lower.contains(kw.as_str()))
                    .count();
                (score > 0 && !cat.items.is_empty()).then_some((score, cat))
            })
            .collect();

        if matches.is_empty() {
            return String::new();
        }
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        let mut lines = vec![REFERENCE_HEADER.to_string()];
        for (_, cat) in matches {
            lines.push(format!("\n### {}", cat.description));
            for item in cat.items.iter().take(MAX_ITEMS_PER_CATEGORY) {
                let name = field(item, "name").unwrap_or_default();
                lines.push(format!("- {name}: {}", format_dims(item)));
            }
        }
        lines.join("\n")
    }
}

impl ReferenceLookup for ReferenceLibrary {
    fn lookup_by_keyword(&self, task_text: &str) -> String {
        self.find_matching(task_text)
    }
}

/// Render a scalar JSON value without quotes.
fn field(item: &Map<String, Value>, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn field_or(item: &Map<String, Value>, key: &str, fallback: &str) -> String {
    field(item, key).unwrap_or_else(|| fallback.to_string())
}

/// Compact dimension string for one library item.
pub fn format_dims(item: &Map<String, Value>) -> String {
    let f = |key: &str| field(item, key);
    let mut parts: Vec<String> = Vec::new();

    if let (Some(l), Some(w)) = (f("length_mm"), f("width_mm")) {
        match f("thickness_mm").or_else(|| f("height_mm")) {
            Some(t) => parts.push(format!("{l} x {w} x {t} mm")),
            None => parts.push(format!("{l} x {w} mm")),
        }
    } else if let Some(d) = f("diameter_mm") {
        if let Some(l) = f("length_mm") {
            parts.push(format!("dia {d} x {l} mm"));
        } else if let Some(t) = f("thickness_mm") {
            parts.push(format!("dia {d} x {t} mm thick"));
        } else {
            parts.push(format!("dia {d} mm"));
        }
    }

    if let Some(face) = f("face_mm") {
        parts.push(format!("face {face}x{face} mm"));
    }

    if let (Some(id), Some(od)) = (f("inner_dia_mm"), f("outer_dia_mm")) {
        match f("width_mm").or_else(|| f("length_mm")) {
            Some(w) => parts.push(format!("ID {id} x OD {od} x W {w} mm")),
            None => parts.push(format!("ID {id} x OD {od} mm")),
        }
    }

    if let (Some(thread), Some(head)) = (f("thread_dia_mm"), f("head_dia_mm")) {
        parts.push(format!("thread M{thread}, head dia {head}mm"));
    }
    if let Some(hole) = f("through_hole_mm") {
        parts.push(format!("through-hole: {hole}mm"));
    }
    if let Some(pilot) = f("pilot_hole_mm") {
        parts.push(format!(
            "pilot hole: {pilot}mm, depth: {}mm",
            field_or(item, "depth_mm", "?")
        ));
    }
    if let Some(af) = f("across_flats_mm") {
        parts.push(format!("AF {af}mm, h {}mm", field_or(item, "height_mm", "?")));
    }
    if let Some(pocket) = f("pocket_af_mm") {
        parts.push(format!("pocket AF: {pocket}mm"));
    }

    if let Some(w) = f("cutout_width_mm") {
        parts.push(format!("cutout: {w}x{}mm", field_or(item, "cutout_height_mm", "?")));
    }
    if let Some(d) = f("cutout_diameter_mm") {
        parts.push(format!("cutout: dia {d}mm"));
    }

    if let Some(holes) = f("mounting_holes") {
        parts.push(format!("mounting: {holes}"));
    }
    if let Some(pattern) = f("hole_pattern_mm") {
        parts.push(format!("pattern: {pattern}mm"));
    }
    if let Some(pattern) = f("bolt_pattern_mm") {
        parts.push(format!(
            "bolt pattern: {pattern}mm, {}",
            field_or(item, "bolt_size", "")
        ));
    }

    if let Some(g) = f("weight_g") {
        parts.push(format!("{g}g"));
    }
    if let Some(notes) = f("notes") {
        parts.push(notes);
    }

    if let Some(wall) = f("wall_mm") {
        parts.push(format!("wall: {wall}mm"));
    }
    if let Some(lip) = f("lip_mm") {
        parts.push(format!("lip: {lip}mm"));
    }
    if let Some(c) = f("clearance_mm") {
        parts.push(format!("clearance: {c}mm"));
    }

    if parts.is_empty() {
        Value::Object(item.clone()).to_string()
    } else {
        parts.join(", ")
    }
}
