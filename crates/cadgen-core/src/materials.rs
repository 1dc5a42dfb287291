//! Printable material catalog.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{CadgenError, Result};

const EMBEDDED_MATERIALS: &str = include_str!("../data/materials.json");

/// One catalog entry as stored on disk. Extra keys are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialProfile {
    pub full_name: String,
    pub wall_min_mm: f64,
    pub temp_max_service: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub id: String,
    pub name: String,
    pub wall_min_mm: f64,
    pub temp_max_service: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialCatalog {
    profiles: BTreeMap<String, MaterialProfile>,
}

impl MaterialCatalog {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self {
            profiles: serde_json::from_str(text)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> &'static MaterialCatalog {
        static EMBEDDED: OnceLock<MaterialCatalog> = OnceLock::new();
        EMBEDDED.get_or_init(|| {
            Self::from_json(EMBEDDED_MATERIALS).unwrap_or_else(|e| {
                warn!(error = %e, "embedded material catalog is unreadable; using empty catalog");
                Self::default()
            })
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&MaterialProfile> {
        self.profiles.get(id)
    }

    /// Reject ids that are not in the catalog.
    pub fn check(&self, id: &str) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(CadgenError::UnknownMaterial(id.to_string()))
        }
    }

    pub fn list(&self) -> Vec<MaterialSummary> {
        self.profiles
            .iter()
            .map(|(id, p)| MaterialSummary {
                id: id.clone(),
                name: p.full_name.clone(),
                wall_min_mm: p.wall_min_mm,
                temp_max_service: p.temp_max_service,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_MATERIAL;

    #[test]
    fn test_embedded_catalog_has_default_material() {
        let catalog = MaterialCatalog::embedded();
        assert!(catalog.contains(DEFAULT_MATERIAL));
        assert!(catalog.check("PETG").is_ok());
    }

    #[test]
    fn test_unknown_material_is_rejected() {
        let err = MaterialCatalog::embedded().check("unobtainium").unwrap_err();
        assert!(matches!(err, CadgenError::UnknownMaterial(id) if id == "unobtainium"));
    }

    #[test]
    fn test_list_maps_full_name() {
        let catalog = MaterialCatalog::from_json(
            r#"{"PLA": {"full_name": "Polylactic Acid", "wall_min_mm": 0.8, "temp_max_service": 55, "bed_temp_c": 60}}"#,
        )
        .unwrap();
        let list = catalog.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "PLA");
        assert_eq!(list[0].name, "Polylactic Acid");
        assert_eq!(list[0].temp_max_service, 55.0);
        assert!(catalog.get("PLA").unwrap().extra.contains_key("bed_temp_c"));
    }
}
