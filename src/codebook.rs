//! Code → label lookup tables for the categorical BAAC fields.
//!
//! Code definitions drift between dataset vintages, so the tables live in a
//! versioned JSON document instead of the source. A default copy is embedded
//! at build time; `--codebook <path>` swaps in another one.

use crate::error::{DashboardError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const EMBEDDED_CODEBOOK: &str = include_str!("../data/codebook.json");

static DEFAULT_CODEBOOK: Lazy<Codebook> = Lazy::new(|| {
    Codebook::from_json(EMBEDDED_CODEBOOK).expect("embedded codebook must be valid")
});

/// Categorical fields that carry a label table. Serialized under the
/// dataset's own column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Dimension {
    #[serde(rename = "grav")]
    Severity,
    #[serde(rename = "surf")]
    Surface,
    #[serde(rename = "lum")]
    Lighting,
    #[serde(rename = "trajet")]
    Journey,
    #[serde(rename = "choc")]
    Impact,
    #[serde(rename = "obs")]
    FixedObstacle,
    #[serde(rename = "obsm")]
    MobileObstacle,
    #[serde(rename = "sexe")]
    Sex,
    #[serde(rename = "mois")]
    Month,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Severity,
        Dimension::Surface,
        Dimension::Lighting,
        Dimension::Journey,
        Dimension::Impact,
        Dimension::FixedObstacle,
        Dimension::MobileObstacle,
        Dimension::Sex,
        Dimension::Month,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Dimension::Severity => "grav",
            Dimension::Surface => "surf",
            Dimension::Lighting => "lum",
            Dimension::Journey => "trajet",
            Dimension::Impact => "choc",
            Dimension::FixedObstacle => "obs",
            Dimension::MobileObstacle => "obsm",
            Dimension::Sex => "sexe",
            Dimension::Month => "mois",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Codebook {
    pub version: String,
    dimensions: HashMap<Dimension, BTreeMap<i32, String>>,
}

impl Codebook {
    /// The codebook shipped with the binary.
    pub fn embedded() -> &'static Codebook {
        &DEFAULT_CODEBOOK
    }

    pub fn from_json(text: &str) -> Result<Codebook> {
        let book: Codebook = serde_json::from_str(text)?;
        if let Some(missing) = Dimension::ALL
            .iter()
            .find(|d| !book.dimensions.contains_key(*d))
        {
            return Err(DashboardError::InvalidConfig(format!(
                "codebook {} has no table for `{}`",
                book.version,
                missing.column()
            )));
        }
        Ok(book)
    }

    pub fn from_path(path: &Path) -> Result<Codebook> {
        let text = std::fs::read_to_string(path).map_err(|source| DashboardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Label for `code`, or `None` when the code is not in the table.
    pub fn label(&self, dimension: Dimension, code: i32) -> Option<&str> {
        self.dimensions
            .get(&dimension)
            .and_then(|table| table.get(&code))
            .map(String::as_str)
    }

    /// Same as [`Codebook::label`] but falls back to the raw code.
    pub fn label_or_code(&self, dimension: Dimension, code: i32) -> String {
        self.label(dimension, code)
            .map(str::to_owned)
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_codebook_has_every_dimension() {
        let book = Codebook::embedded();
        assert_eq!(book.version, "baac-2019");
        for d in Dimension::ALL {
            assert!(book.label(d, 1).is_some(), "no code 1 for {}", d.column());
        }
    }

    #[test]
    fn severity_labels() {
        let book = Codebook::embedded();
        assert_eq!(book.label(Dimension::Severity, 1), Some("Unharmed"));
        assert_eq!(book.label(Dimension::Severity, 2), Some("Killed"));
        assert_eq!(book.label(Dimension::Severity, 3), Some("Hospitalized injury"));
        assert_eq!(book.label(Dimension::Severity, 4), Some("Slight injury"));
        assert_eq!(book.label(Dimension::Severity, 5), None);
    }

    #[test]
    fn negative_codes_are_mapped() {
        let book = Codebook::embedded();
        assert_eq!(book.label(Dimension::Surface, -1), Some("Not specified"));
        assert_eq!(book.label(Dimension::Surface, 9), Some("Other"));
        assert_eq!(book.label_or_code(Dimension::Lighting, 42), "42");
    }

    #[test]
    fn incomplete_codebook_is_rejected() {
        let text = r#"{"version": "partial", "dimensions": {"grav": {"1": "Unharmed"}}}"#;
        let err = Codebook::from_json(text).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidConfig(_)));
    }

    #[test]
    fn codebook_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codebook.json");
        let text = EMBEDDED_CODEBOOK.replace("\"Icy\"", "\"Frozen\"");
        std::fs::write(&path, text).unwrap();
        let book = Codebook::from_path(&path).unwrap();
        assert_eq!(book.label(Dimension::Surface, 7), Some("Frozen"));
    }
}
