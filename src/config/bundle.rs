//! Validation bundles.
//!
//! A bundle is everything that describes one document type: its gates,
//! rubrics, global threshold and threshold schedule. Swapping bundles lets
//! one engine validate different kinds of document.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::policy::ThresholdPolicySpec;
use crate::scoring::RubricSpec;
use crate::validation::GateSpec;

/// Serializable configuration for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBundle {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub global_threshold: f64,
    #[serde(default)]
    pub gates: Vec<GateSpec>,
    pub rubrics: Vec<RubricSpec>,
    /// Defaults to a constant schedule at `global_threshold`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_policy: Option<ThresholdPolicySpec>,
    /// Overrides the engine's refine margin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<f64>,
}

impl ValidationBundle {
    /// Load a bundle from YAML, or JSON when the extension is `.json`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read bundle {}", path.display()))?;

        let bundle: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).with_context(|| format!("Failed to parse bundle {}", path.display()))?
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse bundle {}", path.display()))?
        };
        Ok(bundle)
    }
}

/// Named bundles loaded from a directory.
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    bundles: BTreeMap<String, ValidationBundle>,
}

impl BundleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yml`, `*.yaml` and `*.json` bundle in `dir`.
    ///
    /// A bundle that fails to parse or reuses a name is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        let mut paths = Vec::new();
        for ext in ["yml", "yaml", "json"] {
            let pattern = dir.join(format!("*.{}", ext));
            let pattern = pattern
                .to_str()
                .ok_or_else(|| eyre::eyre!("Bundle directory is not valid UTF-8: {}", dir.display()))?;
            paths.extend(glob::glob(pattern)?.filter_map(|r| r.ok()));
        }
        paths.sort();

        for path in paths {
            let bundle = ValidationBundle::load_from_file(&path)?;
            log::debug!("Loaded bundle '{}' from {}", bundle.name, path.display());
            catalog
                .insert(bundle)
                .with_context(|| format!("Failed to register bundle from {}", path.display()))?;
        }

        log::info!("Loaded {} bundle(s) from {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Add a bundle; names must be unique.
    pub fn insert(&mut self, bundle: ValidationBundle) -> Result<()> {
        if self.bundles.contains_key(&bundle.name) {
            eyre::bail!("duplicate bundle name '{}'", bundle.name);
        }
        self.bundles.insert(bundle.name.clone(), bundle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ValidationBundle> {
        self.bundles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
