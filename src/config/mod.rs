//! Configuration for critiq.
//!
//! Two kinds of configuration:
//! 1. Engine settings (./critiq.yml or ~/.config/critiq/critiq.yml)
//! 2. Validation bundles, one per document type (`bundles.dir`)

use eyre::Result;
use std::path::PathBuf;

pub use self::bundle::{BundleCatalog, ValidationBundle};
pub use self::settings::{
    BestEffortPolicy, BundlesConfig, ConcurrencyConfig, EngineConfig, EngineSettings, ReportConfig, TimeoutConfig,
};

mod bundle;
mod settings;

/// Load engine settings from the standard search paths.
pub fn load_settings(explicit_path: Option<&PathBuf>) -> Result<EngineSettings> {
    EngineSettings::load(explicit_path)
}

/// Load the bundles named by `settings.bundles.dir`, if any.
pub fn load_bundles(settings: &EngineSettings) -> Result<BundleCatalog> {
    match &settings.bundles.dir {
        Some(dir) => BundleCatalog::load_dir(dir),
        None => {
            log::debug!("No bundle directory configured");
            Ok(BundleCatalog::new())
        }
    }
}
