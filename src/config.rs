// ------------------------- Config IO -------------------------

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::palette::palette_by_name;
use crate::render::RenderBackend;
use crate::viewport::ViewportState;

/// Startup settings, read from `.json` or `.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub viewport: ViewportState,
    pub render_backend: RenderBackend,
    /// Catalog palette applied over `viewport.colors`.
    pub palette: Option<String>,
    /// Where the save dialog (or headless export) starts.
    pub export_dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AppConfig {
    fn finish(mut self) -> Self {
        self.viewport.sanitize();
        if let Some(name) = self.palette.as_deref() {
            match palette_by_name(name) {
                Some(found) => self.viewport.apply_palette(found),
                None => warn!(palette = name, "unknown palette in config, keeping colors"),
            }
        }
        self
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let data = fs::read_to_string(path)?;
    let config: AppConfig = match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
        "json" => serde_json::from_str(&data)?,
        "toml" => toml::from_str(&data)?,
        _ => serde_json::from_str(&data).or_else(|_| toml::from_str(&data))?,
    };
    info!(path = %path.display(), backend = config.render_backend.label(), "config loaded");
    Ok(config.finish())
}

pub fn open_config_dialog() -> Option<AppConfig> {
    let file = rfd::FileDialog::new()
        .add_filter("Config", &["json", "toml"])
        .pick_file()?;
    match load_config(&file) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!(path = %file.display(), error = %err, "could not load config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{self, palette_matching};
    use crate::viewport::Complex;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "view.json",
            r#"{ "viewport": { "zoom": 3.0, "is_julia": true }, "render_backend": "cpu" }"#,
        );
        let config = load_config(&path).expect("load");
        assert!((config.viewport.zoom() - 3.0).abs() < 1e-12);
        assert!(config.viewport.is_julia());
        assert_eq!(config.viewport.center(), Complex::new(-0.75, 0.0));
        assert_eq!(config.render_backend, RenderBackend::Cpu);
        assert!(config.export_dir.is_none());
    }

    #[test]
    fn toml_palette_overrides_colors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "view.toml",
            r#"
palette = "royal gold"
export_dir = "/tmp/walls"

[viewport]
zoom = -1.0
center = { re = 0.25, im = -0.5 }
colors = [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]
"#,
        );
        let config = load_config(&path).expect("load");
        let gold = palette_by_name("Royal Gold").expect("palette");
        assert_eq!(config.viewport.colors(), gold.colors);
        assert_eq!(config.viewport.center(), Complex::new(0.25, -0.5));
        // sanitized back to the default
        assert!((config.viewport.zoom() - 0.8).abs() < 1e-12);
        assert_eq!(config.export_dir, Some(PathBuf::from("/tmp/walls")));
    }

    #[test]
    fn unknown_extension_falls_back_to_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "view.cfg", "palette = \"Nope\"\n");
        let config = load_config(&path).expect("load");
        assert_eq!(config.viewport.colors(), palette::default_palette().colors);
        let current = palette_matching(&config.viewport.colors()).expect("catalog colors");
        assert_eq!(current.name, "Electric Neon");
    }

    #[test]
    fn malformed_files_are_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "broken.json", "{ viewport: ");
        assert!(matches!(load_config(&path), Err(ConfigError::Json(_))));
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
