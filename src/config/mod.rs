//! Engine configuration management for `vellum.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `[paths]`     | Application root and shared layout location          |
//! | `[templates]` | Default extension, view-start name, language profile |
//! | `[sources]`   | Template directories and change watching             |
//!
//! # Example
//!
//! ```toml
//! [paths]
//! application_root = "/"
//! shared_location = "~/Shared"
//!
//! [templates]
//! default_extension = ".vt"
//! view_start = "_ViewStart"
//!
//! [sources]
//! directories = ["views"]
//! watch = true
//! ```

pub mod defaults;
mod error;
mod handle;
mod paths;
mod sources;
mod templates;

pub use error::ConfigError;
pub use handle::ConfigHandle;
pub use paths::PathsConfig;
pub use sources::SourcesConfig;
pub use templates::TemplatesConfig;

use crate::vpath::VirtualPath;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "vellum.toml";

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing vellum.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub sources: SourcesConfig,
}

impl EngineConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path.
    ///
    /// Source directories are resolved against the directory holding the
    /// config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;

        config.config_path = normalize_path(path);
        let base = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.resolve_directories(&base);
        Ok(config)
    }

    /// Expand `~` and make every source directory absolute against `base`.
    pub fn resolve_directories(&mut self, base: &Path) {
        for dir in &mut self.sources.directories {
            let expanded = PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).into_owned());
            *dir = if expanded.is_relative() {
                normalize_path(&base.join(expanded))
            } else {
                normalize_path(&expanded)
            };
        }
    }

    /// Empty path bound to the configured application root.
    pub fn app_root(&self) -> VirtualPath {
        VirtualPath::new(&self.paths.application_root)
    }

    /// The shared location as a normalized absolute path.
    pub fn shared_location(&self) -> Result<VirtualPath, ConfigError> {
        let mut shared = self.app_root().sibling(&self.paths.shared_location);
        shared
            .normalize()
            .map_err(|err| ConfigError::Validation(format!("[paths.shared_location] {err}")))?;
        Ok(shared)
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.paths.application_root;
        if !root.starts_with('/') {
            return Err(ConfigError::Validation(
                "[paths.application_root] must start with `/`".into(),
            ));
        }
        if root
            .split('/')
            .any(|segment| matches!(segment, "." | ".." | "~"))
        {
            return Err(ConfigError::Validation(
                "[paths.application_root] must not contain `.`, `..` or `~` segments".into(),
            ));
        }

        if self.paths.shared_location.trim().is_empty() {
            return Err(ConfigError::Validation(
                "[paths.shared_location] must not be empty".into(),
            ));
        }
        if !self.shared_location()?.is_valid_absolute_path() {
            return Err(ConfigError::Validation(
                "[paths.shared_location] must lie under the application root".into(),
            ));
        }

        let extension = self.templates.extension();
        if extension.is_empty() || extension.contains(['/', '\\', '.']) {
            return Err(ConfigError::Validation(format!(
                "[templates.default_extension] `{}` is not a single extension",
                self.templates.default_extension
            )));
        }

        let view_start = &self.templates.view_start;
        if view_start.is_empty() || view_start.contains(['/', '\\', '~']) {
            return Err(ConfigError::Validation(
                "[templates.view_start] must be a bare template name".into(),
            ));
        }

        for dir in &self.sources.directories {
            if !dir.is_dir() {
                return Err(ConfigError::Validation(format!(
                    "[sources.directories] `{}` is not a directory",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_str_empty_uses_defaults() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config.config_path, PathBuf::new());
        assert_eq!(config.paths.application_root, "/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = EngineConfig::from_str("[paths\napplication_root = \"/\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let result = EngineConfig::from_str("[server]\nport = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_resolves_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("views")).unwrap();
        let config_path = dir.path().join(CONFIG_FILE);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[sources]\ndirectories = [\"views\"]").unwrap();

        let config = EngineConfig::from_path(&config_path).unwrap();
        let expected = dir.path().join("views").canonicalize().unwrap();
        assert_eq!(config.sources.directories, vec![expected]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_path_missing_file() {
        let result = EngineConfig::from_path(Path::new("/definitely/not/here/vellum.toml"));
        assert!(matches!(result, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_validate_application_root() {
        let mut config = EngineConfig::default();
        config.paths.application_root = "app".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.paths.application_root = "/app/../x".into();
        assert!(config.validate().is_err());

        config.paths.application_root = "/app".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_shared_location_outside_root() {
        let mut config = EngineConfig::default();
        config.paths.application_root = "/app".into();
        config.paths.shared_location = "/elsewhere".into();
        assert!(config.validate().is_err());

        config.paths.shared_location = "~/../..".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_extension_and_view_start() {
        let mut config = EngineConfig::default();
        config.templates.default_extension = ".".into();
        assert!(config.validate().is_err());

        config.templates.default_extension = "a/b".into();
        assert!(config.validate().is_err());

        config.templates.default_extension = "html".into();
        assert!(config.validate().is_ok());

        config.templates.view_start = "~/_ViewStart".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_location_resolution() {
        let mut config = EngineConfig::default();
        config.paths.application_root = "/app".into();
        assert_eq!(config.shared_location().unwrap().to_string(), "/app/Shared");
    }
}
