//! `[sources]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[sources]` section in vellum.toml - directories mapped onto the
/// application root, in priority order.
///
/// # Example
/// ```toml
/// [sources]
/// directories = ["views", "~/.config/vellum/shared"]
/// watch = true    # invalidate cached templates when files change
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    #[serde(default = "defaults::sources::directories")]
    #[educe(Default = defaults::sources::directories())]
    pub directories: Vec<PathBuf>,

    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub watch: bool,
}

#[cfg(test)]
mod tests {
    use super::super::EngineConfig;
    use std::path::PathBuf;

    #[test]
    fn test_sources_config() {
        let config = r#"
            [sources]
            directories = ["views", "shared"]
            watch = true
        "#;
        let config = EngineConfig::from_str(config).unwrap();

        assert_eq!(
            config.sources.directories,
            vec![PathBuf::from("views"), PathBuf::from("shared")]
        );
        assert!(config.sources.watch);
    }

    #[test]
    fn test_sources_config_defaults() {
        let config = EngineConfig::from_str("").unwrap();
        assert!(config.sources.directories.is_empty());
        assert!(!config.sources.watch);
    }
}
