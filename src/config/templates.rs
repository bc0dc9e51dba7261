//! `[templates]` section configuration.

use super::defaults;
use crate::compiler::LanguageProfile;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[templates]` section in vellum.toml.
///
/// # Example
/// ```toml
/// [templates]
/// default_extension = ".vt"
/// view_start = "_ViewStart"
/// language = "brace"              # or "literal"
/// include_generated_source = true # attach compiled listings to results
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Appended to addresses that carry no extension.
    #[serde(default = "defaults::templates::default_extension")]
    #[educe(Default = defaults::templates::default_extension())]
    pub default_extension: String,

    /// Name of the per-directory hook template.
    #[serde(default = "defaults::templates::view_start")]
    #[educe(Default = defaults::templates::view_start())]
    pub view_start: String,

    #[serde(default = "defaults::templates::language")]
    #[educe(Default = defaults::templates::language())]
    pub language: LanguageProfile,

    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub include_generated_source: bool,
}

impl TemplatesConfig {
    /// The default extension without its leading dot.
    pub fn extension(&self) -> &str {
        self.default_extension.trim_start_matches('.')
    }
}

#[cfg(test)]
mod tests {
    use super::super::EngineConfig;
    use crate::compiler::LanguageProfile;

    #[test]
    fn test_templates_config() {
        let config = r#"
            [templates]
            default_extension = "tpl"
            view_start = "_start"
            language = "literal"
            include_generated_source = true
        "#;
        let config = EngineConfig::from_str(config).unwrap();

        assert_eq!(config.templates.extension(), "tpl");
        assert_eq!(config.templates.view_start, "_start");
        assert_eq!(config.templates.language, LanguageProfile::Literal);
        assert!(config.templates.include_generated_source);
    }

    #[test]
    fn test_templates_config_defaults() {
        let config = EngineConfig::from_str("[templates]\n").unwrap();

        assert_eq!(config.templates.default_extension, ".vt");
        assert_eq!(config.templates.extension(), "vt");
        assert_eq!(config.templates.view_start, "_ViewStart");
        assert_eq!(config.templates.language, LanguageProfile::Brace);
        assert!(!config.templates.include_generated_source);
    }

    #[test]
    fn test_unknown_language_rejection() {
        let result = EngineConfig::from_str("[templates]\nlanguage = \"razor\"\n");
        assert!(result.is_err());
    }
}
