//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [paths] Section Defaults
// ============================================================================

pub mod paths {
    pub fn application_root() -> String {
        "/".into()
    }

    pub fn shared_location() -> String {
        "~/Shared".into()
    }
}

// ============================================================================
// [templates] Section Defaults
// ============================================================================

pub mod templates {
    use crate::compiler::LanguageProfile;

    pub fn default_extension() -> String {
        ".vt".into()
    }

    pub fn view_start() -> String {
        "_ViewStart".into()
    }

    pub fn language() -> LanguageProfile {
        LanguageProfile::Brace
    }
}

// ============================================================================
// [sources] Section Defaults
// ============================================================================

pub mod sources {
    use std::path::PathBuf;

    pub fn directories() -> Vec<PathBuf> {
        Vec::new()
    }
}
