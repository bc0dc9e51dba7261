//! `[paths]` section configuration.
//!
//! Where templates live in the virtual namespace.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[paths]` section in vellum.toml.
///
/// # Example
/// ```toml
/// [paths]
/// application_root = "/app"   # `~/` resolves to `/app/`
/// shared_location = "~/Shared" # second probe when looking up layouts
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Absolute virtual directory that the root operator `~` stands for.
    #[serde(default = "defaults::paths::application_root")]
    #[educe(Default = defaults::paths::application_root())]
    pub application_root: String,

    /// Directory probed for layouts after the caller's own.
    #[serde(default = "defaults::paths::shared_location")]
    #[educe(Default = defaults::paths::shared_location())]
    pub shared_location: String,
}
