use serde::{Deserialize, Serialize};

/// Behavior switches for an update run, the `[update]` table of `updraft.toml`.
///
/// ```toml
/// [update]
/// verify_checksum = true
/// protect_nested_names = true
/// launch_after_update = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Verify the package against a checksum file when the release publishes one.
    ///
    /// Releases without a checksum file are installed with a warning.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,

    /// Whether protected file and directory names are honored below the install
    /// root when purging obsolete files, or only at the root.
    #[serde(default = "default_protect_nested_names")]
    pub protect_nested_names: bool,

    /// Start the target application after a successful update.
    #[serde(default)]
    pub launch_after_update: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            verify_checksum: default_verify_checksum(),
            protect_nested_names: default_protect_nested_names(),
            launch_after_update: false,
        }
    }
}

const fn default_verify_checksum() -> bool {
    true
}

const fn default_protect_nested_names() -> bool {
    true
}
