//! Host-side client options, stored as plain JSON.
//!
//! Nothing here is sensitive: PINs and temporary passwords are never
//! persisted by this crate.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;

// ── Options ────────────────────────────────────────────────────────

/// Knobs for [`Device`](crate::Device).
///
/// Persisted to `{dir}/nk-client.json`. Every field has a serde default so
/// older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Reject responses whose trailing CRC does not match.
    #[serde(default = "default_verify_response_crc")]
    pub verify_response_crc: bool,

    /// Use these capabilities instead of deriving them from the firmware
    /// version at connect.
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            verify_response_crc: default_verify_response_crc(),
            capabilities: None,
        }
    }
}

const fn default_verify_response_crc() -> bool {
    true
}

// ── File I/O ───────────────────────────────────────────────────────

const OPTIONS_FILE: &str = "nk-client.json";

impl ClientOptions {
    /// Load options from `{dir}/nk-client.json`.
    ///
    /// Falls back to [`Default::default()`] for a missing or unparsable file.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(OPTIONS_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| serde_json::from_str(&contents).unwrap_or_default(),
        )
    }

    /// Persist to `{dir}/nk-client.json` via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename fails.
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        let path = dir.join(OPTIONS_FILE);
        let tmp = dir.join(".nk-client.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;

        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
