// Security profile: which rule sources the enforcer may use

use crate::error::{AceError, AceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Allowed enforcer modes, re-applied at the start of every initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    /// Try the access rule applet on the element
    pub use_trust_anchor: bool,
    /// Try the access rule file (UICC only)
    pub use_rule_file: bool,
    /// Grant full access when no rule source can be used
    pub full_access: bool,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self {
            use_trust_anchor: true,
            use_rule_file: true,
            full_access: false,
        }
    }
}

impl SecurityProfile {
    /// Legacy posture: no rule sources, everything allowed
    pub fn permissive() -> Self {
        Self {
            use_trust_anchor: false,
            use_rule_file: false,
            full_access: true,
        }
    }

    pub fn from_json(json: &str) -> AceResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> AceResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AceError::InvalidProfile(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }
}
