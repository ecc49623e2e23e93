// Access decisions and APDU header filters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission state of one access dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Allowed,
    Denied,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Allowed => write!(f, "ALLOWED"),
            Access::Denied => write!(f, "DENIED"),
        }
    }
}

/// Masked header filter applied to outgoing commands.
///
/// A command matches when, for every byte covered by the filter,
/// `command[i] & mask[i] == header[i] & mask[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApduFilter {
    #[serde(with = "hex_bytes")]
    pub header: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub mask: Vec<u8>,
}

impl ApduFilter {
    pub fn new(header: impl Into<Vec<u8>>, mask: impl Into<Vec<u8>>) -> Self {
        Self {
            header: header.into(),
            mask: mask.into(),
        }
    }

    /// Check a command's leading bytes against this filter.
    ///
    /// Length mismatches (mask vs header, or a filter longer than the
    /// command) never match.
    pub fn matches(&self, command: &[u8]) -> bool {
        if self.mask.len() != self.header.len() || command.len() < self.header.len() {
            return false;
        }

        self.header
            .iter()
            .zip(&self.mask)
            .zip(command)
            .all(|((h, m), c)| c & m == h & m)
    }
}

impl fmt::Display for ApduFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "header={} mask={}",
            hex::encode_upper(&self.header),
            hex::encode_upper(&self.mask)
        )
    }
}

/// Rendered outcome of rule evaluation for one (AID, application) pair.
///
/// Decisions are plain values: every copy handed out by the enforcer is
/// independent of the cached rule it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Channel-level verdict: may a channel be set up at all
    pub access: Access,
    pub apdu_access: Access,
    pub nfc_event_access: Access,

    #[serde(default)]
    pub use_apdu_filter: bool,

    #[serde(default)]
    pub apdu_filters: Vec<ApduFilter>,

    #[serde(default)]
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_package: Option<String>,
}

impl AccessDecision {
    /// Decision granting every dimension
    pub fn allow_all(reason: impl Into<String>) -> Self {
        Self::uniform(Access::Allowed, reason)
    }

    /// Decision denying every dimension
    pub fn deny_all(reason: impl Into<String>) -> Self {
        Self::uniform(Access::Denied, reason)
    }

    fn uniform(access: Access, reason: impl Into<String>) -> Self {
        Self {
            access,
            apdu_access: access,
            nfc_event_access: access,
            use_apdu_filter: false,
            apdu_filters: Vec::new(),
            reason: reason.into(),
            owning_package: None,
        }
    }

    /// Restrict APDU access to commands matching one of `filters`
    pub fn with_apdu_filters(mut self, filters: Vec<ApduFilter>) -> Self {
        self.use_apdu_filter = true;
        self.apdu_filters = filters;
        self
    }

    pub fn with_nfc_event_access(mut self, access: Access) -> Self {
        self.nfc_event_access = access;
        self
    }

    pub fn is_denied(&self) -> bool {
        self.access == Access::Denied
    }

    /// True when the decision lets at least some commands through,
    /// either blanket or filter-based.
    pub fn grants_apdu_access(&self) -> bool {
        self.apdu_access == Access::Allowed || self.use_apdu_filter
    }

    pub fn nfc_events_allowed(&self) -> bool {
        self.nfc_event_access == Access::Allowed
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccessDecision [access={}, apdu={}, nfc={}, filter={}",
            self.access, self.apdu_access, self.nfc_event_access, self.use_apdu_filter
        )?;
        for filter in &self.apdu_filters {
            write!(f, ", ({})", filter)?;
        }
        if let Some(package) = &self.owning_package {
            write!(f, ", package={}", package)?;
        }
        write!(f, ", reason=\"{}\"]", self.reason)
    }
}

/// Hex string (de)serialization for byte vectors in fixtures and output
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.replace(' ', "")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_masked_match() {
        let select = ApduFilter::new(vec![0x00, 0xA4], vec![0xFF, 0xFF]);
        assert!(select.matches(&[0x00, 0xA4, 0x04, 0x00]));
        assert!(!select.matches(&[0x00, 0xA5, 0x04, 0x00]));

        // Only the CLA byte is compared
        let cla_only = ApduFilter::new(vec![0x00, 0x10], vec![0xFF, 0x00]);
        assert!(cla_only.matches(&[0x00, 0x20, 0x00, 0x00]));
        assert!(!cla_only.matches(&[0x80, 0x20, 0x00, 0x00]));
    }

    #[test]
    fn test_filter_length_mismatch() {
        let filter = ApduFilter::new(vec![0x00, 0xA4, 0x04, 0x00], vec![0xFF; 4]);
        assert!(!filter.matches(&[0x00, 0xA4]));

        let broken = ApduFilter::new(vec![0x00, 0xA4], vec![0xFF]);
        assert!(!broken.matches(&[0x00, 0xA4, 0x04, 0x00]));
    }

    #[test]
    fn test_grants_apdu_access() {
        assert!(AccessDecision::allow_all("").grants_apdu_access());
        assert!(!AccessDecision::deny_all("").grants_apdu_access());

        let filtered = AccessDecision::deny_all("").with_apdu_filters(Vec::new());
        assert!(filtered.grants_apdu_access());
    }

    #[test]
    fn test_decision_json() {
        let json = r#"{
            "access": "allowed",
            "apdu_access": "denied",
            "nfc_event_access": "allowed",
            "use_apdu_filter": true,
            "apdu_filters": [{ "header": "00A40400", "mask": "FFFFFFFF" }]
        }"#;
        let decision: AccessDecision = serde_json::from_str(json).unwrap();
        assert_eq!(decision.apdu_filters[0].header, vec![0x00, 0xA4, 0x04, 0x00]);
        assert!(decision.nfc_events_allowed());
        assert!(decision.reason.is_empty());
        assert!(decision.to_string().contains("header=00A40400"));
    }
}
