// Collaborator traits consumed by the enforcer
// Transport, rule retrieval and package management live behind these seams.

use crate::decision::AccessDecision;
use crate::error::{AceResult, SourceError};
use crate::identity::{Certificate, CertificateIdentity};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;

/// AID of the ARA-M applet, selected by terminals to reach the trust anchor
pub const DEFAULT_ACCESS_CONTROL_AID: [u8; 9] =
    [0xA0, 0x00, 0x00, 0x01, 0x51, 0x41, 0x43, 0x4C, 0x00];

/// Name prefix of UICC-class terminals
pub const UICC_TERMINAL_PREFIX: &str = "SIM";

/// Secure element terminal the enforcer is attached to
pub trait Terminal: Send + Sync {
    fn name(&self) -> String;

    /// Whether this terminal is the primary SIM-resident element
    fn is_uicc(&self) -> bool {
        self.name().starts_with(UICC_TERMINAL_PREFIX)
    }
}

/// Maps package identifiers to their signing certificates
pub trait AppRegistry: Send + Sync {
    /// Fails with `PackageNotFound` for unknown packages
    fn signing_certificates(&self, package: &str) -> AceResult<Vec<Certificate>>;
}

/// Opaque handle passed through to rule sources during initialization
pub trait ServiceCallback: Send + Sync {
    /// Whether the service that requested initialization is still alive
    fn is_alive(&self) -> bool {
        true
    }
}

/// Which rule-retrieval subsystem a source implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Access rule applet resident on the secure element (ARA)
    TrustAnchor,
    /// Access rule file resident on the UICC (ARF)
    RuleFile,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::TrustAnchor => write!(f, "trust-anchor applet"),
            SourceKind::RuleFile => write!(f, "rule file"),
        }
    }
}

/// A rule-retrieval subsystem. Successful initialization populates the
/// rule cache; the enforcer only observes the outcome.
pub trait RuleSource: Send {
    fn kind(&self) -> SourceKind;

    fn initialize(
        &mut self,
        load_at_startup: bool,
        callback: &dyn ServiceCallback,
    ) -> Result<(), SourceError>;

    /// True when the last failure was caused by the source being absent
    /// from the element rather than misbehaving
    fn is_no_rule_source_present(&self) -> bool {
        false
    }
}

/// Constructs rule sources on demand
pub trait RuleSourceFactory: Send + Sync {
    fn create(&self, kind: SourceKind) -> Box<dyn RuleSource>;
}

/// Query side of the access rule cache
pub trait RuleCache: Send + Sync {
    /// Find the rule applying to `aid` for an application with the given
    /// certificate chain
    fn find_rule(
        &self,
        aid: &[u8],
        identities: &[CertificateIdentity],
    ) -> AceResult<Option<AccessDecision>>;

    /// Write a human-readable listing of cached rules
    fn dump(&self, sink: &mut dyn io::Write, prefix: &str) -> io::Result<()>;
}

/// Collaborators an enforcer is wired to
#[derive(Clone)]
pub struct AceProvider {
    pub registry: Arc<dyn AppRegistry>,
    pub rule_cache: Arc<dyn RuleCache>,
    pub sources: Arc<dyn RuleSourceFactory>,
}

impl AceProvider {
    pub fn new(
        registry: Arc<dyn AppRegistry>,
        rule_cache: Arc<dyn RuleCache>,
        sources: Arc<dyn RuleSourceFactory>,
    ) -> Self {
        Self {
            registry,
            rule_cache,
            sources,
        }
    }

    /// Builder: Replace the rule cache
    pub fn with_rule_cache(mut self, rule_cache: Arc<dyn RuleCache>) -> Self {
        self.rule_cache = rule_cache;
        self
    }
}
