// Rule source selection and fallback posture

use crate::decision::AccessDecision;
use crate::error::{AceError, AceResult, SourceError};
use crate::interfaces::{RuleSource, RuleSourceFactory, ServiceCallback, SourceKind, Terminal};
use crate::profile::SecurityProfile;
use serde::Serialize;

const NOT_INITIALIZED: &str = "access control enforcer not initialized";
const NO_RULE_SOURCE: &str = "no access control rule source available";

/// Read-only snapshot of the enforcer's posture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posture {
    pub use_trust_anchor: bool,
    pub use_rule_file: bool,
    pub full_access: bool,
    pub rules_loaded: bool,
    pub initialized: bool,
    pub initial_decision: AccessDecision,
}

/// Per-terminal enforcer state. Only touched under the enforcer's lock.
pub(crate) struct EnforcerState {
    pub(crate) profile: SecurityProfile,
    pub(crate) use_trust_anchor: bool,
    pub(crate) use_rule_file: bool,
    pub(crate) full_access: bool,
    pub(crate) initial_decision: AccessDecision,
    pub(crate) rules_loaded: bool,
    pub(crate) initialized: bool,
    trust_anchor: Option<Box<dyn RuleSource>>,
    rule_file: Option<Box<dyn RuleSource>>,
}

impl EnforcerState {
    pub(crate) fn new(profile: SecurityProfile) -> Self {
        Self {
            profile,
            use_trust_anchor: profile.use_trust_anchor,
            use_rule_file: profile.use_rule_file,
            full_access: false,
            initial_decision: AccessDecision::deny_all(NOT_INITIALIZED),
            rules_loaded: false,
            initialized: false,
            trust_anchor: None,
            rule_file: None,
        }
    }

    pub(crate) fn has_active_source(&self) -> bool {
        self.use_trust_anchor || self.use_rule_file
    }

    pub(crate) fn posture(&self) -> Posture {
        Posture {
            use_trust_anchor: self.use_trust_anchor,
            use_rule_file: self.use_rule_file,
            full_access: self.full_access,
            rules_loaded: self.rules_loaded,
            initialized: self.initialized,
            initial_decision: self.initial_decision.clone(),
        }
    }

    /// Drop the source handles so the next initialization constructs fresh ones
    pub(crate) fn reset(&mut self) {
        self.trust_anchor = None;
        self.rule_file = None;
    }

    /// Select a rule source, falling back trust anchor -> rule file ->
    /// full access (non-UICC only) -> deny all.
    ///
    /// Returns `Ok(false)` when a present rule source misbehaved; access is
    /// then denied. A missing resource on a non-UICC terminal is returned as
    /// `Err(ResourceUnavailable)` and leaves the enforcer uninitialized.
    pub(crate) fn initialize(
        &mut self,
        terminal: &dyn Terminal,
        factory: &dyn RuleSourceFactory,
        load_at_startup: bool,
        callback: &dyn ServiceCallback,
    ) -> AceResult<bool> {
        let name = terminal.name();
        let uicc = terminal.is_uicc();
        let mut status = true;
        let mut deny_reason = String::new();

        // Sources may need to open a channel themselves while initializing
        self.initial_decision = AccessDecision::allow_all("");

        self.use_trust_anchor = self.profile.use_trust_anchor;
        self.use_rule_file = self.profile.use_rule_file;
        self.full_access = self.profile.full_access;
        log::info!(
            "Allowed ACE mode for {}: trust_anchor={} rule_file={} full_access={}",
            name,
            self.use_trust_anchor,
            self.use_rule_file,
            self.full_access
        );

        if !uicc {
            // Non-UICC elements may grant full access when no rules can be retrieved
            self.full_access = true;
        }

        if self.use_trust_anchor {
            let source = self
                .trust_anchor
                .get_or_insert_with(|| factory.create(SourceKind::TrustAnchor));
            let outcome = source
                .initialize(load_at_startup, callback)
                .map_err(|err| {
                    let absent = matches!(err, SourceError::ElementAbsent(_))
                        || source.is_no_rule_source_present();
                    (err, absent)
                });

            match outcome {
                Ok(()) => {
                    log::info!("{} is used for: {}", source.kind(), name);
                    self.use_rule_file = false;
                    self.full_access = false;
                }
                Err((err, absent)) => {
                    self.use_trust_anchor = false;
                    deny_reason = err.to_string();

                    match err {
                        SourceError::ResourceUnavailable(msg) if uicc => {
                            log::warn!(
                                "Trust-anchor resource unavailable on {}: does the UICC support logical channels? ({})",
                                name,
                                msg
                            );
                        }
                        SourceError::ResourceUnavailable(msg) => {
                            log::error!("Trust-anchor resource unavailable on {}: {}", name, msg);
                            self.abort(&msg);
                            return Err(AceError::ResourceUnavailable(msg));
                        }
                        _ if absent => {
                            log::info!("No trust-anchor applet found in: {}", name);
                        }
                        SourceError::ElementAbsent(msg) | SourceError::Failed(msg) => {
                            log::error!(
                                "Problem accessing trust-anchor applet on {}, access denied: {}",
                                name,
                                msg
                            );
                            self.use_rule_file = false;
                            self.full_access = false;
                            status = false;
                        }
                    }
                }
            }
        }

        if self.use_rule_file && !uicc {
            log::info!(
                "Disable rule file for terminal: {} (rule file is only available for UICC)",
                name
            );
            self.use_rule_file = false;
        }

        if self.use_rule_file {
            let source = self
                .rule_file
                .get_or_insert_with(|| factory.create(SourceKind::RuleFile));

            match source.initialize(load_at_startup, callback) {
                Ok(()) => {
                    log::info!("{} is used for: {}", source.kind(), name);
                    self.full_access = false;
                }
                Err(err) => {
                    log::error!("Rule file cannot be used for {}: {}", name, err);
                    self.use_rule_file = false;
                    status = false;
                    deny_reason = err.to_string();
                }
            }
        }

        if self.full_access {
            self.initial_decision =
                AccessDecision::allow_all(format!("full access granted for {}", name));
            log::info!("Full access granted for: {}", name);
        } else if !self.has_active_source() {
            if deny_reason.is_empty() {
                deny_reason = NO_RULE_SOURCE.to_string();
            }
            self.initial_decision = AccessDecision::deny_all(deny_reason);
            log::info!("Deny any access to: {}", name);
        }

        self.rules_loaded = status;
        self.initialized = true;
        Ok(status)
    }

    fn abort(&mut self, reason: &str) {
        self.use_trust_anchor = false;
        self.use_rule_file = false;
        self.full_access = false;
        self.rules_loaded = false;
        self.initialized = false;
        self.initial_decision = AccessDecision::deny_all(reason);
    }
}
