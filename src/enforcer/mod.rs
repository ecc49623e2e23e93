// Access Control Enforcer
//
// One enforcer guards one secure element terminal. It selects a rule source
// at initialization, then renders a decision for every channel-open request
// and checks every command sent on an open channel against that decision.
// All entry points run under a single per-terminal lock.

pub mod audit;
pub mod command;
mod resolver;
mod state;

pub use audit::{AuditEvent, AuditLog, AuditOperation};
pub use command::DEFAULT_DENY_REASON;
pub use state::Posture;

use crate::decision::AccessDecision;
use crate::error::{AceError, AceResult};
use crate::identity::IdentityResolver;
use crate::interfaces::{AceProvider, ServiceCallback, Terminal, DEFAULT_ACCESS_CONTROL_AID};
use crate::profile::SecurityProfile;
use resolver::Resolver;
use state::EnforcerState;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AccessControlEnforcer {
    terminal: Arc<dyn Terminal>,
    provider: AceProvider,
    identities: IdentityResolver,
    state: Mutex<EnforcerState>,
    audit_log: AuditLog,
}

impl AccessControlEnforcer {
    /// Create an enforcer using the default security profile
    pub fn new(terminal: Arc<dyn Terminal>, provider: AceProvider) -> Self {
        Self::with_profile(terminal, provider, SecurityProfile::default())
    }

    pub fn with_profile(
        terminal: Arc<dyn Terminal>,
        provider: AceProvider,
        profile: SecurityProfile,
    ) -> Self {
        Self {
            terminal,
            identities: IdentityResolver::new(Arc::clone(&provider.registry)),
            provider,
            state: Mutex::new(EnforcerState::new(profile)),
            audit_log: AuditLog::new(),
        }
    }

    /// Builder: Record decisions into a shared audit log
    pub fn with_audit_log(mut self, audit_log: AuditLog) -> Self {
        self.audit_log = audit_log;
        self
    }

    /// AID a terminal selects to reach the access rule applet
    pub fn default_access_control_aid() -> &'static [u8] {
        &DEFAULT_ACCESS_CONTROL_AID
    }

    pub fn terminal(&self) -> &dyn Terminal {
        self.terminal.as_ref()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Replace the security profile; applied by the next `initialize`
    pub fn set_profile(&self, profile: SecurityProfile) -> AceResult<()> {
        self.lock()?.profile = profile;
        Ok(())
    }

    /// Discard the rule source handles so the next `initialize` selects anew
    pub fn reset(&self) -> AceResult<()> {
        log::info!("Reset the ACE for terminal: {}", self.terminal.name());
        self.lock()?.reset();
        Ok(())
    }

    /// Select a rule source and settle the fallback posture.
    ///
    /// Returns `Ok(false)` when a present rule source failed; every request
    /// is then denied. Concurrent calls serialize: the second one runs after
    /// the first completes and re-evaluates from the current profile.
    pub fn initialize(
        &self,
        load_at_startup: bool,
        callback: &dyn ServiceCallback,
    ) -> AceResult<bool> {
        let mut state = self.lock()?;
        let result = state.initialize(
            self.terminal.as_ref(),
            self.provider.sources.as_ref(),
            load_at_startup,
            callback,
        );

        let event = AuditEvent::new(self.terminal.name(), AuditOperation::Initialize);
        self.audit_log.log(match &result {
            Ok(status) => event
                .with_success(*status)
                .with_details(state.initial_decision.to_string()),
            Err(err) => event.with_success(false).with_details(err.to_string()),
        });

        result
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().map(|state| state.initialized).unwrap_or(false)
    }

    pub fn posture(&self) -> AceResult<Posture> {
        Ok(self.lock()?.posture())
    }

    /// Decide whether `package` may open a channel to the applet `aid`.
    ///
    /// The returned decision is an independent value; attach it to the
    /// channel and pass it to `check_command` for every outgoing command.
    pub fn resolve_channel_access(&self, aid: &[u8], package: &str) -> AceResult<AccessDecision> {
        let state = self.lock()?;
        let result = self.resolver(&state).channel_access(aid, package);
        drop(state);

        let event = AuditEvent::new(self.terminal.name(), AuditOperation::OpenChannel)
            .with_package(package)
            .with_aid(aid);
        match &result {
            Ok(decision) => self.audit_log.log(event.with_details(decision.to_string())),
            Err(err) => {
                log::info!(
                    "Channel to {} denied for {}: {}",
                    hex::encode_upper(aid),
                    package,
                    err
                );
                self.audit_log
                    .log(event.with_success(false).with_details(err.to_string()));
            }
        }

        result
    }

    /// Check one command against the decision attached to its channel
    pub fn check_command(&self, decision: Option<&AccessDecision>, command: &[u8]) -> AceResult<()> {
        let _state = self.lock()?;
        let result = command::check_command(decision, command);

        if let Err(err) = &result {
            log::debug!(
                "Command {} rejected: {}",
                hex::encode_upper(command.get(..4).unwrap_or(command)),
                err
            );
            let mut event = AuditEvent::new(self.terminal.name(), AuditOperation::CheckCommand)
                .with_success(false)
                .with_details(err.to_string());
            if let Some(package) = decision.and_then(|d| d.owning_package.as_deref()) {
                event = event.with_package(package);
            }
            self.audit_log.log(event);
        }

        result
    }

    /// Whether each package may receive NFC events from `aid`.
    ///
    /// Always answers one flag per package, in order; failures become `false`.
    pub fn is_event_allowed<S: AsRef<str>>(&self, aid: &[u8], packages: &[S]) -> Vec<bool> {
        let flags = match self.lock() {
            Ok(state) => self.resolver(&state).nfc_event_flags(aid, packages),
            Err(err) => {
                log::error!("NFC event check failed: {}", err);
                vec![false; packages.len()]
            }
        };

        for (package, allowed) in packages.iter().zip(&flags) {
            self.audit_log.log(
                AuditEvent::new(self.terminal.name(), AuditOperation::NfcEvent)
                    .with_package(package.as_ref())
                    .with_aid(aid)
                    .with_success(*allowed),
            );
        }

        flags
    }

    /// Write the current posture and the rule cache contents
    pub fn dump(&self, sink: &mut dyn io::Write) -> AceResult<()> {
        let posture = self.posture()?;
        let prefix = "  ";

        writeln!(sink, "AccessControlEnforcer [{}]:", self.terminal.name())?;
        writeln!(sink, "{}use_trust_anchor: {}", prefix, posture.use_trust_anchor)?;
        writeln!(sink, "{}use_rule_file: {}", prefix, posture.use_rule_file)?;
        writeln!(sink, "{}full_access: {}", prefix, posture.full_access)?;
        writeln!(sink, "{}rules_loaded: {}", prefix, posture.rules_loaded)?;
        writeln!(sink, "{}initial_decision:", prefix)?;
        writeln!(sink, "{}  {}", prefix, posture.initial_decision)?;
        writeln!(sink)?;

        self.provider.rule_cache.dump(sink, prefix)?;
        Ok(())
    }

    fn resolver<'a>(&'a self, state: &'a EnforcerState) -> Resolver<'a> {
        Resolver {
            state,
            identities: &self.identities,
            cache: self.provider.rule_cache.as_ref(),
        }
    }

    fn lock(&self) -> AceResult<MutexGuard<'_, EnforcerState>> {
        self.state
            .lock()
            .map_err(|_| AceError::Internal("enforcer state lock poisoned".to_string()))
    }
}
