// Channel access resolution and NFC event authorization

use super::state::EnforcerState;
use crate::decision::AccessDecision;
use crate::error::{AceError, AceResult};
use crate::identity::{AppIdentity, IdentityResolver};
use crate::interfaces::RuleCache;

const NO_RULE_FOUND: &str = "no access rule found!";
const NO_APDU_ACCESS: &str = "no APDU access allowed!";

/// Collaborators needed to turn a request into a decision
pub(crate) struct Resolver<'a> {
    pub(crate) state: &'a EnforcerState,
    pub(crate) identities: &'a IdentityResolver,
    pub(crate) cache: &'a dyn RuleCache,
}

impl Resolver<'_> {
    /// Decide whether `package` may open a channel to `aid`.
    pub(crate) fn channel_access(&self, aid: &[u8], package: &str) -> AceResult<AccessDecision> {
        let initial = &self.state.initial_decision;
        if initial.is_denied() {
            return Err(AceError::AccessDenied(format!(
                "access denied: {}",
                initial.reason
            )));
        }

        let mut found = None;
        if self.state.has_active_source() {
            found = match self.lookup(aid, package) {
                Ok(decision) => Some(decision),
                Err(AceError::ResourceUnavailable(msg)) => {
                    return Err(AceError::ResourceUnavailable(msg))
                }
                Err(err) => {
                    return Err(AceError::AccessDenied(format!(
                        "access denied: {}",
                        err.message()
                    )))
                }
            };
        }

        let mut decision = match found {
            Some(decision) if decision.grants_apdu_access() => decision,
            // The initial decision allows everything when full access is on
            _ if self.state.full_access => initial.clone(),
            _ => return Err(AceError::AccessDenied(NO_APDU_ACCESS.to_string())),
        };

        decision.owning_package = Some(package.to_string());
        Ok(decision)
    }

    /// NFC event permission for every package, in input order.
    /// Failures resolve to `false` and are only logged.
    pub(crate) fn nfc_event_flags<S: AsRef<str>>(&self, aid: &[u8], packages: &[S]) -> Vec<bool> {
        if !self.state.has_active_source() {
            return vec![self.state.full_access; packages.len()];
        }

        packages
            .iter()
            .map(|package| {
                let package = package.as_ref();
                match self.lookup(aid, package) {
                    Ok(decision) => decision.nfc_events_allowed(),
                    Err(err) => {
                        log::warn!("Access rules for NFC events of {}: {}", package, err);
                        false
                    }
                }
            })
            .collect()
    }

    fn lookup(&self, aid: &[u8], package: &str) -> AceResult<AccessDecision> {
        let identity = self.identities.resolve(package)?;
        self.access_rule(aid, &identity)
    }

    /// Cached rule for `identity`, or a deny-all decision when rules were not
    /// loaded or none applies.
    fn access_rule(&self, aid: &[u8], identity: &AppIdentity) -> AceResult<AccessDecision> {
        let rule = if self.state.rules_loaded {
            self.cache.find_rule(aid, &identity.certificates)?
        } else {
            None
        };

        Ok(rule.unwrap_or_else(|| AccessDecision::deny_all(NO_RULE_FOUND)))
    }
}
