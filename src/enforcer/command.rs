// Per-command enforcement on an open channel

use crate::decision::{Access, AccessDecision};
use crate::error::{AceError, AceResult};

/// Reason reported when a decision carries none
pub const DEFAULT_DENY_REASON: &str = "Command not allowed!";

/// Check one outgoing command against the decision attached to its channel.
///
/// `None` means the channel was opened without a decision, which is a caller
/// bug rather than a denial.
pub fn check_command(decision: Option<&AccessDecision>, command: &[u8]) -> AceResult<()> {
    let decision = decision
        .ok_or_else(|| AceError::Internal("channel access not set".to_string()))?;

    let reason = if decision.reason.is_empty() {
        DEFAULT_DENY_REASON
    } else {
        decision.reason.as_str()
    };

    if decision.access != Access::Allowed {
        return Err(AceError::AccessDenied(reason.to_string()));
    }

    if decision.use_apdu_filter {
        if decision.apdu_filters.is_empty() {
            return Err(AceError::AccessDenied(format!(
                "access rule not available: {}",
                reason
            )));
        }
        if decision.apdu_filters.iter().any(|f| f.matches(command)) {
            return Ok(());
        }
        return Err(AceError::AccessDenied(format!(
            "access rule does not match: {}",
            reason
        )));
    }

    if decision.apdu_access != Access::Allowed {
        return Err(AceError::AccessDenied(reason.to_string()));
    }

    Ok(())
}
