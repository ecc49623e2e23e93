// Audit trail of access decisions

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

/// Enforcer entry point that produced an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Initialize,
    OpenChannel,
    CheckCommand,
    NfcEvent,
}

/// One recorded decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: SystemTime,
    pub terminal: String,
    pub operation: AuditOperation,
    pub package: Option<String>,
    /// Hex-encoded AID
    pub aid: Option<String>,
    pub success: bool,
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(terminal: impl Into<String>, operation: AuditOperation) -> Self {
        Self {
            timestamp: SystemTime::now(),
            terminal: terminal.into(),
            operation,
            package: None,
            aid: None,
            success: true,
            details: None,
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_aid(mut self, aid: &[u8]) -> Self {
        self.aid = Some(hex::encode_upper(aid));
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Bounded, shareable event log. Clones share the same storage.
#[derive(Clone)]
pub struct AuditLog {
    events: Arc<RwLock<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Record an event, evicting the oldest ones beyond capacity
    pub fn log(&self, event: AuditEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.filtered(|_| true)
    }

    pub fn package_events(&self, package: &str) -> Vec<AuditEvent> {
        self.filtered(|e| e.package.as_deref() == Some(package))
    }

    pub fn failed_events(&self) -> Vec<AuditEvent> {
        self.filtered(|e| !e.success)
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn filtered(&self, keep: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
