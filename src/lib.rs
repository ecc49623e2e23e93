//! Secure element Access Control Enforcer
//!
//! Decides whether an application may open a logical channel to an applet on
//! a secure element (UICC or embedded SE), which commands it may send on that
//! channel, and whether it may receive the applet's NFC events. Rules come
//! from an access rule applet on the element or, failing that, from an access
//! rule file on the UICC; when neither is usable the enforcer falls back to
//! full access (non-UICC elements only) or denies everything.

pub mod decision;
pub mod enforcer;
pub mod error;
pub mod identity;
pub mod interfaces;
pub mod profile;
pub mod providers;

// Re-export main types
pub use decision::{Access, AccessDecision, ApduFilter};
pub use enforcer::{AccessControlEnforcer, AuditEvent, AuditLog, AuditOperation, Posture};
pub use error::{AceError, AceErrorCode, AceResult, SourceError};
pub use identity::{
    certificate_hash, AppIdentity, Certificate, CertificateHash, CertificateIdentity,
    IdentityResolver, CERT_HASH_LEN,
};
pub use interfaces::{
    AceProvider, AppRegistry, RuleCache, RuleSource, RuleSourceFactory, ServiceCallback,
    SourceKind, Terminal, DEFAULT_ACCESS_CONTROL_AID,
};
pub use profile::SecurityProfile;

/// Crate version information
pub const ACE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ACE_NAME: &str = "Access Control Enforcer";
