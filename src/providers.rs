// In-memory implementations of the collaborator traits
// Used by the CLI front end and by tests to simulate a secure element.

use crate::decision::AccessDecision;
use crate::error::{AceError, AceResult, SourceError};
use crate::identity::{Certificate, CertificateHash, CertificateIdentity};
use crate::interfaces::*;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Terminal identified only by its name
#[derive(Debug, Clone)]
pub struct NamedTerminal {
    name: String,
}

impl NamedTerminal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Terminal for NamedTerminal {
    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Fixed package -> certificate chain table
#[derive(Debug, Default, Clone)]
pub struct StaticAppRegistry {
    packages: HashMap<String, Vec<Certificate>>,
}

impl StaticAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&mut self, package: impl Into<String>, chain: Vec<Certificate>) {
        self.packages.insert(package.into(), chain);
    }
}

impl AppRegistry for StaticAppRegistry {
    fn signing_certificates(&self, package: &str) -> AceResult<Vec<Certificate>> {
        self.packages
            .get(package)
            .cloned()
            .ok_or_else(|| AceError::PackageNotFound(package.to_string()))
    }
}

/// Key of a cached rule. `None` acts as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub aid: Option<Vec<u8>>,
    pub hash: Option<CertificateHash>,
}

impl RuleKey {
    pub fn new(aid: Option<&[u8]>, hash: Option<CertificateHash>) -> Self {
        Self {
            aid: aid.map(<[u8]>::to_vec),
            hash,
        }
    }
}

/// Rule cache backed by a hash map.
///
/// Lookup order: specific AID before any AID; within each, the certificate
/// chain from leaf to root before the any-application rule.
#[derive(Debug, Default)]
pub struct StaticRuleCache {
    rules: RwLock<HashMap<RuleKey, AccessDecision>>,
}

impl StaticRuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: RuleKey, decision: AccessDecision) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, decision);
    }

    pub fn clear(&self) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleCache for StaticRuleCache {
    fn find_rule(
        &self,
        aid: &[u8],
        identities: &[CertificateIdentity],
    ) -> AceResult<Option<AccessDecision>> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);

        for target in [Some(aid), None] {
            for identity in identities {
                if let Some(rule) = rules.get(&RuleKey::new(target, Some(identity.hash))) {
                    return Ok(Some(rule.clone()));
                }
            }
            if let Some(rule) = rules.get(&RuleKey::new(target, None)) {
                return Ok(Some(rule.clone()));
            }
        }

        Ok(None)
    }

    fn dump(&self, sink: &mut dyn io::Write, prefix: &str) -> io::Result<()> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "{}Access rule cache ({} rules):", prefix, rules.len())?;

        let mut entries: Vec<_> = rules.iter().collect();
        entries.sort_by_key(|(key, _)| (key.aid.clone(), key.hash));
        for (key, decision) in entries {
            let aid = key
                .aid
                .as_deref()
                .map(hex::encode_upper)
                .unwrap_or_else(|| "*".to_string());
            let hash = key
                .hash
                .map(hex::encode_upper)
                .unwrap_or_else(|| "*".to_string());
            writeln!(sink, "{}  aid={} hash={}", prefix, aid, hash)?;
            writeln!(sink, "{}    {}", prefix, decision)?;
        }
        Ok(())
    }
}

/// Pre-configured initialization behavior of one rule source.
///
/// Rules are only written to the cache by an initialization with
/// `load_at_startup` set. Without it a successful source leaves the cache
/// empty, so every lookup misses until a later initialization loads them.
#[derive(Debug, Clone)]
pub struct SourceScript {
    pub outcome: Result<(), SourceError>,
    /// Rules loaded into the cache when initialization succeeds
    pub rules: Vec<(RuleKey, AccessDecision)>,
    /// Report the source as missing from the element after a failure,
    /// whatever the failure variant
    pub absent: bool,
}

impl SourceScript {
    pub fn succeed(rules: Vec<(RuleKey, AccessDecision)>) -> Self {
        Self {
            outcome: Ok(()),
            rules,
            absent: false,
        }
    }

    pub fn fail(error: SourceError) -> Self {
        Self {
            outcome: Err(error),
            rules: Vec::new(),
            absent: false,
        }
    }

    /// Builder: Flag the failing source as not present on the element
    pub fn reported_absent(mut self) -> Self {
        self.absent = true;
        self
    }
}

/// Rule source replaying a `SourceScript`
pub struct ScriptedRuleSource {
    kind: SourceKind,
    script: SourceScript,
    cache: Arc<StaticRuleCache>,
    attempts: Arc<AtomicUsize>,
}

impl RuleSource for ScriptedRuleSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn initialize(
        &mut self,
        load_at_startup: bool,
        callback: &dyn ServiceCallback,
    ) -> Result<(), SourceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !callback.is_alive() {
            return Err(SourceError::Failed("service callback is gone".to_string()));
        }

        self.script.outcome.clone()?;

        self.cache.clear();
        if load_at_startup {
            for (key, decision) in &self.script.rules {
                self.cache.put(key.clone(), decision.clone());
            }
        }
        log::debug!("{} loaded {} rules", self.kind, self.cache.len());
        Ok(())
    }

    fn is_no_rule_source_present(&self) -> bool {
        match &self.script.outcome {
            Ok(()) => false,
            Err(SourceError::ElementAbsent(_)) => true,
            Err(_) => self.script.absent,
        }
    }
}

/// Factory handing out scripted sources; kinds without a script behave as
/// absent from the element.
pub struct ScriptedSourceFactory {
    scripts: HashMap<SourceKind, SourceScript>,
    cache: Arc<StaticRuleCache>,
    created: HashMap<SourceKind, Arc<AtomicUsize>>,
    attempts: HashMap<SourceKind, Arc<AtomicUsize>>,
}

impl ScriptedSourceFactory {
    pub fn new(cache: Arc<StaticRuleCache>) -> Self {
        let counters = || {
            [SourceKind::TrustAnchor, SourceKind::RuleFile]
                .into_iter()
                .map(|kind| (kind, Arc::new(AtomicUsize::new(0))))
                .collect::<HashMap<_, _>>()
        };
        Self {
            scripts: HashMap::new(),
            cache,
            created: counters(),
            attempts: counters(),
        }
    }

    pub fn with_script(mut self, kind: SourceKind, script: SourceScript) -> Self {
        self.scripts.insert(kind, script);
        self
    }

    /// Number of sources of `kind` constructed so far
    pub fn created(&self, kind: SourceKind) -> usize {
        self.created[&kind].load(Ordering::SeqCst)
    }

    /// Number of `initialize` calls made on sources of `kind`
    pub fn attempts(&self, kind: SourceKind) -> usize {
        self.attempts[&kind].load(Ordering::SeqCst)
    }
}

impl RuleSourceFactory for ScriptedSourceFactory {
    fn create(&self, kind: SourceKind) -> Box<dyn RuleSource> {
        self.created[&kind].fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.get(&kind).cloned().unwrap_or_else(|| {
            SourceScript::fail(SourceError::ElementAbsent(format!("no {} on element", kind)))
        });

        Box::new(ScriptedRuleSource {
            kind,
            script,
            cache: Arc::clone(&self.cache),
            attempts: Arc::clone(&self.attempts[&kind]),
        })
    }
}

/// Callback that is always alive
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl ServiceCallback for NoopCallback {}
