//! Simulated secure element loaded from JSON
//!
//! A fixture lists installed packages with their signing certificates and
//! scripts the initialization of each rule source, including the rules it
//! loads into the cache.

use anyhow::{Context, Result};
use se_access_control::providers::{
    NamedTerminal, RuleKey, ScriptedSourceFactory, SourceScript, StaticAppRegistry,
    StaticRuleCache,
};
use se_access_control::{
    AccessControlEnforcer, AccessDecision, AceProvider, Certificate, SecurityProfile,
    SourceError, SourceKind, CERT_HASH_LEN,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    /// package -> hex-encoded DER certificates, leaf first
    #[serde(default)]
    pub packages: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub trust_anchor: Option<SourceFixture>,
    #[serde(default)]
    pub rule_file: Option<SourceFixture>,
}

#[derive(Debug, Deserialize)]
pub struct SourceFixture {
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub rules: Vec<RuleFixture>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Ok,
    ResourceUnavailable(String),
    ElementAbsent(String),
    Failed(String),
}

#[derive(Debug, Deserialize)]
pub struct RuleFixture {
    /// Hex AID; absent means any applet
    pub aid: Option<String>,
    /// Hex certificate hash; absent means any application
    pub certificate_hash: Option<String>,
    pub decision: AccessDecision,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fixture {:?}", path))
    }

    pub fn build_enforcer(
        &self,
        terminal: &str,
        profile: SecurityProfile,
    ) -> Result<AccessControlEnforcer> {
        let mut registry = StaticAppRegistry::new();
        for (package, certificates) in &self.packages {
            let chain = certificates
                .iter()
                .map(|c| parse_hex(c).map(Certificate::from_der))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid certificate for {}", package))?;
            registry.add_package(package.clone(), chain);
        }

        let cache = Arc::new(StaticRuleCache::new());
        let mut factory = ScriptedSourceFactory::new(Arc::clone(&cache));
        for (kind, source) in [
            (SourceKind::TrustAnchor, &self.trust_anchor),
            (SourceKind::RuleFile, &self.rule_file),
        ] {
            if let Some(source) = source {
                factory = factory.with_script(kind, source.script()?);
            }
        }

        let provider = AceProvider::new(Arc::new(registry), cache, Arc::new(factory));
        Ok(AccessControlEnforcer::with_profile(
            Arc::new(NamedTerminal::new(terminal)),
            provider,
            profile,
        ))
    }
}

impl SourceFixture {
    fn script(&self) -> Result<SourceScript> {
        let outcome = match &self.outcome {
            Outcome::Ok => Ok(()),
            Outcome::ResourceUnavailable(m) => Err(SourceError::ResourceUnavailable(m.clone())),
            Outcome::ElementAbsent(m) => Err(SourceError::ElementAbsent(m.clone())),
            Outcome::Failed(m) => Err(SourceError::Failed(m.clone())),
        };

        let rules = self
            .rules
            .iter()
            .map(|rule| -> Result<(RuleKey, AccessDecision)> {
                let aid = rule.aid.as_deref().map(parse_hex).transpose()?;
                let hash = rule
                    .certificate_hash
                    .as_deref()
                    .map(parse_hash)
                    .transpose()?;
                Ok((RuleKey::new(aid.as_deref(), hash), rule.decision.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SourceScript {
            outcome,
            rules,
            absent: false,
        })
    }
}

pub fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex value {:?}", value))
}

fn parse_hash(value: &str) -> Result<[u8; CERT_HASH_LEN]> {
    let bytes = parse_hex(value)?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Certificate hash must be {} bytes", CERT_HASH_LEN))
}
