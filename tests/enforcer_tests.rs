use se_access_control::enforcer::DEFAULT_DENY_REASON;
use se_access_control::providers::*;
use se_access_control::*;
use std::io;
use std::sync::Arc;
use std::thread;

const AID: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10];
const WALLET: &str = "com.example.wallet";
const TRANSIT: &str = "com.example.transit";
const UNSIGNED: &str = "com.example.unsigned";

/// Minimal DER SEQUENCE around `content`
fn der(content: &[u8]) -> Certificate {
    let mut encoding = vec![0x30, content.len() as u8];
    encoding.extend_from_slice(content);
    Certificate::from_der(encoding)
}

fn wallet_cert() -> Certificate {
    der(b"wallet signing certificate")
}

fn registry() -> StaticAppRegistry {
    let mut registry = StaticAppRegistry::new();
    registry.add_package(WALLET, vec![wallet_cert()]);
    registry.add_package(
        TRANSIT,
        vec![der(b"transit signing certificate")],
    );
    registry.add_package(UNSIGNED, Vec::new());
    registry
}

fn wallet_rules() -> Vec<(RuleKey, AccessDecision)> {
    let wallet_hash = certificate_hash(&wallet_cert()).unwrap();
    vec![
        (
            RuleKey::new(Some(AID), Some(wallet_hash)),
            AccessDecision::allow_all("wallet").with_nfc_event_access(Access::Allowed),
        ),
        (
            RuleKey::new(Some(AID), None),
            AccessDecision::deny_all("only the wallet may use this applet"),
        ),
    ]
}

struct Setup {
    enforcer: AccessControlEnforcer,
    factory: Arc<ScriptedSourceFactory>,
}

fn setup(terminal: &str, scripts: Vec<(SourceKind, SourceScript)>) -> Setup {
    setup_with_profile(terminal, scripts, SecurityProfile::default())
}

fn setup_with_profile(
    terminal: &str,
    scripts: Vec<(SourceKind, SourceScript)>,
    profile: SecurityProfile,
) -> Setup {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = Arc::new(StaticRuleCache::new());
    let factory = Arc::new(
        scripts
            .into_iter()
            .fold(ScriptedSourceFactory::new(Arc::clone(&cache)), |f, (kind, script)| {
                f.with_script(kind, script)
            }),
    );
    let provider = AceProvider::new(Arc::new(registry()), cache, factory.clone());
    let enforcer =
        AccessControlEnforcer::with_profile(Arc::new(NamedTerminal::new(terminal)), provider, profile);
    Setup { enforcer, factory }
}

#[test]
fn test_fail_closed_without_rule_source() {
    // UICC, both sources broken or absent, no full access
    let setup = setup(
        "SIM1",
        vec![(
            SourceKind::RuleFile,
            SourceScript::fail(SourceError::Failed("EF_ACRules unreadable".to_string())),
        )],
    );
    assert!(!setup.enforcer.initialize(true, &NoopCallback).unwrap());

    let posture = setup.enforcer.posture().unwrap();
    assert!(!posture.use_trust_anchor && !posture.use_rule_file && !posture.full_access);

    for package in [WALLET, TRANSIT, UNSIGNED, ""] {
        for aid in [AID, &[0x01][..], &[][..]] {
            match setup.enforcer.resolve_channel_access(aid, package) {
                Err(AceError::AccessDenied(reason)) => {
                    assert!(reason.contains("EF_ACRules unreadable"))
                }
                other => panic!("expected denial, got {:?}", other),
            }
        }
    }
}

#[test]
fn test_full_access_substitutes_initial_decision() {
    let setup = setup(
        "eSE1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(Vec::new()))],
    );
    assert!(setup.enforcer.initialize(true, &NoopCallback).unwrap());
    assert!(!setup.enforcer.posture().unwrap().full_access);

    // Without full access a missing rule is a denial
    assert!(matches!(
        setup.enforcer.resolve_channel_access(AID, WALLET),
        Err(AceError::AccessDenied(_))
    ));

    let open = setup_with_profile("eSE2", Vec::new(), SecurityProfile::default());
    assert!(open.enforcer.initialize(true, &NoopCallback).unwrap());
    let posture = open.enforcer.posture().unwrap();
    assert!(posture.full_access);

    let decision = open.enforcer.resolve_channel_access(AID, WALLET).unwrap();
    let mut expected = posture.initial_decision.clone();
    expected.owning_package = Some(WALLET.to_string());
    assert_eq!(decision, expected);
}

#[test]
fn test_rule_file_overrides_profile_full_access() {
    // The trust anchor is absent, so the rule file is consulted; once it
    // loads, the profile's full access no longer applies.
    let mut profile = SecurityProfile::default();
    profile.full_access = true;
    let setup = setup_with_profile(
        "SIM1",
        vec![(SourceKind::RuleFile, SourceScript::succeed(wallet_rules()))],
        profile,
    );
    assert!(setup.enforcer.initialize(true, &NoopCallback).unwrap());
    let posture = setup.enforcer.posture().unwrap();
    assert!(posture.use_rule_file);
    assert!(!posture.full_access);

    assert!(matches!(
        setup.enforcer.resolve_channel_access(AID, TRANSIT),
        Err(AceError::AccessDenied(_))
    ));
}

#[test]
fn test_rule_driven_decisions() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    assert!(setup.enforcer.initialize(true, &NoopCallback).unwrap());

    let decision = setup.enforcer.resolve_channel_access(AID, WALLET).unwrap();
    assert_eq!(decision.apdu_access, Access::Allowed);
    assert_eq!(decision.owning_package.as_deref(), Some(WALLET));
    assert!(setup
        .enforcer
        .check_command(Some(&decision), &[0x00, 0xA4, 0x04, 0x00])
        .is_ok());

    match setup.enforcer.resolve_channel_access(AID, TRANSIT) {
        Err(AceError::AccessDenied(reason)) => assert_eq!(reason, "no APDU access allowed!"),
        other => panic!("expected denial, got {:?}", other),
    }
    assert!(matches!(
        setup.enforcer.resolve_channel_access(AID, UNSIGNED),
        Err(AceError::AccessDenied(_))
    ));
}

#[test]
fn test_filter_header_matching() {
    let filter = ApduFilter::new(vec![0x00, 0xA4], vec![0xFF, 0xFF]);
    assert!(filter.matches(&[0x00, 0xA4, 0x04, 0x00]));
    assert!(!filter.matches(&[0x00, 0xA5, 0x04, 0x00]));

    let masked = ApduFilter::new(vec![0x00, 0x10], vec![0xFF, 0x00]);
    assert!(masked.matches(&[0x00, 0x20, 0x00, 0x00]));
}

#[test]
fn test_returned_decisions_are_independent() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    setup.enforcer.initialize(true, &NoopCallback).unwrap();

    let mut first = setup.enforcer.resolve_channel_access(AID, WALLET).unwrap();
    let second = setup.enforcer.resolve_channel_access(AID, WALLET).unwrap();
    assert_eq!(first, second);

    first.apdu_access = Access::Denied;
    first.reason = "tampered".to_string();
    first.apdu_filters.push(ApduFilter::new(vec![0x00], vec![0xFF]));

    let third = setup.enforcer.resolve_channel_access(AID, WALLET).unwrap();
    assert_eq!(second, third);
    assert_eq!(third.apdu_access, Access::Allowed);
}

#[test]
fn test_nfc_batch_is_complete() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    setup.enforcer.initialize(true, &NoopCallback).unwrap();

    let packages = [TRANSIT, WALLET, "", UNSIGNED, "com.example.missing", WALLET];
    let flags = setup.enforcer.is_event_allowed(AID, &packages);
    assert_eq!(flags, vec![false, true, false, false, false, true]);

    let empty: [&str; 0] = [];
    assert!(setup.enforcer.is_event_allowed(AID, &empty).is_empty());
}

#[test]
fn test_nfc_without_rule_source_follows_full_access() {
    let open = setup("eSE1", Vec::new());
    open.enforcer.initialize(true, &NoopCallback).unwrap();
    assert_eq!(
        open.enforcer.is_event_allowed(AID, &[WALLET, "com.example.missing"]),
        vec![true, true]
    );

    let closed = setup("SIM1", Vec::new());
    closed.enforcer.initialize(true, &NoopCallback).unwrap();
    assert_eq!(
        closed.enforcer.is_event_allowed(AID, &[WALLET, TRANSIT]),
        vec![false, false]
    );
}

#[test]
fn test_command_without_filter_denied() {
    let setup = setup("eSE1", Vec::new());
    let mut decision = AccessDecision::allow_all("");
    decision.apdu_access = Access::Denied;

    for command in [&[0x00, 0xA4, 0x04, 0x00][..], &[0x80, 0xCA][..], &[][..]] {
        assert_eq!(
            setup.enforcer.check_command(Some(&decision), command),
            Err(AceError::AccessDenied(DEFAULT_DENY_REASON.to_string()))
        );
    }
    assert!(matches!(
        setup.enforcer.check_command(None, &[0x00]),
        Err(AceError::Internal(_))
    ));
}

#[test]
fn test_empty_filter_list_denies_everything() {
    let setup = setup("eSE1", Vec::new());
    let decision = AccessDecision::allow_all("").with_apdu_filters(Vec::new());

    for command in [&[0x00, 0xA4, 0x04, 0x00][..], &[0xFF; 8][..]] {
        assert!(matches!(
            setup.enforcer.check_command(Some(&decision), command),
            Err(AceError::AccessDenied(_))
        ));
    }
    assert_eq!(setup.enforcer.audit_log().failed_events().len(), 2);
}

#[test]
fn test_uicc_tolerates_missing_trust_anchor_resource() {
    let setup = setup(
        "SIM1",
        vec![
            (
                SourceKind::TrustAnchor,
                SourceScript::fail(SourceError::ResourceUnavailable(
                    "logical channels not supported".to_string(),
                )),
            ),
            (SourceKind::RuleFile, SourceScript::succeed(wallet_rules())),
        ],
    );

    assert!(setup.enforcer.initialize(true, &NoopCallback).unwrap());
    let posture = setup.enforcer.posture().unwrap();
    assert!(!posture.use_trust_anchor);
    assert!(posture.use_rule_file);
    assert!(posture.rules_loaded);
    assert_eq!(setup.factory.attempts(SourceKind::RuleFile), 1);

    assert!(setup.enforcer.resolve_channel_access(AID, WALLET).is_ok());
}

#[test]
fn test_non_uicc_propagates_missing_trust_anchor_resource() {
    let setup = setup(
        "eSE1",
        vec![(
            SourceKind::TrustAnchor,
            SourceScript::fail(SourceError::ResourceUnavailable("no logical channel".to_string())),
        )],
    );

    assert_eq!(
        setup.enforcer.initialize(true, &NoopCallback),
        Err(AceError::ResourceUnavailable("no logical channel".to_string()))
    );
    assert!(!setup.enforcer.is_initialized());
    assert!(matches!(
        setup.enforcer.resolve_channel_access(AID, WALLET),
        Err(AceError::AccessDenied(_))
    ));
    assert_eq!(setup.enforcer.is_event_allowed(AID, &[WALLET]), vec![false]);
}

#[test]
fn test_trust_anchor_success_disables_fallbacks() {
    let setup = setup(
        "SIM1",
        vec![
            (SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules())),
            (SourceKind::RuleFile, SourceScript::succeed(Vec::new())),
        ],
    );

    assert!(setup.enforcer.initialize(true, &NoopCallback).unwrap());
    let posture = setup.enforcer.posture().unwrap();
    assert!(posture.use_trust_anchor);
    assert!(!posture.use_rule_file);
    assert!(!posture.full_access);
    assert_eq!(setup.factory.created(SourceKind::RuleFile), 0);
}

#[test]
fn test_reset_and_reinitialize() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    setup.enforcer.initialize(true, &NoopCallback).unwrap();
    setup.enforcer.reset().unwrap();
    setup.enforcer.initialize(true, &NoopCallback).unwrap();

    assert_eq!(setup.factory.created(SourceKind::TrustAnchor), 2);
    assert!(setup.enforcer.resolve_channel_access(AID, WALLET).is_ok());

    // A new profile takes effect on the next initialization
    setup.enforcer.set_profile(SecurityProfile::permissive()).unwrap();
    setup.enforcer.initialize(true, &NoopCallback).unwrap();
    let posture = setup.enforcer.posture().unwrap();
    assert!(!posture.use_trust_anchor);
    assert!(posture.full_access);
}

struct FailingCache(AceError);

impl RuleCache for FailingCache {
    fn find_rule(
        &self,
        _aid: &[u8],
        _identities: &[CertificateIdentity],
    ) -> AceResult<Option<AccessDecision>> {
        Err(self.0.clone())
    }

    fn dump(&self, sink: &mut dyn io::Write, prefix: &str) -> io::Result<()> {
        writeln!(sink, "{}failing cache", prefix)
    }
}

#[test]
fn test_cache_failures_are_classified() {
    let cases = [
        (
            AceError::ResourceUnavailable("channel lost".to_string()),
            AceError::ResourceUnavailable("channel lost".to_string()),
        ),
        (
            AceError::RuleEngineFailure("corrupt rule".to_string()),
            AceError::AccessDenied("access denied: corrupt rule".to_string()),
        ),
    ];

    for (failure, expected) in cases {
        let cache = Arc::new(StaticRuleCache::new());
        let factory = ScriptedSourceFactory::new(Arc::clone(&cache))
            .with_script(SourceKind::TrustAnchor, SourceScript::succeed(Vec::new()));
        let provider = AceProvider::new(Arc::new(registry()), cache, Arc::new(factory))
            .with_rule_cache(Arc::new(FailingCache(failure)));
        let enforcer =
            AccessControlEnforcer::new(Arc::new(NamedTerminal::new("SIM1")), provider);
        enforcer.initialize(true, &NoopCallback).unwrap();

        assert_eq!(enforcer.resolve_channel_access(AID, WALLET), Err(expected));
        assert_eq!(enforcer.is_event_allowed(AID, &[WALLET, TRANSIT]), vec![false, false]);
    }
}

#[test]
fn test_concurrent_requests_share_one_enforcer() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    let audit = AuditLog::new();
    let enforcer = Arc::new(setup.enforcer.with_audit_log(audit.clone()));
    enforcer.initialize(true, &NoopCallback).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let enforcer = Arc::clone(&enforcer);
            thread::spawn(move || {
                if i % 4 == 0 {
                    enforcer.initialize(true, &NoopCallback).unwrap();
                }
                let decision = enforcer.resolve_channel_access(AID, WALLET).unwrap();
                enforcer
                    .check_command(Some(&decision), &[0x00, 0xB0, 0x00, 0x00])
                    .unwrap();
                enforcer.is_event_allowed(AID, &[WALLET, TRANSIT])
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![true, false]);
    }
    assert_eq!(audit.package_events(WALLET).len(), 16);
}

#[test]
fn test_dump_does_not_fail() {
    let setup = setup(
        "SIM1",
        vec![(SourceKind::TrustAnchor, SourceScript::succeed(wallet_rules()))],
    );
    setup.enforcer.initialize(true, &NoopCallback).unwrap();

    let mut out = Vec::new();
    setup.enforcer.dump(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("use_trust_anchor: true"));
    assert!(text.contains("Access rule cache (2 rules)"));
}
