/*!
 * Policy Tests
 * Merge precedence, baseline floors and keyfile round-trips
 */

use cloister::keyfile::KeyFile;
use cloister::policy::{
    BusLevel, BusScope, FilesystemRule, PolicyContext, DESKTOP_PORTAL_NAME, DOCUMENTS_PORTAL_NAME,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn metadata(text: &str) -> KeyFile {
    KeyFile::parse(text).unwrap()
}

#[test]
fn test_precedence_is_override_not_union() {
    // A later NONE beats an earlier SEE; levels are never maxed.
    let mut ctx = PolicyContext::new();
    ctx.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::See);

    let mut later = PolicyContext::new();
    later.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::None);
    ctx.merge(&later);

    assert_eq!(
        ctx.bus_level(BusScope::Session, "org.example.Svc"),
        BusLevel::None
    );
}

#[test]
fn test_merge_order_in_chain_decides_outcome() {
    // Applying B then C in sequence equals applying them in that order to
    // any base; what matters is position in the chain, not grouping.
    let mut b = PolicyContext::new();
    b.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::Talk);
    let mut c = PolicyContext::new();
    c.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::See);

    let mut sequential = PolicyContext::new();
    sequential.merge(&b);
    sequential.merge(&c);

    let mut grouped = b.clone();
    grouped.merge(&c);
    let mut via_group = PolicyContext::new();
    via_group.merge(&grouped);

    assert_eq!(sequential, via_group);
    assert_eq!(
        sequential.bus_level(BusScope::Session, "org.example.Svc"),
        BusLevel::See
    );
}

#[test]
fn test_baseline_talk_survives_silent_metadata() {
    // The baseline is a floor until something explicitly overrides it.
    let mut ctx = PolicyContext::new();
    ctx.seed_baseline_grants();

    ctx.load_from_metadata(&metadata(
        "[Context]\nshared=network;\n[Session Bus Policy]\norg.unrelated.Svc=see\n",
    ))
    .unwrap();
    ctx.merge(&PolicyContext::new());

    assert_eq!(
        ctx.bus_level(BusScope::Session, DESKTOP_PORTAL_NAME),
        BusLevel::Talk
    );
    assert_eq!(
        ctx.bus_level(BusScope::Session, DOCUMENTS_PORTAL_NAME),
        BusLevel::Talk
    );
}

#[test]
fn test_baseline_can_be_explicitly_revoked() {
    let mut ctx = PolicyContext::new();
    ctx.seed_baseline_grants();

    let revoke = format!("[Session Bus Policy]\n{}=none\n", DOCUMENTS_PORTAL_NAME);
    ctx.load_from_metadata(&metadata(&revoke)).unwrap();

    assert_eq!(
        ctx.bus_level(BusScope::Session, DOCUMENTS_PORTAL_NAME),
        BusLevel::None
    );
    // The other baseline is untouched.
    assert_eq!(
        ctx.bus_level(BusScope::Session, DESKTOP_PORTAL_NAME),
        BusLevel::Talk
    );
}

#[test]
fn test_stored_overrides_lose_to_cli_overrides() {
    // Pipeline order: metadata, stored overrides, CLI; last one wins.
    let mut ctx = PolicyContext::new();
    ctx.load_from_metadata(&metadata("[Session Bus Policy]\norg.example.Svc=see\n"))
        .unwrap();

    let stored =
        PolicyContext::from_metadata(&metadata("[Session Bus Policy]\norg.example.Svc=own\n"))
            .unwrap();
    ctx.merge(&stored);

    let mut cli = PolicyContext::new();
    cli.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::Talk);
    ctx.merge(&cli);

    assert_eq!(
        ctx.bus_level(BusScope::Session, "org.example.Svc"),
        BusLevel::Talk
    );
}

#[test]
fn test_parse_failure_fails_closed() {
    let mut ctx = PolicyContext::new();
    ctx.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::See);

    let before = ctx.clone();
    let result = ctx.load_from_metadata(&metadata(
        "[Session Bus Policy]\norg.example.Svc=talk\norg.broken.Svc=everything\n",
    ));

    assert!(result.is_err());
    // Nothing from the bad source was applied.
    assert_eq!(ctx, before);
}

#[test]
fn test_save_load_roundtrip() {
    let mut ctx = PolicyContext::new();
    ctx.seed_baseline_grants();
    ctx.add_filesystem(FilesystemRule::parse("host:ro").unwrap());
    ctx.add_filesystem(FilesystemRule::parse("/media/music").unwrap());
    ctx.set_env("G_MESSAGES_DEBUG", "all");
    ctx.unset_env("SESSION_MANAGER");

    let mut keyfile = KeyFile::new();
    ctx.save_to_keyfile(&mut keyfile);

    // Through text and back, not just through the KeyFile value.
    let reparsed = KeyFile::parse(&keyfile.to_string()).unwrap();
    assert_eq!(PolicyContext::from_metadata(&reparsed).unwrap(), ctx);
}

fn bus_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "org.example.alpha".to_string(),
        "org.example.beta".to_string(),
        "org.example.beta.helper".to_string(),
        "com.vendor.gamma".to_string(),
        "net.demo.delta".to_string(),
        "org.example.epsilon.*".to_string(),
    ])
}

fn bus_level() -> impl Strategy<Value = BusLevel> {
    prop_oneof![
        Just(BusLevel::None),
        Just(BusLevel::See),
        Just(BusLevel::Talk),
        Just(BusLevel::Own),
    ]
}

proptest! {
    #[test]
    fn prop_bus_table_roundtrips(entries in proptest::collection::btree_map(bus_name(), bus_level(), 0..8)) {
        let mut ctx = PolicyContext::new();
        for (name, level) in &entries {
            ctx.set_bus_policy(BusScope::Session, name, *level);
        }

        let mut keyfile = KeyFile::new();
        ctx.save_to_keyfile(&mut keyfile);
        let reloaded = PolicyContext::from_metadata(&KeyFile::parse(&keyfile.to_string()).unwrap()).unwrap();
        prop_assert_eq!(ctx, reloaded);
    }

    #[test]
    fn prop_merge_last_writer_wins(name in bus_name(), first in bus_level(), second in bus_level()) {
        let mut ctx = PolicyContext::new();
        ctx.set_bus_policy(BusScope::Session, &name, first);

        let mut later = PolicyContext::new();
        later.set_bus_policy(BusScope::Session, &name, second);
        ctx.merge(&later);

        prop_assert_eq!(ctx.bus_level(BusScope::Session, &name), second);
    }
}
