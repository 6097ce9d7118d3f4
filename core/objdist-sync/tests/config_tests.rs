use objdist_sync::{SyncConfig, SyncError};
use objdist_types::{Delimiter, Keypath};
use serde_json::json;

#[test]
fn defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.prefix, "root");
    assert_eq!(config.delimiter.as_str(), "/");
    assert!(config.validate().is_ok());
}

#[test]
fn channel_names_follow_prefix_and_delimiter() {
    let config = SyncConfig::default();
    assert_eq!(config.channel_name(&Keypath::root()), "/root");
    assert_eq!(config.channel_name(&Keypath::new(["foo"])), "/root/foo");
    assert_eq!(config.channel_name(&Keypath::new(["man", "name"])), "/root/man/name");
}

#[test]
fn custom_delimiter_in_channel_names() {
    let config = SyncConfig::new("state", Delimiter::new(".").unwrap());
    assert_eq!(config.channel_name(&Keypath::root()), ".state");
    assert_eq!(config.channel_name(&Keypath::new(["man", "name"])), ".state.man.name");
}

#[test]
fn prefix_with_leading_delimiter_is_not_doubled() {
    let config = SyncConfig::new("/root", Delimiter::default());
    assert!(config.validate().is_ok());
    assert_eq!(config.root_channel(), "/root");
    assert_eq!(config.channel_name(&Keypath::new(["a"])), "/root/a");
}

#[test]
fn keypath_for_channel_inverts_channel_name() {
    let config = SyncConfig::default();
    for keypath in [
        Keypath::root(),
        Keypath::new(["foo"]),
        Keypath::new(["man", "name"]),
    ] {
        let name = config.channel_name(&keypath);
        assert_eq!(config.keypath_for_channel(&name), Some(keypath));
    }
}

#[test]
fn keypath_for_channel_rejects_foreign_names() {
    let config = SyncConfig::default();
    assert_eq!(config.keypath_for_channel("/other/man"), None);
    assert_eq!(config.keypath_for_channel("/rootx"), None);
    assert_eq!(config.keypath_for_channel("root/man"), None);
}

#[test]
fn validate_rejects_bad_prefixes() {
    let empty = SyncConfig::new("", Delimiter::default());
    assert!(matches!(empty.validate(), Err(SyncError::Config(_))));

    let only_delimiter = SyncConfig::new("/", Delimiter::default());
    assert!(matches!(only_delimiter.validate(), Err(SyncError::Config(_))));

    let nested = SyncConfig::new("a/b", Delimiter::default());
    assert!(matches!(nested.validate(), Err(SyncError::Config(_))));
}

#[test]
fn deserializes_with_defaults() {
    let config: SyncConfig = serde_json::from_value(json!({"prefix": "state"})).unwrap();
    assert_eq!(config.prefix, "state");
    assert_eq!(config.delimiter, Delimiter::default());

    let config: SyncConfig = serde_json::from_value(json!({})).unwrap();
    assert_eq!(config, SyncConfig::default());
}

#[test]
fn empty_delimiter_fails_to_deserialize() {
    let result: Result<SyncConfig, _> = serde_json::from_value(json!({"delimiter": ""}));
    assert!(result.is_err());
}
