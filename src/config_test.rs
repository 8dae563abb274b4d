use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn from_lookup_uses_defaults() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[("HOME", "/home/alice")])).unwrap();
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.storage_path, PathBuf::from("/home/alice/.movierec/session.json"));
    assert_eq!(cfg.timeouts, HttpTimeouts::default());
}

#[test]
fn from_lookup_without_home_falls_back_to_cwd() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg.storage_path, PathBuf::from("./.movierec/session.json"));
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("MOVIEREC_BASE_URL", "https://movierec.example/"),
        ("MOVIEREC_STORAGE_PATH", "/tmp/movierec.json"),
        ("MOVIEREC_REQUEST_TIMEOUT_SECS", "42"),
        ("MOVIEREC_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.base_url, "https://movierec.example");
    assert_eq!(cfg.storage_path, PathBuf::from("/tmp/movierec.json"));
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 42, connect_secs: 7 });
    assert_eq!(cfg.timeouts.request(), Duration::from_secs(42));
}

#[test]
fn from_lookup_ignores_unparsable_timeouts() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("MOVIEREC_REQUEST_TIMEOUT_SECS", "soon"),
        ("MOVIEREC_CONNECT_TIMEOUT_SECS", "0"),
    ]))
    .unwrap();
    assert_eq!(cfg.timeouts, HttpTimeouts::default());
}

#[test]
fn from_lookup_rejects_malformed_base_url() {
    let err = ClientConfig::from_lookup(lookup_from(&[("MOVIEREC_BASE_URL", "not a url")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
}

#[test]
fn parse_base_url_rejects_non_http_scheme() {
    let err = parse_base_url("ftp://movierec.example").unwrap_err();
    assert!(err.to_string().contains("unsupported scheme ftp"));
}
