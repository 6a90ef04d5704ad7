#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use qpmetrics_proxy::config;

const MINIMAL: &str = r#"
version: 1
identity:
  namespace: "ns"
  service: "svc"
  configuration: "cfg"
  revision: "rev"
  pod: "pod"
"#;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
proxy:
  listen: "0.0.0.0:8012"
  max_body_bytez: 123 # typo should fail
identity:
  namespace: "ns"
  service: "svc"
  configuration: "cfg"
  revision: "rev"
  pod: "pod"
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str(MINIMAL).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.proxy.listen, "0.0.0.0:8012");
    assert!(!cfg.metrics.app_metrics);
    assert_eq!(cfg.identity.pod, "pod");
    assert!(cfg.identity.annotations.is_empty());
}

#[test]
fn full_config_maps_to_identity() {
    let s = r#"
version: 1
proxy:
  listen: "127.0.0.1:9000"
  max_body_bytes: 1024
identity:
  namespace: "ns"
  service: "svc"
  configuration: "cfg"
  revision: "rev"
  pod: "pod"
  annotations: { testann: testval }
  labels: { testlab: testval }
metrics:
  app_metrics: true
"#;
    let cfg = config::load_from_str(s).expect("must parse");
    assert!(cfg.metrics.app_metrics);
    assert_eq!(cfg.proxy.listen_addr().unwrap().port(), 9000);

    let id = cfg.identity.to_identity();
    assert_eq!(id.revision, "rev");
    assert_eq!(id.annotations.get("testann").map(String::as_str), Some("testval"));
    assert_eq!(id.labels.get("testlab").map(String::as_str), Some("testval"));
}

#[test]
fn wrong_version_is_rejected() {
    let s = MINIMAL.replace("version: 1", "version: 2");
    let err = config::load_from_str(&s).expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn empty_identity_field_is_rejected() {
    let s = MINIMAL.replace(r#"pod: "pod""#, r#"pod: """#);
    let err = config::load_from_str(&s).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
    assert!(err.to_string().contains("identity.pod"));
}

#[test]
fn bad_listen_is_rejected() {
    let s = format!("{MINIMAL}proxy:\n  listen: \"not-an-addr\"\n");
    let err = config::load_from_str(&s).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn zero_body_limit_is_rejected() {
    let s = format!("{MINIMAL}proxy:\n  max_body_bytes: 0\n");
    let err = config::load_from_str(&s).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}
