use super::*;
use std::path::PathBuf;

const HEX_ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

#[test]
fn test_typical_pod_log_parses() {
    let path = PathBuf::from(format!("/var/log/containers/web-7f8b9c-x2x9z_default_app-{HEX_ID}.log"));
    let parsed = parse(&path).expect("should match grammar");

    assert_eq!(parsed.pod, "web-7f8b9c-x2x9z");
    assert_eq!(parsed.namespace, "default");
    assert_eq!(parsed.container, "app");
    assert_eq!(parsed.id, HEX_ID);
}

#[test]
fn test_container_name_with_dashes() {
    let path = PathBuf::from(format!("api--web-abc12-def34_prod_side-car-{HEX_ID}.log"));
    let parsed = parse(&path).expect("should match grammar");

    assert_eq!(parsed.pod, "api--web-abc12-def34");
    assert_eq!(parsed.namespace, "prod");
    assert_eq!(parsed.container, "side-car");
}

#[test]
fn test_non_matching_names_are_ignored() {
    for name in [
        "syslog",
        "app.log",
        "web_default_app.log",                   // no container id
        &format!("web_default_app-{}.log", "ff"), // id too short
        &format!("web_default_app-{HEX_ID}.txt"), // wrong extension
    ] {
        assert!(parse(&PathBuf::from(name)).is_none(), "{name} should not match");
    }
}

#[test]
fn test_uppercase_id_rejected() {
    let id = HEX_ID.to_uppercase();
    assert!(parse(&PathBuf::from(format!("web_default_app-{id}.log"))).is_none());
}
