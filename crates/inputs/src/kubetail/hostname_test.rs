use super::*;

fn meta(
    name: &str,
    annotations: &[(&str, &str)],
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        },
        ..Default::default()
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Pod-name fallback (rule 5)
// =============================================================================

#[test]
fn test_plain_mode_uses_controller_prefix_and_pod_name() {
    let derived = derive_from_pod_name("web-7f8b9c-x2x9z", "default", false);
    assert_eq!(derived.hostname, "web.default");
    assert_eq!(derived.tag, "web-7f8b9c-x2x9z");
}

#[test]
fn test_app_platform_mode_default_dyno() {
    let derived = derive_from_pod_name("shop-7f8b9c-x2x9z", "space", true);
    assert_eq!(derived.hostname, "shop-space");
    assert_eq!(derived.tag, "web.7f8b9c-x2x9z");
}

#[test]
fn test_app_platform_mode_explicit_dyno() {
    let derived = derive_from_pod_name("shop--worker-7f8b9c-x2x9z", "space", true);
    assert_eq!(derived.hostname, "shop-space");
    assert_eq!(derived.tag, "worker.7f8b9c-x2x9z");
}

#[test]
fn test_app_platform_tag_keeps_last_two_parts() {
    assert_eq!(app_platform_tag("shop-abc12-def34"), "web.abc12-def34");
    assert_eq!(app_platform_tag("shop--worker-abc12-def34"), "worker.abc12-def34");
}

// =============================================================================
// Annotations (rules 1-2)
// =============================================================================

#[test]
fn test_both_annotations_win_verbatim() {
    let meta = meta(
        "web-abc-def",
        &[(HOSTNAME_ANNOTATION, "shop.example.com"), (TAG_ANNOTATION, "api")],
    );
    let derived = from_annotations(&meta, false).expect("annotated");
    assert_eq!(derived.hostname, "shop.example.com");
    assert_eq!(derived.tag, "api");
}

#[test]
fn test_hostname_annotation_alone_plain_mode() {
    let meta = meta("web-abc-def", &[(HOSTNAME_ANNOTATION, "shop.example.com")]);
    let derived = from_annotations(&meta, false).expect("annotated");
    assert_eq!(derived.hostname, "shop.example.com");
    assert_eq!(derived.tag, "web-abc-def");
}

#[test]
fn test_hostname_annotation_alone_app_platform_mode() {
    let meta = meta("shop--worker-abc-def", &[(HOSTNAME_ANNOTATION, "shop.example.com")]);
    let derived = from_annotations(&meta, true).expect("annotated");
    assert_eq!(derived.hostname, "shop.example.com");
    assert_eq!(derived.tag, "worker.abc-def");
}

#[test]
fn test_no_hostname_annotation_defers_to_controller_walk() {
    let meta1 = meta("web-abc-def", &[(TAG_ANNOTATION, "ignored-alone")]);
    assert!(from_annotations(&meta1, false).is_none());

    let meta2 = meta("web-abc-def", &[]);
    assert!(from_annotations(&meta2, false).is_none());
}

// =============================================================================
// Controller-derived names (rules 3-4)
// =============================================================================

#[test]
fn test_controller_plain_mode() {
    let derived = from_controller("web", &labels(&[]), "web-7f8b9c-x2x9z", "default", false);
    assert_eq!(derived.hostname, "web.default");
    assert_eq!(derived.tag, "web-7f8b9c-x2x9z");
}

#[test]
fn test_controller_app_platform_without_labels() {
    let derived = from_controller("shop", &labels(&[]), "shop-7f8b9c-x2x9z", "space", true);
    assert_eq!(derived.hostname, "shop-space");
    assert_eq!(derived.tag, "web.7f8b9c-x2x9z");
}

#[test]
fn test_controller_labels_override_pod_name_parse() {
    let derived = from_controller(
        "shop",
        &labels(&[(APP_LABEL, "storefront"), (DYNO_TYPE_LABEL, "worker")]),
        "shop-7f8b9c-x2x9z",
        "space",
        true,
    );
    assert_eq!(derived.hostname, "storefront-space");
    assert_eq!(derived.tag, "worker.7f8b9c-x2x9z");
}

#[test]
fn test_one_label_alone_does_not_override() {
    let derived = from_controller(
        "shop",
        &labels(&[(APP_LABEL, "storefront")]),
        "shop-7f8b9c-x2x9z",
        "space",
        true,
    );
    assert_eq!(derived.hostname, "shop-space");
    assert_eq!(derived.tag, "web.7f8b9c-x2x9z");
}

// =============================================================================
// Unreachable orchestrator (rule 5 via resolve)
// =============================================================================

#[tokio::test]
async fn test_resolve_without_client_uses_pod_name() {
    let derived = resolve(None, "default", "web-7f8b9c-x2x9z", false).await;
    assert_eq!(derived.hostname, "web.default");
    assert_eq!(derived.tag, "web-7f8b9c-x2x9z");
}
