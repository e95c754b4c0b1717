//! Hostname/tag derivation
//!
//! A container log line is attributed to a logical `hostname` (the
//! application) and `tag` (the instance). The orchestrator is the source
//! of truth when reachable:
//!
//! 1. Explicit hostname+tag annotations on the pod win outright.
//! 2. A hostname annotation alone takes the tag from the pod-name
//!    convention (app-platform mode) or the pod name itself.
//! 3. Otherwise the owner-reference chain is walked to the top-level
//!    controller; hostname becomes `<controller>.<namespace>` and the
//!    tag is the pod name.
//! 4. In app-platform mode the pod name parses as
//!    `<app>[--<dyno>]-<suffix>`; hostname becomes `<app>-<namespace>`
//!    and the tag `<dyno>.<pod-suffix>` (dyno defaults to `web`).
//!    `app` / `dyno-type` labels on the controller override the parse.
//! 5. With no orchestrator at all, the pod name alone decides.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::Api;
use kube::Client;

use crate::error::InputError;

/// Pod annotation carrying an explicit hostname.
pub const HOSTNAME_ANNOTATION: &str = "haul.io/hostname";

/// Pod annotation carrying an explicit tag.
pub const TAG_ANNOTATION: &str = "haul.io/tag";

/// Controller label overriding the app name in app-platform mode.
pub const APP_LABEL: &str = "app";

/// Controller label overriding the dyno type in app-platform mode.
pub const DYNO_TYPE_LABEL: &str = "dyno-type";

/// Default dyno when the pod name carries no `--<dyno>` part.
const DEFAULT_DYNO: &str = "web";

/// A derived (hostname, tag) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameTag {
    pub hostname: String,
    pub tag: String,
}

/// Split a pod name into its base and the generated suffix (the last
/// two dash-separated parts).
fn split_pod_name(pod: &str) -> (String, String) {
    let parts: Vec<&str> = pod.split('-').collect();
    let split = parts.len().saturating_sub(2);
    (parts[..split].join("-"), parts[split..].join("-"))
}

/// App-platform tag from the pod-name convention:
/// `<dyno>.<pod-suffix>`, dyno defaulting to `web`.
fn app_platform_tag(pod: &str) -> String {
    let (base, suffix) = split_pod_name(pod);
    let dyno = base.split_once("--").map(|(_, d)| d).unwrap_or(DEFAULT_DYNO);
    format!("{dyno}.{suffix}")
}

/// Derive purely from the pod name, for when the orchestrator is
/// unreachable or knows nothing useful.
pub fn derive_from_pod_name(pod: &str, namespace: &str, app_platform: bool) -> HostnameTag {
    let (base, _) = split_pod_name(pod);
    if app_platform {
        let app = base.split_once("--").map(|(a, _)| a).unwrap_or(&base);
        HostnameTag {
            hostname: format!("{app}-{namespace}"),
            tag: app_platform_tag(pod),
        }
    } else {
        HostnameTag {
            hostname: format!("{base}.{namespace}"),
            tag: pod.to_string(),
        }
    }
}

/// Apply the annotation rules (1) and (2). `None` means no hostname
/// annotation is present and the controller walk decides.
fn from_annotations(meta: &ObjectMeta, app_platform: bool) -> Option<HostnameTag> {
    let annotations = meta.annotations.as_ref()?;
    let hostname = annotations.get(HOSTNAME_ANNOTATION)?;
    let pod = meta.name.as_deref().unwrap_or_default();

    let tag = match annotations.get(TAG_ANNOTATION) {
        Some(tag) => tag.clone(),
        None if app_platform => app_platform_tag(pod),
        None => pod.to_string(),
    };
    Some(HostnameTag {
        hostname: hostname.clone(),
        tag,
    })
}

/// Apply rules (3) and (4) given the resolved top-level controller.
fn from_controller(
    top_name: &str,
    top_labels: &BTreeMap<String, String>,
    pod: &str,
    namespace: &str,
    app_platform: bool,
) -> HostnameTag {
    if app_platform {
        if let (Some(app), Some(dyno)) = (top_labels.get(APP_LABEL), top_labels.get(DYNO_TYPE_LABEL))
        {
            let (_, suffix) = split_pod_name(pod);
            return HostnameTag {
                hostname: format!("{app}-{namespace}"),
                tag: format!("{dyno}.{suffix}"),
            };
        }
        return HostnameTag {
            hostname: format!("{top_name}-{namespace}"),
            tag: app_platform_tag(pod),
        };
    }
    HostnameTag {
        hostname: format!("{top_name}.{namespace}"),
        tag: pod.to_string(),
    }
}

/// Walk the owner-reference chain to the top-level controller, following
/// only non-controller references of the workload kinds.
async fn top_level_meta(
    client: &Client,
    namespace: &str,
    start: &ObjectMeta,
) -> Result<ObjectMeta, InputError> {
    let mut current = start.clone();
    loop {
        let refs = current.owner_references.clone().unwrap_or_default();
        let next = refs
            .into_iter()
            .find(|r| !r.controller.unwrap_or(false));
        let Some(owner) = next else {
            return Ok(current);
        };

        let lookup = |e: kube::Error| InputError::Orchestrator(e.to_string());
        current = match owner.kind.to_ascii_lowercase().as_str() {
            "replicaset" | "replicasets" => {
                Api::<ReplicaSet>::namespaced(client.clone(), namespace)
                    .get(&owner.name)
                    .await
                    .map_err(lookup)?
                    .metadata
            }
            "deployment" | "deployments" => {
                Api::<Deployment>::namespaced(client.clone(), namespace)
                    .get(&owner.name)
                    .await
                    .map_err(lookup)?
                    .metadata
            }
            "daemonset" | "daemonsets" => {
                Api::<DaemonSet>::namespaced(client.clone(), namespace)
                    .get(&owner.name)
                    .await
                    .map_err(lookup)?
                    .metadata
            }
            "statefulset" | "statefulsets" => {
                Api::<StatefulSet>::namespaced(client.clone(), namespace)
                    .get(&owner.name)
                    .await
                    .map_err(lookup)?
                    .metadata
            }
            other => {
                return Err(InputError::Orchestrator(format!(
                    "unrecognized owner kind {other}"
                )))
            }
        };
    }
}

/// Full derivation for one pod: annotations, then the controller walk,
/// then the pod-name fallback.
async fn from_pod(client: &Client, pod: &Pod, app_platform: bool) -> HostnameTag {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();

    if let Some(found) = from_annotations(&pod.metadata, app_platform) {
        return found;
    }

    match top_level_meta(client, namespace, &pod.metadata).await {
        Ok(top) => {
            let empty = BTreeMap::new();
            from_controller(
                top.name.as_deref().unwrap_or_default(),
                top.labels.as_ref().unwrap_or(&empty),
                name,
                namespace,
                app_platform,
            )
        }
        Err(e) => {
            tracing::warn!(
                pod = %name,
                namespace = %namespace,
                error = %e,
                "controller walk failed, deriving from pod name"
            );
            derive_from_pod_name(name, namespace, app_platform)
        }
    }
}

/// Resolve hostname/tag for `(namespace, pod)`, falling back to the
/// pod-name rules when the orchestrator is unreachable.
pub async fn resolve(
    client: Option<&Client>,
    namespace: &str,
    pod: &str,
    app_platform: bool,
) -> HostnameTag {
    let Some(client) = client else {
        return derive_from_pod_name(pod, namespace, app_platform);
    };
    match Api::<Pod>::namespaced(client.clone(), namespace).get(pod).await {
        Ok(found) => from_pod(client, &found, app_platform).await,
        Err(e) => {
            tracing::warn!(
                pod = %pod,
                namespace = %namespace,
                error = %e,
                "pod lookup failed, deriving from pod name"
            );
            derive_from_pod_name(pod, namespace, app_platform)
        }
    }
}

#[cfg(test)]
#[path = "hostname_test.rs"]
mod hostname_test;
