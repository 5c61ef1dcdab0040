//! Pure selector/target/export-to matching for Istio resources, per
//! spec.md §4.3.1. Unit-testable without a session or network: every
//! function here borrows its inputs and returns a plain bool.

use meshctl_common::model::{
    IstioResourceMeta,
    LabelMap,
    TargetRef,
};

/// `export_to` visibility of a resource in `resource_namespace` as seen from
/// `instance_namespace`. Empty or `["*"]` is global; `["."]` is
/// same-namespace-as-resource; an explicit list is taken literally with `.`
/// expanded to the resource's own namespace.
pub fn is_visible_to(export_to: &[String], resource_namespace: &str, instance_namespace: &str) -> bool {
    if export_to.is_empty() || export_to.iter().any(|e| e == "*") {
        return true;
    }
    export_to.iter().any(|e| {
        if e == "." {
            resource_namespace == instance_namespace
        } else {
            e == instance_namespace
        }
    })
}

/// Does `selector` (if present) match `labels`? Otherwise, does any
/// `target_refs` entry identify this workload under one of `candidates` —
/// the `(kind, name)` pairs a real `targetRef` could plausibly reference it
/// by, e.g. `("Service", "nginx")` for the Service it belongs to or
/// `("Pod", "nginx-7d9f-abc")` for the pod itself? No selector and no
/// `target_refs` is "apply to the whole visible namespace".
pub fn matches_selector_or_targets(
    selector: &Option<LabelMap>, target_refs: &[TargetRef], labels: &LabelMap, candidates: &[(&str, &str)],
) -> bool {
    if let Some(sel) = selector {
        return sel.is_subset_of(labels);
    }
    if !target_refs.is_empty() {
        return target_refs.iter().any(|t| {
            candidates
                .iter()
                .any(|(kind, name)| t.kind.eq_ignore_ascii_case(kind) && t.name == *name)
        });
    }
    true
}

/// PeerAuthentication applies per the four cases in spec.md §4.3.1: global or
/// namespace-scoped in the root namespace, or namespace-scoped in the
/// instance's own namespace. It never applies across any other namespace
/// boundary.
pub fn peer_authentication_applies(
    meta: &IstioResourceMeta, root_namespace: &str, instance_namespace: &str, labels: &LabelMap,
) -> bool {
    let selector_matches = |sel: &Option<LabelMap>| match sel {
        None => true,
        Some(s) if s.0.is_empty() => true,
        Some(s) => s.is_subset_of(labels),
    };

    if meta.namespace == root_namespace {
        return selector_matches(&meta.workload_selector);
    }
    if meta.namespace == instance_namespace {
        return selector_matches(&meta.workload_selector);
    }
    false
}

/// DestinationRule and the remaining Istio kinds share the same
/// visibility ∧ targeting contract. Host matching is a placeholder — it
/// currently matches every host, per spec.md §4.3.1.
pub fn resource_applies(
    meta: &IstioResourceMeta, instance_namespace: &str, labels: &LabelMap, candidates: &[(&str, &str)],
) -> bool {
    is_visible_to(&meta.export_to, &meta.namespace, instance_namespace)
        && matches_selector_or_targets(&meta.workload_selector, &meta.target_refs, labels, candidates)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelMap {
        LabelMap(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn meta(namespace: &str, selector: Option<LabelMap>, export_to: &[&str]) -> IstioResourceMeta {
        IstioResourceMeta {
            name: "res".into(),
            namespace: namespace.into(),
            workload_selector: selector,
            target_refs: vec![],
            export_to: export_to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn peer_authentication_root_namespace_no_selector_applies_everywhere() {
        let m = meta("istio-system", None, &[]);
        assert!(peer_authentication_applies(
            &m,
            "istio-system",
            "default",
            &labels(&[("app", "nginx")])
        ));
    }

    #[test]
    fn peer_authentication_root_namespace_selector_requires_subset() {
        let m = meta(
            "istio-system",
            Some(labels(&[("app", "nginx")])),
            &[],
        );
        assert!(peer_authentication_applies(
            &m,
            "istio-system",
            "default",
            &labels(&[("app", "nginx"), ("version", "v1")])
        ));
        assert!(!peer_authentication_applies(
            &m,
            "istio-system",
            "default",
            &labels(&[("app", "other")])
        ));
    }

    #[test]
    fn peer_authentication_does_not_cross_non_root_namespaces() {
        let m = meta("team-a", None, &[]);
        assert!(peer_authentication_applies(&m, "istio-system", "team-a", &labels(&[])));
        assert!(!peer_authentication_applies(&m, "istio-system", "team-b", &labels(&[])));
    }

    #[test]
    fn export_to_star_and_empty_are_global() {
        assert!(is_visible_to(&[], "ns-a", "ns-b"));
        assert!(is_visible_to(&["*".to_string()], "ns-a", "ns-b"));
    }

    #[test]
    fn export_to_dot_is_same_namespace_only() {
        assert!(is_visible_to(&[".".to_string()], "ns-a", "ns-a"));
        assert!(!is_visible_to(&[".".to_string()], "ns-a", "ns-b"));
    }

    #[test]
    fn export_to_explicit_list_is_literal() {
        let export_to = vec!["ns-b".to_string()];
        assert!(is_visible_to(&export_to, "ns-a", "ns-b"));
        assert!(!is_visible_to(&export_to, "ns-a", "ns-c"));
    }

    #[test]
    fn resource_applies_combines_visibility_and_targeting() {
        let m = meta("ns-a", Some(labels(&[("app", "nginx")])), &["ns-b"]);
        let candidates = [("Service", "nginx")];
        assert!(resource_applies(&m, "ns-b", &labels(&[("app", "nginx")]), &candidates));
        assert!(!resource_applies(&m, "ns-c", &labels(&[("app", "nginx")]), &candidates));
        assert!(!resource_applies(&m, "ns-b", &labels(&[("app", "other")]), &candidates));
    }

    #[test]
    fn resource_with_no_selector_or_targets_applies_to_whole_visible_namespace() {
        let m = meta("ns-a", None, &[]);
        assert!(resource_applies(&m, "ns-a", &labels(&[]), &[("Service", "anything")]));
    }

    fn meta_with_targets(namespace: &str, target_refs: Vec<TargetRef>, export_to: &[&str]) -> IstioResourceMeta {
        IstioResourceMeta {
            name: "res".into(),
            namespace: namespace.into(),
            workload_selector: None,
            target_refs,
            export_to: export_to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn target_refs_match_the_owning_service_by_kind_and_name() {
        let m = meta_with_targets(
            "ns-a",
            vec![TargetRef {
                kind: "Service".into(),
                name: "nginx".into(),
            }],
            &[],
        );
        let candidates = [("Service", "nginx"), ("Pod", "nginx-7d9f-abc")];
        assert!(resource_applies(&m, "ns-a", &labels(&[]), &candidates));
    }

    #[test]
    fn target_refs_do_not_match_an_unrelated_kind_or_name() {
        let m = meta_with_targets(
            "ns-a",
            vec![TargetRef {
                kind: "Service".into(),
                name: "other-service".into(),
            }],
            &[],
        );
        let candidates = [("Service", "nginx"), ("Pod", "nginx-7d9f-abc")];
        assert!(!resource_applies(&m, "ns-a", &labels(&[]), &candidates));

        let m = meta_with_targets(
            "ns-a",
            vec![TargetRef {
                kind: "Gateway".into(),
                name: "nginx".into(),
            }],
            &[],
        );
        assert!(!resource_applies(&m, "ns-a", &labels(&[]), &candidates));
    }
}
