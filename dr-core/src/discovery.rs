//! Cluster State & Discovery: fetches each site's service catalog from its
//! Site Manager (`GET /sitemanager`), parses the wire schema from spec.md
//! §6.1 into [`ServiceRecord`]s, and marks each site reachable/unreachable.
//!
//! Ported from `examples/original_source/sm_client/initialization.py::sm_get_cluster_state`,
//! which issues one status request per site and folds the `(response, ok,
//! code)` triple back into the per-site dict. The JSON service-record shape
//! parsed here (`module`, `namespace`, `CRname`, optional `alias`,
//! `after`/`before`/`sequence`, `allowedStandbyStateList`, optional
//! `timeout`, `parameters.{serviceEndpoint, healthzEndpoint}`) is the Site
//! Manager HTTP contract in spec.md §6.1 — the Site Manager server itself
//! is an external collaborator, so only the wire shape is modeled here.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::{ClusterState, Healthz, Mode, ModuleGlobals, ServiceRecord};
use crate::planner;
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
struct SiteManagerListing {
    #[serde(default)]
    services: BTreeMap<String, RawServiceRecord>,
}

#[derive(Debug, Deserialize)]
struct RawServiceRecord {
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(rename = "CRname", default)]
    cr_name: Option<String>,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    after: Vec<String>,
    #[serde(default)]
    before: Vec<String>,
    #[serde(default)]
    sequence: Vec<String>,
    #[serde(default)]
    #[serde(rename = "allowedStandbyStateList")]
    allowed_standby_state_list: Vec<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    parameters: RawParameters,
}

#[derive(Debug, Deserialize, Default)]
struct RawParameters {
    #[serde(default)]
    #[serde(rename = "serviceEndpoint")]
    service_endpoint: Option<String>,
    #[serde(default)]
    #[serde(rename = "healthzEndpoint")]
    healthz_endpoint: Option<String>,
}

/// Canonical name per spec.md §3: the declared `alias`, or `CRname.namespace`
/// when no alias is set. Falls back to the catalog key (the map entry name)
/// if neither `CRname` nor `namespace` is present, which only happens for
/// malformed/test fixtures — the Site Manager contract always sets both.
fn canonical_name(key: &str, raw: &RawServiceRecord) -> String {
    if let Some(alias) = &raw.alias {
        if !alias.is_empty() {
            return alias.clone();
        }
    }
    match (&raw.cr_name, &raw.namespace) {
        (Some(cr), Some(ns)) if !cr.is_empty() && !ns.is_empty() => format!("{cr}.{ns}"),
        _ => key.to_string(),
    }
}

fn to_service_record(key: &str, raw: RawServiceRecord, default_timeout_secs: u64) -> ServiceRecord {
    let name = canonical_name(key, &raw);
    let sequence: Vec<Mode> = raw.sequence.iter().filter_map(|s| Mode::parse(s)).collect();
    let allowed_standby_state_list: Vec<Healthz> = {
        let parsed: Vec<Healthz> = raw.allowed_standby_state_list.iter().filter_map(|s| Healthz::parse(s)).collect();
        if parsed.is_empty() {
            vec![Healthz::Up]
        } else {
            parsed
        }
    };

    ServiceRecord {
        name,
        module: raw.module.filter(|m| !m.is_empty()).unwrap_or_else(|| crate::model::DEFAULT_MODULE.to_string()),
        after: raw.after,
        before: raw.before,
        sequence,
        allowed_standby_state_list,
        timeout_secs: raw.timeout.unwrap_or(default_timeout_secs),
        service_endpoint: raw.parameters.service_endpoint.unwrap_or_default(),
        healthz_endpoint: raw.parameters.healthz_endpoint,
    }
}

/// Fetches and populates `state` in place: each site's `GET /sitemanager` is
/// requested independently, so one site's unreachability never prevents
/// discovering the other. On success a site is marked `reachable = true`
/// and its `services` map replaced; on failure it is marked `reachable =
/// false` and `return_code` retained for the validator's diagnostics.
///
/// After every site has been probed, `globals` is allocated for each module
/// named in `flow` (defaulting to the single `stateful` module when `flow`
/// is empty), matching `SMClusterState.__init__`'s per-module globals slot.
pub async fn discover(
    transport: &Transport,
    state: &mut ClusterState,
    default_timeout_secs: u64,
    flow_modules: &[String],
) {
    let site_names: Vec<String> = state.sites.keys().cloned().collect();
    for site_name in site_names {
        let endpoint = state.site_manager_url(&site_name).expect("site present");
        let token = state.sites[&site_name].token.clone();
        let resp = transport.request(&endpoint, None, token.as_deref()).await;

        let site = state.sites.get_mut(&site_name).expect("site present");
        site.return_code = resp.code;
        site.reachable = Some(resp.ok);

        if !resp.ok {
            tracing::warn!(site = %site_name, code = ?resp.code, "site manager unreachable during discovery");
            continue;
        }

        match serde_json::from_value::<SiteManagerListing>(resp.body) {
            Ok(listing) => {
                let mut catalog = BTreeMap::new();
                for (key, raw) in listing.services {
                    let record = to_service_record(&key, raw, default_timeout_secs);
                    catalog.insert(record.name.clone(), record);
                }
                state.services.insert(site_name.clone(), catalog);
            }
            Err(err) => {
                tracing::warn!(site = %site_name, error = %err, "failed to decode site manager listing");
                let site = state.sites.get_mut(&site_name).expect("site present");
                site.reachable = Some(false);
            }
        }
    }

    let modules: Vec<String> = if flow_modules.is_empty() {
        vec![crate::model::DEFAULT_MODULE.to_string()]
    } else {
        flow_modules.to_vec()
    };
    for module in modules {
        state.globals.entry(module).or_insert_with(ModuleGlobals::default);
    }
}

/// Recomputes `globals[module]` from the current catalog, the way the
/// planner is invoked fresh for each command (globals are a cache surfaced
/// for inspection/`status`, not consumed by the controller, which calls
/// [`planner::plan`] directly per procedure).
pub fn refresh_globals(state: &mut ClusterState, module: &str) {
    let plan = planner::plan(state, module, None, None, &[]);
    let entry = state.globals.entry(module.to_string()).or_insert_with(ModuleGlobals::default);
    entry.ordered_list = plan.ordered;
    entry.deps_issue = !plan.minor_issues_ok;
    entry.has_graph = plan.graph.is_some();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_with_site(name: &str, endpoint: &str) -> ClusterState {
        let mut state = ClusterState::new([name.to_string(), "other".to_string()]).unwrap();
        state.sites.get_mut(name).unwrap().endpoint = endpoint.to_string();
        state
    }

    #[tokio::test]
    async fn discovery_populates_catalog_and_marks_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemanager"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "services": {
                    "svc-a": {
                        "module": "stateful",
                        "namespace": "ns1",
                        "CRname": "svc-a",
                        "after": [],
                        "before": [],
                        "sequence": ["standby"],
                        "allowedStandbyStateList": ["up", "degraded"],
                        "parameters": {"serviceEndpoint": "http://svc-a/status"}
                    }
                }
            })))
            .mount(&server)
            .await;

        let mut state = state_with_site("site-1", &server.uri());
        let transport = Transport::new(TransportConfig::default()).unwrap();
        discover(&transport, &mut state, 200, &["stateful".to_string()]).await;

        assert_eq!(state.sites["site-1"].reachable, Some(true));
        let svc = &state.services["site-1"]["svc-a.ns1"];
        assert_eq!(svc.name, "svc-a.ns1");
        assert_eq!(svc.allowed_standby_state_list, vec![Healthz::Up, Healthz::Degraded]);
        assert!(state.globals.contains_key("stateful"));
    }

    #[tokio::test]
    async fn unreachable_site_is_marked_and_catalog_left_empty() {
        let mut state = state_with_site("site-1", "http://127.0.0.1:1");
        let transport = Transport::new(TransportConfig { retries: 1, ..Default::default() }).unwrap();
        discover(&transport, &mut state, 200, &[]).await;

        assert_eq!(state.sites["site-1"].reachable, Some(false));
        assert!(state.services["site-1"].is_empty());
    }

    #[test]
    fn canonical_name_prefers_alias_over_crname_namespace() {
        let raw = RawServiceRecord {
            module: None,
            namespace: Some("ns".into()),
            cr_name: Some("svc".into()),
            alias: Some("friendly".into()),
            after: vec![],
            before: vec![],
            sequence: vec![],
            allowed_standby_state_list: vec![],
            timeout: None,
            parameters: RawParameters::default(),
        };
        assert_eq!(canonical_name("key", &raw), "friendly");
    }
}
