//! End-to-end Procedure Controller scenarios against mock Site Managers,
//! covering the concrete walkthroughs in spec.md §8 (S1 switchover, S2
//! cascade skip, S4 state-restriction veto).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dr_core::controller::{Controller, RunOptions, RunOutcome};
use dr_core::executor::ExecutorConfig;
use dr_core::model::{ClusterState, Command, FlowEntry, Healthz, Mode, ServiceRecord};
use dr_core::transport::{Transport, TransportConfig};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record(name: &str, after: &[&str]) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        module: "stateful".to_string(),
        after: after.iter().map(|s| s.to_string()).collect(),
        before: vec![],
        sequence: vec![Mode::Standby],
        allowed_standby_state_list: vec![Healthz::Up],
        timeout_secs: 5,
        service_endpoint: String::new(),
        healthz_endpoint: None,
    }
}

fn controller() -> Controller {
    let transport = Transport::new(TransportConfig::default()).unwrap();
    Controller::new(Arc::new(transport), ExecutorConfig { poll_interval: std::time::Duration::from_millis(5), ..Default::default() })
}

fn default_flow() -> Vec<FlowEntry> {
    vec![FlowEntry { module: "stateful".to_string(), states: None }]
}

/// Tracks each service's last-requested mode so a `status` poll after a
/// mode-change POST reports that mode back as `done`/`healthy` — a mutation
/// POST's `procedure` field IS the target mode, while a poll's `procedure`
/// is always the literal string `"status"` and must echo the last one set.
async fn mount_always_healthy(server: &MockServer) {
    let modes: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
    Mock::given(method("POST"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = req.body_json().unwrap();
            let service = body["run-service"].as_str().unwrap_or_default().to_string();
            let procedure = body["procedure"].as_str().unwrap_or_default().to_string();
            let mut modes = modes.lock().unwrap();
            if procedure != "status" {
                modes.insert(service.clone(), procedure);
            }
            let mode = modes.get(&service).cloned().unwrap_or_else(|| "active".to_string());
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "services": { service: { "mode": mode, "status": "done", "healthz": "up" } }
            }))
        })
        .mount(server)
        .await;
}

/// S1. Activate-all via `move site-2`: services {A, B} with B.after=[A],
/// initial site-1 active / site-2 standby. Expect both to land `done`.
#[tokio::test]
async fn s1_switchover_activates_dependency_chain() {
    let site1 = MockServer::start().await;
    let site2 = MockServer::start().await;
    mount_always_healthy(&site1).await;
    mount_always_healthy(&site2).await;

    let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
    for s in state.sites.values_mut() {
        s.reachable = Some(true);
    }
    state.sites.get_mut("site-1").unwrap().endpoint = site1.uri();
    state.sites.get_mut("site-2").unwrap().endpoint = site2.uri();
    state.services.get_mut("site-1").unwrap().insert("A".into(), record("A", &[]));
    state.services.get_mut("site-1").unwrap().insert("B".into(), record("B", &["A"]));
    state.services.get_mut("site-2").unwrap().insert("A".into(), record("A", &[]));
    state.services.get_mut("site-2").unwrap().insert("B".into(), record("B", &["A"]));

    let ctl = controller();
    let outcome = ctl
        .run_dr_procedure(&state, Command::Move, "site-2", &default_flow(), &RunOptions::default())
        .await
        .unwrap();

    match outcome {
        RunOutcome::Buckets(buckets) => {
            assert_eq!(buckets.done.len(), 2, "expected both A and B to land done: {buckets:?}");
            assert!(buckets.done.contains("A"));
            assert!(buckets.done.contains("B"));
            assert!(buckets.failed.is_empty());
            assert!(buckets.skipped_due_deps.is_empty());
        }
        RunOutcome::Planned(_) => panic!("expected buckets, not a dry-run plan"),
    }
}

/// S2. Cascade skip: A.after unset, B.after=[A], C.after=[B]; A fails.
/// Expect failed={A}, skipped_due_deps={B, C}, done empty.
#[tokio::test]
async fn s2_cascade_skip_on_ancestor_failure() {
    let server = MockServer::start().await;
    // A fails outright; B and C would succeed if ever attempted.
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"run-service": "A"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "services": { "A": { "mode": "active", "status": "failed", "healthz": "down" } }
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = req.body_json().unwrap();
            let service = body["run-service"].as_str().unwrap_or_default().to_string();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "services": { service: { "mode": "active", "status": "done", "healthz": "up" } }
            }))
        })
        .with_priority(2)
        .mount(&server)
        .await;

    let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
    for s in state.sites.values_mut() {
        s.reachable = Some(true);
    }
    state.sites.get_mut("site-2").unwrap().endpoint = server.uri();
    state.services.get_mut("site-2").unwrap().insert("A".into(), record("A", &[]));
    state.services.get_mut("site-2").unwrap().insert("B".into(), record("B", &["A"]));
    state.services.get_mut("site-2").unwrap().insert("C".into(), record("C", &["B"]));

    let ctl = controller();
    let outcome = ctl
        .run_site_command(&state, Command::Active, "site-2", &default_flow(), &RunOptions::default())
        .await
        .unwrap();

    match outcome {
        RunOutcome::Buckets(buckets) => {
            assert!(buckets.failed.contains("A"));
            assert!(buckets.skipped_due_deps.contains("B"));
            assert!(buckets.skipped_due_deps.contains("C"));
            assert!(buckets.done.is_empty());
        }
        RunOutcome::Planned(_) => panic!("expected buckets, not a dry-run plan"),
    }
}

/// S4. State-restriction veto: restriction `{"*": ["active-active"]}`,
/// opposite site already `active`, requesting `active` on the target site
/// predicts `active-active` and must abort before any service POST.
#[tokio::test]
async fn s4_state_restriction_blocks_before_any_post() {
    let requested = MockServer::start().await;
    let opposite = MockServer::start().await;
    // Any POST to the requested site is a bug in this scenario.
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&requested).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "services": { "A": { "mode": "active", "status": "done", "healthz": "up" } }
        })))
        .mount(&opposite)
        .await;

    let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
    for s in state.sites.values_mut() {
        s.reachable = Some(true);
    }
    state.sites.get_mut("site-1").unwrap().endpoint = opposite.uri();
    state.sites.get_mut("site-2").unwrap().endpoint = requested.uri();
    state.services.get_mut("site-1").unwrap().insert("A".into(), record("A", &[]));
    state.services.get_mut("site-2").unwrap().insert("A".into(), record("A", &[]));

    let mut opts = RunOptions::default();
    opts.restrictions.insert("*".to_string(), vec!["active-active".to_string()]);

    let ctl = controller();
    let err = ctl
        .run_site_command(&state, Command::Active, "site-2", &default_flow(), &opts)
        .await
        .unwrap_err();

    assert!(matches!(err, dr_core::DrError::Validation(_)));
    assert_eq!(requested.received_requests().await.unwrap().len(), 0);
}

/// A `move` flow with `states`-scoped entries (mirroring
/// `test_procedure.py`'s `module_flow = [{"notstateful": ["standby"]}, ...,
/// {"notstateful": ["active"]}]`) must run each phase as a single step at
/// the site its `states[0]` selects, not the full two-step sequence: the
/// `standby` phase passivates the opposite site (site-1) and the `active`
/// phase activates the requested site (site-2).
#[tokio::test]
async fn states_scoped_flow_entries_run_single_step_at_computed_sites() {
    let site1 = MockServer::start().await;
    let site2 = MockServer::start().await;
    mount_always_healthy(&site1).await;
    mount_always_healthy(&site2).await;

    let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
    for s in state.sites.values_mut() {
        s.reachable = Some(true);
    }
    state.sites.get_mut("site-1").unwrap().endpoint = site1.uri();
    state.sites.get_mut("site-2").unwrap().endpoint = site2.uri();
    let mut ns_record = record("ns-serv", &[]);
    ns_record.module = "notstateful".to_string();
    state.services.get_mut("site-1").unwrap().insert("ns-serv".into(), ns_record.clone());
    state.services.get_mut("site-2").unwrap().insert("ns-serv".into(), ns_record);

    let flow = vec![
        FlowEntry { module: "notstateful".to_string(), states: Some(vec![Mode::Standby]) },
        FlowEntry { module: "notstateful".to_string(), states: Some(vec![Mode::Active]) },
    ];

    let ctl = controller();
    let outcome =
        ctl.run_dr_procedure(&state, Command::Move, "site-2", &flow, &RunOptions::default()).await.unwrap();

    match outcome {
        RunOutcome::Buckets(buckets) => {
            assert!(buckets.done.contains("ns-serv"));
            assert!(buckets.failed.is_empty());
        }
        RunOutcome::Planned(_) => panic!("expected buckets, not a dry-run plan"),
    }

    let site1_bodies: Vec<serde_json::Value> =
        site1.received_requests().await.unwrap().iter().map(|r| r.body_json().unwrap()).collect();
    let site2_bodies: Vec<serde_json::Value> =
        site2.received_requests().await.unwrap().iter().map(|r| r.body_json().unwrap()).collect();

    assert!(site1_bodies.iter().any(|b| b["procedure"] == "standby"), "standby phase should reach site-1: {site1_bodies:?}");
    assert!(!site1_bodies.iter().any(|b| b["procedure"] == "active"), "active phase must not reach site-1: {site1_bodies:?}");
    assert!(site2_bodies.iter().any(|b| b["procedure"] == "active"), "active phase should reach site-2: {site2_bodies:?}");
    assert!(!site2_bodies.iter().any(|b| b["procedure"] == "standby"), "standby phase must not reach site-2: {site2_bodies:?}");
}
