//! Service Executor: drives one (site, service, target-mode) transition
//! through a POST plus a polled status endpoint, honoring per-service
//! timeouts and allowed-standby-state rules.
//!
//! Ported from `examples/original_source/sm_client/processing.py::sm_process_service`,
//! `::sm_poll_service_required_status`, and `::service_status_polling`.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::model::{ExecStatus, Healthz, Mode, ServiceDrStatus, ServiceRecord};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            poll_interval: Duration::from_secs(5),
            default_timeout: Duration::from_secs(200),
        }
    }
}

pub struct ServiceExecutor<'a> {
    transport: &'a Transport,
    config: ExecutorConfig,
}

fn parse_service_status(service: &str, body: &serde_json::Value) -> ServiceDrStatus {
    let entry = body.get("services").and_then(|s| s.get(service));
    let mode = entry
        .and_then(|e| e.get("mode"))
        .and_then(|v| v.as_str())
        .and_then(Mode::parse);
    let status = entry
        .and_then(|e| e.get("status"))
        .and_then(|v| v.as_str())
        .and_then(ExecStatus::parse);
    let healthz = entry
        .and_then(|e| e.get("healthz"))
        .and_then(|v| v.as_str())
        .and_then(Healthz::parse);
    let message = entry
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    ServiceDrStatus {
        service: service.to_string(),
        mode,
        status,
        healthz,
        message,
        service_status: false,
        allow_failure: false,
    }
}

/// `healthz` values that fail the ok-check for `target_mode`, per the
/// Service Executor design: everything is a failure except when the
/// target mode is `standby` and the service's declared
/// `allowedStandbyStateList` carries the observed value.
fn failed_healthz_set(target_mode: Mode, allowed_standby: &[Healthz]) -> Vec<Healthz> {
    let all = [Healthz::Down, Healthz::Degraded];
    if target_mode == Mode::Standby {
        all.into_iter().filter(|h| !allowed_standby.contains(h)).collect()
    } else {
        all.to_vec()
    }
}

impl<'a> ServiceExecutor<'a> {
    pub fn new(transport: &'a Transport, config: ExecutorConfig) -> Self {
        ServiceExecutor { transport, config }
    }

    /// Single-shot status query, no mutation and no polling — used by the
    /// `status` command and by the validator's state-restriction check.
    pub async fn query_status(&self, site_endpoint: &str, service: &str, token: Option<&str>) -> ServiceDrStatus {
        let body = json!({"procedure": "status", "run-service": service});
        let resp = self.transport.request(site_endpoint, Some(body), token).await;
        if !resp.ok {
            let mut status = ServiceDrStatus::empty(service);
            status.message = "status query failed".to_string();
            return status;
        }
        parse_service_status(service, &resp.body)
    }

    /// Drives `service` to `target_mode` at `site_endpoint`: POST then poll
    /// until expected state, error state, or per-service timeout.
    pub async fn execute(
        &self,
        site_endpoint: &str,
        service: &ServiceRecord,
        target_mode: Mode,
        no_wait: bool,
        force: bool,
        allow_failure: bool,
        token: Option<&str>,
    ) -> ServiceDrStatus {
        let post_body = json!({
            "procedure": target_mode.as_str(),
            "run-service": service.name,
            "no-wait": no_wait,
            "force": force,
        });
        let post_resp = self.transport.request(site_endpoint, Some(post_body), token).await;
        if !post_resp.ok {
            let mut status = ServiceDrStatus::empty(&service.name);
            status.message = format!("mode-change request rejected (code={:?})", post_resp.code);
            status.allow_failure = allow_failure;
            return status;
        }

        let timeout = if service.timeout_secs > 0 {
            Duration::from_secs(service.timeout_secs)
        } else {
            self.config.default_timeout
        };
        let start = Instant::now();
        let failed_healthz = failed_healthz_set(target_mode, &service.allowed_standby_state_list);

        loop {
            let mut status = self.query_status(site_endpoint, &service.name, token).await;

            let expected = status.status == Some(ExecStatus::Done)
                && status.mode == Some(target_mode)
                && status.healthz.map(|h| !failed_healthz.contains(&h)).unwrap_or(false);
            let errored = status.status == Some(ExecStatus::Failed)
                || (status.status == Some(ExecStatus::Done)
                    && matches!(status.healthz, Some(Healthz::Down) | Some(Healthz::Degraded)));

            if expected || errored {
                status.service_status = Self::compute_service_status(&status, &failed_healthz, force);
                status.allow_failure = allow_failure;
                return status;
            }

            if start.elapsed() > timeout {
                let mut timed_out = ServiceDrStatus::empty(&service.name);
                timed_out.status = status.status;
                timed_out.mode = status.mode;
                timed_out.healthz = None; // synthesized '--' so the ok-check fails
                timed_out.message = "timed out waiting for expected state".to_string();
                timed_out.service_status = Self::compute_service_status(&timed_out, &failed_healthz, force);
                timed_out.allow_failure = allow_failure;
                return timed_out;
            }

            tracing::debug!(
                service = %service.name,
                elapsed_secs = start.elapsed().as_secs(),
                timeout_secs = timeout.as_secs(),
                "waiting for expected state"
            );
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// `status ∉ {failed} ∧ (healthz ∉ failed_healthz ∨ force)`.
    fn compute_service_status(status: &ServiceDrStatus, failed_healthz: &[Healthz], force: bool) -> bool {
        let status_ok = status.status != Some(ExecStatus::Failed);
        let healthz_ok = match status.healthz {
            Some(h) => !failed_healthz.contains(&h),
            None => false,
        };
        status_ok && (healthz_ok || force)
    }
}
