//! CLI output rendering: the per-site/per-service table and the bucket
//! summary line described in spec.md §7 ("User-visible output is a
//! per-site, per-service table and a summary line listing the counts of
//! each bucket"), plus the `--dry-run` planned-step listing.
//!
//! Uses `tabled`, the table-rendering crate already present in the
//! retrieval pack's own CLI (`examples/abiolaogu-SASE-SDWAN/cli`).

use std::collections::BTreeMap;

use tabled::{Table, Tabled};

use dr_core::buckets::ResultBuckets;
use dr_core::controller::PlannedStep;
use dr_core::model::ServiceDrStatus;

/// `list` output is sorted for deterministic CLI output — the original's
/// `get_services_list_for_ok_site` returns an unordered Python `set`.
pub fn print_list(services: &[String]) {
    let mut sorted = services.to_vec();
    sorted.sort();
    for s in sorted {
        println!("{s}");
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "SITE")]
    site: String,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "HEALTHZ")]
    healthz: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

pub fn print_status_table(table: &BTreeMap<(String, String), ServiceDrStatus>) {
    let rows: Vec<StatusRow> = table
        .iter()
        .map(|((site, service), status)| StatusRow {
            site: site.clone(),
            service: service.clone(),
            mode: status.mode.map(|m| m.as_str().to_string()).unwrap_or_else(|| "--".to_string()),
            status: status.status.map(|s| s.as_str().to_string()).unwrap_or_else(|| "--".to_string()),
            healthz: status.healthz.map(|h| h.as_str().to_string()).unwrap_or_else(|| "--".to_string()),
            message: status.message.clone(),
        })
        .collect();
    if rows.is_empty() {
        println!("(no services)");
        return;
    }
    println!("{}", Table::new(rows));
}

#[derive(Tabled)]
struct PlannedRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "SITE")]
    site: String,
    #[tabled(rename = "MODE")]
    mode: String,
}

pub fn print_planned_steps(steps: &[PlannedStep]) {
    if steps.is_empty() {
        println!("(nothing to do)");
        return;
    }
    let rows: Vec<PlannedRow> = steps
        .iter()
        .map(|s| PlannedRow { service: s.service.clone(), site: s.site.clone(), mode: s.mode.as_str().to_string() })
        .collect();
    println!("{}", Table::new(rows));
    println!("dry-run: {} step(s) planned, nothing executed", steps.len());
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "RESULT")]
    result: &'static str,
}

pub fn print_buckets(buckets: &ResultBuckets) {
    let mut rows = Vec::with_capacity(buckets.total_considered());
    for s in &buckets.done {
        rows.push(BucketRow { service: s.clone(), result: "done" });
    }
    for s in &buckets.warned {
        rows.push(BucketRow { service: s.clone(), result: "warned" });
    }
    for s in &buckets.failed {
        rows.push(BucketRow { service: s.clone(), result: "failed" });
    }
    for s in &buckets.skipped_due_deps {
        rows.push(BucketRow { service: s.clone(), result: "skipped-due-deps" });
    }
    rows.sort_by(|a, b| a.service.cmp(&b.service));

    if rows.is_empty() {
        println!("(no services considered)");
    } else {
        println!("{}", Table::new(rows));
    }

    println!(
        "summary: {} done, {} warned, {} failed, {} skipped-due-deps",
        buckets.done.len(),
        buckets.warned.len(),
        buckets.failed.len(),
        buckets.skipped_due_deps.len()
    );
}
