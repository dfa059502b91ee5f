//! Derivation of presentation records from the latest-result snapshot.
//!
//! Everything here is a pure function of (registry, snapshot, now): no
//! cached state, recomputed on every read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{Protocol, Service};
use crate::models::{CheckResult, Status};
use crate::reason::{self, ReasonClass};

/// What the dashboard sees for one service: registry fields merged with the
/// latest result, staleness, dependency correlation and reason presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub target: String,
    pub protocol: String,
    pub protocol_class: String,

    pub status: Status,
    pub status_class: String,
    pub latency_ms: Option<f64>,
    pub checked_at: Option<DateTime<Utc>>,
    pub last_error: String,

    pub is_stale: bool,
    pub stale_label: String,

    pub upstream_issue: bool,
    pub upstream_note: String,

    pub reason_class: String,
    pub reason_label: String,
    pub reason_color: String,

    pub just_checked: bool,
}

/// Aggregate banner over one set of views.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BannerSummary {
    pub down_count: usize,
    pub stale_count: usize,
    pub unknown_count: usize,
    pub up_count: usize,
    pub top_reason_label: String,
    pub top_reason_count: usize,
    pub severity_class: String,
}

// Dependency ranks, worst first. MISSING sits between STALE and UNKNOWN: a
// dependency name absent from the registry is overridden only by an actual
// DOWN or STALE dependency found elsewhere in the list.
const RANK_DOWN: u8 = 0;
const RANK_STALE: u8 = 1;
const RANK_MISSING: u8 = 2;
const RANK_UNKNOWN: u8 = 3;
const RANK_UP: u8 = 4;

/// Builds the sorted view list for one render.
pub fn build_views(
    services: &[Service],
    results: &HashMap<String, CheckResult>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Vec<ServiceView> {
    let stale_after = chrono::Duration::seconds(2 * interval.as_secs() as i64 + 10);

    let mut views = Vec::with_capacity(services.len());
    let mut index_by_name = HashMap::with_capacity(services.len());

    // Pass 1: project each service against its latest result.
    for svc in services {
        let mut v = ServiceView {
            name: svc.name.clone(),
            description: svc.description.clone(),
            category: svc.category.clone(),
            icon: svc.icon.clone(),
            target: svc.target(),
            protocol: svc.protocol.label().to_string(),
            protocol_class: protocol_class(svc.protocol).to_string(),
            status: Status::Unknown,
            status_class: status_class(Status::Unknown).to_string(),
            latency_ms: None,
            checked_at: None,
            last_error: String::new(),
            is_stale: false,
            stale_label: String::new(),
            upstream_issue: false,
            upstream_note: String::new(),
            reason_class: String::new(),
            reason_label: String::new(),
            reason_color: String::new(),
            just_checked: false,
        };

        if let Some(res) = results.get(&svc.name) {
            v.status = res.status;
            v.status_class = status_class(res.status).to_string();
            v.latency_ms = res.latency_ms;
            v.checked_at = res.checked_at;
            v.last_error = res.error.clone();

            if !v.last_error.is_empty() {
                let reason = reason::classify(&v.last_error);
                apply_reason(&mut v, reason);
            }

            // A service that was never checked cannot be stale.
            if let Some(checked_at) = res.checked_at {
                if now.signed_duration_since(checked_at) > stale_after {
                    v.is_stale = true;
                    v.stale_label = "STALE".to_string();
                    if v.last_error.is_empty() {
                        v.last_error = "stale: no recent health result".to_string();
                        apply_reason(&mut v, ReasonClass::Timeout);
                    }
                }
            }
        }

        index_by_name.insert(svc.name.clone(), views.len());
        views.push(v);
    }

    // Pass 2: first-degree dependency correlation.
    correlate_dependencies(services, &mut views, &index_by_name);

    views.sort_by(|a, b| {
        severity_rank(a)
            .cmp(&severity_rank(b))
            .then_with(|| {
                // Empty categories sort last.
                (a.category.is_empty(), a.category.as_str())
                    .cmp(&(b.category.is_empty(), b.category.as_str()))
            })
            .then_with(|| a.name.cmp(&b.name))
    });

    views
}

fn correlate_dependencies(
    services: &[Service],
    views: &mut [ServiceView],
    index_by_name: &HashMap<String, usize>,
) {
    for (i, svc) in services.iter().enumerate() {
        if svc.depends_on.is_empty() {
            continue;
        }

        let mut worst_rank = u8::MAX;
        let mut worst_name = "";
        let mut worst_state = "";

        for dep_name in &svc.depends_on {
            let Some(&dep_idx) = index_by_name.get(dep_name) else {
                if RANK_MISSING < worst_rank {
                    worst_rank = RANK_MISSING;
                    worst_name = dep_name.as_str();
                    worst_state = "MISSING";
                }
                continue;
            };

            let dep = &views[dep_idx];
            let rank = dependency_rank(dep);
            // Strict comparison: ties keep the first dependency in
            // depends_on order.
            if rank < worst_rank {
                worst_rank = rank;
                worst_name = dep_name.as_str();
                worst_state = match rank {
                    RANK_DOWN => "DOWN",
                    RANK_STALE => "STALE",
                    RANK_UNKNOWN => "UNKNOWN",
                    _ => "UP",
                };
            }
        }

        // Skip the hint on services that are themselves healthy and current.
        let own_healthy = views[i].status == Status::Up && !views[i].is_stale;
        if !worst_name.is_empty() && worst_rank < RANK_UP && !own_healthy {
            views[i].upstream_issue = true;
            views[i].upstream_note = format!("Upstream: {worst_name} is {worst_state}");
        }
    }
}

fn dependency_rank(view: &ServiceView) -> u8 {
    if view.status == Status::Down {
        RANK_DOWN
    } else if view.is_stale {
        RANK_STALE
    } else if view.status == Status::Unknown {
        RANK_UNKNOWN
    } else {
        RANK_UP
    }
}

// Sort priority: DOWN, then stale, then UNKNOWN, UP last.
fn severity_rank(view: &ServiceView) -> u8 {
    if view.status == Status::Down {
        0
    } else if view.is_stale {
        1
    } else if view.status == Status::Unknown {
        2
    } else {
        3
    }
}

fn apply_reason(view: &mut ServiceView, class: ReasonClass) {
    let (label, color) = reason::presentation(class);
    view.reason_class = class.name().to_string();
    view.reason_label = label.to_string();
    view.reason_color = color.to_string();
}

fn status_class(status: Status) -> &'static str {
    match status {
        Status::Up => "is-success",
        Status::Down => "is-danger",
        Status::Unknown => "is-dark",
    }
}

fn protocol_class(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Http => "is-info",
        Protocol::Tcp => "is-warning",
        Protocol::Dns => "is-primary",
        Protocol::Ping => "is-success",
    }
}

/// Bucket counts plus the most frequent DOWN reason. A stale service counts
/// toward the stale bucket regardless of its raw status.
pub fn summarize(views: &[ServiceView]) -> BannerSummary {
    let mut summary = BannerSummary::default();
    let mut reason_counts: HashMap<&str, usize> = HashMap::new();

    for v in views {
        if v.status == Status::Down {
            summary.down_count += 1;
        } else if v.is_stale {
            summary.stale_count += 1;
        } else if v.status == Status::Unknown {
            summary.unknown_count += 1;
        } else {
            summary.up_count += 1;
        }

        if v.status == Status::Down && !v.reason_label.is_empty() {
            *reason_counts.entry(v.reason_label.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = reason_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    if let Some((label, count)) = ranked.first() {
        summary.top_reason_label = label.to_string();
        summary.top_reason_count = *count;
    }

    summary.severity_class = if summary.down_count > 0 {
        "is-danger"
    } else if summary.stale_count > 0 {
        "is-warning"
    } else if summary.unknown_count > 0 {
        "is-dark"
    } else {
        "is-success"
    }
    .to_string();

    summary
}
