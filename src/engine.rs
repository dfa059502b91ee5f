use anyhow::{Context, Result};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_ping::{
    Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, SurgeError,
};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{MonitorConfig, Protocol, Service};
use crate::models::{CheckResult, Status};

/// Runs the periodic probe passes and owns the latest-result store, the
/// only shared mutable state in the system.
pub struct Checker {
    config: MonitorConfig,
    http_client: reqwest::Client,
    dns_resolver: TokioResolver,
    ping_client: Option<PingClient>,
    results: RwLock<HashMap<String, CheckResult>>,
}

impl Checker {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("failed to build http client")?;

        let dns_resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!("system resolver config unavailable ({e}), using Cloudflare 1.1.1.1");
                TokioResolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };

        // Without ICMP privileges the engine still runs; ping probes then
        // report DOWN instead of the process refusing to start.
        let ping_client = match PingClient::new(&PingConfig::default()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("ping socket unavailable, ping checks will report DOWN: {e}");
                None
            }
        };

        Ok(Self {
            config,
            http_client,
            dns_resolver,
            ping_client,
            results: RwLock::new(HashMap::new()),
        })
    }

    pub fn services(&self) -> &[Service] {
        &self.config.services
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.config.http_timeout_secs)
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_secs)
    }

    /// Runs one pass immediately, then repeats on the configured interval
    /// forever. Passes are not serialized against each other: the loop never
    /// waits on the probe tasks it spawned, so a hung probe delays only its
    /// own service's freshness.
    pub async fn run(self: Arc<Self>) {
        info!(
            "health engine started: {} services, checking every {}s",
            self.config.services.len(),
            self.config.interval_secs
        );
        loop {
            self.spawn_pass();
            tokio::time::sleep(self.interval()).await;
        }
    }

    /// Dispatches one detached probe task per configured service.
    fn spawn_pass(self: &Arc<Self>) {
        for svc in self.config.services.iter().cloned() {
            let checker = Arc::clone(self);
            tokio::spawn(async move {
                let result = checker.probe(&svc).await;
                checker.store(result).await;
            });
        }
    }

    /// Probes a single service right now, bypassing the schedule, and writes
    /// the result into the store before returning. `false` when the name is
    /// not in the registry; the store is left untouched in that case.
    pub async fn recheck_one(&self, name: &str) -> bool {
        let Some(svc) = self.config.services.iter().find(|s| s.name == name) else {
            return false;
        };
        let result = self.probe(svc).await;
        self.store(result).await;
        true
    }

    /// Runs the protocol-specific probe for one service. Never fails: every
    /// protocol, network, or configuration problem is captured in the
    /// returned result.
    pub async fn probe(&self, svc: &Service) -> CheckResult {
        match svc.protocol {
            Protocol::Http => self.check_http(svc).await,
            Protocol::Tcp => self.check_tcp(svc).await,
            Protocol::Dns => self.check_dns(svc).await,
            Protocol::Ping => self.check_ping(svc).await,
        }
    }

    async fn check_http(&self, svc: &Service) -> CheckResult {
        if svc.url.is_empty() {
            return CheckResult::down(&svc.name, svc.target(), "missing url for http check".into());
        }

        let start = Instant::now();
        match self.http_client.get(&svc.url).send().await {
            Ok(resp) => {
                let status = resp.status();
                // Drain the body so the connection can be reused.
                let _ = resp.bytes().await;
                if status.is_success() || status.is_redirection() {
                    CheckResult::up(&svc.name, svc.target(), start.elapsed())
                } else {
                    CheckResult::down(
                        &svc.name,
                        svc.target(),
                        format!("unexpected status: {status}"),
                    )
                }
            }
            Err(err) => CheckResult::down(&svc.name, svc.target(), error_chain(err)),
        }
    }

    async fn check_tcp(&self, svc: &Service) -> CheckResult {
        if svc.host.is_empty() || svc.port == 0 {
            return CheckResult::down(
                &svc.name,
                svc.target(),
                "missing host or port for tcp check".into(),
            );
        }

        let addr = svc.target();
        let start = Instant::now();
        match timeout(self.probe_timeout(), TcpStream::connect(&addr)).await {
            Ok(Ok(conn)) => {
                drop(conn);
                CheckResult::up(&svc.name, addr, start.elapsed())
            }
            Ok(Err(err)) => CheckResult::down(&svc.name, addr, error_chain(err)),
            Err(_) => CheckResult::down(
                &svc.name,
                addr,
                format!("connect timeout after {}ms", self.probe_timeout().as_millis()),
            ),
        }
    }

    async fn check_dns(&self, svc: &Service) -> CheckResult {
        if svc.host.is_empty() {
            return CheckResult::down(&svc.name, svc.target(), "missing host for dns check".into());
        }

        let start = Instant::now();
        match timeout(self.http_timeout(), self.dns_resolver.lookup_ip(svc.host.as_str())).await {
            Ok(Ok(lookup)) => {
                // A lookup can succeed and still return nothing; that is a
                // failure, distinct from a resolver error.
                if lookup.iter().next().is_none() {
                    CheckResult::down(&svc.name, svc.target(), "no dns records returned".into())
                } else {
                    CheckResult::up(&svc.name, svc.target(), start.elapsed())
                }
            }
            Ok(Err(err)) => CheckResult::down(
                &svc.name,
                svc.target(),
                format!("dns lookup failed: {}", error_chain(err)),
            ),
            Err(_) => CheckResult::down(
                &svc.name,
                svc.target(),
                format!("dns lookup timeout after {}ms", self.http_timeout().as_millis()),
            ),
        }
    }

    async fn check_ping(&self, svc: &Service) -> CheckResult {
        if svc.host.is_empty() {
            return CheckResult::down(&svc.name, svc.target(), "missing host for ping check".into());
        }
        let Some(client) = &self.ping_client else {
            return CheckResult::down(
                &svc.name,
                svc.target(),
                "ping socket unavailable: permission denied".into(),
            );
        };

        let ip = match self.resolve(&svc.host).await {
            Ok(ip) => ip,
            Err(err) => return CheckResult::down(&svc.name, svc.target(), err),
        };

        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.probe_timeout());

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, rtt)) => CheckResult::up(&svc.name, svc.target(), rtt),
            Err(SurgeError::Timeout { .. }) => CheckResult::down(
                &svc.name,
                svc.target(),
                format!("no ping reply within {}ms", self.probe_timeout().as_millis()),
            ),
            Err(err) => CheckResult::down(&svc.name, svc.target(), error_chain(err)),
        }
    }

    async fn resolve(&self, host: &str) -> std::result::Result<IpAddr, String> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        match timeout(self.http_timeout(), self.dns_resolver.lookup_ip(host)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .next()
                .ok_or_else(|| "no dns records returned".to_string()),
            Ok(Err(err)) => Err(format!("dns lookup failed: {}", error_chain(err))),
            Err(_) => Err(format!(
                "dns lookup timeout after {}ms",
                self.http_timeout().as_millis()
            )),
        }
    }

    /// Single-key upsert. Logs status transitions on the way in.
    async fn store(&self, result: CheckResult) {
        let mut results = self.results.write().await;
        let previous = results.get(&result.service_name).map(|r| r.status);
        if previous != Some(result.status) {
            match result.status {
                Status::Down => {
                    warn!("{} is DOWN: {}", result.service_name, result.error);
                }
                Status::Up if previous == Some(Status::Down) => {
                    info!("{} recovered", result.service_name);
                }
                _ => {}
            }
        }
        results.insert(result.service_name.clone(), result);
    }

    /// Whole-map copy taken under the read lock. Callers never observe a
    /// map mid-mutation and never hold the lock while rendering.
    pub async fn snapshot(&self) -> HashMap<String, CheckResult> {
        self.results.read().await.clone()
    }
}

/// Flattens an error and its source chain into one classifiable line.
fn error_chain(err: impl Into<anyhow::Error>) -> String {
    format!("{:#}", err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(services: Vec<Service>) -> MonitorConfig {
        MonitorConfig {
            services,
            interval_secs: 30,
            http_timeout_secs: 1,
            probe_timeout_secs: 1,
            listen_port: 0,
        }
    }

    fn service(name: &str, protocol: Protocol) -> Service {
        Service {
            name: name.to_string(),
            protocol,
            url: String::new(),
            host: String::new(),
            port: 0,
            icon: String::new(),
            category: String::new(),
            description: String::new(),
            depends_on: Vec::new(),
        }
    }

    fn tcp_service(name: &str, host: &str, port: u16) -> Service {
        let mut svc = service(name, Protocol::Tcp);
        svc.host = host.to_string();
        svc.port = port;
        svc
    }

    #[tokio::test]
    async fn recheck_unknown_name_leaves_store_untouched() {
        let checker = Checker::new(test_config(vec![])).unwrap();
        assert!(!checker.recheck_one("does-not-exist").await);
        assert!(checker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn recheck_stores_tcp_result_before_returning() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let checker =
            Checker::new(test_config(vec![tcp_service("db", "127.0.0.1", port)])).unwrap();

        assert!(checker.recheck_one("db").await);

        let snap = checker.snapshot().await;
        let res = snap.get("db").expect("result stored");
        assert_eq!(res.status, Status::Up);
        assert!(res.latency_ms.is_some());
        assert!(res.checked_at.is_some());
        assert!(res.error.is_empty());
    }

    #[tokio::test]
    async fn tcp_refused_connection_is_down_with_raw_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker =
            Checker::new(test_config(vec![tcp_service("db", "127.0.0.1", port)])).unwrap();
        let svc = checker.services()[0].clone();
        let res = checker.probe(&svc).await;

        assert_eq!(res.status, Status::Down);
        assert!(!res.error.is_empty());
        assert!(res.latency_ms.is_none());
    }

    #[tokio::test]
    async fn tcp_without_target_is_immediate_config_error() {
        let checker = Checker::new(test_config(vec![service("db", Protocol::Tcp)])).unwrap();

        assert!(checker.recheck_one("db").await);

        let snap = checker.snapshot().await;
        let res = snap.get("db").unwrap();
        assert_eq!(res.status, Status::Down);
        assert_eq!(res.error, "missing host or port for tcp check");
        assert!(res.latency_ms.is_none());
        assert!(res.checked_at.is_some());
    }

    #[tokio::test]
    async fn http_without_url_is_immediate_config_error() {
        let checker = Checker::new(test_config(vec![service("web", Protocol::Http)])).unwrap();
        let svc = checker.services()[0].clone();
        let res = checker.probe(&svc).await;

        assert_eq!(res.status, Status::Down);
        assert_eq!(res.error, "missing url for http check");
        assert!(res.latency_ms.is_none());
    }

    #[tokio::test]
    async fn dns_without_host_is_immediate_config_error() {
        let checker = Checker::new(test_config(vec![service("ns", Protocol::Dns)])).unwrap();
        let svc = checker.services()[0].clone();
        let res = checker.probe(&svc).await;

        assert_eq!(res.status, Status::Down);
        assert_eq!(res.error, "missing host for dns check");
    }

    #[tokio::test]
    async fn run_performs_an_immediate_first_pass() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let checker =
            Arc::new(Checker::new(test_config(vec![tcp_service("db", "127.0.0.1", port)])).unwrap());

        let handle = tokio::spawn(Arc::clone(&checker).run());

        // The first pass fires without waiting for the 30s interval; poll
        // briefly for its result.
        let mut found = false;
        for _ in 0..50 {
            if !checker.snapshot().await.is_empty() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(found, "first pass should run immediately");
    }

    #[tokio::test]
    async fn snapshot_entries_are_always_whole() {
        let checker = Arc::new(Checker::new(test_config(vec![])).unwrap());

        let mut writers = Vec::new();
        for i in 0..8 {
            let checker = Arc::clone(&checker);
            writers.push(tokio::spawn(async move {
                let name = format!("svc-{i}");
                for round in 0..50 {
                    checker
                        .store(CheckResult::down(&name, name.clone(), format!("err-{round}")))
                        .await;
                }
            }));
        }

        let reader = {
            let checker = Arc::clone(&checker);
            tokio::spawn(async move {
                for _ in 0..50 {
                    for (key, res) in checker.snapshot().await {
                        assert_eq!(key, res.service_name);
                        assert_eq!(res.status, Status::Down);
                        assert!(res.error.starts_with("err-"));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in writers {
            handle.await.unwrap();
        }
        reader.await.unwrap();
    }
}
