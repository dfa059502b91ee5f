use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Timeout budget shared by the HTTP and DNS probes.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Timeout budget shared by the TCP and ping probes.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_interval_secs() -> u64 { 30 }
fn default_http_timeout_secs() -> u64 { 3 }
fn default_probe_timeout_secs() -> u64 { 2 }
fn default_listen_port() -> u16 { 3000 }

/// One monitored endpoint. The registry is read once at startup and
/// immutable afterwards.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Service {
    pub name: String,
    #[serde(default, rename = "type")]
    pub protocol: Protocol,
    /// Used by HTTP checks.
    #[serde(default)]
    pub url: String,
    /// Used by TCP, DNS and ping checks.
    #[serde(default)]
    pub host: String,
    /// Used by TCP checks.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Names of direct dependencies, in priority order.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Service {
    /// Display target for this service's probe.
    pub fn target(&self) -> String {
        match self.protocol {
            Protocol::Http => self.url.clone(),
            Protocol::Tcp => format!("{}:{}", self.host, self.port),
            Protocol::Dns | Protocol::Ping => self.host.clone(),
        }
    }
}

/// The closed set of probe protocols. A config value that names none of
/// them falls back to HTTP rather than failing the whole registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Tcp,
    Dns,
    Ping,
}

impl Protocol {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "dns" => Protocol::Dns,
            "ping" => Protocol::Ping,
            _ => Protocol::Http,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Tcp => "TCP",
            Protocol::Dns => "DNS",
            Protocol::Ping => "PING",
        }
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Protocol::from_label(&label))
    }
}
