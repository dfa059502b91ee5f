//! Semantic classification of raw probe error text for display.

/// Semantic bucket derived from a raw error message. Never stored; computed
/// on demand from [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonClass {
    None,
    Timeout,
    Dns,
    Conn,
    Permission,
    Tls,
    Http,
    Other,
}

impl ReasonClass {
    pub fn name(self) -> &'static str {
        match self {
            ReasonClass::None => "",
            ReasonClass::Timeout => "TIMEOUT",
            ReasonClass::Dns => "DNS",
            ReasonClass::Conn => "CONN",
            ReasonClass::Permission => "PERMISSION",
            ReasonClass::Tls => "TLS",
            ReasonClass::Http => "HTTP",
            ReasonClass::Other => "OTHER",
        }
    }
}

// Checked top to bottom, first match wins. Order matters: categories
// overlap ("dns" can appear inside an otherwise generic message).
const RULES: &[(ReasonClass, &[&str])] = &[
    (
        ReasonClass::Timeout,
        &["deadline exceeded", "timed out", "timeout"],
    ),
    (
        ReasonClass::Dns,
        &[
            "no such host",
            "failed to lookup",
            "name resolution",
            "no records found",
            "server misbehaving",
            "dns",
        ],
    ),
    (
        ReasonClass::Conn,
        &[
            "connection refused",
            "network is unreachable",
            "no route to host",
            "connection reset",
            "connection aborted",
            "broken pipe",
            "host unreachable",
        ],
    ),
    (
        ReasonClass::Permission,
        &["permission denied", "operation not permitted", "access denied"],
    ),
    (
        ReasonClass::Tls,
        &["certificate", "x509", "handshake", "tls", "ssl"],
    ),
    (
        ReasonClass::Http,
        &["status code", "unexpected status", "http response"],
    ),
];

/// Maps raw error text to a [`ReasonClass`]. Total: every non-empty input
/// lands in exactly one class, the empty string is `None`.
pub fn classify(error: &str) -> ReasonClass {
    let e = error.trim().to_lowercase();
    if e.is_empty() {
        return ReasonClass::None;
    }
    for (class, patterns) in RULES {
        if patterns.iter().any(|p| e.contains(p)) {
            return *class;
        }
    }
    ReasonClass::Other
}

/// Fixed (label, tag color) presentation pair for a reason class.
pub fn presentation(class: ReasonClass) -> (&'static str, &'static str) {
    match class {
        ReasonClass::None => ("", ""),
        ReasonClass::Timeout => ("Timeout", "is-warning"),
        ReasonClass::Dns => ("DNS", "is-warning"),
        ReasonClass::Conn => ("Connect", "is-danger"),
        ReasonClass::Permission => ("Permission", "is-warning"),
        ReasonClass::Tls => ("TLS", "is-warning"),
        ReasonClass::Http => ("HTTP", "is-warning"),
        ReasonClass::Other => ("Other", "is-warning"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_table() {
        let cases = [
            ("", ReasonClass::None),
            ("   ", ReasonClass::None),
            ("context deadline exceeded", ReasonClass::Timeout),
            ("connect timeout after 2000ms", ReasonClass::Timeout),
            ("operation timed out", ReasonClass::Timeout),
            ("lookup proxmox.local: no such host", ReasonClass::Dns),
            (
                "failed to lookup address information: Name or service not known",
                ReasonClass::Dns,
            ),
            ("no records found for query", ReasonClass::Dns),
            ("server misbehaving", ReasonClass::Dns),
            ("connect: connection refused", ReasonClass::Conn),
            ("network is unreachable", ReasonClass::Conn),
            ("connection reset by peer", ReasonClass::Conn),
            ("broken pipe", ReasonClass::Conn),
            ("socket: permission denied", ReasonClass::Permission),
            ("operation not permitted", ReasonClass::Permission),
            ("invalid peer certificate: UnknownIssuer", ReasonClass::Tls),
            ("tls handshake eof", ReasonClass::Tls),
            ("unexpected status: 503 Service Unavailable", ReasonClass::Http),
            ("something completely unexpected happened", ReasonClass::Other),
        ];

        for (input, want) in cases {
            assert_eq!(classify(input), want, "classify({input:?})");
        }
    }

    #[test]
    fn earlier_rules_win_on_overlap() {
        // Contains both a timeout phrase and "dns"; the timeout rule is
        // checked first.
        assert_eq!(classify("dns lookup timeout after 3000ms"), ReasonClass::Timeout);
        // Bare "dns" inside a generic message still classifies as DNS.
        assert_eq!(classify("dns lookup failed: refused to answer"), ReasonClass::Dns);
    }

    #[test]
    fn presentation_pairs() {
        let cases = [
            (ReasonClass::Timeout, "Timeout", "is-warning"),
            (ReasonClass::Dns, "DNS", "is-warning"),
            (ReasonClass::Conn, "Connect", "is-danger"),
            (ReasonClass::Permission, "Permission", "is-warning"),
            (ReasonClass::Tls, "TLS", "is-warning"),
            (ReasonClass::Http, "HTTP", "is-warning"),
            (ReasonClass::Other, "Other", "is-warning"),
            (ReasonClass::None, "", ""),
        ];

        for (class, want_label, want_color) in cases {
            assert_eq!(presentation(class), (want_label, want_color));
        }
    }
}
