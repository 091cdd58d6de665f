//! Outbound destination checks for network node units.
//!
//! Every address a URL's host resolves to must be publicly routable unless
//! the policy allows private networks. Loopback, private, link-local, shared
//! (CGNAT), unspecified, broadcast, multicast, documentation and other
//! reserved ranges are rejected, including IPv4 addresses embedded in IPv6.
//!
//! The same rule is enforced inside the HTTP client: redirect hops to
//! non-public literals are refused, and host names are resolved through
//! [`PublicResolver`] so the connection uses only addresses that passed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use dagflow_core::NodeError;
use reqwest::Url;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;

const MAX_REDIRECTS: usize = 10;

/// Which destinations network nodes may reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgressPolicy {
    pub allow_private_network: bool,
}

impl EgressPolicy {
    pub fn new(allow_private_network: bool) -> Self {
        Self {
            allow_private_network,
        }
    }

    /// Parse `raw` and verify its scheme and every resolved address.
    pub async fn check_url(&self, raw: &str) -> Result<Url, NodeError> {
        let url = Url::parse(raw).map_err(|e| NodeError::invalid_config(format!("invalid url '{raw}': {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(NodeError::invalid_config(format!(
                    "unsupported url scheme '{other}'"
                )));
            }
        }

        if self.allow_private_network {
            return Ok(url);
        }

        let host = url
            .host_str()
            .ok_or_else(|| NodeError::invalid_config(format!("url '{raw}' has no host")))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let bare = bare_host(host);
        let addrs: Vec<IpAddr> = match literal_ip(host) {
            Some(ip) => vec![ip],
            None => tokio::net::lookup_host((bare, port))
                .await
                .map_err(|e| NodeError::failed(format!("failed to resolve '{host}': {e}")))?
                .map(|addr| addr.ip())
                .collect(),
        };

        if addrs.is_empty() {
            return Err(NodeError::failed(format!("'{host}' did not resolve")));
        }
        if let Some(blocked) = addrs.iter().find(|ip| !is_public(ip)) {
            tracing::warn!(host, address = %blocked, "blocked outbound request to non-public address");
            return Err(NodeError::failed(format!(
                "destination '{host}' resolves to non-public address {blocked}"
            )));
        }
        Ok(url)
    }

    /// Enforce this policy inside a client: every redirect hop and every
    /// name the client resolves is held to the same rule as [`check_url`].
    ///
    /// [`check_url`]: EgressPolicy::check_url
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        if self.allow_private_network {
            return builder;
        }
        builder
            .redirect(redirect::Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
                }
                match redirect_violation(attempt.url()) {
                    Some(reason) => attempt.error(reason),
                    None => attempt.follow(),
                }
            }))
            .dns_resolver(Arc::new(PublicResolver))
    }
}

/// Why a redirect to `url` must not be followed. Names are left to the
/// resolver; only the scheme and IP literals are judged here.
fn redirect_violation(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Some(format!("redirect to unsupported scheme '{}'", url.scheme()));
    }
    let ip = url.host_str().and_then(literal_ip)?;
    if is_public(&ip) {
        return None;
    }
    tracing::warn!(url = %url, "blocked redirect to non-public address");
    Some(format!("redirect to non-public address {ip}"))
}

/// IPv6 literals keep their brackets in `host_str`.
fn bare_host(host: &str) -> &str {
    host.trim_start_matches('[').trim_end_matches(']')
}

fn literal_ip(host: &str) -> Option<IpAddr> {
    bare_host(host).parse().ok()
}

/// DNS resolver that fails any name resolving to a non-public address.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let resolved: Result<Addrs, Box<dyn std::error::Error + Send + Sync>> =
                match resolve_public(&host).await {
                    Ok(addrs) => Ok(Box::new(addrs.into_iter())),
                    Err(e) => Err(e.into()),
                };
            resolved
        })
    }
}

/// Resolve `host`, refusing the lookup when any address is non-public.
pub async fn resolve_public(host: &str) -> Result<Vec<SocketAddr>, NodeError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| NodeError::failed(format!("failed to resolve '{host}': {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(NodeError::failed(format!("'{host}' did not resolve")));
    }
    if let Some(blocked) = addrs.iter().find(|addr| !is_public(&addr.ip())) {
        tracing::warn!(host, address = %blocked.ip(), "blocked resolution to non-public address");
        return Err(NodeError::failed(format!(
            "'{host}' resolves to non-public address {}",
            blocked.ip()
        )));
    }
    Ok(addrs)
}

/// Whether `ip` is globally routable.
pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let reserved = ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (64..128).contains(&b))
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19))
        // 240.0.0.0/4 reserved
        || a >= 240;
    !reserved
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }
    let segments = ip.segments();
    let reserved = ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
        // 64:ff9b::/96 NAT64 embeds an IPv4 destination
        || (segments[0] == 0x0064 && segments[1] == 0xff9b && !is_public_v4(&embedded_v4(&segments)))
        // ::/96 IPv4-compatible
        || segments[..6].iter().all(|s| *s == 0);
    !reserved
}

fn embedded_v4(segments: &[u16; 8]) -> Ipv4Addr {
    let [hi, lo] = [segments[6], segments[7]];
    Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_public_addresses() {
        for addr in ["8.8.8.8", "1.1.1.1", "2606:4700:4700::1111", "93.184.216.34"] {
            assert!(is_public(&ip(addr)), "{addr} should be public");
        }
    }

    #[test]
    fn test_reserved_addresses() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "224.0.0.1",
            "192.0.2.10",
            "198.18.0.1",
            "::1",
            "::",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
            "::ffff:10.0.0.1",
            "64:ff9b::a00:1",
            "2001:db8::1",
        ] {
            assert!(!is_public(&ip(addr)), "{addr} should be blocked");
        }
    }

    #[tokio::test]
    async fn test_check_url_blocks_private_literal() {
        let policy = EgressPolicy::default();
        let err = policy.check_url("http://127.0.0.1:8080/admin").await.unwrap_err();
        assert!(err.to_string().contains("non-public"));

        let err = policy.check_url("http://[::1]/").await.unwrap_err();
        assert!(err.to_string().contains("non-public"));
    }

    #[tokio::test]
    async fn test_check_url_allows_private_when_configured() {
        let policy = EgressPolicy::new(true);
        let url = policy.check_url("http://127.0.0.1:8080/admin").await.unwrap();
        assert_eq!(url.port(), Some(8080));
    }

    #[tokio::test]
    async fn test_check_url_rejects_bad_input() {
        let policy = EgressPolicy::new(true);
        assert!(matches!(
            policy.check_url("not a url").await,
            Err(NodeError::InvalidConfig(_))
        ));
        assert!(matches!(
            policy.check_url("file:///etc/passwd").await,
            Err(NodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_redirect_violation() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert!(redirect_violation(&url("http://127.0.0.1:9000/")).is_some());
        assert!(redirect_violation(&url("http://169.254.169.254/latest")).is_some());
        assert!(redirect_violation(&url("http://[::1]/")).is_some());
        assert!(redirect_violation(&url("ftp://8.8.8.8/")).is_some());
        assert!(redirect_violation(&url("https://8.8.8.8/")).is_none());
        assert!(redirect_violation(&url("https://example.com/next")).is_none());
    }

    #[tokio::test]
    async fn test_resolver_refuses_loopback_names() {
        let err = resolve_public("localhost").await.unwrap_err();
        assert!(matches!(err, NodeError::Failed(_)));
    }

    #[tokio::test]
    async fn test_check_url_resolves_localhost() {
        let policy = EgressPolicy::default();
        assert!(policy.check_url("http://localhost/").await.is_err());
    }
}
