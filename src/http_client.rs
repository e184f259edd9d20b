use anyhow::{Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::Url;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

const USER_AGENT_ENV: &str = "RISEPROB_USER_AGENT";
const DEFAULT_USER_AGENT: &str = concat!("riseprob/", env!("CARGO_PKG_VERSION"));

fn user_agent() -> String {
    env::var(USER_AGENT_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
}

fn is_loopback(base_url: &str) -> bool {
    Url::parse(base_url)
        .ok()
        .and_then(|url| {
            url.host_str().map(|host| {
                host == "localhost"
                    || host
                        .trim_matches(|c| c == '[' || c == ']')
                        .parse::<IpAddr>()
                        .map_or(false, |ip| ip.is_loopback())
            })
        })
        .unwrap_or(false)
}

/// Blocking client for `base_url`. Loopback endpoints bypass any proxy
/// configured in the environment.
pub fn build_blocking_client(base_url: &str, timeout: Option<Duration>) -> Result<Client> {
    let mut builder: ClientBuilder = Client::builder().user_agent(user_agent());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if is_loopback(base_url) {
        builder = builder.no_proxy();
    }
    builder.build().context("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:8080"));
        assert!(is_loopback("http://localhost/api"));
        assert!(is_loopback("http://[::1]:9000"));
        assert!(!is_loopback("https://query1.finance.yahoo.com"));
        assert!(!is_loopback("not a url"));
    }
}
