//! Healthcheck-style heartbeat: GET the URL on success, `<url>/fail` on
//! failure.

use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub fn send(url: &str, success: bool) -> Result<(), reqwest::Error> {
    let client = reqwest::blocking::Client::builder()
        .timeout(PING_TIMEOUT)
        .build()?;
    client.get(ping_url(url, success)).send()?.error_for_status()?;
    Ok(())
}

fn ping_url(url: &str, success: bool) -> String {
    if success {
        url.to_string()
    } else {
        format!("{}/fail", url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_url() {
        assert_eq!(ping_url("https://hc.example/abc", true), "https://hc.example/abc");
        assert_eq!(ping_url("https://hc.example/abc/", false), "https://hc.example/abc/fail");
    }
}
