//! Browser request headers.
//!
//! The site serves reduced markup to unknown agents, so every request goes
//! out with a plausible desktop browser's header set. A profile is picked once
//! per session unless the config pins a user agent.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::error::{Error, Result};

/// Headers identifying the client as a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

const CHROME_VERSIONS: &[&str] = &["131.0.0.0", "130.0.0.0", "129.0.0.0", "128.0.0.0"];

const FIREFOX_VERSIONS: &[&str] = &["133.0", "132.0", "131.0"];

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
];

const LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en-US,en;q=0.9,de;q=0.8"];

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

fn pick(options: &'static [&'static str]) -> &'static str {
    options
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(options[0])
}

#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            pick(PLATFORMS),
            pick(CHROME_VERSIONS)
        ),
        accept: HTML_ACCEPT.to_string(),
        accept_language: pick(LANGUAGES).to_string(),
    }
}

#[must_use]
pub fn firefox_profile() -> BrowserProfile {
    let version = pick(FIREFOX_VERSIONS);
    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 ({}; rv:{version}) Gecko/20100101 Firefox/{version}",
            pick(PLATFORMS)
        ),
        accept: HTML_ACCEPT.to_string(),
        accept_language: pick(LANGUAGES).to_string(),
    }
}

/// Chrome three times out of four, Firefox otherwise.
#[must_use]
pub fn random_profile() -> BrowserProfile {
    if rand::thread_rng().gen_bool(0.75) {
        chrome_profile()
    } else {
        firefox_profile()
    }
}

impl BrowserProfile {
    /// Replace the user agent, keeping the rest of the profile.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Convert to default request headers.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let value = |raw: &str| {
            HeaderValue::from_str(raw)
                .map_err(|e| Error::Config(format!("invalid header value {raw:?}: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, value(&self.user_agent)?);
        headers.insert(ACCEPT, value(&self.accept)?);
        headers.insert(ACCEPT_LANGUAGE, value(&self.accept_language)?);
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_profile() {
        let profile = chrome_profile();
        assert!(profile.user_agent.contains("Chrome/"));
    }

    #[test]
    fn test_firefox_profile() {
        let profile = firefox_profile();
        assert!(profile.user_agent.contains("Firefox/"));
        assert!(profile.user_agent.contains("rv:"));
    }

    #[test]
    fn test_headers_conversion() {
        let headers = random_profile().to_headers().unwrap();
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_invalid_user_agent_is_rejected() {
        let profile = chrome_profile().with_user_agent("bad\nagent");
        assert!(matches!(profile.to_headers(), Err(Error::Config(_))));
    }
}
