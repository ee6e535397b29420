//! reqwest-backed session
//!
//! [`Session`] is the real [`Transport`]: one connection pool, one cookie jar
//! holding the member credentials, browser request headers, and the shared
//! throttle and global limiters in front of every request it sends.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::{self, Credentials, SESSION_COOKIE};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::fingerprint::{random_profile, BrowserProfile};
use crate::ratelimit::Limiters;
use crate::transport::{Document, FormData, QueryParams, Transport};

/// Text the site shows instead of content that moderators haven't approved.
const AWAITING_AUTHORISATION: &str =
    "is currently awaiting authorisation, which can take a couple of days while a";

/// Reject pages that render a moderation notice instead of their content.
///
/// The notice is matched ignoring ASCII case.
pub fn check_page(url: &str, html: &str) -> Result<()> {
    if html.to_ascii_lowercase().contains(AWAITING_AUTHORISATION) {
        return Err(Error::AwaitingAuthorisation {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Cookie store that can be emptied while the client keeps using it.
#[derive(Debug, Default)]
struct SessionCookies {
    jar: RwLock<Arc<Jar>>,
}

impl SessionCookies {
    fn current(&self) -> Arc<Jar> {
        Arc::clone(&self.jar.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn add(&self, pair: &str, url: &Url) {
        self.current().add_cookie_str(pair, url);
    }

    fn clear(&self) {
        *self.jar.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Jar::default());
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.current().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.current().cookies(url)
    }
}

/// HTTP session against one ModDB deployment
pub struct Session {
    client: Client,
    jar: Arc<SessionCookies>,
    base_url: Url,
    limits: Limiters,
    profile: BrowserProfile,
}

impl Session {
    /// Session with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(&ClientConfig::default())
    }

    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let mut profile = random_profile();
        if let Some(user_agent) = &config.user_agent {
            profile = profile.with_user_agent(user_agent);
        }
        let jar = Arc::new(SessionCookies::default());

        let client = Client::builder()
            // ═══════════════════════════════════════════════════════════════
            // TLS & COMPRESSION
            // ═══════════════════════════════════════════════════════════════
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            // ═══════════════════════════════════════════════════════════════
            // BROWSER HEADERS
            // ═══════════════════════════════════════════════════════════════
            .default_headers(profile.to_headers()?)
            // ═══════════════════════════════════════════════════════════════
            // TIMEOUTS
            // ═══════════════════════════════════════════════════════════════
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            // ═══════════════════════════════════════════════════════════════
            // REDIRECTS & COOKIES
            // ═══════════════════════════════════════════════════════════════
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            base_url: Url::parse(&config.base_url)?,
            limits: Limiters::from_config(&config.limits),
            profile,
        })
    }

    /// Attach saved credentials to every following request.
    #[must_use]
    pub fn with_credentials(self, credentials: &Credentials) -> Self {
        for pair in credentials.pairs() {
            self.jar.add(pair, &self.base_url);
        }
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn limits(&self) -> &Limiters {
        &self.limits
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Current cookies for the site, if any were set.
    pub fn credentials(&self) -> Option<Credentials> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?.to_string();
        Some(Credentials::new(self.base_url(), cookies))
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials().is_some_and(|c| c.is_member())
    }

    /// Drop every cookie, ending any member session.
    pub fn clear_cookies(&self) {
        self.jar.clear();
    }

    /// Log in with the members form.
    ///
    /// Guarded by the login limiter on top of the usual request limiters.
    /// Starts from an empty cookie jar, so only a session cookie set by this
    /// login counts. Fails with [`Error::Auth`] on bad credentials or when the
    /// account needs e-mail 2FA.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials> {
        self.limits.login.call().await?;
        self.clear_cookies();

        let login_url = format!("{}/members/login", self.base_url());
        let page = self.get(&login_url, &QueryParams::new()).await?;
        let (action, form) = auth::login_form(page.html(), page.url(), username, password)?;

        let body = self.post(&action, &form).await?;
        auth::check_login(&body, self.is_logged_in())?;
        info!("logged in");

        self.credentials().ok_or_else(|| {
            Error::Auth(format!("no {SESSION_COOKIE} cookie after login"))
        })
    }

    /// Send a prepared request and read the body, mapping error statuses.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<(Url, String)> {
        self.limits.request().await?;

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        debug!(%status, final_url = %final_url, "response received");

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            warn!(%status, "request failed");
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok((final_url, response.text().await?))
    }
}

#[async_trait]
impl Transport for Session {
    #[instrument(skip(self, params), fields(params = %params.encode()))]
    async fn get(&self, url: &str, params: &QueryParams) -> Result<Document> {
        let query: Vec<(&str, &str)> = params.iter().collect();
        let (final_url, html) = self.send(self.client.get(url).query(&query), url).await?;
        check_page(final_url.as_str(), &html)?;
        Ok(Document::new(final_url.as_str(), html))
    }

    #[instrument(skip(self, form), fields(fields = form.len()))]
    async fn post(&self, url: &str, form: &FormData) -> Result<String> {
        let (_, body) = self.send(self.client.post(url).form(form), url).await?;
        Ok(body)
    }
}
