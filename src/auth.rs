//! Login form handling and persisted credentials
//!
//! A logged-in session is nothing more than the cookies the site hands out on
//! a successful form login. [`Credentials`] stores that cookie blob so the CLI
//! can reuse it without logging in again; [`login_form`] fills the site's
//! members form from a fetched login page.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::form::Form;
use crate::transport::FormData;

/// Cookie the site sets only for authenticated members.
pub const SESSION_COOKIE: &str = "freeman";

/// Marker of the e-mail 2FA step in the login response.
const TWO_FACTOR_MARKER: &str = "members2faemailhash";

const LOGIN_FORM: &str = "membersform";
const USERNAME_INPUT_ID: &str = "membersusername";

/// The opaque credential blob attached to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Site the cookies belong to.
    pub base_url: String,
    /// `Cookie` header value, `name=value; name=value`.
    pub cookies: String,
}

impl Credentials {
    #[must_use]
    pub fn new(base_url: impl Into<String>, cookies: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cookies: cookies.into(),
        }
    }

    /// Individual `name=value` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.cookies
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
    }

    /// Whether the blob carries a member session.
    pub fn is_member(&self) -> bool {
        self.pairs()
            .any(|pair| pair.split_once('=').is_some_and(|(name, _)| name == SESSION_COOKIE))
    }

    /// Load from `path`; `None` when no session was saved.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create {}: {e}", parent.display())))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .map_err(|e| Error::Config(format!("failed to write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "saved session");
        Ok(())
    }
}

/// Where the CLI keeps the saved session.
#[must_use]
pub fn credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moddb")
        .join("session.json")
}

/// Fill the members login form found on `html`.
///
/// The username input's name changes between page loads and is located by
/// id. The text input without an id is a honeypot and goes out empty.
pub fn login_form(
    html: &str,
    page_url: &str,
    username: &str,
    password: &str,
) -> Result<(String, FormData)> {
    let form = Form::find_by_name(html, LOGIN_FORM)?
        .ok_or_else(|| Error::Parse("login page has no members form".to_string()))?;

    let username_field = form
        .field_by_id(USERNAME_INPUT_ID)
        .ok_or_else(|| Error::Parse("login form has no username input".to_string()))?;

    let mut data: FormData = vec![
        (username_field.name.clone(), username.to_string()),
        ("password".to_string(), password.to_string()),
        ("referer".to_string(), String::new()),
        ("rememberme".to_string(), "1".to_string()),
        ("members".to_string(), "Sign in".to_string()),
    ];
    for field in form.hidden_fields() {
        if !data.iter().any(|(name, _)| *name == field.name) {
            data.push((field.name.clone(), field.value.clone()));
        }
    }
    if let Some(botcatcher) = form
        .fields
        .iter()
        .find(|f| f.kind == "text" && f.id.is_none())
    {
        data.push((botcatcher.name.clone(), String::new()));
    }

    Ok((form.resolve_action(page_url)?, data))
}

/// Interpret the login response.
///
/// `session_cookie` is whether the jar now holds [`SESSION_COOKIE`].
pub fn check_login(body: &str, session_cookie: bool) -> Result<()> {
    if body.contains(TWO_FACTOR_MARKER) {
        return Err(Error::Auth("2FA required".to_string()));
    }
    if !session_cookie {
        return Err(Error::Auth("login failed, check username and password".to_string()));
    }
    Ok(())
}
