pub mod browse;
pub mod comments;
pub mod limits;
pub mod login;
pub mod output;
pub mod resolve;

use anyhow::{Context, Result};
use tracing::debug;

use moddb::auth::{credentials_path, Credentials};
use moddb::{Client, ClientConfig, Session};

/// Session from the config file, carrying the saved login if there is one.
pub fn session(config: &ClientConfig) -> Result<Session> {
    let session = Session::with_config(config).context("failed to build HTTP session")?;
    let path = credentials_path();
    match Credentials::load(&path)? {
        Some(credentials) if credentials.base_url == session.base_url() => {
            debug!(path = %path.display(), "using saved session");
            Ok(session.with_credentials(&credentials))
        }
        _ => Ok(session),
    }
}

pub fn client() -> Result<Client> {
    let config = ClientConfig::load().context("failed to load config")?;
    let per_page = config.per_page;
    Ok(Client::with_session(session(&config)?).with_per_page(per_page))
}
