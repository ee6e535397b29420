use anyhow::{Context, Result};

use moddb::auth::credentials_path;
use moddb::ClientConfig;

pub async fn cmd_login(username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => std::env::var("MODDB_PASSWORD")
            .context("No password given. Pass --password or set MODDB_PASSWORD")?,
    };

    let config = ClientConfig::load()?;
    let session = moddb::Session::with_config(&config)?;
    let credentials = session.login(username, &password).await?;

    let path = credentials_path();
    credentials.save(&path)?;
    println!("✅ Logged in as {username}");
    println!("💾 Session saved to {}", path.display());
    Ok(())
}

pub fn cmd_logout() -> Result<()> {
    let path = credentials_path();
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        println!("🗑️  Removed {}", path.display());
    } else {
        println!("No saved session");
    }
    Ok(())
}
