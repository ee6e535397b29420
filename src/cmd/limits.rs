use anyhow::Result;
use serde::Serialize;

use moddb::config::config_path;
use moddb::{ClientConfig, LimitMode, Limiters, RateLimiter};

use crate::OutputFormat;

#[derive(Serialize)]
struct LimitRow<'a> {
    name: &'a str,
    rate: u32,
    window_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sleep_ceiling_secs: Option<f64>,
}

impl<'a> From<&'a RateLimiter> for LimitRow<'a> {
    fn from(limiter: &'a RateLimiter) -> Self {
        let sleep_ceiling_secs = match limiter.mode() {
            LimitMode::Block { ceiling } => Some(ceiling.as_secs_f64()),
            LimitMode::FailFast => None,
        };
        Self {
            name: limiter.name(),
            rate: limiter.rate(),
            window_secs: limiter.window().as_secs_f64(),
            sleep_ceiling_secs,
        }
    }
}

pub fn cmd_limits(format: OutputFormat) -> Result<()> {
    let config = ClientConfig::load()?;
    let limiters = Limiters::from_config(&config.limits);
    let rows: Vec<LimitRow<'_>> = limiters.all().into_iter().map(LimitRow::from).collect();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Rate limits ({})", config_path().display());
    for row in &rows {
        let policy = match row.sleep_ceiling_secs {
            Some(ceiling) => format!("waits up to {ceiling}s"),
            None => "fails fast".to_string(),
        };
        println!(
            "   {:<9} {:>3} calls / {:>5}s, {policy}",
            row.name, row.rate, row.window_secs
        );
    }
    Ok(())
}
