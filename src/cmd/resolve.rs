use anyhow::Result;

use moddb::extract::page_summary;
use moddb::{Thumbnail, ThumbnailType};

use crate::OutputFormat;

pub async fn cmd_resolve(url: &str, format: OutputFormat) -> Result<()> {
    let kind = ThumbnailType::from_url(url)?;
    let thumbnail = Thumbnail::new(url, url, kind);

    let client = super::client()?;
    let summary = client.resolve(&thumbnail, page_summary).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} ({})", summary.title, summary.kind);
    println!("   URL: {}", summary.url);
    if let Some(description) = &summary.description {
        println!("   {description}");
    }
    if let Some(image) = &summary.image {
        println!("   Image: {image}");
    }
    Ok(())
}
