use anyhow::Result;

use super::output::print_comments;
use crate::OutputFormat;

pub async fn cmd_comments(url: &str, page: u32, deleted: bool, format: OutputFormat) -> Result<()> {
    let client = super::client()?;
    let list = client.comments(url, page, deleted).await?;
    print_comments(&list, format)
}
