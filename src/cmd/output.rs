use anyhow::Result;
use serde::Serialize;

use moddb::{Comment, ResultList, Thumbnail};

use crate::OutputFormat;

#[derive(Serialize)]
struct PageJson<'a, T> {
    page: u32,
    total_pages: u32,
    total_results: u64,
    items: &'a [T],
}

pub fn print_json<T: Serialize>(
    page: u32,
    total_pages: u32,
    total_results: u64,
    items: &[T],
) -> Result<()> {
    let out = PageJson {
        page,
        total_pages,
        total_results,
        items,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub fn print_thumbnails(list: &ResultList<Thumbnail>, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(
            list.current_page(),
            list.total_pages(),
            list.total_results(),
            list.items(),
        );
    }

    for thumbnail in list.iter() {
        print_thumbnail(thumbnail);
    }
    println!(
        "\n(page {}/{}, {} results)",
        list.current_page(),
        list.total_pages(),
        list.total_results()
    );
    Ok(())
}

pub fn print_thumbnail(thumbnail: &Thumbnail) {
    match thumbnail.date {
        Some(date) => println!(
            "[{}] {} ({}) {}",
            thumbnail.kind,
            thumbnail.name,
            date.format("%Y-%m-%d"),
            thumbnail.url
        ),
        None => println!("[{}] {} {}", thumbnail.kind, thumbnail.name, thumbnail.url),
    }
}

pub fn print_comments(list: &ResultList<Comment>, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(
            list.current_page(),
            list.total_pages(),
            list.total_results(),
            list.items(),
        );
    }

    for record in moddb::comments::flatten(list.items()) {
        let indent = "    ".repeat(usize::from(record.depth));
        let mut badges = Vec::new();
        if record.developer {
            badges.push("dev");
        }
        if record.staff {
            badges.push("staff");
        }
        if !record.approved {
            badges.push("pending");
        }
        let badges = if badges.is_empty() {
            String::new()
        } else {
            format!(" [{}]", badges.join(", "))
        };

        println!(
            "{indent}#{} {}{badges} {:+} {}",
            record.id,
            record.author.name,
            record.score.net,
            record.date.format("%Y-%m-%d %H:%M")
        );
        match &record.content {
            Some(text) => {
                for line in text.lines() {
                    println!("{indent}  {line}");
                }
            }
            None => println!("{indent}  <{} embed(s)>", record.embeds.len()),
        }
    }
    println!(
        "\n(page {}/{}, {} comments)",
        list.current_page(),
        list.total_pages(),
        list.total_results()
    );
    Ok(())
}
