//! `moddb` CLI - browse listings, read comment threads, check rate limits

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "moddb")]
#[command(about = "Typed access to ModDB listings, comments and pages")]
#[command(version)]
struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List one page of a browse or search listing
    Browse {
        /// Listing URL, e.g. https://www.moddb.com/mods
        url: String,

        /// Keyword search
        #[arg(short, long)]
        keyword: Option<String>,

        /// Extra filter as key=value (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Sort key, e.g. dateup or visitstotal
        #[arg(short, long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Page to show
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Walk every page and print all results
        #[arg(long, conflicts_with = "page")]
        all: bool,
    },

    /// Show a page's comments as threads
    Comments {
        /// Page URL, e.g. https://www.moddb.com/mods/portal-reloaded
        url: String,

        /// Comment page to show
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Include deleted comments (page owners and staff)
        #[arg(long)]
        deleted: bool,
    },

    /// Fetch a page and report what it is
    Resolve {
        /// Page URL
        url: String,
    },

    /// Show the configured rate limits
    Limits,

    /// Log in and save the session for later commands
    Login {
        /// Member name
        username: String,

        /// Password (read from MODDB_PASSWORD when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the saved session
    Logout,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Browse {
            url,
            keyword,
            filters,
            sort,
            desc,
            page,
            all,
        } => {
            let query = cmd::browse::BrowseQuery {
                keyword,
                filters,
                sort,
                desc,
                page,
                all,
            };
            cmd::browse::cmd_browse(&url, query, cli.format).await?;
        }
        Commands::Comments { url, page, deleted } => {
            cmd::comments::cmd_comments(&url, page, deleted, cli.format).await?;
        }
        Commands::Resolve { url } => {
            cmd::resolve::cmd_resolve(&url, cli.format).await?;
        }
        Commands::Limits => {
            cmd::limits::cmd_limits(cli.format)?;
        }
        Commands::Login { username, password } => {
            cmd::login::cmd_login(&username, password).await?;
        }
        Commands::Logout => {
            cmd::login::cmd_logout()?;
        }
    }

    Ok(())
}
