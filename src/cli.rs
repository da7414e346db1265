use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror a website to a relocatable local copy.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl a site starting from an entry URL and write a relocatable mirror to disk.
    Crawl(CrawlArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Entry URL the crawl starts from (also the source of truth for the crawl's origin).
    #[arg(long)]
    pub url: String,

    /// Directory the mirrored site is written to.
    #[arg(long)]
    pub out: PathBuf,

    /// URLs must start with this (case-insensitively) to be admitted; defaults to the output origin.
    #[arg(long)]
    pub required_prefix: Option<String>,

    /// Output site origin, if it differs from `--url`'s origin (composing a mirror under a new host).
    #[arg(long)]
    pub new_website_url: Option<String>,

    /// Prefix rewritten to the output origin wherever it's found in an absolute URL. Repeatable.
    #[arg(long = "rewrite-this-url")]
    pub rewrite_this_urls: Vec<String>,

    /// URL prefix excluded from the crawl; still marked seen, never fetched. Repeatable.
    #[arg(long = "forbidden-url")]
    pub forbidden_urls: Vec<String>,

    /// Extra URL injected into the entry page's resource stack. Repeatable.
    #[arg(long = "scan-this-url")]
    pub scan_this_urls: Vec<String>,

    /// Delay inserted before each fetch, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub pause_ms: u64,

    /// Emit root-relative links instead of relocatable `../`-relative ones.
    #[arg(long)]
    pub no_relocatable: bool,
}
