//! Render the digest a feed file would produce, without any network calls.
//! Feed descriptions stand in for summaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use news_digest::ingest::parser::parse_feed;
use news_digest::notify::digest::{DigestBuilder, MIN_MESSAGE_CHARS};
use news_digest::{Article, Category, EnrichedArticle, Source};

#[derive(Parser)]
#[command(name = "digest-preview", about = "Print the Slack messages for an RSS file")]
struct Args {
    /// RSS 2.0 document to render
    feed: PathBuf,

    #[arg(long, default_value = "Technology")]
    category: Category,

    /// Message ceiling in characters
    #[arg(long, default_value_t = 13_000, value_parser = parse_max_chars)]
    max_chars: usize,

    #[arg(long, default_value_t = 5)]
    per_category: usize,
}

fn parse_max_chars(raw: &str) -> Result<usize, String> {
    let n: usize = raw.parse().map_err(|e| format!("{e}"))?;
    if n < MIN_MESSAGE_CHARS {
        return Err(format!("must be at least {MIN_MESSAGE_CHARS}"));
    }
    Ok(n)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let xml = std::fs::read_to_string(&args.feed)
        .with_context(|| format!("reading {}", args.feed.display()))?;
    let now = Utc::now();
    let items = parse_feed(&xml, now)?;

    let enriched: Vec<EnrichedArticle> = items
        .into_iter()
        .map(|it| {
            let mut a = Article::new(Source::VnExpress, args.category, it.title, it.url, it.published_at, now);
            a.summary = it.description.unwrap_or_else(|| "(no description)".to_string());
            EnrichedArticle::plain(a)
        })
        .collect();

    let builder = DigestBuilder::new(args.max_chars, args.per_category);
    let messages = builder.build_messages(&enriched, now);
    for (i, m) in messages.iter().enumerate() {
        println!("----- message {} of {} ({} chars) -----", i + 1, messages.len(), m.chars().count());
        println!("{m}");
    }
    if messages.is_empty() {
        println!("no items to render");
    }
    Ok(())
}
