#![warn(
    clippy::all,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::str_to_string,
    clippy::inefficient_to_string,
    clippy::suspicious
)]

mod api;
mod cli;
mod download;
mod mirror;
mod prefs;

use api::OsuClient;
use clap::Parser;
use cli::{Args, MapSource};
use console::style;
use eyre::Result;
use indicatif::MultiProgress;
use mirror::MirrorClient;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::util::SubscriberInitExt;

pub fn print_red(message: &str) {
    println!("{}", style(message).red())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::FmtSubscriber::builder()
        .with_level(true)
        .with_max_level(level)
        .with_target(false)
        .with_file(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(args.verbose);

    let credentials = prefs::resolve_credentials(&args.env_file)?;
    let folder = prefs::ensure_output_dir(&args.output_dir, args.yes)?;

    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let osu = OsuClient::authenticate(client.clone(), &args.api_url, &credentials).await?;
    let user = osu.get_user(&args.username).await?;

    let ids = match args.source()? {
        MapSource::TopPlays { amount } => osu.get_top_plays(user.id, amount).await?,
        MapSource::UserMaps { kind, amount } => {
            osu.get_user_beatmapsets(user.id, kind, amount).await?
        }
    };
    let ids = download::unique_ids(ids);

    if ids.is_empty() {
        print_red(&format!("No beatmap sets found for {}.", user.username));
        return Ok(());
    }
    info!("Found {} beatmap sets", ids.len());

    let mirror = MirrorClient::new(client, &args.mirror_url);
    let multibar = MultiProgress::new();
    let delay = Duration::from_secs(args.delay);

    let jobs = download::resolve_jobs(&mirror, &ids, &folder, delay, &multibar).await?;
    let written = download::download_all(
        &mirror,
        &jobs,
        delay,
        &multibar,
        |jobs| prefs::confirm_download(jobs, &folder, args.yes),
    )
    .await?;

    if written > 0 {
        println!(
            "{}",
            style(format!(
                "Download Done! {} archives saved to {}",
                written,
                folder.display()
            ))
            .green()
        );
    }

    Ok(())
}
