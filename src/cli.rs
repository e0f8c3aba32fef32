use clap::{Parser, ValueEnum};
use eyre::{eyre, Result};
use std::path::PathBuf;

/// Download a user's osu! top plays or beatmap sets as .osz archives.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(
    clap::ArgGroup::new("source")
        .required(true)
        .multiple(true)
        .args(["top_plays", "maps_type"])
))]
pub struct Args {
    /// osu! username
    #[arg(long)]
    pub username: String,

    /// Number of top plays to download
    #[arg(long)]
    pub top_plays: Option<usize>,

    /// Type of maps to download
    #[arg(long, value_enum)]
    pub maps_type: Option<MapsType>,

    /// Number of maps to download
    #[arg(long, requires = "maps_type")]
    pub maps_amount: Option<usize>,

    /// Output directory for downloaded files
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// File holding CLIENT_ID and CLIENT_SECRET, created on first run
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Seconds to wait between mirror requests
    #[arg(long, default_value_t = 5)]
    pub delay: u64,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, env = "OSU_API_URL", default_value = "https://osu.ppy.sh", hide = true)]
    pub api_url: String,

    #[arg(long, env = "OSZ_MIRROR_URL", default_value = "https://api.chimu.moe", hide = true)]
    pub mirror_url: String,
}

/// Beatmap set categories listed on a user's profile.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum MapsType {
    Favourite,
    Graveyard,
    Guest,
    Loved,
    MostPlayed,
    Nominated,
    Pending,
    Ranked,
}

impl MapsType {
    /// The name used on the command line, which is also the api path segment.
    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|value| value.get_name().to_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MapSource {
    TopPlays { amount: usize },
    UserMaps { kind: MapsType, amount: Option<usize> },
}

impl Args {
    pub fn source(&self) -> Result<MapSource> {
        match (self.top_plays, self.maps_type) {
            (Some(amount), maps_type) => {
                if maps_type.is_some() {
                    tracing::warn!("Both --top-plays and --maps-type given, only top plays will be downloaded.");
                }
                Ok(MapSource::TopPlays { amount })
            }
            (None, Some(kind)) => Ok(MapSource::UserMaps {
                kind,
                amount: self.maps_amount,
            }),
            (None, None) => Err(eyre!("Nothing to download, pass --top-plays or --maps-type.")),
        }
    }
}
