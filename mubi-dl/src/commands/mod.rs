mod download;
mod keys;
mod options;
mod pssh;
mod search;
mod session;

pub use download::Download;
pub use keys::Keys;
pub use pssh::Pssh;
pub use search::Search;

use clap::{ColorChoice, Parser, Subcommand};

/// Acquire content keys for mubi titles, then download and decrypt their streams.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More detailed logs, repeat for request level tracing.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Download(Download),
    Keys(Keys),
    Pssh(Pssh),
    Search(Search),
}

impl Commands {
    pub fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Download(args) => args.execute(),
            Self::Keys(args) => args.execute(),
            Self::Pssh(args) => args.execute(),
            Self::Search(args) => args.execute(),
        }
    }
}
