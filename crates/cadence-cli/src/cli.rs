use std::path::PathBuf;

use cadence_core::sync::RemoteKind;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Songs and setlists, synchronized through a file you own")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage songs
    Song {
        #[command(subcommand)]
        command: SongCommands,
    },
    /// Manage setlists
    Setlist {
        #[command(subcommand)]
        command: SetlistCommands,
    },
    /// Configure the remote document
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Synchronize with the connected remote
    Sync {
        /// Remote to sync with (required when several are connected)
        #[arg(long, global = true, value_enum)]
        remote: Option<RemoteKindArg>,
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Inspect or prune deletion markers
    Tombstones {
        #[command(subcommand)]
        command: TombstoneCommands,
    },
    /// Write the full catalog as a snapshot document
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace the local catalog with a snapshot document
    Import {
        /// Snapshot document to import
        path: PathBuf,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SongCommands {
    /// Add a song
    #[command(alias = "new")]
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: Option<String>,
        /// Musical key, e.g. G or Bbm
        #[arg(long)]
        key: Option<String>,
        /// Tempo in BPM
        #[arg(long)]
        tempo: Option<u32>,
        /// Tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Read ChordPro content from a file
        #[arg(long, value_name = "PATH")]
        content_file: Option<PathBuf>,
    },
    /// List songs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a song
    Edit {
        /// Song ID or unique ID prefix
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        tempo: Option<u32>,
        #[arg(long, value_name = "PATH")]
        content_file: Option<PathBuf>,
    },
    /// Delete a song
    Delete {
        /// Song ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SetlistCommands {
    /// Add a setlist
    #[command(alias = "new")]
    Add {
        #[arg(long)]
        name: String,
        /// Song ID or prefix, in performance order (repeatable)
        #[arg(long = "song", value_name = "ID")]
        songs: Vec<String>,
    },
    /// List setlists
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a setlist
    Delete {
        /// Setlist ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Connect a remote adapter
    Connect {
        #[command(subcommand)]
        target: ConnectCommands,
    },
    /// Forget a remote adapter and its sync baseline
    Disconnect {
        #[arg(value_enum)]
        kind: RemoteKindArg,
    },
    /// Check that the remote is reachable with the stored credentials
    Test {
        #[arg(value_enum)]
        kind: Option<RemoteKindArg>,
    },
}

#[derive(Subcommand)]
pub enum ConnectCommands {
    /// A file in a GitHub repository
    Github {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        repo: String,
        /// Path of the document inside the repository
        #[arg(long, default_value = cadence_core::sync::config::DEFAULT_DOCUMENT_NAME)]
        path: String,
        #[arg(long)]
        branch: Option<String>,
        /// Personal access token (or CADENCE_GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// API base URL for GitHub Enterprise
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
    },
    /// A file in Dropbox
    Dropbox {
        /// Absolute Dropbox path, e.g. /Apps/Cadence/cadence.json
        #[arg(long)]
        path: String,
        /// App key (or CADENCE_DROPBOX_APP_KEY)
        #[arg(long)]
        app_key: Option<String>,
        /// OAuth refresh token (or CADENCE_DROPBOX_REFRESH_TOKEN)
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// A file on a local or mounted filesystem
    File {
        #[arg(long)]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Apply remote changes, then choose which local changes to push
    Review {
        /// Push one outgoing change, as TYPE:ID or TYPE:PREFIX (repeatable)
        #[arg(long = "select", value_name = "TYPE:ID")]
        select: Vec<String>,
        /// Push every outgoing change
        #[arg(long, conflicts_with_all = ["select", "none"])]
        all: bool,
        /// Push nothing; only record that the remote was reviewed
        #[arg(long, conflicts_with = "select")]
        none: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show connected remotes and local counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TombstoneCommands {
    /// List retained deletion markers
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop deletion markers past the retention window
    Prune,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config (uses --profile and --db-path)
    Init {
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RemoteKindArg {
    Github,
    Dropbox,
    File,
}

impl From<RemoteKindArg> for RemoteKind {
    fn from(value: RemoteKindArg) -> Self {
        match value {
            RemoteKindArg::Github => Self::GitHub,
            RemoteKindArg::Dropbox => Self::Dropbox,
            RemoteKindArg::File => Self::File,
        }
    }
}
