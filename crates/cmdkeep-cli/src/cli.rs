use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cmdkeep")]
#[command(about = "Keep, search and sync your shell commands")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for token and sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: cmdkeep git log --oneline
    #[arg(trailing_var_arg = true)]
    pub quick: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a new command
    #[command(alias = "new")]
    Add {
        /// Command text
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
        /// Natural-language prompt describing what the command does
        #[arg(short, long)]
        prompt: Option<String>,
        /// Longer description
        #[arg(short, long)]
        description: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List recently updated commands
    List {
        /// Number of commands to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only show favorites
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search commands, prompts, descriptions and tags
    Search {
        /// Search query
        query: String,
        /// Number of commands to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing command (opens $EDITOR when no field is given)
    Edit {
        /// Command ID or unique ID prefix
        id: String,
        /// Replace the command text
        #[arg(long)]
        command: Option<String>,
        /// Replace the prompt
        #[arg(short, long)]
        prompt: Option<String>,
        /// Replace the description (empty clears it)
        #[arg(short, long)]
        description: Option<String>,
        /// Replace the tags (repeatable)
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// Delete a command (synced as a tombstone)
    #[command(alias = "rm")]
    Delete {
        /// Command ID or unique ID prefix
        id: String,
    },
    /// Toggle the favorite flag of a command
    Favorite {
        /// Command ID or unique ID prefix
        id: String,
    },
    /// Print a command and count the use
    Use {
        /// Command ID or unique ID prefix
        id: String,
    },
    /// Export the collection to a JSON file
    Export {
        /// Output path (prompted when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import a JSON export into the collection
    Import {
        /// Input path (prompted when omitted)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// How imported commands combine with existing ones (prompted when omitted)
        #[arg(long, value_enum)]
        mode: Option<ImportModeArg>,
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
    /// Sync the collection with a private GitHub gist
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Answer every conflict the same way instead of asking
        #[arg(long, value_name = "POLICY")]
        policy: Option<String>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the GitHub token used for sync
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ImportModeArg {
    Merge,
    Replace,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync state for the profile
    Status,
    /// Adopt an existing cmdkeep gist from the account
    Link,
    /// Forget the linked gist (the gist itself is kept)
    Unlink,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// GitHub API base URL (for GitHub Enterprise)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Default conflict policy: ask, keep_local or keep_remote
        #[arg(long, value_name = "POLICY")]
        conflict_policy: Option<String>,
        /// HTTP request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the config file path and contents
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a GitHub token (gist scope) in the keychain
    Login {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Token value (prompted when omitted)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },
    /// Show which token the profile would sync with
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Remove the stored token for the profile
    Logout {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
