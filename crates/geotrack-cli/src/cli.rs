//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "geotrack")]
#[command(author, version, about = "Record and browse your location history", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "GEOTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides `storage.path` from the config)
    #[arg(long, global = true, env = "GEOTRACK_DB")]
    pub db: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a location update
    Refresh {
        /// Run the update now and wait for its result
        #[arg(short, long)]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(short = 'T', long, default_value = "30", requires = "wait")]
        timeout: u64,
    },

    /// List stored locations, newest first
    #[command(alias = "ls")]
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Maximum number of locations to show
        #[arg(short = 'n', long)]
        limit: Option<u32>,

        /// Only locations captured at or after this time (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Only locations captured at or before this time (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Omit header row in CSV output (useful for appending)
        #[arg(long)]
        no_header: bool,
    },

    /// Follow the stored locations live
    ///
    /// Reads commands from stdin: `r` refresh, `h` toggle history,
    /// `s <id>` select, `x` clear selection, `c` clear error, `q` quit.
    Watch {
        /// Do not run the background worker in this process
        #[arg(long)]
        no_worker: bool,
    },

    /// Run the background worker
    Worker {
        /// Process the currently due work once and exit
        #[arg(long)]
        once: bool,
    },

    /// Show queued location updates
    Jobs {
        /// Maximum number of jobs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Omit header row in CSV output
        #[arg(long)]
        no_header: bool,
    },

    /// Delete every stored location
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Street View thumbnail for a stored location
    ///
    /// Prints the image URL, or downloads the image when `--output` is given.
    Preview {
        /// Location ID (see `geotrack list`)
        id: i64,

        /// Image width in pixels (overrides config)
        #[arg(long)]
        width: Option<u32>,

        /// Image height in pixels (overrides config)
        #[arg(long)]
        height: Option<u32>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list_defaults() {
        let cli = Cli::try_parse_from(["geotrack", "list"]).unwrap();
        match cli.command {
            Commands::List {
                format,
                limit,
                no_header,
                ..
            } => {
                assert_eq!(format, OutputFormat::Text);
                assert_eq!(limit, None);
                assert!(!no_header);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_parse_list_csv_with_limit() {
        let cli = Cli::try_parse_from(["geotrack", "ls", "-f", "csv", "-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                format: OutputFormat::Csv,
                limit: Some(5),
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_requires_wait() {
        assert!(Cli::try_parse_from(["geotrack", "refresh", "--timeout", "5"]).is_err());
        assert!(Cli::try_parse_from(["geotrack", "refresh", "--wait", "--timeout", "5"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["geotrack", "jobs", "--quiet", "--db", "x.db"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
    }

    #[test]
    fn test_preview_requires_id() {
        assert!(Cli::try_parse_from(["geotrack", "preview"]).is_err());
        let cli = Cli::try_parse_from(["geotrack", "preview", "7", "--width", "320"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Preview {
                id: 7,
                width: Some(320),
                height: None
            }
        ));
    }
}
