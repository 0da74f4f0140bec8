//! # Metastream CLI (`ms`)
//!
//! Upload datasets, wait for their metadata, and browse what the
//! extraction pipeline produced.
//!
//! ## Usage
//!
//! ```bash
//! ms --config ./config/metastream.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ms upload <path>` | Validate and upload a file, then wait for its record |
//! | `ms list` | List records, newest first, hidden ones left out |
//! | `ms show <id>` | Show one record with key phrases and attributes |
//! | `ms hide <file> <record-id>` | Hide a record locally |
//! | `ms unhide <file> <record-id>` | Show a hidden record again |
//! | `ms hidden` | List hidden records |
//! | `ms clear-hidden` | Unhide everything |
//! | `ms reset` | Clear all local state |
//! | `ms delete <id> --yes` | Hard delete (disabled) |
//! | `ms completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Upload and wait for processing
//! ms upload ./foods.csv
//!
//! # Every record mentioning sodium, uploaded in March
//! ms list --search sodium --since 2024-03-01 --until 2024-03-31 --all-pages
//!
//! # Details as JSON, without fetching the object
//! ms show foods.csv --no-content --json
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=metastream=debug` to see poll
//! attempts and page fetches.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use metastream::config;
use metastream::dashboard::{self, ListArgs};
use metastream::progress::ProgressMode;
use metastream::{details, hidden, upload};
use metastream_core::{QueryFilters, SortOrder};

/// Metastream CLI: upload datasets and browse their extracted metadata.
///
/// All commands except `completions` read a TOML configuration file.
/// See `config/metastream.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ms",
    about = "Metastream: upload datasets and browse their extracted metadata",
    version,
    long_about = "Metastream uploads dataset files to S3, waits for the extraction pipeline \
    to write their metadata to DynamoDB, and lists, filters and inspects the resulting records."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/metastream.toml`.
    #[arg(long, global = true, default_value = "./config/metastream.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and wait for its metadata record.
    ///
    /// Only the configured extensions are accepted, up to the configured
    /// size. After the upload the table is polled a bounded number of
    /// times; Ctrl-C stops waiting without affecting the upload.
    Upload {
        /// File to upload.
        path: PathBuf,

        /// Return as soon as the upload finishes.
        #[arg(long)]
        no_wait: bool,

        /// Progress output on stderr: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// List metadata records.
    ///
    /// Loads the first page (or every page with `--all-pages`), merges
    /// revisions of the same upload and leaves hidden records out.
    List {
        /// Case-insensitive match on the file name or metadata.
        #[arg(long)]
        search: Option<String>,

        /// Case-insensitive match on the file name only.
        #[arg(long)]
        filename: Option<String>,

        /// Only records uploaded on or after this date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        since: Option<String>,

        /// Only records uploaded on or before this date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        until: Option<String>,

        /// `upload_time` (newest first) or `filename`. Defaults to `[dashboard].sort`.
        #[arg(long)]
        sort: Option<String>,

        /// Keep loading pages until the table is exhausted.
        #[arg(long)]
        all_pages: bool,

        /// Include hidden records.
        #[arg(long)]
        show_hidden: bool,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show one record: key phrases, attributes and a content preview.
    Show {
        /// Record id or file name.
        id: String,

        /// Do not fetch the object; phrases then come from metadata only.
        #[arg(long)]
        no_content: bool,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Hide a record from `ms list`. Local only; the record is not touched.
    Hide { file_name: String, record_id: String },

    /// Make a hidden record visible again.
    Unhide { file_name: String, record_id: String },

    /// List hidden records as `file::record-id`.
    Hidden {
        #[arg(long)]
        json: bool,
    },

    /// Unhide every record.
    ClearHidden,

    /// Clear all local state.
    Reset,

    /// Hard-delete a record. Currently disabled; always fails.
    Delete {
        id: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ms", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Upload {
            path,
            no_wait,
            progress,
        } => {
            let mode = ProgressMode::from_flag(&progress)?;
            upload::run_upload(&cfg, &path, !no_wait, mode).await?;
        }
        Commands::List {
            search,
            filename,
            since,
            until,
            sort,
            all_pages,
            show_hidden,
            json,
        } => {
            let sort = sort.as_deref().map(str::parse::<SortOrder>).transpose()?;
            let args = ListArgs {
                filters: QueryFilters {
                    filename,
                    search_term: search,
                    date_from: since,
                    date_to: until,
                },
                sort,
                all_pages,
                show_hidden,
                json,
            };
            dashboard::run_list(&cfg, args).await?;
        }
        Commands::Show {
            id,
            no_content,
            json,
        } => {
            details::run_show(&cfg, &id, !no_content, json).await?;
        }
        Commands::Hide {
            file_name,
            record_id,
        } => {
            hidden::run_hide(&cfg, &file_name, &record_id)?;
        }
        Commands::Unhide {
            file_name,
            record_id,
        } => {
            hidden::run_unhide(&cfg, &file_name, &record_id)?;
        }
        Commands::Hidden { json } => {
            hidden::run_list_hidden(&cfg, json)?;
        }
        Commands::ClearHidden => {
            hidden::run_clear_hidden(&cfg)?;
        }
        Commands::Reset => {
            hidden::run_reset(&cfg)?;
        }
        Commands::Delete { id, yes } => {
            dashboard::run_delete(&cfg, &id, yes)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
