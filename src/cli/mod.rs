//! Command-line interface.

mod local;
mod remote;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use miette::IntoDiagnostic;
use serverfiles_cache::{LocalCache, LockTable};
use serverfiles_catalog::{CatalogHandle, HttpCatalog, SearchOptions};
use serverfiles_config::{Config, Overrides};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "serverfiles", version, about)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalOptions,
}

#[derive(Debug, ClapArgs)]
pub struct GlobalOptions {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Local mirror directory.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Base URL of the remote repository.
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// Connection timeout in seconds.
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv). Without it `RUST_LOG` is
    /// honoured.
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl GlobalOptions {
    fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            server: self.server.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }

    /// `None` when no flag was given, deferring to `RUST_LOG`.
    fn log_level(&self) -> Option<LevelFilter> {
        match (self.quiet, self.verbose) {
            (true, _) => Some(LevelFilter::ERROR),
            (false, 0) => None,
            (false, 1) => Some(LevelFilter::INFO),
            (false, 2) => Some(LevelFilter::DEBUG),
            (false, _) => Some(LevelFilter::TRACE),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List files in the local mirror.
    List {
        /// Only entries beneath this directory.
        prefix: Option<String>,
    },
    /// Show the stored metadata of a local file.
    Info { path: String },
    /// Print the local path of a file, downloading it if needed.
    Get {
        path: String,
        #[command(flatten)]
        download: DownloadOptions,
        /// Fail instead of downloading a missing file.
        #[arg(long)]
        no_fetch: bool,
    },
    /// Download a file, replacing any local copy.
    Fetch {
        path: String,
        #[command(flatten)]
        download: DownloadOptions,
    },
    /// Report whether the remote has a newer version of a file.
    Stale { path: String },
    /// Refresh stale files: one file, everything under a directory, or the
    /// whole mirror.
    Update {
        path: Option<String>,
        #[command(flatten)]
        download: DownloadOptions,
    },
    /// Delete a file and its metadata from the local mirror.
    Remove { path: String },
    /// Search the local mirror's tags, titles and names.
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
        #[command(flatten)]
        options: SearchFlags,
    },
    /// Query the remote repository directly.
    #[command(subcommand)]
    Remote(RemoteCommand),
}

#[derive(Debug, Subcommand)]
enum RemoteCommand {
    /// List remote files.
    List {
        prefix: Option<String>,
        /// Only files directly under the prefix.
        #[arg(long)]
        flat: bool,
    },
    /// Show published metadata for a remote file.
    Info { path: String },
    /// Search the remote repository's tags, titles and names.
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
        #[command(flatten)]
        options: SearchFlags,
    },
}

#[derive(Debug, Clone, Copy, ClapArgs)]
struct DownloadOptions {
    /// Store compressed files as published instead of unpacking them.
    #[arg(long)]
    no_extract: bool,
    /// Report download progress on stderr.
    #[arg(long)]
    progress: bool,
}

#[derive(Debug, Clone, Copy, ClapArgs)]
struct SearchFlags {
    #[arg(long)]
    case_sensitive: bool,
    /// Don't match against tags.
    #[arg(long)]
    no_tags: bool,
    /// Don't match against titles.
    #[arg(long)]
    no_title: bool,
    /// Don't match against path segments.
    #[arg(long)]
    no_name: bool,
}

impl From<SearchFlags> for SearchOptions {
    fn from(flags: SearchFlags) -> Self {
        Self {
            case_sensitive: flags.case_sensitive,
            in_tags: !flags.no_tags,
            in_title: !flags.no_title,
            in_name: !flags.no_name,
        }
    }
}

/// Render an error tree (every frame with its location) as a diagnostic.
pub(crate) fn report<E>(err: exn::Exn<E>) -> miette::Report
where
    E: StdError + Send + Sync + 'static,
{
    miette::miette!("{err:?}")
}

fn setup_logging(options: &GlobalOptions) -> miette::Result<()> {
    let filter = match options.log_level() {
        Some(level) => EnvFilter::builder().with_default_directive(level.into()).parse("").into_diagnostic()?,
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env()
            .into_diagnostic()?,
    };
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).without_time();
    tracing_subscriber::registry().with(filter).with(fmt).try_init().into_diagnostic()?;
    Ok(())
}

fn open_catalog(config: &Config) -> miette::Result<CatalogHandle> {
    let mut builder = HttpCatalog::builder().server(&config.server).timeout(config.timeout);
    if let Some((username, password)) = config.credentials() {
        builder = builder.credentials(username, password);
    }
    let catalog = builder.build().map_err(report)?;
    Ok(Arc::new(catalog))
}

pub fn execute() -> miette::Result<()> {
    let args = Args::parse();
    setup_logging(&args.global)?;

    let config = Config::load(args.global.config.as_deref(), &args.global.overrides()).map_err(report)?;
    tracing::debug!(root = %config.root.display(), server = %config.server, "loaded configuration");
    let catalog = open_catalog(&config)?;

    match args.command {
        Command::Remote(command) => remote::execute(command, catalog),
        command => {
            let cache = LocalCache::new(&config.root, catalog, LockTable::new()).map_err(report)?;
            local::execute(command, &cache)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_command_definition() {
        Args::command().debug_assert();
    }

    #[rstest]
    #[case(&["serverfiles", "list"], None)]
    #[case(&["serverfiles", "-q", "list"], Some(LevelFilter::ERROR))]
    #[case(&["serverfiles", "list", "-v"], Some(LevelFilter::INFO))]
    #[case(&["serverfiles", "-vv", "list"], Some(LevelFilter::DEBUG))]
    #[case(&["serverfiles", "-vvvv", "list"], Some(LevelFilter::TRACE))]
    fn test_log_level(#[case] argv: &[&str], #[case] expected: Option<LevelFilter>) {
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.global.log_level(), expected);
    }

    #[test]
    fn test_global_options_become_overrides() {
        let args = Args::try_parse_from([
            "serverfiles",
            "get",
            "GO/taxonomy.pickle",
            "--root",
            "/srv/mirror",
            "--server",
            "http://files.example/",
            "--timeout",
            "9",
            "--username",
            "reader",
        ])
        .unwrap();
        let overrides = args.global.overrides();
        assert_eq!(overrides.root, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(overrides.server.as_deref(), Some("http://files.example/"));
        assert_eq!(overrides.timeout, Some(9));
        assert_eq!(overrides.username.as_deref(), Some("reader"));
        assert_eq!(overrides.password, None);
    }

    #[test]
    fn test_search_flags() {
        let args = Args::try_parse_from(["serverfiles", "remote", "search", "go", "--no-tags", "--case-sensitive"])
            .unwrap();
        let Command::Remote(RemoteCommand::Search { terms, options }) = args.command else {
            panic!("expected remote search");
        };
        assert_eq!(terms, ["go"]);
        let options = SearchOptions::from(options);
        assert!(options.case_sensitive);
        assert!(!options.in_tags);
        assert!(options.in_title);
        assert!(options.in_name);
    }

    #[test]
    fn test_search_requires_terms() {
        assert!(Args::try_parse_from(["serverfiles", "search"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["serverfiles", "-v", "-q", "list"]).is_err());
    }
}
