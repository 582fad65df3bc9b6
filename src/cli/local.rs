use super::{Command, DownloadOptions, report};
use crate::size::format_size;
use miette::IntoDiagnostic;
use serverfiles_cache::{FetchOptions, LocalCache};
use serverfiles_catalog::{Progress, RepositoryPath, SearchOptions};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(super) fn parse_path(path: &str) -> miette::Result<RepositoryPath> {
    path.parse().map_err(report)
}

fn parse_prefix(prefix: Option<&str>) -> miette::Result<Option<RepositoryPath>> {
    prefix.map(parse_path).transpose()
}

/// Prints a percentage to stderr, one tick per whole percent downloaded.
#[derive(Default)]
struct ProgressLine {
    ticks: AtomicU64,
}

impl ProgressLine {
    fn tick(&self) {
        let percent = (self.ticks.fetch_add(1, Ordering::Relaxed) + 1).min(100);
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{percent:>3}%");
        let _ = stderr.flush();
    }

    fn finish(&self) {
        if self.ticks.load(Ordering::Relaxed) > 0 {
            eprintln!();
        }
    }
}

fn fetch_options<'a>(download: DownloadOptions, progress: Option<Progress<'a>>) -> FetchOptions<'a> {
    FetchOptions {
        extract: !download.no_extract,
        progress: if download.progress { progress } else { None },
        ..FetchOptions::default()
    }
}

/// Bytes on disk: a file's length, or the sum over a directory's files.
fn disk_usage(path: &Path) -> u64 {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return 0;
    };
    if !metadata.is_dir() {
        return metadata.len();
    }
    fs::read_dir(path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| disk_usage(&entry.path()))
        .sum()
}

pub(super) fn execute(command: Command, cache: &LocalCache) -> miette::Result<()> {
    let progress = ProgressLine::default();
    let observer = || progress.tick();

    match command {
        Command::List { prefix } => {
            let prefix = parse_prefix(prefix.as_deref())?;
            for path in cache.enumerate(prefix.as_ref()).map_err(report)? {
                let size = disk_usage(&cache.local_path(&path));
                println!("{path}\t{}", format_size(size));
            }
        },
        Command::Info { path } => {
            let metadata = cache.metadata(&parse_path(&path)?).map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&metadata).into_diagnostic()?);
        },
        Command::Get { path, download, no_fetch } => {
            let options = FetchOptions { fetch_if_missing: !no_fetch, ..fetch_options(download, Some(&observer)) };
            let local = cache.resolve(&parse_path(&path)?, &options).map_err(report);
            progress.finish();
            println!("{}", local?.display());
        },
        Command::Fetch { path, download } => {
            let local = cache.fetch(&parse_path(&path)?, &fetch_options(download, Some(&observer))).map_err(report);
            progress.finish();
            println!("{}", local?.display());
        },
        Command::Stale { path } => {
            let stale = cache.is_stale(&parse_path(&path)?);
            println!("{}", if stale { "stale" } else { "current" });
        },
        Command::Update { path, download } => {
            let options = fetch_options(download, Some(&observer));
            let path = parse_prefix(path.as_deref())?;
            let updated = match &path {
                // A cached file is refreshed on its own, anything else is
                // treated as a directory.
                Some(path) if cache.metadata(path).is_ok() => {
                    usize::from(cache.update(path, &options).map_err(report)?)
                },
                prefix => cache.update_all(prefix.as_ref(), &options).map_err(report)?,
            };
            progress.finish();
            println!("{updated} updated");
        },
        Command::Remove { path } => cache.remove(&parse_path(&path)?).map_err(report)?,
        Command::Search { terms, options } => {
            for path in cache.search(terms.as_slice(), &SearchOptions::from(options)).map_err(report)? {
                println!("{path}");
            }
        },
        Command::Remote(command) => return super::remote::execute(command, Arc::clone(cache.catalog())),
    }
    Ok(())
}
