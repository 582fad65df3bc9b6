use super::local::parse_path;
use super::{RemoteCommand, report};
use miette::IntoDiagnostic;
use serverfiles_catalog::{CatalogHandle, SearchOptions, SearchSession};

pub(super) fn execute(command: RemoteCommand, catalog: CatalogHandle) -> miette::Result<()> {
    match command {
        RemoteCommand::List { prefix, flat } => {
            let prefix = prefix.as_deref().map(parse_path).transpose()?;
            let mut paths = catalog.list(prefix.as_ref(), !flat).map_err(report)?;
            paths.sort();
            for path in paths {
                println!("{path}");
            }
        },
        RemoteCommand::Info { path } => {
            let metadata = catalog.metadata(&parse_path(&path)?).map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&metadata).into_diagnostic()?);
        },
        RemoteCommand::Search { terms, options } => {
            let session = SearchSession::new(catalog);
            for path in session.search(terms.as_slice(), &SearchOptions::from(options)).map_err(report)? {
                println!("{path}");
            }
        },
    }
    Ok(())
}
