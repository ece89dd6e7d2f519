//! List command.

use std::path::PathBuf;

use crate::cli::{output, session};
use crate::core::secrets;
use crate::error::Result;

/// Print secret names, sorted, one per line.
pub fn execute(filename: Option<PathBuf>, json: bool) -> Result<()> {
    let store = session::store(filename)?;
    let names = secrets::list_names(&store)?;

    if json {
        return output::json(&names);
    }
    if names.is_empty() {
        output::dimmed("no secrets stored");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}
