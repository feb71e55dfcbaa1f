//! CLI command implementations.

pub mod admin;
pub mod inspect;
pub mod records;

use crate::error::{CliError, CliResult};
use recordb_core::{Connection, CoreResult, Factory, UpgradeContext};
use std::path::Path;

/// Opens an existing database at its stored version.
pub(crate) fn connect(root: &Path, name: &str) -> CliResult<(Factory, Connection)> {
    let factory = Factory::on_disk(root);
    let version = stored_version(&factory, name)?;
    let conn = factory.open(name, version, &no_upgrade)?;
    Ok((factory, conn))
}

pub(crate) fn stored_version(factory: &Factory, name: &str) -> CliResult<u64> {
    factory
        .databases()?
        .into_iter()
        .find(|info| info.name == name)
        .map(|info| info.version)
        .ok_or_else(|| CliError::NoSuchDatabase(name.to_string()))
}

fn no_upgrade(_: &mut UpgradeContext) -> CoreResult<()> {
    Ok(())
}
