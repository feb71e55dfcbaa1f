//! Administrative commands: upgrade, checkpoint, drop.

use super::{connect, stored_version};
use crate::error::{CliError, CliResult};
use recordb_core::{CoreResult, Factory, UpgradeContext};
use std::path::Path;
use tracing::info;

/// Opens `database` at `version`, creating and deleting collections during
/// the upgrade. A database that does not exist yet is created.
pub fn upgrade(
    root: &Path,
    database: &str,
    version: u64,
    create: &[String],
    drop: &[String],
) -> CliResult<()> {
    let create = create
        .iter()
        .map(|spec| parse_collection_spec(spec))
        .collect::<CliResult<Vec<_>>>()?;

    let factory = Factory::on_disk(root);
    if let Ok(stored) = stored_version(&factory, database) {
        if version <= stored {
            return Err(CliError::NotNewer {
                name: database.to_string(),
                stored,
            });
        }
    }

    let handler = |ctx: &mut UpgradeContext| -> CoreResult<()> {
        for name in drop {
            ctx.delete_collection(name)?;
        }
        for (name, key_path) in &create {
            ctx.create_collection(name, key_path)?;
        }
        Ok(())
    };
    let conn = factory.open(database, version, &handler)?;
    info!(database, version, "upgraded");
    println!("{database} is now at version {}", conn.version());
    Ok(())
}

/// Folds the WAL into the segment log.
pub fn checkpoint(root: &Path, database: &str) -> CliResult<()> {
    let (_factory, conn) = connect(root, database)?;
    let sequence = conn.database().checkpoint()?;
    println!("checkpointed {database} at sequence {sequence}");
    Ok(())
}

/// Deletes a database.
pub fn drop_database(root: &Path, database: &str) -> CliResult<()> {
    let factory = Factory::on_disk(root);
    if factory.delete_database(database)? {
        println!("deleted {database}");
        Ok(())
    } else {
        Err(CliError::NoSuchDatabase(database.to_string()))
    }
}

fn parse_collection_spec(spec: &str) -> CliResult<(&str, &str)> {
    match spec.split_once(':') {
        Some((name, key_path)) if !name.is_empty() && !key_path.is_empty() => {
            Ok((name, key_path))
        }
        _ => Err(CliError::CollectionSpec(spec.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::records;
    use tempfile::tempdir;

    #[test]
    fn collection_specs_need_both_parts() {
        assert_eq!(parse_collection_spec("tasks:id").unwrap(), ("tasks", "id"));
        assert_eq!(
            parse_collection_spec("tasks:meta.id").unwrap(),
            ("tasks", "meta.id")
        );
        for bad in ["tasks", ":id", "tasks:"] {
            assert!(matches!(
                parse_collection_spec(bad),
                Err(CliError::CollectionSpec(_))
            ));
        }
    }

    #[test]
    fn upgrade_write_and_drop() {
        let temp = tempdir().unwrap();
        let root = temp.path();

        upgrade(root, "todos", 1, &["tasks:id".to_string()], &[]).unwrap();
        assert!(matches!(
            upgrade(root, "todos", 1, &[], &[]),
            Err(CliError::NotNewer { stored: 1, .. })
        ));

        records::add(root, "todos", "tasks", r#"{"id": 1, "title": "a"}"#).unwrap();
        assert!(records::add(root, "todos", "tasks", r#"{"id": 1}"#).is_err());
        records::put(root, "todos", "tasks", r#"{"id": 1, "title": "b"}"#).unwrap();
        records::delete(root, "todos", "tasks", "1").unwrap();
        checkpoint(root, "todos").unwrap();

        drop_database(root, "todos").unwrap();
        assert!(matches!(
            drop_database(root, "todos"),
            Err(CliError::NoSuchDatabase(_))
        ));
    }
}
