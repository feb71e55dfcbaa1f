//! Task-list walkthrough.
//!
//! Opens the `todos` database at version 1, upgrades it to version 2 with a
//! `listaTareas` collection keyed by `id`, then inserts, reads, updates,
//! deletes and scans tasks through [`RecordStore`].
//!
//! Pass a directory to keep the database on disk; without one it lives in
//! memory.

use recordb_core::{CoreResult, Factory, KeyedCollection, Record, RecordStore, UpgradeContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DATABASE: &str = "todos";
const COLLECTION: &str = "listaTareas";

fn task(id: &str, title: &str, description: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("titulo", title)
        .with("descripcion", description)
}

fn seed() -> Vec<Record> {
    vec![
        task("tarea_1", "Compras", "Hacer las compras"),
        task("tarea_2", "Estudiar", "Estudiar para el examen"),
        task("tarea_3", "Cocinar", "Hacer la cena"),
        task("tarea_4", "Gimnasio", "Ir al gimnasio por una hora"),
    ]
}

async fn print_all(store: &RecordStore) -> CoreResult<()> {
    let mut stream = store.scan().await?;
    while let Some(record) = stream.next().await {
        let record = record?;
        let field = |name: &str| {
            record
                .get(name)
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string()
        };
        println!("  {:<8} {:<22} {}", field("id"), field("titulo"), field("descripcion"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let factory = match std::env::args_os().nth(1) {
        Some(root) => Factory::on_disk(root),
        None => Factory::in_memory(),
    };

    // Version 1 has no collections yet.
    if !factory.databases()?.iter().any(|info| info.name == DATABASE) {
        let empty = |_: &mut UpgradeContext| -> CoreResult<()> { Ok(()) };
        factory.open(DATABASE, 1, &empty)?.close();
    }

    let store = RecordStore::open(&factory, DATABASE, 2, KeyedCollection::new(COLLECTION, "id"))
        .await?;

    if store.count().await? == 0 {
        let outcome = store.insert_batch(seed()).await?;
        info!(inserted = outcome.inserted, sequence = %outcome.sequence, "seeded tasks");
    }
    println!("All tasks:");
    print_all(&store).await?;

    let first = store.require("tarea_1").await?;
    println!("tarea_1: {first:?}");

    store
        .upsert(task("tarea_2", "Compras Supermercado", "Hacer las compras"))
        .await?;
    info!(id = "tarea_2", "task updated");

    store.remove("tarea_3").await?;
    info!(id = "tarea_3", "task deleted");

    println!("Remaining tasks:");
    print_all(&store).await?;

    store.close();
    Ok(())
}
