//! Crash recovery testing for RecorDB.
//!
//! A [`CrashHarness`] runs a workload on in-memory backends and keeps an
//! image of both logs after every commit. It can then rebuild the database
//! from the WAL cut at any byte offset, the way it would look after a crash
//! during that write.
//!
//! The segment log is written only after a commit's WAL frames are flushed,
//! so a cut inside commit `k` pairs with the segment image from commit
//! `k - 1`. Recovery must land exactly on the last commit whose frames
//! survived the cut.
//!
//! ## Usage
//!
//! ```rust
//! use recordb_testkit::crash::CrashHarness;
//! use recordb_testkit::fixtures::task;
//!
//! let harness = CrashHarness::record(&[vec![task(1)], vec![task(2), task(3)]]).unwrap();
//! for cut in harness.cut_points() {
//!     assert_eq!(harness.recover_at(cut).unwrap(), harness.expected_at(cut));
//! }
//! ```

use crate::fixtures::{tasks_collection, TASKS};
use recordb_core::{
    Config, CoreResult, Database, KeyRange, Manifest, Record, TransactionMode,
};
use recordb_storage::InMemoryBackend;
use std::sync::Arc;

/// State of both logs after one commit.
#[derive(Debug, Clone)]
struct CommitImage {
    wal_len: usize,
    segments: Vec<u8>,
    records: Vec<Record>,
}

/// Records a workload and replays crashes against it.
#[derive(Debug)]
pub struct CrashHarness {
    manifest: Manifest,
    wal: Vec<u8>,
    images: Vec<CommitImage>,
}

impl CrashHarness {
    /// Runs one transaction per batch, putting every record of the batch
    /// into the [`TASKS`] collection.
    pub fn record(batches: &[Vec<Record>]) -> CoreResult<Self> {
        let wal = InMemoryBackend::new();
        let segments = InMemoryBackend::new();
        let db = Arc::new(Database::open_with_backends(
            "crash",
            config(),
            Manifest::default(),
            Box::new(wal.clone()),
            Box::new(segments.clone()),
        )?);
        db.connect(1, &tasks_collection())?;

        let mut images = vec![image(&db, &wal, &segments)?];
        for batch in batches {
            let mut txn = db.transaction(&[TASKS], TransactionMode::ReadWrite)?;
            for record in batch {
                txn.put(TASKS, record)?;
            }
            txn.commit()?;
            images.push(image(&db, &wal, &segments)?);
        }

        Ok(Self {
            manifest: db.manifest(),
            wal: wal.snapshot(),
            images,
        })
    }

    /// Number of commits recorded.
    pub fn commits(&self) -> usize {
        self.images.len() - 1
    }

    /// Every offset the WAL can be cut at, from empty to complete.
    pub fn cut_points(&self) -> impl Iterator<Item = usize> {
        0..=self.wal.len()
    }

    /// Records that must be visible after a crash at `cut`.
    pub fn expected_at(&self, cut: usize) -> Vec<Record> {
        self.images
            .iter()
            .rev()
            .find(|image| image.wal_len <= cut)
            .map(|image| image.records.clone())
            .unwrap_or_default()
    }

    /// Opens the database from the WAL cut at `cut` and returns every
    /// record it recovers, in key order.
    pub fn recover_at(&self, cut: usize) -> CoreResult<Vec<Record>> {
        let cut = cut.min(self.wal.len());
        let segments = self
            .images
            .iter()
            .rev()
            .find(|image| image.wal_len < cut)
            .unwrap_or(&self.images[0])
            .segments
            .clone();

        let db = Arc::new(Database::open_with_backends(
            "crash",
            config(),
            self.manifest.clone(),
            Box::new(InMemoryBackend::with_data(self.wal[..cut].to_vec())),
            Box::new(InMemoryBackend::with_data(segments)),
        )?);
        all_records(&db)
    }
}

fn config() -> Config {
    // Keep every commit in the WAL.
    Config::default().max_wal_size(0).sync_on_commit(false)
}

fn image(
    db: &Arc<Database>,
    wal: &InMemoryBackend,
    segments: &InMemoryBackend,
) -> CoreResult<CommitImage> {
    Ok(CommitImage {
        wal_len: wal.snapshot().len(),
        segments: segments.snapshot(),
        records: all_records(db)?,
    })
}

fn all_records(db: &Arc<Database>) -> CoreResult<Vec<Record>> {
    let mut txn = db.transaction(&[TASKS], TransactionMode::ReadOnly)?;
    txn.get_all(TASKS, &KeyRange::all(), None)
}
