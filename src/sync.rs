// Batched task synchronizer: the pure core behind the task import/update
// flows. It talks to the platform only through the `TaskStore` trait and
// never prompts or prints; the interactive shell in `ui` gathers
// confirmations beforehand and renders the outcome afterwards.

use serde_json::Value;
use thiserror::Error;

/// One unit of input data: an arbitrary JSON object destined for the remote
/// project, either as a new task or as replacement data for an existing one.
/// Records carry no identifier of their own; their identity is their position
/// in the input sequence.
pub type Record = Value;

/// A task already present in the remote project, addressable by id.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteTask {
    pub id: i64,
    #[serde(default)]
    pub data: Value,
}

/// Any failure reported by the remote platform: network, auth, validation,
/// not-found. The client flattens them all into a message; the synchronizer
/// only needs to record and carry them, not distinguish them.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        RemoteError {
            message: message.into(),
        }
    }
}

/// The capability the synchronizer requires of a remote task collection.
/// `ApiClient` implements this against the real platform; tests plug in an
/// in-memory store.
pub trait TaskStore {
    /// All tasks of the project, in the platform's listing order. The order
    /// must hold still for the duration of one run; update mode pairs input
    /// records against it by position.
    fn list_tasks(&self, project_id: i64) -> Result<Vec<RemoteTask>, RemoteError>;

    /// Create one batch of new tasks in a single call. Fails or succeeds as
    /// a whole.
    fn import_tasks(&self, project_id: i64, batch: &[Record]) -> Result<(), RemoteError>;

    /// Replace the data of one existing task.
    fn update_task(&self, task_id: i64, data: &Record) -> Result<(), RemoteError>;
}

/// Whether records become new tasks or overwrite existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Create,
    Update,
}

/// A progress event, emitted synchronously after each batch. `processed` is
/// the number of input positions covered so far, which in create mode only
/// advances on successful batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

/// The unit a recorded failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedUnit {
    /// A whole create-mode batch, by batch index.
    Batch(usize),
    /// A single update call, by remote task id.
    Task(i64),
    /// An input position with no remote task to pair against.
    Unmatched(usize),
}

#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub unit: FailedUnit,
    pub message: String,
}

/// Update mode found a different number of remote tasks than input records.
/// Recorded as a warning, never a hard failure; the shell asks the operator
/// before starting a mismatched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardinalityMismatch {
    pub records: usize,
    pub remote: usize,
}

/// Aggregate result of one synchronization run. Counts are in tasks, not
/// batches; `failures` keeps the order in which things went wrong. Nothing
/// is ever rolled back.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
    pub cardinality_mismatch: Option<CardinalityMismatch>,
}

/// Batch size is 5% of the input, with a floor of one.
pub fn batch_size(total: usize) -> usize {
    (total / 20).max(1)
}

/// Push `records` into a project, in order, in fixed-size batches.
///
/// Create mode issues one `import_tasks` call per batch; a failed batch is
/// recorded and the run moves on to the next one, so the remote project can
/// end up partially filled. Re-running create mode over the same input
/// duplicates tasks; the platform does not deduplicate.
///
/// Update mode lists the project's tasks once and pairs input position `i`
/// with listed position `i`. This is only sound when the listing order is
/// stable and both sequences were produced the same way; a count mismatch is
/// recorded in the outcome and surplus input positions are skipped, not
/// created. Only a failure of that initial listing aborts the run — every
/// per-batch and per-task failure is swallowed into the outcome.
///
/// Empty input is a successful no-op: no remote call is made.
pub fn synchronize<S, F>(
    store: &S,
    project_id: i64,
    records: &[Record],
    mode: SyncMode,
    mut on_progress: F,
) -> Result<SyncOutcome, RemoteError>
where
    S: TaskStore,
    F: FnMut(Progress),
{
    let mut outcome = SyncOutcome::default();
    if records.is_empty() {
        return Ok(outcome);
    }

    let total = records.len();
    let size = batch_size(total);

    match mode {
        SyncMode::Create => {
            for (batch_index, batch) in records.chunks(size).enumerate() {
                match store.import_tasks(project_id, batch) {
                    Ok(()) => {
                        outcome.processed += batch.len();
                        on_progress(Progress {
                            processed: outcome.processed,
                            total,
                        });
                    }
                    Err(err) => {
                        outcome.failed += batch.len();
                        outcome.failures.push(SyncFailure {
                            unit: FailedUnit::Batch(batch_index),
                            message: err.message,
                        });
                    }
                }
            }
        }
        SyncMode::Update => {
            // The one call without which nothing below makes sense; its
            // failure is the only hard failure of the run.
            let existing = store.list_tasks(project_id)?;
            if existing.len() != total {
                outcome.cardinality_mismatch = Some(CardinalityMismatch {
                    records: total,
                    remote: existing.len(),
                });
            }

            for (batch_index, batch) in records.chunks(size).enumerate() {
                let start = batch_index * size;
                for (offset, record) in batch.iter().enumerate() {
                    let index = start + offset;
                    match existing.get(index) {
                        Some(task) => match store.update_task(task.id, record) {
                            Ok(()) => outcome.processed += 1,
                            Err(err) => {
                                outcome.failed += 1;
                                outcome.failures.push(SyncFailure {
                                    unit: FailedUnit::Task(task.id),
                                    message: err.message,
                                });
                            }
                        },
                        None => {
                            outcome.skipped += 1;
                            outcome.failures.push(SyncFailure {
                                unit: FailedUnit::Unmatched(index),
                                message: "no remote task at this position".into(),
                            });
                        }
                    }
                }
                // Batches only pace the reporting here; the calls above went
                // out one task at a time.
                on_progress(Progress {
                    processed: start + batch.len(),
                    total,
                });
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// In-memory store with programmable failures. Counts every call so
    /// tests can assert what went over the wire.
    #[derive(Default)]
    struct FakeStore {
        existing: Vec<RemoteTask>,
        fail_listing: bool,
        fail_batches: HashSet<usize>,
        fail_tasks: HashSet<i64>,
        list_calls: RefCell<usize>,
        import_calls: RefCell<usize>,
        imported: RefCell<Vec<Vec<Record>>>,
        updated: RefCell<Vec<(i64, Record)>>,
    }

    impl FakeStore {
        fn with_existing(ids: &[i64]) -> Self {
            FakeStore {
                existing: ids
                    .iter()
                    .map(|&id| RemoteTask {
                        id,
                        data: Value::Null,
                    })
                    .collect(),
                ..FakeStore::default()
            }
        }
    }

    impl TaskStore for FakeStore {
        fn list_tasks(&self, _project_id: i64) -> Result<Vec<RemoteTask>, RemoteError> {
            *self.list_calls.borrow_mut() += 1;
            if self.fail_listing {
                return Err(RemoteError::new("listing refused"));
            }
            Ok(self.existing.clone())
        }

        fn import_tasks(&self, _project_id: i64, batch: &[Record]) -> Result<(), RemoteError> {
            let call = *self.import_calls.borrow();
            *self.import_calls.borrow_mut() += 1;
            if self.fail_batches.contains(&call) {
                return Err(RemoteError::new("batch rejected"));
            }
            self.imported.borrow_mut().push(batch.to_vec());
            Ok(())
        }

        fn update_task(&self, task_id: i64, data: &Record) -> Result<(), RemoteError> {
            if self.fail_tasks.contains(&task_id) {
                return Err(RemoteError::new("update rejected"));
            }
            self.updated.borrow_mut().push((task_id, data.clone()));
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| json!({ "text": format!("item {}", i) })).collect()
    }

    #[test]
    fn batch_size_is_five_percent_with_a_floor_of_one() {
        assert_eq!(batch_size(3), 1);
        assert_eq!(batch_size(19), 1);
        assert_eq!(batch_size(20), 1);
        assert_eq!(batch_size(21), 1);
        assert_eq!(batch_size(40), 2);
        assert_eq!(batch_size(47), 2);
        assert_eq!(batch_size(100), 5);
    }

    #[test]
    fn create_partitions_the_input_exactly_once_in_order() {
        let store = FakeStore::default();
        let input = records(47);
        let mut events = Vec::new();

        let outcome =
            synchronize(&store, 1, &input, SyncMode::Create, |p| events.push(p)).unwrap();

        assert_eq!(outcome.processed, 47);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.failures.is_empty());

        // 23 batches of 2 and a final batch of 1.
        let batches = store.imported.borrow();
        assert_eq!(batches.len(), 24);
        assert!(batches[..23].iter().all(|b| b.len() == 2));
        assert_eq!(batches[23].len(), 1);

        let replayed: Vec<Record> = batches.iter().flatten().cloned().collect();
        assert_eq!(replayed, input);

        assert_eq!(events.len(), 24);
        assert_eq!(
            events.last(),
            Some(&Progress {
                processed: 47,
                total: 47
            })
        );
    }

    #[test]
    fn create_uses_singleton_batches_for_small_inputs() {
        let store = FakeStore::default();
        let outcome = synchronize(&store, 1, &records(3), SyncMode::Create, |_| {}).unwrap();

        assert_eq!(outcome.processed, 3);
        assert_eq!(store.imported.borrow().len(), 3);
        assert!(store.imported.borrow().iter().all(|b| b.len() == 1));
    }

    #[test]
    fn create_records_a_failed_batch_and_keeps_going() {
        let store = FakeStore {
            fail_batches: HashSet::from([3]),
            ..FakeStore::default()
        };
        let outcome = synchronize(&store, 1, &records(47), SyncMode::Create, |_| {}).unwrap();

        assert_eq!(outcome.processed, 45);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].unit, FailedUnit::Batch(3));
        assert_eq!(outcome.failures[0].message, "batch rejected");
        // The remaining 23 batches still went out.
        assert_eq!(*store.import_calls.borrow(), 24);
    }

    #[test]
    fn create_progress_does_not_advance_over_a_failed_batch() {
        let store = FakeStore {
            fail_batches: HashSet::from([0]),
            ..FakeStore::default()
        };
        let mut events = Vec::new();
        synchronize(&store, 1, &records(47), SyncMode::Create, |p| events.push(p)).unwrap();

        assert_eq!(events.len(), 23);
        assert_eq!(events[0].processed, 2);
        assert_eq!(events.last().unwrap().processed, 45);
    }

    #[test]
    fn update_pairs_records_with_listed_tasks_by_position() {
        let store = FakeStore::with_existing(&[10, 11, 12, 13, 14]);
        let input = records(5);
        let outcome = synchronize(&store, 1, &input, SyncMode::Update, |_| {}).unwrap();

        assert_eq!(outcome.processed, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.cardinality_mismatch.is_none());

        let updated = store.updated.borrow();
        let ids: Vec<i64> = updated.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13, 14]);
        assert_eq!(updated[2].1, input[2]);
    }

    #[test]
    fn update_skips_positions_past_the_remote_list() {
        let store = FakeStore::with_existing(&[10, 11, 12]);
        let outcome = synchronize(&store, 1, &records(5), SyncMode::Update, |_| {}).unwrap();

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(
            outcome.cardinality_mismatch,
            Some(CardinalityMismatch {
                records: 5,
                remote: 3
            })
        );
        let skips: Vec<FailedUnit> = outcome.failures.iter().map(|f| f.unit).collect();
        assert_eq!(
            skips,
            vec![FailedUnit::Unmatched(3), FailedUnit::Unmatched(4)]
        );
    }

    #[test]
    fn update_records_a_failed_task_and_keeps_going() {
        let store = FakeStore {
            fail_tasks: HashSet::from([11]),
            ..FakeStore::with_existing(&[10, 11, 12])
        };
        let outcome = synchronize(&store, 1, &records(3), SyncMode::Update, |_| {}).unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].unit, FailedUnit::Task(11));
    }

    #[test]
    fn update_reports_progress_per_batch_even_when_tasks_fail() {
        let store = FakeStore {
            fail_tasks: HashSet::from([10]),
            ..FakeStore::with_existing(&[10, 11, 12])
        };
        let mut events = Vec::new();
        synchronize(&store, 1, &records(3), SyncMode::Update, |p| events.push(p)).unwrap();

        let positions: Vec<usize> = events.iter().map(|p| p.processed).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn update_propagates_a_listing_failure() {
        let store = FakeStore {
            fail_listing: true,
            ..FakeStore::default()
        };
        let err = synchronize(&store, 1, &records(3), SyncMode::Update, |_| {}).unwrap_err();

        assert_eq!(err.message, "listing refused");
        assert!(store.updated.borrow().is_empty());
    }

    #[test]
    fn empty_input_is_a_no_op_with_no_remote_calls() {
        let store = FakeStore::default();
        for mode in [SyncMode::Create, SyncMode::Update] {
            let outcome = synchronize(&store, 1, &[], mode, |_| {}).unwrap();
            assert_eq!(outcome.processed, 0);
            assert_eq!(outcome.failed, 0);
            assert_eq!(outcome.skipped, 0);
        }
        assert_eq!(*store.list_calls.borrow(), 0);
        assert_eq!(*store.import_calls.borrow(), 0);
    }

    #[test]
    fn rerunning_create_duplicates_tasks() {
        // The platform does not deduplicate imports; a second run doubles
        // the data. Known behavior, not a bug.
        let store = FakeStore::default();
        let input = records(10);
        synchronize(&store, 1, &input, SyncMode::Create, |_| {}).unwrap();
        synchronize(&store, 1, &input, SyncMode::Create, |_| {}).unwrap();

        let imported: usize = store.imported.borrow().iter().map(Vec::len).sum();
        assert_eq!(imported, 20);
    }

    #[test]
    fn progress_percent_is_exact_at_the_ends() {
        let start = Progress {
            processed: 0,
            total: 47,
        };
        let end = Progress {
            processed: 47,
            total: 47,
        };
        assert_eq!(start.percent(), 0.0);
        assert_eq!(end.percent(), 100.0);
    }
}
