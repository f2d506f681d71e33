//! Workout write coordinator.
//!
//! # Responsibility
//! - Run batch create, full-replacement update and delete of exercises with
//!   their sets, each as one unit of work.
//! - Decide commit or rollback from the aggregated outcome of a whole batch.
//! - Map store failures into the caller-facing error taxonomy.
//!
//! # Invariants
//! - A write is `Pending -> Open -> Committed | RolledBack`; commit or rollback
//!   is always the terminal action once a unit of work is open.
//! - Batch items are processed strictly in input order, and the commit
//!   decision is taken only after every item was attempted.
//! - Any failed item or set rolls back the whole batch; nothing is partially
//!   committed.
//! - A failing commit or rollback is a `StorageFault`, distinct from the write
//!   failure that led to it.
//! - Once the engine ends a transaction on its own, no further statement is
//!   issued for that write; the result is a `StorageFault` at stage `Write`.

use crate::model::exercise::{is_known_category, CreatedExercise, Exercise, ExerciseId};
use crate::repo::exercise_repo::{ExerciseFilter, ExerciseStore, RepoError, UnitOfWork};
use crate::service::payload::{
    batch_items, classify_set, parse_exercise, ExerciseDraft, FieldIssue, SetEntry,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const CREATE_BATCH_EVENT: &str = "exercise_create_batch";
const UPDATE_EVENT: &str = "exercise_update";
const DELETE_EVENT: &str = "exercise_delete";

pub type WorkoutResult<T> = Result<T, WorkoutServiceError>;

/// Caller-facing failure category.
///
/// The HTTP layer maps these to status codes; see [`ErrorKind::http_status_hint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed or missing caller input. Nothing was written.
    ValidationError,
    /// Target exercise id does not exist.
    NotFound,
    /// A set referenced a missing exercise.
    ReferentialError,
    /// At least one item of a write failed; the unit of work was rolled back.
    WriteFailed,
    /// Storage medium or transaction control failed.
    StorageFault,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::NotFound => "NotFound",
            Self::ReferentialError => "ReferentialError",
            Self::WriteFailed => "WriteFailed",
            Self::StorageFault => "StorageFault",
        }
    }

    /// Status class conventionally used by HTTP callers.
    pub fn http_status_hint(self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::ReferentialError | Self::WriteFailed | Self::StorageFault => 500,
        }
    }
}

/// Storage step during which a fault happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStage {
    Begin,
    /// A statement failed and the engine discarded the open transaction.
    Write,
    Commit,
    Rollback,
    Read,
    Delete,
}

impl StorageStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Write => "write",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }
}

/// One failed item (or set of an item) inside a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    /// Zero-based position of the exercise in the request.
    pub index: usize,
    /// Zero-based position of the set inside the exercise, for set failures.
    pub set_index: Option<usize>,
    pub reason: String,
}

impl ItemFailure {
    fn exercise(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            set_index: None,
            reason: reason.into(),
        }
    }

    fn set(index: usize, set_index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            set_index: Some(set_index),
            reason: reason.into(),
        }
    }
}

impl Display for ItemFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.set_index {
            Some(set_index) => write!(
                f,
                "exercise {} set {}: {}",
                self.index, set_index, self.reason
            ),
            None => write!(f, "exercise {}: {}", self.index, self.reason),
        }
    }
}

/// Service error for workout use-cases.
#[derive(Debug)]
pub enum WorkoutServiceError {
    /// Input failed structural validation; no unit of work was opened.
    Validation(Vec<FieldIssue>),
    /// Target exercise does not exist.
    NotFound(ExerciseId),
    /// A set write referenced a missing exercise.
    Referential(ExerciseId),
    /// Aggregated item failures; every change of the write was discarded.
    WriteFailed { failures: Vec<ItemFailure> },
    /// Storage or transaction-control failure.
    StorageFault {
        stage: StorageStage,
        source: RepoError,
    },
}

impl WorkoutServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Referential(_) => ErrorKind::ReferentialError,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::StorageFault { .. } => ErrorKind::StorageFault,
        }
    }

    fn storage_fault(stage: StorageStage) -> impl FnOnce(RepoError) -> Self {
        move |source| Self::StorageFault { stage, source }
    }
}

impl Display for WorkoutServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(issues) => {
                write!(f, "invalid exercise input: ")?;
                write_joined(f, issues)
            }
            Self::NotFound(id) => write!(f, "exercise not found: {id}"),
            Self::Referential(id) => write!(f, "set references missing exercise: {id}"),
            Self::WriteFailed { failures } => {
                write!(f, "failed to write exercises: ")?;
                write_joined(f, failures)
            }
            Self::StorageFault { stage, source } => {
                write!(f, "storage fault during {}: {source}", stage.as_str())
            }
        }
    }
}

impl Error for WorkoutServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFault { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn write_joined<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> std::fmt::Result {
    for (position, item) in items.iter().enumerate() {
        if position > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Lifecycle of one coordinator write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Pending,
    Open,
    Committed,
    RolledBack,
}

impl WriteState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Result of a committed batch create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreated {
    /// Well-formed input items, in input order, with their new ids.
    pub created_exercises: Vec<CreatedExercise>,
}

/// Confirmation of a committed full-replacement update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfirmation {
    pub id: ExerciseId,
    /// Sets removed before the replacement was written.
    pub sets_removed: usize,
    pub sets_written: usize,
    /// Entries skipped for lacking `weight` or `reps`.
    pub sets_skipped: usize,
}

/// Confirmation of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteConfirmation {
    pub id: ExerciseId,
}

/// Outcome accumulated across one batch pass.
#[derive(Debug, Default)]
struct BatchAccumulator {
    created: Vec<CreatedExercise>,
    failures: Vec<ItemFailure>,
    skipped_sets: usize,
    /// Set once the engine has ended the transaction on its own.
    lost: Option<RepoError>,
}

/// One open unit of work tagged with the operation that owns it.
struct OpenWrite<T: UnitOfWork> {
    tx: T,
    event: &'static str,
    started_at: Instant,
}

impl<T: UnitOfWork> OpenWrite<T> {
    fn commit(self) -> WorkoutResult<()> {
        let Self {
            tx,
            event,
            started_at,
        } = self;
        match tx.commit() {
            Ok(()) => {
                log_transition(event, WriteState::Committed, started_at);
                Ok(())
            }
            Err(source) => {
                error!(
                    "event={event} module=service status=error stage=commit duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    source
                );
                Err(WorkoutServiceError::StorageFault {
                    stage: StorageStage::Commit,
                    source,
                })
            }
        }
    }

    /// Rolls back and returns `cause`, or a `StorageFault` if rollback fails.
    ///
    /// A transaction the engine already ended is dropped without issuing
    /// `ROLLBACK`.
    fn abort(self, cause: WorkoutServiceError) -> WorkoutServiceError {
        let Self {
            tx,
            event,
            started_at,
        } = self;
        if !tx.is_open() {
            error!(
                "event={event} module=service status=error stage=write duration_ms={} reason=transaction_lost cause_kind={}",
                started_at.elapsed().as_millis(),
                cause.kind().as_str()
            );
            drop(tx);
            log_transition(event, WriteState::RolledBack, started_at);
            return cause;
        }
        match tx.rollback() {
            Ok(()) => {
                log_transition(event, WriteState::RolledBack, started_at);
                cause
            }
            Err(source) => {
                error!(
                    "event={event} module=service status=error stage=rollback duration_ms={} error={} cause_kind={}",
                    started_at.elapsed().as_millis(),
                    source,
                    cause.kind().as_str()
                );
                WorkoutServiceError::StorageFault {
                    stage: StorageStage::Rollback,
                    source,
                }
            }
        }
    }
}

fn open_write<'a, S: ExerciseStore>(
    store: &'a mut S,
    event: &'static str,
) -> WorkoutResult<OpenWrite<S::Tx<'a>>> {
    let started_at = Instant::now();
    debug!(
        "event={event} module=service status={}",
        WriteState::Pending.as_str()
    );
    match store.begin() {
        Ok(tx) => {
            debug!(
                "event={event} module=service status={}",
                WriteState::Open.as_str()
            );
            Ok(OpenWrite {
                tx,
                event,
                started_at,
            })
        }
        Err(source) => {
            error!(
                "event={event} module=service status=error stage=begin error={}",
                source
            );
            Err(WorkoutServiceError::StorageFault {
                stage: StorageStage::Begin,
                source,
            })
        }
    }
}

fn log_transition(event: &str, state: WriteState, started_at: Instant) {
    info!(
        "event={event} module=service status={} duration_ms={}",
        state.as_str(),
        started_at.elapsed().as_millis()
    );
}

/// Workout service facade over store implementations.
pub struct WorkoutService<S: ExerciseStore> {
    store: S,
}

impl<S: ExerciseStore> WorkoutService<S> {
    /// Creates a service using the provided store implementation.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Releases the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Creates one or many exercises with their sets in one unit of work.
    ///
    /// # Contract
    /// - `payload` is one exercise object or an array of them.
    /// - Invalid items insert nothing but do not stop later items from being
    ///   attempted; any failure anywhere rolls back the whole batch.
    /// - Set entries lacking `weight` or `reps` are skipped.
    /// - On commit, returns every well-formed item with its new id.
    pub fn create_batch(&mut self, payload: &Value) -> WorkoutResult<BatchCreated> {
        let items = batch_items(payload).map_err(|issue| {
            warn!(
                "event={CREATE_BATCH_EVENT} module=service status=rejected reason=invalid_batch"
            );
            WorkoutServiceError::Validation(vec![issue])
        })?;

        let write = open_write(&mut self.store, CREATE_BATCH_EVENT)?;
        let outcome = items
            .iter()
            .enumerate()
            .fold(BatchAccumulator::default(), |acc, (index, item)| {
                if acc.lost.is_some() {
                    return acc;
                }
                apply_batch_item(&write.tx, acc, index, item)
            });

        info!(
            "event={CREATE_BATCH_EVENT} module=service status=attempted items={} created={} failures={} skipped_sets={}",
            items.len(),
            outcome.created.len(),
            outcome.failures.len(),
            outcome.skipped_sets
        );

        if let Some(source) = outcome.lost {
            return Err(write.abort(WorkoutServiceError::StorageFault {
                stage: StorageStage::Write,
                source,
            }));
        }
        if !outcome.failures.is_empty() {
            return Err(write.abort(WorkoutServiceError::WriteFailed {
                failures: outcome.failures,
            }));
        }

        write.commit()?;
        Ok(BatchCreated {
            created_exercises: outcome.created,
        })
    }

    /// Replaces one exercise and its complete set list.
    ///
    /// # Contract
    /// - Full replacement: every existing set is removed and the supplied
    ///   list is written; callers resend the whole list.
    /// - Invalid input is rejected before any unit of work opens.
    /// - Any failure after that restores the pre-update state.
    pub fn update_exercise(
        &mut self,
        id: ExerciseId,
        payload: &Value,
    ) -> WorkoutResult<UpdateConfirmation> {
        let draft = parse_exercise(payload).map_err(|issues| {
            warn!(
                "event={UPDATE_EVENT} module=service status=rejected id={id} issues={}",
                issues.len()
            );
            WorkoutServiceError::Validation(issues)
        })?;
        warn_unknown_category(UPDATE_EVENT, &draft);

        let write = open_write(&mut self.store, UPDATE_EVENT)?;
        match replace_exercise(&write.tx, id, &draft) {
            Ok(confirmation) => {
                write.commit()?;
                Ok(confirmation)
            }
            Err(cause) => Err(write.abort(cause)),
        }
    }

    /// Deletes one exercise; its sets go with it through the store cascade.
    ///
    /// Deleting an id that does not exist is `NotFound`.
    pub fn delete_exercise(&mut self, id: ExerciseId) -> WorkoutResult<DeleteConfirmation> {
        let started_at = Instant::now();
        let changed = self
            .store
            .delete_exercise(id)
            .map_err(WorkoutServiceError::storage_fault(StorageStage::Delete))?;

        if changed == 0 {
            info!("event={DELETE_EVENT} module=service status=not_found id={id}");
            return Err(WorkoutServiceError::NotFound(id));
        }

        info!(
            "event={DELETE_EVENT} module=service status=ok id={id} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(DeleteConfirmation { id })
    }

    /// Lists exercises with their sets, most recent first.
    pub fn list_exercises(&self, filter: &ExerciseFilter) -> WorkoutResult<Vec<Exercise>> {
        self.store
            .list_exercises_with_sets(filter)
            .map_err(WorkoutServiceError::storage_fault(StorageStage::Read))
    }

    /// Gets one exercise with its sets.
    pub fn get_exercise(&self, id: ExerciseId) -> WorkoutResult<Exercise> {
        self.store
            .get_exercise_with_sets(id)
            .map_err(WorkoutServiceError::storage_fault(StorageStage::Read))?
            .ok_or(WorkoutServiceError::NotFound(id))
    }
}

/// Attempts one batch item and folds its outcome into the accumulator.
fn apply_batch_item<T: UnitOfWork>(
    tx: &T,
    mut acc: BatchAccumulator,
    index: usize,
    item: &Value,
) -> BatchAccumulator {
    let draft = match parse_exercise(item) {
        Ok(draft) => draft,
        Err(issues) => {
            warn!(
                "event={CREATE_BATCH_EVENT} module=service status=item_invalid index={index} issues={}",
                issues.len()
            );
            acc.failures.extend(
                issues
                    .iter()
                    .map(|issue| ItemFailure::exercise(index, issue.to_string())),
            );
            return acc;
        }
    };
    warn_unknown_category(CREATE_BATCH_EVENT, &draft);

    let exercise_id = match tx.create_exercise(&draft.exercise) {
        Ok(id) => id,
        Err(err) => {
            error!(
                "event={CREATE_BATCH_EVENT} module=service status=error stage=insert_exercise index={index} error={err}"
            );
            if tx.is_open() {
                acc.failures.push(ItemFailure::exercise(index, err.to_string()));
            } else {
                acc.lost = Some(err);
            }
            return acc;
        }
    };

    for (set_index, entry) in draft.sets.iter().enumerate() {
        match classify_set(entry) {
            SetEntry::Insert(set) => {
                if let Err(err) = tx.create_set(exercise_id, set) {
                    error!(
                        "event={CREATE_BATCH_EVENT} module=service status=error stage=insert_set index={index} set_index={set_index} exercise_id={exercise_id} error={err}"
                    );
                    if !tx.is_open() {
                        acc.lost = Some(err);
                        return acc;
                    }
                    acc.failures
                        .push(ItemFailure::set(index, set_index, err.to_string()));
                }
            }
            SetEntry::Skip => {
                warn!(
                    "event={CREATE_BATCH_EVENT} module=service status=set_skipped index={index} set_index={set_index} exercise_id={exercise_id}"
                );
                acc.skipped_sets += 1;
            }
            SetEntry::Malformed(reason) => {
                warn!(
                    "event={CREATE_BATCH_EVENT} module=service status=set_invalid index={index} set_index={set_index} exercise_id={exercise_id}"
                );
                acc.failures.push(ItemFailure::set(index, set_index, reason));
            }
        }
    }

    acc.created
        .push(CreatedExercise::from_new(exercise_id, draft.exercise));
    acc
}

/// Rewrites header fields and swaps the full set list inside `tx`.
///
/// Stops at the first failure; the caller rolls back.
fn replace_exercise<T: UnitOfWork>(
    tx: &T,
    id: ExerciseId,
    draft: &ExerciseDraft<'_>,
) -> WorkoutResult<UpdateConfirmation> {
    let changed = tx
        .update_exercise(id, &draft.exercise)
        .map_err(|err| mutation_failure(tx, err, ItemFailure::exercise(0, "update failed")))?;
    if changed == 0 {
        return Err(WorkoutServiceError::NotFound(id));
    }

    let sets_removed = tx
        .delete_sets_for_exercise(id)
        .map_err(|err| {
            mutation_failure(tx, err, ItemFailure::exercise(0, "set removal failed"))
        })?;

    let mut confirmation = UpdateConfirmation {
        id,
        sets_removed,
        sets_written: 0,
        sets_skipped: 0,
    };
    for (set_index, entry) in draft.sets.iter().enumerate() {
        match classify_set(entry) {
            SetEntry::Insert(set) => {
                tx.create_set(id, set).map_err(|err| {
                    mutation_failure(tx, err, ItemFailure::set(0, set_index, "set insert failed"))
                })?;
                confirmation.sets_written += 1;
            }
            SetEntry::Skip => {
                debug!(
                    "event={UPDATE_EVENT} module=service status=set_skipped id={id} set_index={set_index}"
                );
                confirmation.sets_skipped += 1;
            }
            SetEntry::Malformed(reason) => {
                return Err(WorkoutServiceError::WriteFailed {
                    failures: vec![ItemFailure::set(0, set_index, reason)],
                });
            }
        }
    }

    Ok(confirmation)
}

/// Maps a store failure raised while a unit of work is open.
fn mutation_failure<T: UnitOfWork>(
    tx: &T,
    err: RepoError,
    mut failure: ItemFailure,
) -> WorkoutServiceError {
    if !tx.is_open() {
        return WorkoutServiceError::StorageFault {
            stage: StorageStage::Write,
            source: err,
        };
    }
    if let RepoError::Referential(id) = err {
        return WorkoutServiceError::Referential(id);
    }
    error!(
        "event={UPDATE_EVENT} module=service status=error reason={} error={err}",
        failure.reason
    );
    failure.reason = format!("{}: {err}", failure.reason);
    WorkoutServiceError::WriteFailed {
        failures: vec![failure],
    }
}

fn warn_unknown_category(event: &str, draft: &ExerciseDraft<'_>) {
    if !is_known_category(&draft.exercise.category) {
        warn!("event={event} module=service status=unknown_category");
    }
}
