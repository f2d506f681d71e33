//! Coordinator behavior against a scripted store that fails on demand.

use liftlog_core::{
    ErrorKind, Exercise, ExerciseFilter, ExerciseId, ExerciseStore, NewExercise, NewSet,
    RepoError, RepoResult, SetId, StorageStage, UnitOfWork, WorkoutService, WorkoutServiceError,
};
use serde_json::json;
use std::cell::{Cell, RefCell};

#[derive(Default)]
struct Faults {
    begin: bool,
    commit: bool,
    rollback: bool,
    set_insert: bool,
    referential_set: bool,
    first_exercise_insert: bool,
    set_insert_ends_transaction: bool,
}

#[derive(Default)]
struct ScriptedStore {
    faults: Faults,
    calls: RefCell<Vec<String>>,
    next_id: Cell<i64>,
    transaction_ended: Cell<bool>,
}

impl ScriptedStore {
    fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn fresh_id(&self) -> i64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

fn medium_error() -> RepoError {
    RepoError::InvalidData("medium unavailable".to_string())
}

struct ScriptedTx<'a> {
    store: &'a ScriptedStore,
}

impl UnitOfWork for ScriptedTx<'_> {
    fn create_exercise(&self, _exercise: &NewExercise) -> RepoResult<ExerciseId> {
        let id = self.store.fresh_id();
        self.store.record(format!("exercise:{id}"));
        if self.store.faults.first_exercise_insert && id == 1 {
            return Err(medium_error());
        }
        Ok(id)
    }

    fn create_set(&self, exercise_id: ExerciseId, _set: NewSet) -> RepoResult<SetId> {
        self.store.record(format!("set:{exercise_id}"));
        if self.store.faults.referential_set {
            return Err(RepoError::Referential(exercise_id));
        }
        if self.store.faults.set_insert {
            return Err(medium_error());
        }
        if self.store.faults.set_insert_ends_transaction {
            self.store.transaction_ended.set(true);
            return Err(medium_error());
        }
        Ok(self.store.fresh_id())
    }

    fn delete_sets_for_exercise(&self, exercise_id: ExerciseId) -> RepoResult<usize> {
        self.store.record(format!("delete_sets:{exercise_id}"));
        Ok(2)
    }

    fn update_exercise(&self, id: ExerciseId, _exercise: &NewExercise) -> RepoResult<usize> {
        self.store.record(format!("update:{id}"));
        Ok(1)
    }

    fn delete_exercise(&self, id: ExerciseId) -> RepoResult<usize> {
        self.store.record(format!("delete:{id}"));
        Ok(1)
    }

    fn is_open(&self) -> bool {
        !self.store.transaction_ended.get()
    }

    fn commit(self) -> RepoResult<()> {
        self.store.record("commit");
        if self.store.faults.commit {
            return Err(medium_error());
        }
        Ok(())
    }

    fn rollback(self) -> RepoResult<()> {
        self.store.record("rollback");
        if self.store.faults.rollback {
            return Err(medium_error());
        }
        Ok(())
    }
}

impl ExerciseStore for ScriptedStore {
    type Tx<'a> = ScriptedTx<'a>;

    fn begin(&mut self) -> RepoResult<ScriptedTx<'_>> {
        self.record("begin");
        if self.faults.begin {
            return Err(medium_error());
        }
        Ok(ScriptedTx { store: self })
    }

    fn list_exercises_with_sets(&self, _filter: &ExerciseFilter) -> RepoResult<Vec<Exercise>> {
        Err(medium_error())
    }

    fn get_exercise_with_sets(&self, _id: ExerciseId) -> RepoResult<Option<Exercise>> {
        Ok(None)
    }

    fn delete_exercise(&mut self, id: ExerciseId) -> RepoResult<usize> {
        self.record(format!("delete:{id}"));
        Ok(0)
    }
}

fn two_item_batch() -> serde_json::Value {
    json!([
        {
            "date": "2024-01-01",
            "category": "Chest",
            "exerciseName": "Bench",
            "sets": [{"weight": 80, "reps": 10}]
        },
        {
            "date": "2024-01-01",
            "category": "Legs",
            "exerciseName": "Squat",
            "sets": [{"weight": 100, "reps": 5}]
        }
    ])
}

fn calls(service: WorkoutService<ScriptedStore>) -> Vec<String> {
    service.into_store().calls.into_inner()
}

#[test]
fn successful_batch_runs_sequentially_and_commits_once() {
    let mut service = WorkoutService::new(ScriptedStore::default());

    service.create_batch(&two_item_batch()).unwrap();

    assert_eq!(
        calls(service),
        vec!["begin", "exercise:1", "set:1", "exercise:3", "set:3", "commit"]
    );
}

#[test]
fn set_failure_keeps_processing_then_rolls_back() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        set_insert: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    match err {
        WorkoutServiceError::WriteFailed { ref failures } => assert_eq!(failures.len(), 2),
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        calls(service),
        vec!["begin", "exercise:1", "set:1", "exercise:2", "set:2", "rollback"]
    );
}

#[test]
fn failing_rollback_is_storage_fault_not_write_failed() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        set_insert: true,
        rollback: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageFault);
    assert!(matches!(
        err,
        WorkoutServiceError::StorageFault {
            stage: StorageStage::Rollback,
            ..
        }
    ));
}

#[test]
fn failing_commit_is_storage_fault() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        commit: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    assert!(matches!(
        err,
        WorkoutServiceError::StorageFault {
            stage: StorageStage::Commit,
            ..
        }
    ));
}

#[test]
fn failing_begin_writes_nothing() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        begin: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    assert!(matches!(
        err,
        WorkoutServiceError::StorageFault {
            stage: StorageStage::Begin,
            ..
        }
    ));
    assert_eq!(calls(service), vec!["begin"]);
}

#[test]
fn validation_failure_never_opens_a_unit_of_work() {
    let mut service = WorkoutService::new(ScriptedStore::default());

    service.create_batch(&json!([])).unwrap_err();
    service
        .update_exercise(1, &json!({"date": "2024-01-01"}))
        .unwrap_err();

    assert!(calls(service).is_empty());
}

#[test]
fn update_referential_failure_rolls_back_with_referential_kind() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        referential_set: true,
        ..Faults::default()
    }));

    let err = service
        .update_exercise(
            9,
            &json!({
                "date": "2024-01-01",
                "category": "Chest",
                "exerciseName": "Bench",
                "sets": [{"weight": 80, "reps": 10}, {"weight": 85, "reps": 8}]
            }),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReferentialError);
    assert_eq!(
        calls(service),
        vec!["begin", "update:9", "delete_sets:9", "set:9", "rollback"]
    );
}

#[test]
fn read_failures_are_storage_faults() {
    let service = WorkoutService::new(ScriptedStore::default());

    let err = service
        .list_exercises(&ExerciseFilter::default())
        .unwrap_err();
    assert!(matches!(
        err,
        WorkoutServiceError::StorageFault {
            stage: StorageStage::Read,
            ..
        }
    ));
}

#[test]
fn failed_exercise_insert_keeps_processing_then_rolls_back() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        first_exercise_insert: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    match err {
        WorkoutServiceError::WriteFailed { ref failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, 0);
            assert_eq!(failures[0].set_index, None);
        }
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        calls(service),
        vec!["begin", "exercise:1", "exercise:2", "set:2", "rollback"]
    );
}

#[test]
fn transaction_ended_by_engine_stops_batch_without_rollback() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        set_insert_ends_transaction: true,
        ..Faults::default()
    }));

    let err = service.create_batch(&two_item_batch()).unwrap_err();

    assert!(matches!(
        err,
        WorkoutServiceError::StorageFault {
            stage: StorageStage::Write,
            ..
        }
    ));
    assert_eq!(calls(service), vec!["begin", "exercise:1", "set:1"]);
}

#[test]
fn transaction_ended_during_update_is_storage_fault() {
    let mut service = WorkoutService::new(ScriptedStore::with_faults(Faults {
        set_insert_ends_transaction: true,
        ..Faults::default()
    }));

    let err = service
        .update_exercise(
            4,
            &json!({
                "date": "2024-01-01",
                "category": "Chest",
                "exerciseName": "Bench",
                "sets": [{"weight": 80, "reps": 10}, {"weight": 85, "reps": 8}]
            }),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageFault);
    assert_eq!(
        calls(service),
        vec!["begin", "update:4", "delete_sets:4", "set:4"]
    );
}
