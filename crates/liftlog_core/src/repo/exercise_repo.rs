//! Exercise/set store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own the `exercises` and `sets` tables and their relational integrity.
//! - Expose mutating primitives only inside an explicit unit of work.
//! - Rebuild the exercise -> sets grouping from a left join at read time.
//!
//! # Invariants
//! - A set row always references an existing exercise (FK enforced by SQLite).
//! - Deleting an exercise removes its sets through `ON DELETE CASCADE`, never
//!   through application-level iteration.
//! - Zero affected rows is returned as a count, not raised as an error.
//! - List order is `date DESC, id DESC`; sets are ordered by `id ASC`.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::exercise::{Exercise, ExerciseId, NewExercise, NewSet, SetId, WorkoutSet};
use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const EXERCISE_WITH_SETS_SELECT_SQL: &str = "SELECT
    e.id,
    e.date,
    e.category,
    e.exercise_name,
    s.id AS set_id,
    s.weight,
    s.reps";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store error for exercise/set persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A set referenced an exercise id that does not exist.
    Referential(ExerciseId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted rows cannot be converted to the read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Referential(id) => {
                write!(f, "set references missing exercise: {id}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "exercise store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "exercise store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "exercise store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted exercise data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read filter for exercise listing.
///
/// `limit`/`offset` count exercises, not joined rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExerciseFilter {
    /// Exact category match, case-insensitive.
    pub category: Option<String>,
    /// Inclusive lower date bound (`YYYY-MM-DD`).
    pub date_from: Option<String>,
    /// Inclusive upper date bound (`YYYY-MM-DD`).
    pub date_to: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Mutating store primitives bound to one open transaction.
///
/// Dropping a unit of work without `commit` discards its changes, but callers
/// are expected to end it explicitly with `commit` or `rollback`.
pub trait UnitOfWork {
    /// Inserts one exercise row and returns its fresh id.
    fn create_exercise(&self, exercise: &NewExercise) -> RepoResult<ExerciseId>;
    /// Inserts one set under `exercise_id`.
    ///
    /// Fails with [`RepoError::Referential`] when the exercise does not exist.
    fn create_set(&self, exercise_id: ExerciseId, set: NewSet) -> RepoResult<SetId>;
    /// Removes every set of one exercise. Returns the number of removed rows.
    fn delete_sets_for_exercise(&self, exercise_id: ExerciseId) -> RepoResult<usize>;
    /// Rewrites exercise header fields. `0` means the exercise does not exist.
    fn update_exercise(&self, id: ExerciseId, exercise: &NewExercise) -> RepoResult<usize>;
    /// Deletes one exercise and, by cascade, its sets. `0` means not found.
    fn delete_exercise(&self, id: ExerciseId) -> RepoResult<usize>;
    /// Whether the underlying transaction is still active.
    ///
    /// Some engine errors (disk full, I/O, out of memory) end the transaction
    /// on their own; later statements would then autocommit.
    fn is_open(&self) -> bool;
    /// Durably applies every change made through this unit of work.
    fn commit(self) -> RepoResult<()>;
    /// Discards every change made through this unit of work.
    fn rollback(self) -> RepoResult<()>;
}

/// Store interface for exercise/set persistence.
pub trait ExerciseStore {
    type Tx<'a>: UnitOfWork
    where
        Self: 'a;

    /// Opens a unit of work. At most one can be open per store.
    fn begin(&mut self) -> RepoResult<Self::Tx<'_>>;
    /// Lists exercises with their sets, most recent first.
    fn list_exercises_with_sets(&self, filter: &ExerciseFilter) -> RepoResult<Vec<Exercise>>;
    /// Loads one exercise with its sets.
    fn get_exercise_with_sets(&self, id: ExerciseId) -> RepoResult<Option<Exercise>>;
    /// Deletes one exercise as a single statement. `0` means not found.
    fn delete_exercise(&mut self, id: ExerciseId) -> RepoResult<usize>;
}

/// SQLite-backed exercise store.
pub struct SqliteExerciseStore<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteExerciseStore<'conn> {
    /// Creates a store from a migrated connection.
    ///
    /// Rejects connections that were not bootstrapped through
    /// [`crate::db::open_db`] or [`crate::db::open_db_in_memory`].
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_exercise_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

/// Unit of work over one `IMMEDIATE` SQLite transaction.
pub struct SqliteUnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn create_exercise(&self, exercise: &NewExercise) -> RepoResult<ExerciseId> {
        insert_exercise(&self.tx, exercise)
    }

    fn create_set(&self, exercise_id: ExerciseId, set: NewSet) -> RepoResult<SetId> {
        insert_set(&self.tx, exercise_id, set)
    }

    fn delete_sets_for_exercise(&self, exercise_id: ExerciseId) -> RepoResult<usize> {
        let removed = self
            .tx
            .execute("DELETE FROM sets WHERE exercise_id = ?1;", [exercise_id])?;
        Ok(removed)
    }

    fn update_exercise(&self, id: ExerciseId, exercise: &NewExercise) -> RepoResult<usize> {
        let changed = self.tx.execute(
            "UPDATE exercises
             SET
                date = ?1,
                category = ?2,
                exercise_name = ?3
             WHERE id = ?4;",
            params![
                exercise.date.as_str(),
                exercise.category.as_str(),
                exercise.name.as_str(),
                id,
            ],
        )?;
        Ok(changed)
    }

    fn delete_exercise(&self, id: ExerciseId) -> RepoResult<usize> {
        delete_exercise_row(&self.tx, id)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_autocommit()
    }

    fn commit(self) -> RepoResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> RepoResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl ExerciseStore for SqliteExerciseStore<'_> {
    type Tx<'a> = SqliteUnitOfWork<'a> where Self: 'a;

    fn begin(&mut self) -> RepoResult<SqliteUnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteUnitOfWork { tx })
    }

    fn list_exercises_with_sets(&self, filter: &ExerciseFilter) -> RepoResult<Vec<Exercise>> {
        let mut inner = String::from(
            "SELECT id, date, category, exercise_name
             FROM exercises
             WHERE 1 = 1",
        );
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(category) = filter.category.as_ref() {
            inner.push_str(" AND category = ? COLLATE NOCASE");
            bind_values.push(Value::Text(category.clone()));
        }
        if let Some(date_from) = filter.date_from.as_ref() {
            inner.push_str(" AND date >= ?");
            bind_values.push(Value::Text(date_from.clone()));
        }
        if let Some(date_to) = filter.date_to.as_ref() {
            inner.push_str(" AND date <= ?");
            bind_values.push(Value::Text(date_to.clone()));
        }

        inner.push_str(" ORDER BY date DESC, id DESC");
        if let Some(limit) = filter.limit {
            inner.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if filter.offset > 0 {
                inner.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(filter.offset)));
            }
        } else if filter.offset > 0 {
            inner.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(filter.offset)));
        }

        let sql = format!(
            "{EXERCISE_WITH_SETS_SELECT_SQL}
             FROM ({inner}) e
             LEFT JOIN sets s ON s.exercise_id = e.id
             ORDER BY e.date DESC, e.id DESC, s.id ASC;"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut exercises: Vec<Exercise> = Vec::new();
        while let Some(row) = rows.next()? {
            push_joined_row(&mut exercises, row)?;
        }

        Ok(exercises)
    }

    fn get_exercise_with_sets(&self, id: ExerciseId) -> RepoResult<Option<Exercise>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXERCISE_WITH_SETS_SELECT_SQL}
             FROM exercises e
             LEFT JOIN sets s ON s.exercise_id = e.id
             WHERE e.id = ?1
             ORDER BY s.id ASC;"
        ))?;

        let mut rows = stmt.query([id])?;
        let mut exercises: Vec<Exercise> = Vec::with_capacity(1);
        while let Some(row) = rows.next()? {
            push_joined_row(&mut exercises, row)?;
        }

        Ok(exercises.pop())
    }

    fn delete_exercise(&mut self, id: ExerciseId) -> RepoResult<usize> {
        delete_exercise_row(self.conn, id)
    }
}

fn insert_exercise(conn: &Connection, exercise: &NewExercise) -> RepoResult<ExerciseId> {
    conn.execute(
        "INSERT INTO exercises (date, category, exercise_name) VALUES (?1, ?2, ?3);",
        params![
            exercise.date.as_str(),
            exercise.category.as_str(),
            exercise.name.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_set(conn: &Connection, exercise_id: ExerciseId, set: NewSet) -> RepoResult<SetId> {
    conn.execute(
        "INSERT INTO sets (exercise_id, weight, reps) VALUES (?1, ?2, ?3);",
        params![exercise_id, set.weight, set.reps],
    )
    .map_err(|err| map_set_insert_error(err, exercise_id))?;
    Ok(conn.last_insert_rowid())
}

fn delete_exercise_row(conn: &Connection, id: ExerciseId) -> RepoResult<usize> {
    let changed = conn.execute("DELETE FROM exercises WHERE id = ?1;", [id])?;
    Ok(changed)
}

fn map_set_insert_error(err: rusqlite::Error, exercise_id: ExerciseId) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            RepoError::Referential(exercise_id)
        }
        _ => err.into(),
    }
}

/// Folds one joined row into the grouped result.
///
/// Rows must arrive grouped by exercise, which the `ORDER BY` guarantees.
fn push_joined_row(exercises: &mut Vec<Exercise>, row: &Row<'_>) -> RepoResult<()> {
    let id: ExerciseId = row.get("id")?;
    let is_new_group = exercises.last().map_or(true, |last| last.id != id);
    if is_new_group {
        exercises.push(Exercise {
            id,
            date: row.get("date")?,
            category: row.get("category")?,
            name: row.get("exercise_name")?,
            sets: Vec::new(),
        });
    }

    let Some(set_id) = row.get::<_, Option<SetId>>("set_id")? else {
        return Ok(());
    };
    let set = parse_set_columns(row, set_id)?;
    if let Some(current) = exercises.last_mut() {
        current.sets.push(set);
    }
    Ok(())
}

fn parse_set_columns(row: &Row<'_>, set_id: SetId) -> RepoResult<WorkoutSet> {
    let weight: i64 = row.get("weight")?;
    let reps: i64 = row.get("reps")?;
    if weight < 0 || reps < 0 {
        return Err(RepoError::InvalidData(format!(
            "negative weight/reps in sets row {set_id}"
        )));
    }
    Ok(WorkoutSet {
        id: set_id,
        weight,
        reps,
    })
}

fn ensure_exercise_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["exercises", "sets"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in ["id", "date", "category", "exercise_name"] {
        if !table_has_column(conn, "exercises", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "exercises",
                column,
            });
        }
    }

    for column in ["id", "exercise_id", "weight", "reps"] {
        if !table_has_column(conn, "sets", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "sets",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
