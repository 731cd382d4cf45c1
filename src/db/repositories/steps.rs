use std::time::Instant;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::{
    helpers::{from_epoch_millis, to_epoch_millis, to_i64, to_u64},
    models::{NewStepSession, StepSession},
    Database,
};

const SELECT_COLUMNS: &str =
    "SELECT _id, startDate, endDate, stepCount, latitude, longitude, speed, synced FROM steps";

fn row_to_step_session(row: &Row) -> Result<StepSession> {
    let start_date: i64 = row.get("startDate")?;
    let end_date: i64 = row.get("endDate")?;
    let step_count: i64 = row.get("stepCount")?;
    // Rows written by the mobile plugin may carry NULLs in the optional columns.
    let latitude: Option<f64> = row.get("latitude")?;
    let longitude: Option<f64> = row.get("longitude")?;
    let speed: Option<f64> = row.get("speed")?;
    let synced: Option<i64> = row.get("synced")?;

    Ok(StepSession {
        id: row.get("_id")?,
        start_date: from_epoch_millis(start_date, "startDate")?,
        end_date: from_epoch_millis(end_date, "endDate")?,
        step_count: to_u64(step_count, "stepCount")?,
        latitude: latitude.unwrap_or_default(),
        longitude: longitude.unwrap_or_default(),
        speed: speed.unwrap_or_default(),
        synced: synced.unwrap_or_default() != 0,
    })
}

fn collect_sessions(
    stmt: &mut rusqlite::Statement<'_>,
    args: impl rusqlite::Params,
) -> Result<Vec<StepSession>> {
    let mut rows = stmt.query(args)?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_step_session(row)?);
    }
    Ok(sessions)
}

fn check_deadline(deadline: Option<Instant>, stage: &str) -> Result<()> {
    if let Some(deadline) = deadline {
        if Instant::now() >= deadline {
            bail!("append deadline passed {stage}");
        }
    }
    Ok(())
}

fn insert_step_session(
    conn: &mut Connection,
    record: NewStepSession,
    deadline: Option<Instant>,
) -> Result<StepSession> {
    check_deadline(deadline, "before the ledger picked it up")?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to open append transaction")?;
    tx.execute(
        "INSERT INTO steps (startDate, endDate, stepCount, latitude, longitude, speed, synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            to_epoch_millis(&record.start_date),
            to_epoch_millis(&record.end_date),
            to_i64(record.step_count)?,
            record.latitude,
            record.longitude,
            record.speed,
        ],
    )
    .context("failed to insert step session")?;
    let id = tx.last_insert_rowid();
    // Returning early drops `tx`, which rolls the insert back.
    check_deadline(deadline, "while waiting for the write lock; rolled back")?;
    tx.commit().context("failed to commit step session")?;
    Ok(record.into_stored(id))
}

impl Database {
    /// Running total of the most recent row, or 0 for an empty ledger.
    pub async fn last_step_count(&self) -> Result<u64> {
        self.execute(|conn| {
            let latest: Option<i64> = conn
                .query_row(
                    "SELECT stepCount FROM steps ORDER BY _id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query latest step count")?;

            match latest {
                Some(count) => to_u64(count, "stepCount"),
                None => Ok(0),
            }
        })
        .await
    }

    /// Appends one row inside its own transaction and returns it with the assigned id.
    pub async fn append_step_session(&self, session: &NewStepSession) -> Result<StepSession> {
        let record = session.clone();
        self.execute(move |conn| insert_step_session(conn, record, None))
            .await
    }

    /// Like `append_step_session`, but the ledger thread rolls the row back instead of
    /// committing it once `deadline` has passed. An `Err` always means no row was written.
    pub async fn append_step_session_before(
        &self,
        session: &NewStepSession,
        deadline: Instant,
    ) -> Result<StepSession> {
        let record = session.clone();
        self.execute(move |conn| insert_step_session(conn, record, Some(deadline)))
            .await
    }

    pub async fn latest_step_session(&self) -> Result<Option<StepSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY _id DESC LIMIT 1"))?;
            let mut rows = stmt.query([])?;
            let latest = match rows.next()? {
                Some(row) => Some(row_to_step_session(row)?),
                None => None,
            };
            Ok(latest)
        })
        .await
    }

    /// Rows with `id > after_id`, oldest first.
    pub async fn list_step_sessions(&self, after_id: i64, limit: u32) -> Result<Vec<StepSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE _id > ?1 ORDER BY _id ASC LIMIT ?2"
            ))?;
            collect_sessions(&mut stmt, params![after_id, limit])
        })
        .await
    }

    pub async fn unsynced_step_sessions(&self, limit: u32) -> Result<Vec<StepSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE synced = 0 ORDER BY _id ASC LIMIT ?1"
            ))?;
            collect_sessions(&mut stmt, params![limit])
        })
        .await
    }

    /// Flags every row up to and including `latest_id` as synced.
    ///
    /// This only touches the `synced` column and is meant for the sync collaborator;
    /// the collector never calls it.
    pub async fn mark_synced_through(&self, latest_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE steps SET synced = 1 WHERE _id <= ?1 AND synced = 0",
                    params![latest_id],
                )
                .context("failed to mark step sessions as synced")?;
            Ok(updated)
        })
        .await
    }
}
