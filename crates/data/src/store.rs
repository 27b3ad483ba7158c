//! The snapshot write path: an explicit begin/execute/commit/rollback/close
//! interface in front of diesel, plus the one statement the bridge actually
//! issues — a per-room upsert guarded by `ON CONFLICT (time, id) DO
//! NOTHING`.
//!
//! The trait exists so the snapshot loop in the bridge crate can depend on
//! an interface rather than a concrete Postgres connection; diesel has no
//! transaction type that outlives the closure that opens it, so the
//! trait's state lives in the implementor instead.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use loxone_core::model::RoomSnapshot;

use crate::error::Result;
use crate::pool::{DieselPool, PgPooledConnection};
use crate::schema::room;

#[derive(Insertable)]
#[diesel(table_name = room)]
struct RoomRow {
    time: DateTime<Utc>,
    id: String,
    name: String,
    temperature: Option<f64>,
    temperature_target: Option<f64>,
    humidity: Option<f64>,
    light: Option<bool>,
    shading: Option<f64>,
    valve: Option<f64>,
    ventilation: Option<bool>,
    presence: Option<bool>,
}

impl RoomRow {
    fn from_snapshot(at: DateTime<Utc>, snapshot: &RoomSnapshot) -> Self {
        RoomRow {
            time: at,
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            temperature: snapshot.temperature,
            temperature_target: snapshot.temperature_target,
            humidity: snapshot.humidity,
            light: snapshot.light,
            shading: snapshot.shading,
            valve: snapshot.valve,
            ventilation: snapshot.ventilation,
            presence: snapshot.presence,
        }
    }
}

/// The downstream store contract: open, write parameterized statements,
/// and close — no statement beyond the room upsert is ever issued.
pub trait Store {
    fn begin_transaction(&mut self) -> Result<()>;
    fn execute_room_upsert(&mut self, at: DateTime<Utc>, snapshot: &RoomSnapshot) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

pub struct PgStore {
    conn: PgPooledConnection,
}

impl PgStore {
    pub fn new(conn: PgPooledConnection) -> Self {
        PgStore { conn }
    }
}

impl Store for PgStore {
    fn begin_transaction(&mut self) -> Result<()> {
        diesel::sql_query("BEGIN").execute(&mut self.conn)?;
        Ok(())
    }

    fn execute_room_upsert(&mut self, at: DateTime<Utc>, snapshot: &RoomSnapshot) -> Result<()> {
        diesel::insert_into(room::table)
            .values(RoomRow::from_snapshot(at, snapshot))
            .on_conflict((room::time, room::id))
            .do_nothing()
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        diesel::sql_query("COMMIT").execute(&mut self.conn)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        diesel::sql_query("ROLLBACK").execute(&mut self.conn)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one snapshot: every room with at least one non-null measurement
/// gets a row, all inside one transaction. Rooms that are entirely null are
/// skipped rather than writing an all-NULL row.
///
/// Runs diesel's blocking API on a blocking-pool thread since this
/// dependency stack has no async diesel driver.
pub async fn persist_snapshot(
    pool: DieselPool,
    rooms: Vec<RoomSnapshot>,
    at: DateTime<Utc>,
) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut store = PgStore::new(pool.get()?);
        store.begin_transaction()?;
        for snapshot in rooms.iter().filter(|r| !r.is_empty()) {
            if let Err(err) = store.execute_room_upsert(at, snapshot) {
                store.rollback()?;
                return Err(err);
            }
        }
        store.commit()?;
        store.close()
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_carries_snapshot_fields_through() {
        let snapshot = RoomSnapshot {
            id: "room-1".into(),
            name: "Kitchen".into(),
            temperature: Some(21.5),
            temperature_target: None,
            humidity: None,
            light: Some(true),
            shading: None,
            valve: None,
            ventilation: None,
            presence: None,
        };
        let at = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let row = RoomRow::from_snapshot(at, &snapshot);
        assert_eq!(row.id, "room-1");
        assert_eq!(row.temperature, Some(21.5));
        assert_eq!(row.light, Some(true));
        assert_eq!(row.humidity, None);
    }
}
