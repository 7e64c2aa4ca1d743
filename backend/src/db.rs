use crate::schema::*;
use crate::utils::sqlite_timestamp;
use chrono::NaiveDateTime;
use common::req::SensorReading;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PoolError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use std::time::Duration;

/// Row cap of the unbounded readings query.
pub const LATEST_LIMIT: i64 = 100;

// Same layout as files written by the original python server, so an existing
// `sensor_data.db` keeps working.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sensor_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    temperature REAL,
    humidity REAL,
    bpm REAL,
    ir INTEGER,
    accX REAL,
    accY REAL,
    accZ REAL,
    flameDigital INTEGER,
    flameAnalog INTEGER,
    gasDigital INTEGER,
    gasAnalog INTEGER,
    spo2 REAL,
    timestamp INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("username already exists")]
    Duplicate,
    #[error("no database connection available: {0}")]
    Pool(#[from] PoolError),
    #[error("query failed: {0}")]
    Query(#[from] DieselError),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = sensor_data)]
pub struct NewSensorReading {
    pub temperature: Option<f64>, // °C
    pub humidity: Option<f64>,    // percent
    pub bpm: Option<f64>,
    pub ir: Option<i32>,
    pub acc_x: Option<f64>,
    pub acc_y: Option<f64>,
    pub acc_z: Option<f64>,
    pub flame_digital: Option<i32>,
    pub flame_analog: Option<i32>,
    pub gas_digital: Option<i32>,
    pub gas_analog: Option<i32>,
    pub spo2: Option<f64>,        // percent
    pub timestamp: i64,           // s since epoch
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = sensor_data)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[allow(unused)]
pub struct StoredReading {
    pub id: i32,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub bpm: Option<f64>,
    pub ir: Option<i32>,
    pub acc_x: Option<f64>,
    pub acc_y: Option<f64>,
    pub acc_z: Option<f64>,
    pub flame_digital: Option<i32>,
    pub flame_analog: Option<i32>,
    pub gas_digital: Option<i32>,
    pub gas_analog: Option<i32>,
    pub spo2: Option<f64>,
    pub timestamp: i64,
    pub created_at: Option<NaiveDateTime>,
}

impl From<StoredReading> for SensorReading {
    fn from(row: StoredReading) -> Self {
        Self {
            temperature: row.temperature,
            humidity: row.humidity,
            bpm: row.bpm,
            ir: row.ir,
            acc_x: row.acc_x,
            acc_y: row.acc_y,
            acc_z: row.acc_z,
            flame_digital: row.flame_digital,
            flame_analog: row.flame_analog,
            gas_digital: row.gas_digital,
            gas_analog: row.gas_analog,
            spo2: row.spo2,
            timestamp: row.timestamp,
            created_at: row.created_at.as_ref().map(sqlite_timestamp),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    username: &'a str,
    password_hash: &'a str,
}

/// Inclusive `[start, end]` bounds on the reading timestamp, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

// Let SQLite's own file lock serialize writers instead of failing fast with SQLITE_BUSY.
#[derive(Debug)]
struct BusyTimeout(Duration);

impl CustomizeConnection<SqliteConnection, r2d2::Error> for BusyTimeout {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", self.0.as_millis()))
            .map_err(r2d2::Error::QueryError)
    }
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Db {
    pub fn connect(
        database_url: &str,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> StorageResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(BusyTimeout(busy_timeout)))
            .build(manager)?;

        let db = Self { pool };
        db.ensure_schema()?;

        Ok(db)
    }

    /// Creates both tables if they are missing. Safe to run any number of times,
    /// from any number of connections.
    pub fn ensure_schema(&self) -> StorageResult<()> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(SCHEMA)?;

        Ok(())
    }

    pub fn insert_reading(&self, reading: &NewSensorReading) -> StorageResult<()> {
        log::debug!("Insert reading into db");
        let mut conn = self.pool.get()?;

        diesel::insert_into(sensor_data::table)
            .values(reading)
            .execute(&mut *conn)?;

        Ok(())
    }

    /// Readings inside `range`, or the latest [`LATEST_LIMIT`] when there is none.
    /// Newest first in both cases.
    pub fn query_readings(&self, range: Option<TimeRange>) -> StorageResult<Vec<StoredReading>> {
        use crate::schema::sensor_data::dsl::*;
        let mut conn = self.pool.get()?;

        let newest_first = sensor_data
            .select(StoredReading::as_select())
            .order((created_at.desc(), id.desc()));

        let rows: Vec<StoredReading> = match range {
            Some(range) => newest_first
                .filter(timestamp.between(range.start, range.end))
                .load(&mut *conn)?,
            None => newest_first.limit(LATEST_LIMIT).load(&mut *conn)?,
        };

        Ok(rows)
    }

    pub fn insert_user(&self, username: &str, password_hash: &str) -> StorageResult<()> {
        let mut conn = self.pool.get()?;

        diesel::insert_into(users::table)
            .values(&NewUser {
                username,
                password_hash,
            })
            .execute(&mut *conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    StorageError::Duplicate
                }
                e => StorageError::Query(e),
            })?;

        Ok(())
    }

    pub fn user_password_hash(&self, name: &str) -> StorageResult<Option<String>> {
        let mut conn = self.pool.get()?;

        let hash = users::table
            .filter(users::username.eq(name))
            .select(users::password_hash)
            .first::<String>(&mut *conn)
            .optional()?;

        Ok(hash)
    }

    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> StorageResult<()> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(sql)?;

        Ok(())
    }

    #[cfg(test)]
    pub fn user_count(&self, name: &str) -> StorageResult<i64> {
        let mut conn = self.pool.get()?;

        let count = users::table
            .filter(users::username.eq(name))
            .count()
            .get_result(&mut *conn)?;

        Ok(count)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::TempDir;

    pub fn open_temp_db() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor_data.db");
        let db = Db::connect(path.to_str().unwrap(), 4, Duration::from_secs(5)).unwrap();
        (dir, db)
    }

    fn reading(temperature: f64, timestamp: i64) -> NewSensorReading {
        NewSensorReading {
            temperature: Some(temperature),
            humidity: Some(40.0),
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let (_dir, db) = open_temp_db();
        db.ensure_schema().unwrap();
        db.ensure_schema().unwrap();

        db.insert_reading(&reading(20.0, 1)).unwrap();
        db.ensure_schema().unwrap();
        assert_eq!(db.query_readings(None).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_first_use_keeps_schema_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");
        let url = path.to_str().unwrap().to_owned();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let url = url.clone();
                std::thread::spawn(move || {
                    let db = Db::connect(&url, 2, Duration::from_secs(5)).unwrap();
                    db.insert_reading(&reading(i as f64, i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let db = Db::connect(&url, 1, Duration::from_secs(5)).unwrap();
        assert_eq!(db.query_readings(None).unwrap().len(), 4);
    }

    #[test]
    fn optional_fields_are_stored_as_null() {
        let (_dir, db) = open_temp_db();
        db.insert_reading(&NewSensorReading {
            temperature: Some(36.5),
            humidity: Some(40.2),
            bpm: Some(72.0),
            gas_analog: Some(311),
            timestamp: 1_700_000_000,
            ..Default::default()
        })
        .unwrap();

        let rows = db.query_readings(None).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.temperature, Some(36.5));
        assert_eq!(row.humidity, Some(40.2));
        assert_eq!(row.bpm, Some(72.0));
        assert_eq!(row.gas_analog, Some(311));
        assert_eq!(row.ir, None);
        assert_eq!(row.acc_x, None);
        assert_eq!(row.spo2, None);
        assert_eq!(row.timestamp, 1_700_000_000);
        assert!(row.created_at.is_some());
    }

    #[test]
    fn range_query_is_inclusive_and_newest_first() {
        let (_dir, db) = open_temp_db();
        for ts in [100, 200, 300, 400, 500] {
            db.insert_reading(&reading(ts as f64, ts)).unwrap();
        }

        let rows = db
            .query_readings(Some(TimeRange {
                start: 200,
                end: 400,
            }))
            .unwrap();
        let stamps: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![400, 300, 200]);
    }

    #[test]
    fn empty_range_is_not_an_error() {
        let (_dir, db) = open_temp_db();
        db.insert_reading(&reading(20.0, 100)).unwrap();

        let rows = db
            .query_readings(Some(TimeRange {
                start: 1000,
                end: 2000,
            }))
            .unwrap();
        assert!(rows.is_empty());

        let rows = db
            .query_readings(Some(TimeRange {
                start: 500,
                end: 10,
            }))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn latest_query_is_capped() {
        let (_dir, db) = open_temp_db();
        for i in 0..(LATEST_LIMIT + 5) {
            db.insert_reading(&reading(i as f64, 1_000)).unwrap();
        }

        let rows = db.query_readings(None).unwrap();
        assert_eq!(rows.len(), LATEST_LIMIT as usize);
        assert_eq!(rows[0].temperature, Some((LATEST_LIMIT + 4) as f64));
        assert_eq!(rows[99].temperature, Some(5.0));
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (_dir, db) = open_temp_db();
        db.insert_user("alice", "hash-1").unwrap();

        let err = db.insert_user("alice", "hash-2").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate));
        assert_eq!(db.user_count("alice").unwrap(), 1);
        assert_eq!(
            db.user_password_hash("alice").unwrap().as_deref(),
            Some("hash-1")
        );
    }

    #[test]
    fn unknown_user_has_no_hash() {
        let (_dir, db) = open_temp_db();
        assert_eq!(db.user_password_hash("nobody").unwrap(), None);
    }

    #[test]
    fn stored_reading_converts_to_wire_form() {
        let row = StoredReading {
            id: 7,
            temperature: Some(21.5),
            humidity: Some(55.0),
            bpm: None,
            ir: Some(1200),
            acc_x: Some(0.1),
            acc_y: Some(0.2),
            acc_z: Some(9.8),
            flame_digital: Some(1),
            flame_analog: Some(1023),
            gas_digital: Some(0),
            gas_analog: Some(87),
            spo2: Some(98.0),
            timestamp: 1_700_000_000,
            created_at: NaiveDateTime::parse_from_str("2024-03-01 12:30:05", "%Y-%m-%d %H:%M:%S")
                .ok(),
        };

        let wire = SensorReading::from(row);
        assert_eq!(wire.ir, Some(1200));
        assert_eq!(wire.acc_z, Some(9.8));
        assert_eq!(wire.created_at.as_deref(), Some("2024-03-01 12:30:05"));
    }
}
