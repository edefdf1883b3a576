//! SQLite persistence of runs and per-generation state
//!
//! Uses schema versioning with migrations, like any long-lived results
//! database. Grids and misfit vectors are stored as JSON text.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::driver::{GenerationRecord, RunSummary};
use crate::error::Result;
use crate::grid::Grid;

pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 30000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Insert a new run record and return its id
    pub fn insert_run(&self, algorithm: &str, config_json: &str, population_size: usize) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (algorithm, config, population_size) VALUES (?1, ?2, ?3)",
            params![algorithm, config_json, population_size as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store one generation; recording the same generation again replaces it
    pub fn record_generation(&self, run_id: i64, record: &GenerationRecord) -> Result<()> {
        let misfit = misfit_json::to_string(&record.misfit)?;
        let positions = serde_json::to_string(&record.positions)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO generations (run_id, generation, misfit, positions)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, record.generation as i64, misfit, positions],
        )?;
        Ok(())
    }

    /// Update run statistics on completion
    pub fn finish_run(&self, run_id: i64, summary: &RunSummary) -> Result<()> {
        let best = summary.best.as_ref();
        let best_position = best.map(|b| serde_json::to_string(&b.position)).transpose()?;
        self.conn.execute(
            "UPDATE runs SET
                ended_at = datetime('now'),
                total_generations = ?2,
                total_evaluations = ?3,
                stopped_early = ?4,
                best_misfit = ?5,
                best_generation = ?6,
                best_index = ?7,
                best_position = ?8
             WHERE id = ?1",
            params![
                run_id,
                summary.generations as i64,
                summary.total_evaluated as i64,
                summary.stopped_early,
                best.map(|b| b.misfit as f64),
                best.map(|b| b.generation as i64),
                best.map(|b| b.index as i64),
                best_position,
            ],
        )?;
        Ok(())
    }

    pub fn load_generation(&self, run_id: i64, generation: usize) -> Result<Option<GenerationRecord>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT misfit, positions FROM generations WHERE run_id = ?1 AND generation = ?2",
                params![run_id, generation as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((misfit, positions)) => Ok(Some(GenerationRecord {
                generation,
                misfit: misfit_json::from_str(&misfit)?,
                positions: serde_json::from_str::<Vec<Grid>>(&positions)?,
            })),
            None => Ok(None),
        }
    }

    pub fn generation_count(&self, run_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM generations WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Best misfit stored by `finish_run`, if any
    pub fn best_misfit(&self, run_id: i64) -> Result<Option<f32>> {
        let best: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT best_misfit FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(best.flatten().map(|b| b as f32))
    }
}

/// JSON form of misfit vectors.
///
/// JSON has no infinities or NaN, and misfits are ±inf whenever a result was
/// replaced by the worst value. Finite values stay numbers; the rest are
/// written as strings (`"inf"`, `"-inf"`, `"NaN"`).
pub(crate) mod misfit_json {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f32),
        Text(String),
    }

    fn to_values(misfit: &[f32]) -> Vec<Value> {
        misfit
            .iter()
            .map(|&m| if m.is_finite() { Value::Number(m) } else { Value::Text(m.to_string()) })
            .collect()
    }

    fn from_values<E: serde::de::Error>(values: Vec<Value>) -> Result<Vec<f32>, E> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Number(m) => Ok(m),
                Value::Text(t) => t
                    .parse::<f32>()
                    .map_err(|_| E::custom(format!("invalid misfit '{}'", t))),
            })
            .collect()
    }

    pub fn serialize<S: Serializer>(misfit: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        to_values(misfit).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        from_values(Vec::<Value>::deserialize(deserializer)?)
    }

    pub fn to_string(misfit: &[f32]) -> serde_json::Result<String> {
        serde_json::to_string(&to_values(misfit))
    }

    pub fn from_str(text: &str) -> serde_json::Result<Vec<f32>> {
        from_values(serde_json::from_str::<Vec<Value>>(text)?)
    }
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now')),
            description TEXT
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for (version, description, sql) in get_migrations() {
        if version > current_version {
            log::info!("Applying migration {}: {}", version, description);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
                params![version, description],
            )?;
        }
    }
    Ok(())
}

/// All migrations as (version, description, sql)
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![(1, "Initial schema", include_str!("../migrations/001_initial_schema.sql"))]
}

/// Write one generation as pretty JSON into `dir` with a timestamped name.
pub fn save_snapshot(dir: impl AsRef<Path>, record: &GenerationRecord) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("generation_{:05}_{}.json", record.generation, timestamp));
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BestRecord;

    fn record(generation: usize) -> GenerationRecord {
        GenerationRecord {
            generation,
            misfit: vec![1.5, -0.25],
            positions: vec![
                Grid::from_vec(1, 2, vec![0.1, 0.2]).unwrap(),
                Grid::from_vec(1, 2, vec![-1.0, 2.5]).unwrap(),
            ],
        }
    }

    #[test]
    fn test_generations_round_trip_in_memory() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store.insert_run("pso", "{}", 2).unwrap();

        store.record_generation(run, &record(0)).unwrap();
        store.record_generation(run, &record(1)).unwrap();
        // Re-recording replaces
        store.record_generation(run, &record(1)).unwrap();

        assert_eq!(store.generation_count(run).unwrap(), 2);
        assert_eq!(store.load_generation(run, 1).unwrap(), Some(record(1)));
        assert_eq!(store.load_generation(run, 7).unwrap(), None);
    }

    #[test]
    fn test_non_finite_misfits_round_trip() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store.insert_run("ga", "{}", 2).unwrap();
        let mut rec = record(0);
        rec.misfit = vec![f32::INFINITY, 1.0];
        store.record_generation(run, &rec).unwrap();
        assert_eq!(store.load_generation(run, 0).unwrap(), Some(rec.clone()));

        rec.misfit = vec![f32::NEG_INFINITY, f32::NAN];
        let text = serde_json::to_string(&rec).unwrap();
        let back: GenerationRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.misfit[0], f32::NEG_INFINITY);
        assert!(back.misfit[1].is_nan());
    }

    #[test]
    fn test_misfit_json_format() {
        let text = misfit_json::to_string(&[0.5, f32::INFINITY]).unwrap();
        assert_eq!(text, r#"[0.5,"inf"]"#);
        assert_eq!(misfit_json::from_str(r#"[2,"-inf"]"#).unwrap(), vec![2.0, f32::NEG_INFINITY]);
        assert!(misfit_json::from_str(r#"["worst"]"#).is_err());
    }

    #[test]
    fn test_finish_run() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store.insert_run("ga", "{\"elite_count\":1}", 2).unwrap();
        assert_eq!(store.best_misfit(run).unwrap(), None);

        let summary = RunSummary {
            generations: 3,
            total_evaluated: 6,
            stopped_early: false,
            best: Some(BestRecord {
                generation: 2,
                index: 1,
                misfit: -0.25,
                position: Grid::zeros(1, 2),
            }),
        };
        store.finish_run(run, &summary).unwrap();
        assert_eq!(store.best_misfit(run).unwrap(), Some(-0.25));
    }

    #[test]
    fn test_file_database_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");
        {
            let store = RunStore::open(&path).unwrap();
            let run = store.insert_run("pso", "{}", 2).unwrap();
            store.record_generation(run, &record(0)).unwrap();
        }
        let store = RunStore::open(&path).unwrap();
        assert_eq!(store.generation_count(1).unwrap(), 1);
        let versions: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_save_snapshot_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_snapshot(dir.path().join("out"), &record(4)).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("generation_00004_"));
        assert!(name.ends_with(".json"));

        let text = std::fs::read_to_string(&path).unwrap();
        let back: GenerationRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record(4));
    }
}
