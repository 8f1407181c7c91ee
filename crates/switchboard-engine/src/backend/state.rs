use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::types::RunId;

use crate::runner::StepExecution;

/// The loop's durably recorded control state.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub current_agent: String,
    /// Index of the next step to execute.
    pub next_step: usize,
    pub variables: HashMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent run-state store backed by SQLite.
///
/// Step results are keyed by (run_id, step) and written before the loop
/// advances; re-executing a run with the same id replays recorded results
/// instead of re-dispatching, so a crashed run resumes at the last
/// completed step.
pub struct RunStateStore {
    conn: Mutex<Connection>,
}

impl RunStateStore {
    /// Open or create the run-state database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SwitchboardError::State(format!("Failed to create state directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SwitchboardError::State(format!("Failed to open state store: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS run_steps (
                 run_id TEXT NOT NULL,
                 step INTEGER NOT NULL,
                 agent_name TEXT NOT NULL,
                 execution_json TEXT NOT NULL,
                 timestamp TEXT NOT NULL,
                 PRIMARY KEY (run_id, step)
             );

             CREATE TABLE IF NOT EXISTS run_control (
                 run_id TEXT PRIMARY KEY,
                 current_agent TEXT NOT NULL,
                 next_step INTEGER NOT NULL,
                 variables_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )
        .map_err(|e| SwitchboardError::State(format!("Failed to initialize state schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record one step's result. Idempotent per (run_id, step).
    pub fn save_step(
        &self,
        run_id: &RunId,
        step: usize,
        agent_name: &str,
        exec: &StepExecution,
    ) -> Result<()> {
        let execution_json = serde_json::to_string(exec)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO run_steps (run_id, step, agent_name, execution_json, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id.0,
                step as i64,
                agent_name,
                execution_json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SwitchboardError::State(format!("Failed to save step: {}", e)))?;
        Ok(())
    }

    /// Load a recorded step result, if the step already completed.
    pub fn load_step(&self, run_id: &RunId, step: usize) -> Result<Option<StepExecution>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT execution_json FROM run_steps WHERE run_id = ?1 AND step = ?2",
                params![run_id.0, step as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SwitchboardError::State(format!("Failed to load step: {}", e)))?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Record the loop's control state (upserts by run_id).
    pub fn save_control(
        &self,
        run_id: &RunId,
        current_agent: &str,
        next_step: usize,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let variables_json = serde_json::to_string(variables)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO run_control (run_id, current_agent, next_step, variables_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id.0,
                current_agent,
                next_step as i64,
                variables_json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SwitchboardError::State(format!("Failed to save control state: {}", e)))?;
        Ok(())
    }

    /// Load the loop's last recorded control state.
    pub fn load_control(&self, run_id: &RunId) -> Result<Option<ControlState>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT current_agent, next_step, variables_json, updated_at
                 FROM run_control WHERE run_id = ?1",
                params![run_id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| SwitchboardError::State(format!("Failed to load control state: {}", e)))?;

        match row {
            Some((current_agent, next_step, variables_json, updated_at)) => {
                Ok(Some(ControlState {
                    current_agent,
                    next_step: next_step as usize,
                    variables: serde_json::from_str(&variables_json)?,
                    updated_at: DateTime::parse_from_rfc3339(&updated_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }))
            }
            None => Ok(None),
        }
    }

    /// Delete all recorded state for a run (e.g. after successful completion).
    pub fn delete_run(&self, run_id: &RunId) -> Result<usize> {
        let conn = self.lock()?;
        let steps = conn
            .execute("DELETE FROM run_steps WHERE run_id = ?1", params![run_id.0])
            .map_err(|e| SwitchboardError::State(format!("Failed to delete steps: {}", e)))?;
        conn.execute(
            "DELETE FROM run_control WHERE run_id = ?1",
            params![run_id.0],
        )
        .map_err(|e| SwitchboardError::State(format!("Failed to delete control state: {}", e)))?;
        Ok(steps)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SwitchboardError::State(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, RunStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::open(&dir.path().join("runs.db")).unwrap();
        (dir, store)
    }

    fn exec_with(key: &str, value: serde_json::Value) -> StepExecution {
        let mut outputs = HashMap::new();
        outputs.insert(key.to_string(), value);
        StepExecution {
            inputs: HashMap::new(),
            outputs,
        }
    }

    #[test]
    fn test_save_and_load_step() {
        let (_dir, store) = temp_store();
        let run_id = RunId::new();

        store
            .save_step(&run_id, 0, "a", &exec_with("y", serde_json::json!(2)))
            .unwrap();

        let loaded = store.load_step(&run_id, 0).unwrap().unwrap();
        assert_eq!(loaded.outputs["y"], serde_json::json!(2));

        assert!(store.load_step(&run_id, 1).unwrap().is_none());
    }

    #[test]
    fn test_steps_scoped_by_run() {
        let (_dir, store) = temp_store();
        let run_a = RunId::new();
        let run_b = RunId::new();

        store
            .save_step(&run_a, 0, "a", &exec_with("k", serde_json::json!("a")))
            .unwrap();

        assert!(store.load_step(&run_b, 0).unwrap().is_none());
    }

    #[test]
    fn test_control_state_roundtrip() {
        let (_dir, store) = temp_store();
        let run_id = RunId::new();

        let mut vars = HashMap::new();
        vars.insert("x".to_string(), serde_json::json!(1));
        store.save_control(&run_id, "b", 1, &vars).unwrap();

        let control = store.load_control(&run_id).unwrap().unwrap();
        assert_eq!(control.current_agent, "b");
        assert_eq!(control.next_step, 1);
        assert_eq!(control.variables["x"], serde_json::json!(1));
    }

    #[test]
    fn test_control_state_upserts() {
        let (_dir, store) = temp_store();
        let run_id = RunId::new();

        store
            .save_control(&run_id, "a", 1, &HashMap::new())
            .unwrap();
        store
            .save_control(&run_id, "b", 2, &HashMap::new())
            .unwrap();

        let control = store.load_control(&run_id).unwrap().unwrap();
        assert_eq!(control.current_agent, "b");
        assert_eq!(control.next_step, 2);
    }

    #[test]
    fn test_delete_run() {
        let (_dir, store) = temp_store();
        let run_id = RunId::new();

        store
            .save_step(&run_id, 0, "a", &exec_with("k", serde_json::json!(1)))
            .unwrap();
        store
            .save_control(&run_id, "a", 1, &HashMap::new())
            .unwrap();

        let deleted = store.delete_run(&run_id).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.load_step(&run_id, 0).unwrap().is_none());
        assert!(store.load_control(&run_id).unwrap().is_none());
    }
}
