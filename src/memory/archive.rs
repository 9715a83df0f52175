// src/memory/archive.rs — SQLite audit trail
//
// Append-only mirror of the in-memory history. Insert failures mid-run
// are logged and swallowed; failing to open the archive at INITIALIZING
// is an infrastructure fault.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::core::types::{AgentResult, CompetitionContext, IterationRecord};
use crate::infra::errors::AgentError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    data_dir TEXT NOT NULL,
    metric TEXT NOT NULL,
    target_column TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    termination_reason TEXT,
    final_score REAL,
    total_iterations INTEGER
);
CREATE TABLE IF NOT EXISTS iterations (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES runs(id),
    idx INTEGER NOT NULL,
    overall_score REAL,
    degraded INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS phase_results (
    id TEXT PRIMARY KEY,
    iteration_id TEXT NOT NULL REFERENCES iterations(id),
    phase TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    attempts INTEGER NOT NULL,
    status TEXT NOT NULL,
    score REAL,
    degraded INTEGER NOT NULL,
    generated_code TEXT NOT NULL,
    stderr_head TEXT
);
";

pub struct Archive {
    conn: Connection,
    run_id: String,
}

impl Archive {
    /// Open (or create) the archive database and start a run row.
    pub fn open(path: &Path, ctx: &CompetitionContext) -> Result<Self, AgentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AgentError::Infrastructure(format!(
                    "cannot create archive dir {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO runs (id, data_dir, metric, target_column, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                ctx.data_dir.display().to_string(),
                ctx.metric,
                ctx.target_column,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(Self { conn, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_iteration(&self, record: &IterationRecord) -> Result<(), AgentError> {
        self.conn.execute(
            "INSERT INTO iterations (id, run_id, idx, overall_score, degraded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                self.run_id,
                record.index,
                record.overall_score,
                record.degraded as i32,
                record.created_at.to_rfc3339(),
            ],
        )?;

        for phase in &record.phases {
            self.conn.execute(
                "INSERT INTO phase_results (id, iteration_id, phase, ordinal, attempts,
                 status, score, degraded, generated_code, stderr_head)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    record.id,
                    phase.spec.name.as_str(),
                    phase.spec.ordinal as i64,
                    phase.attempts,
                    phase.outcome.status.to_string(),
                    phase.outcome.score,
                    phase.degraded as i32,
                    phase.artifact.code,
                    phase.outcome.error_head(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn complete_run(&self, result: &AgentResult) -> Result<(), AgentError> {
        self.conn.execute(
            "UPDATE runs SET completed_at = ?1, termination_reason = ?2,
             final_score = ?3, total_iterations = ?4
             WHERE id = ?5",
            params![
                Utc::now().to_rfc3339(),
                result.termination_reason.to_string(),
                result.final_score,
                result.total_iterations,
                self.run_id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IterationRecord, TerminationReason};

    fn test_context(dir: &Path) -> CompetitionContext {
        std::fs::write(dir.join("train.csv"), "a,target\n1,0\n").unwrap();
        CompetitionContext::resolve(dir, Some("auc"), None, None, 3).unwrap()
    }

    #[test]
    fn test_open_and_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let archive = Archive::open(&dir.path().join(".tabiter/history.db"), &ctx).unwrap();

        let record = IterationRecord::new(0, vec![]);
        archive.record_iteration(&record).unwrap();

        let result = AgentResult {
            final_score: Some(0.7),
            best_iteration: Some(0),
            termination_reason: TerminationReason::MaxIterations,
            total_iterations: 1,
            submission_path: None,
            error_context: None,
        };
        archive.complete_run(&result).unwrap();

        let n: i64 = archive
            .conn
            .query_row("SELECT COUNT(*) FROM iterations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
        let reason: String = archive
            .conn
            .query_row("SELECT termination_reason FROM runs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(reason, "max_iterations");
    }
}
