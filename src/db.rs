use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::model::{AssignmentGroup, Course, Enrollment, GradingPeriod, Id};

pub const DB_FILE_NAME: &str = "gradesd.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            apply_group_weights INTEGER NOT NULL DEFAULT 0,
            payload TEXT NOT NULL,
            synced_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_periods(
            course_id INTEGER PRIMARY KEY,
            payload TEXT NOT NULL,
            next_url TEXT,
            synced_at TEXT
        )",
        [],
    )?;

    // scope_key is 'all' for the unscoped list, otherwise the grading period id.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_groups(
            course_id INTEGER NOT NULL,
            scope_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            next_url TEXT,
            synced_at TEXT,
            PRIMARY KEY(course_id, scope_key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            course_id INTEGER NOT NULL,
            grading_period_id INTEGER NOT NULL,
            payload TEXT NOT NULL,
            synced_at TEXT,
            PRIMARY KEY(course_id, grading_period_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fetch_failures(
            endpoint TEXT NOT NULL,
            course_id INTEGER NOT NULL,
            scope_key TEXT NOT NULL,
            status INTEGER NOT NULL,
            message TEXT NOT NULL,
            recorded_at TEXT,
            PRIMARY KEY(endpoint, course_id, scope_key)
        )",
        [],
    )?;

    ensure_courses_apply_group_weights(&conn)?;

    Ok(conn)
}

/// Connection to an already initialised workspace database.
pub fn open_existing(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

pub fn scope_key(grading_period_id: Option<Id>) -> String {
    grading_period_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "all".to_string())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub const ONLINE_KEY: &str = "sync.online";

pub fn is_online(conn: &Connection) -> anyhow::Result<bool> {
    Ok(settings_get_json(conn, ONLINE_KEY)?
        .and_then(|v| v.as_bool())
        .unwrap_or(true))
}

fn clear_failure(conn: &Connection, endpoint: &str, course_id: Id, scope: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM fetch_failures WHERE endpoint = ? AND course_id = ? AND scope_key = ?",
        (endpoint, course_id, scope),
    )?;
    Ok(())
}

pub fn record_failure(
    conn: &Connection,
    endpoint: &str,
    course_id: Id,
    grading_period_id: Option<Id>,
    status: u16,
    message: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO fetch_failures(endpoint, course_id, scope_key, status, message, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(endpoint, course_id, scope_key) DO UPDATE SET
           status = excluded.status,
           message = excluded.message,
           recorded_at = excluded.recorded_at",
        (
            endpoint,
            course_id,
            scope_key(grading_period_id),
            status as i64,
            message,
            now(),
        ),
    )?;
    Ok(())
}

pub fn recorded_failure(
    conn: &Connection,
    endpoint: &str,
    course_id: Id,
    grading_period_id: Option<Id>,
) -> anyhow::Result<Option<(u16, String)>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT status, message FROM fetch_failures
             WHERE endpoint = ? AND course_id = ? AND scope_key = ?",
            (endpoint, course_id, scope_key(grading_period_id)),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(row.map(|(status, message)| (status.clamp(0, u16::MAX as i64) as u16, message)))
}

pub fn upsert_course(conn: &Connection, course: &Course) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO courses(id, name, apply_group_weights, payload, synced_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           apply_group_weights = excluded.apply_group_weights,
           payload = excluded.payload,
           synced_at = excluded.synced_at",
        (
            course.id,
            &course.name,
            course.apply_assignment_group_weights as i64,
            serde_json::to_string(course)?,
            now(),
        ),
    )?;
    clear_failure(conn, "course", course.id, &scope_key(None))?;
    Ok(())
}

pub fn load_course(conn: &Connection, course_id: Id) -> anyhow::Result<Option<Course>> {
    let payload: Option<String> = conn
        .query_row("SELECT payload FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
    }
}

pub fn upsert_grading_periods(
    conn: &Connection,
    course_id: Id,
    periods: &[GradingPeriod],
    next_url: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO grading_periods(course_id, payload, next_url, synced_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(course_id) DO UPDATE SET
           payload = excluded.payload,
           next_url = excluded.next_url,
           synced_at = excluded.synced_at",
        (course_id, serde_json::to_string(periods)?, next_url, now()),
    )?;
    clear_failure(conn, "gradingPeriods", course_id, &scope_key(None))?;
    Ok(())
}

pub fn load_grading_periods(
    conn: &Connection,
    course_id: Id,
) -> anyhow::Result<Option<(Vec<GradingPeriod>, Option<String>)>> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT payload, next_url FROM grading_periods WHERE course_id = ?",
            [course_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match row {
        Some((p, next)) => Ok(Some((serde_json::from_str(&p)?, next))),
        None => Ok(None),
    }
}

pub fn upsert_assignment_groups(
    conn: &Connection,
    course_id: Id,
    grading_period_id: Option<Id>,
    groups: &[AssignmentGroup],
    next_url: Option<&str>,
) -> anyhow::Result<()> {
    let scope = scope_key(grading_period_id);
    conn.execute(
        "INSERT INTO assignment_groups(course_id, scope_key, payload, next_url, synced_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(course_id, scope_key) DO UPDATE SET
           payload = excluded.payload,
           next_url = excluded.next_url,
           synced_at = excluded.synced_at",
        (course_id, &scope, serde_json::to_string(groups)?, next_url, now()),
    )?;
    clear_failure(conn, "assignmentGroups", course_id, &scope)?;
    Ok(())
}

pub fn load_assignment_groups(
    conn: &Connection,
    course_id: Id,
    grading_period_id: Option<Id>,
) -> anyhow::Result<Option<(Vec<AssignmentGroup>, Option<String>)>> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT payload, next_url FROM assignment_groups WHERE course_id = ? AND scope_key = ?",
            (course_id, scope_key(grading_period_id)),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match row {
        Some((p, next)) => Ok(Some((serde_json::from_str(&p)?, next))),
        None => Ok(None),
    }
}

pub fn upsert_enrollments(
    conn: &Connection,
    course_id: Id,
    grading_period_id: Id,
    enrollments: &[Enrollment],
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO enrollments(course_id, grading_period_id, payload, synced_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(course_id, grading_period_id) DO UPDATE SET
           payload = excluded.payload,
           synced_at = excluded.synced_at",
        (
            course_id,
            grading_period_id,
            serde_json::to_string(enrollments)?,
            now(),
        ),
    )?;
    clear_failure(conn, "enrollments", course_id, &scope_key(Some(grading_period_id)))?;
    Ok(())
}

pub fn load_enrollments(
    conn: &Connection,
    course_id: Id,
    grading_period_id: Id,
) -> anyhow::Result<Option<Vec<Enrollment>>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM enrollments WHERE course_id = ? AND grading_period_id = ?",
            (course_id, grading_period_id),
            |r| r.get(0),
        )
        .optional()?;
    match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
    }
}

fn ensure_courses_apply_group_weights(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "apply_group_weights")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE courses ADD COLUMN apply_group_weights INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
