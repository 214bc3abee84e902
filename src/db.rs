use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::auth::{Identity, Session};
use crate::error::{Result, TrackerError};
use crate::models::{timestamp_now, Application, ApplicationPatch, ApplicationStatus, Note, Profile};
use crate::store::RemoteStore;

/// Environment override for the database location.
pub const DB_PATH_ENV: &str = "APPLYTRACK_DB";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open_at(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Explicit path, then `APPLYTRACK_DB`, then the platform data directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Some(path) = std::env::var_os(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applytrack") {
            proj_dirs.data_dir().join("applytrack.db")
        } else {
            PathBuf::from("applytrack.db")
        }
    }

    pub fn init(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                company_name TEXT NOT NULL CHECK (length(company_name) > 0),
                job_title TEXT NOT NULL CHECK (length(job_title) > 0),
                status TEXT NOT NULL DEFAULT 'WISHLIST'
                    CHECK (status IN ('WISHLIST', 'APPLIED', 'INTERVIEWING', 'OFFER', 'REJECTED')),
                job_url TEXT,
                location TEXT,
                applied_date TEXT,
                rejection_reason TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                interview_date TEXT,
                interview_time TEXT,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);
            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_notes_application ON notes(application_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> anyhow::Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'applytrack init' first."
            ));
        }
        Ok(())
    }

    // --- Profile and session operations ---

    pub fn upsert_profile(&self, email: &str, full_name: Option<&str>) -> Result<Profile> {
        let email = email.trim();
        if email.is_empty() {
            return Err(TrackerError::Validation("email is required".into()));
        }
        let now = timestamp_now();

        match self.get_profile_by_email(email)? {
            Some(existing) => {
                if let Some(name) = full_name {
                    self.conn
                        .execute(
                            "UPDATE profiles SET full_name = ?1, updated_at = ?2 WHERE id = ?3",
                            params![name, now, existing.id],
                        )
                        .map_err(TrackerError::write)?;
                }
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO profiles (id, email, full_name, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![uuid::Uuid::new_v4().to_string(), email, full_name, now],
                    )
                    .map_err(TrackerError::write)?;
            }
        }

        self.get_profile_by_email(email)?
            .ok_or_else(|| TrackerError::NotFound(format!("Profile '{}'", email)))
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                "SELECT id, email, full_name, created_at, updated_at FROM profiles WHERE id = ?1",
                [user_id],
                Self::row_to_profile,
            )
            .optional()
            .map_err(TrackerError::read)
    }

    fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                "SELECT id, email, full_name, created_at, updated_at
                 FROM profiles WHERE LOWER(email) = LOWER(?1)",
                [email],
                Self::row_to_profile,
            )
            .optional()
            .map_err(TrackerError::read)
    }

    pub fn replace_session(&self, user_id: &str) -> Result<()> {
        self.clear_sessions()?;
        self.conn
            .execute(
                "INSERT INTO sessions (user_id, created_at) VALUES (?1, ?2)",
                params![user_id, timestamp_now()],
            )
            .map_err(TrackerError::write)?;
        Ok(())
    }

    pub fn current_session(&self) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT p.id, p.email, s.created_at
                 FROM sessions s
                 JOIN profiles p ON s.user_id = p.id
                 ORDER BY s.id DESC LIMIT 1",
                [],
                |row| {
                    Ok(Session {
                        identity: Identity {
                            user_id: row.get(0)?,
                            email: row.get(1)?,
                        },
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(TrackerError::read)
    }

    pub fn clear_sessions(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions", [])
            .map_err(TrackerError::write)?;
        Ok(())
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        Ok(Profile {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        let status: String = row.get(4)?;
        let status = status
            .parse::<ApplicationStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;

        let applied_date: Option<String> = row.get(7)?;
        let applied_date = applied_date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        let tags: String = row.get(9)?;
        let tags: Vec<String> = serde_json::from_str(&tags)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

        let interview_date: Option<String> = row.get(12)?;
        let interview_date = interview_date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

        let interview_time: Option<String> = row.get(13)?;
        let interview_time = interview_time
            .map(|t| NaiveTime::parse_from_str(&t, TIME_FORMAT))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?;

        Ok(Application {
            id: row.get(0)?,
            user_id: row.get(1)?,
            company_name: row.get(2)?,
            job_title: row.get(3)?,
            status,
            job_url: row.get(5)?,
            location: row.get(6)?,
            applied_date,
            rejection_reason: row.get(8)?,
            tags,
            interview_date,
            interview_time,
            created_at: row.get(10)?,
            last_updated: row.get(11)?,
        })
    }

    fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            application_id: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(TrackerError::write)
}

fn encode_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn encode_time(time: Option<NaiveTime>) -> Option<String> {
    time.map(|t| t.format(TIME_FORMAT).to_string())
}

impl RemoteStore for Database {
    fn select_applications(&self, owner: &str) -> Result<Vec<Application>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, company_name, job_title, status, job_url, location,
                        applied_date, rejection_reason, tags, created_at, last_updated,
                        interview_date, interview_time
                 FROM applications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(TrackerError::read)?;

        let rows = stmt
            .query_map([owner], Self::row_to_application)
            .map_err(TrackerError::read)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(TrackerError::read)
    }

    fn insert_application(&self, row: &Application) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO applications (id, user_id, company_name, job_title, status, job_url,
                        location, applied_date, rejection_reason, tags, created_at, last_updated,
                        interview_date, interview_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    row.id,
                    row.user_id,
                    row.company_name,
                    row.job_title,
                    row.status.as_str(),
                    row.job_url,
                    row.location,
                    encode_date(row.applied_date),
                    row.rejection_reason,
                    encode_tags(&row.tags)?,
                    row.created_at,
                    row.last_updated,
                    encode_date(row.interview_date),
                    encode_time(row.interview_time),
                ],
            )
            .map_err(TrackerError::write)?;
        debug!(id = %row.id, "inserted application");
        Ok(())
    }

    fn update_application(&self, owner: &str, id: &str, patch: &ApplicationPatch) -> Result<()> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(company_name) = &patch.company_name {
            assignments.push("company_name");
            values.push(Box::new(company_name.clone()));
        }
        if let Some(job_title) = &patch.job_title {
            assignments.push("job_title");
            values.push(Box::new(job_title.clone()));
        }
        if let Some(status) = patch.status {
            assignments.push("status");
            values.push(Box::new(status.as_str()));
        }
        if let Some(job_url) = &patch.job_url {
            assignments.push("job_url");
            values.push(Box::new(job_url.clone()));
        }
        if let Some(location) = &patch.location {
            assignments.push("location");
            values.push(Box::new(location.clone()));
        }
        if let Some(applied_date) = patch.applied_date {
            assignments.push("applied_date");
            values.push(Box::new(encode_date(applied_date)));
        }
        if let Some(reason) = &patch.rejection_reason {
            assignments.push("rejection_reason");
            values.push(Box::new(reason.clone()));
        }
        if let Some(tags) = &patch.tags {
            assignments.push("tags");
            values.push(Box::new(encode_tags(tags)?));
        }
        if let Some(interview_date) = patch.interview_date {
            assignments.push("interview_date");
            values.push(Box::new(encode_date(interview_date)));
        }
        if let Some(interview_time) = patch.interview_time {
            assignments.push("interview_time");
            values.push(Box::new(encode_time(interview_time)));
        }
        assignments.push("last_updated");
        values.push(Box::new(timestamp_now()));

        let mut sql = String::from("UPDATE applications SET ");
        let set_clause: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        sql.push_str(&set_clause.join(", "));
        sql.push_str(&format!(
            " WHERE id = ?{} AND user_id = ?{}",
            values.len() + 1,
            values.len() + 2
        ));
        values.push(Box::new(id.to_string()));
        values.push(Box::new(owner.to_string()));

        let changed = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(TrackerError::write)?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("Application #{}", id)));
        }
        debug!(id, fields = assignments.len() - 1, "updated application");
        Ok(())
    }

    fn delete_application(&self, owner: &str, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM applications WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
            )
            .map_err(TrackerError::write)?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("Application #{}", id)));
        }
        Ok(())
    }

    fn select_notes(&self, owner: &str, application_id: &str) -> Result<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT n.id, n.application_id, n.content, n.created_at
                 FROM notes n
                 JOIN applications a ON n.application_id = a.id
                 WHERE a.user_id = ?1 AND n.application_id = ?2
                 ORDER BY n.created_at DESC, n.rowid DESC",
            )
            .map_err(TrackerError::read)?;

        let rows = stmt
            .query_map(params![owner, application_id], Self::row_to_note)
            .map_err(TrackerError::read)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(TrackerError::read)
    }

    fn insert_note(&self, owner: &str, note: &Note) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO notes (id, application_id, content, created_at)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (SELECT 1 FROM applications WHERE id = ?2 AND user_id = ?5)",
                params![note.id, note.application_id, note.content, note.created_at, owner],
            )
            .map_err(TrackerError::write)?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!(
                "Application #{}",
                note.application_id
            )));
        }
        Ok(())
    }

    fn delete_note(&self, owner: &str, note_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM notes
                 WHERE id = ?1
                   AND application_id IN (SELECT id FROM applications WHERE user_id = ?2)",
                params![note_id, owner],
            )
            .map_err(TrackerError::write)?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("Note #{}", note_id)));
        }
        Ok(())
    }
}
