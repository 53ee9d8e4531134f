//! Registered users.
//!
//! Credentials live in the `users` table next to the history ledger.
//! Passwords are stored as `sha256$<salt>$<digest>` with a per-user random
//! salt; plaintext is never written.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

const SALT_BYTES: usize = 16;
const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username is required")]
    MissingUsername,
    #[error("password must be at least {} characters", MIN_PASSWORD_CHARS)]
    WeakPassword,
    #[error("user already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("user store error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("user store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

pub struct UserStore {
    conn: Mutex<Connection>,
}

impl UserStore {
    pub fn open(path: &Path) -> Result<Self, UserError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, UserError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, UserError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, UserError> {
        self.conn.lock().map_err(|_| UserError::Poisoned)
    }

    pub fn register(&self, username: &str, password: &str) -> Result<User, UserError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserError::MissingUsername);
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(UserError::WeakPassword);
        }

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, hash_password(password), created_at],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(UserError::AlreadyExists(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        info!("Registered user {username} (#{id})");
        Ok(User {
            id,
            username: username.to_string(),
            created_at,
        })
    }

    /// Check credentials. Unknown users and wrong passwords are reported
    /// the same way.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, UserError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                params![username.trim()],
                |r| {
                    Ok((
                        User {
                            id: r.get(0)?,
                            username: r.get(1)?,
                            created_at: r.get(3)?,
                        },
                        r.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((user, stored)) if verify_password(password, &stored) => Ok(user),
            _ => Err(UserError::InvalidCredentials),
        }
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("sha256${}${}", hex::encode(salt), digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some("sha256"), Some(salt_hex), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    match hex::decode(salt_hex) {
        Ok(salt) => digest(&salt, password) == expected,
        Err(_) => false,
    }
}
