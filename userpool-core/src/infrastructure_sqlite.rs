//! SQLite-backed IdentityStore implementation.
//! Lock state survives restarts and may be shared by several server
//! processes pointing at the same database file.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! userpool-core = { path = "../userpool-core", features = ["sqlite"] }
//! ```

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::time::Duration;

use crate::error::StoreError;
use crate::infrastructure::IdentityStore;
use crate::types::*;

/// Upper bound on open connections per store
const MAX_CONNECTIONS: u32 = 8;

/// How long a writer waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, login, credential, project_id, env, domain, created_at, free_since, lock_state, locked_at, holder_token, holder";

/// A persistent identity store backed by SQLite.
///
/// Uses WAL mode over an r2d2 connection pool. Lock-state changes are single
/// conditional `UPDATE`s, so SQLite decides every compare-and-set race.
pub struct SqliteIdentityStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteIdentityStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if path.is_empty() || path == ":memory:" {
            // Every connection to ":memory:" would see its own empty database.
            return Err(StoreError::Backend(format!(
                "'{}' is not a shareable SQLite path; use the in-memory store instead",
                path
            )));
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });
        let pool = Pool::builder()
            .max_size(MAX_CONNECTIONS)
            .min_idle(Some(1))
            .build(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                id           TEXT PRIMARY KEY,
                login        TEXT NOT NULL UNIQUE,
                credential   TEXT NOT NULL,
                project_id   TEXT NOT NULL,
                env          TEXT NOT NULL,
                domain       TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                free_since   INTEGER NOT NULL,
                lock_state   TEXT NOT NULL DEFAULT 'Free',
                locked_at    INTEGER,
                holder_token TEXT,
                holder       TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_identities_free ON identities(lock_state, free_since, id);
            CREATE INDEX IF NOT EXISTS idx_identities_locked_at ON identities(locked_at);",
        )?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Unparsable stored values are corruption, not driver failures.
    fn read_error(e: rusqlite::Error) -> StoreError {
        match e {
            rusqlite::Error::FromSqlConversionFailure(idx, _, err) => {
                StoreError::Corrupt(format!("column {}: {}", idx, err))
            }
            e => StoreError::Sqlite(e),
        }
    }

    fn conversion_error(idx: usize, err: ParseAttributeError) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
    }

    fn row_to_identity(row: &rusqlite::Row) -> rusqlite::Result<Identity> {
        let env: String = row.get(4)?;
        let domain: String = row.get(5)?;
        let state: String = row.get(8)?;
        let locked_at: Option<u64> = row.get(9)?;
        let holder_token: Option<String> = row.get(10)?;
        let holder: Option<String> = row.get(11)?;

        let lock_state = match (state.as_str(), locked_at, holder_token) {
            (LockState::FREE, _, _) => LockState::Free,
            (LockState::LOCKED, Some(locked_at), Some(token)) => LockState::Locked {
                locked_at,
                holder_token: HolderToken::from(token),
                holder: holder.unwrap_or_default(),
            },
            _ => {
                return Err(Self::conversion_error(
                    8,
                    ParseAttributeError::new(
                        "lock_state",
                        state.clone(),
                        "Free, Locked (with locked_at and holder_token)",
                    ),
                ))
            }
        };

        Ok(Identity {
            id: IdentityId::from(row.get::<_, String>(0)?),
            login: row.get(1)?,
            credential: row.get(2)?,
            project_id: row.get(3)?,
            env: env.parse().map_err(|e| Self::conversion_error(4, e))?,
            domain: domain.parse().map_err(|e| Self::conversion_error(5, e))?,
            created_at: row.get(6)?,
            free_since: row.get(7)?,
            lock_state,
        })
    }

    fn query_identities(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Identity>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_identity)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(Self::read_error)?);
        }
        Ok(out)
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn insert(&self, identity: Identity) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO identities (id, login, credential, project_id, env, domain, created_at, free_since, lock_state, locked_at, holder_token, holder)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                identity.id.as_str(),
                identity.login,
                identity.credential,
                identity.project_id,
                identity.env.as_str(),
                identity.domain.as_str(),
                identity.created_at,
                identity.free_since,
                identity.lock_state.label(),
                identity.lock_state.locked_at(),
                identity.lock_state.holder_token().map(HolderToken::as_str),
                identity.lock_state.holder(),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate(identity.login))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM identities WHERE id = ?1"),
            params![id.as_str()],
            Self::row_to_identity,
        )
        .optional()
        .map_err(Self::read_error)
    }

    fn find_one_free_matching(&self, criteria: &Criteria) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM identities
                 WHERE lock_state = 'Free'
                   AND (?1 IS NULL OR env = ?1)
                   AND (?2 IS NULL OR domain = ?2)
                   AND (?3 IS NULL OR project_id = ?3)
                   AND (?4 IS NULL OR id = ?4)
                 ORDER BY free_since ASC, id ASC
                 LIMIT 1"
            ),
            params![
                criteria.env.map(Environment::as_str),
                criteria.domain.map(DomainType::as_str),
                criteria.project_id.as_deref(),
                criteria.identity_id.as_ref().map(IdentityId::as_str),
            ],
            Self::row_to_identity,
        )
        .optional()
        .map_err(Self::read_error)
    }

    fn compare_and_set_state(
        &self,
        id: &IdentityId,
        expected: &LockState,
        new: &LockState,
        at: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE identities
             SET lock_state = ?1,
                 locked_at = ?2,
                 holder_token = ?3,
                 holder = ?4,
                 free_since = CASE WHEN ?1 = 'Free' THEN ?5 ELSE free_since END
             WHERE id = ?6 AND lock_state = ?7 AND holder_token IS ?8",
            params![
                new.label(),
                new.locked_at(),
                new.holder_token().map(HolderToken::as_str),
                new.holder(),
                at,
                id.as_str(),
                expected.label(),
                expected.holder_token().map(HolderToken::as_str),
            ],
        )?;
        Ok(rows == 1)
    }

    fn list(&self, criteria: &Criteria) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn()?;
        Self::query_identities(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM identities
                 WHERE (?1 IS NULL OR env = ?1)
                   AND (?2 IS NULL OR domain = ?2)
                   AND (?3 IS NULL OR project_id = ?3)
                   AND (?4 IS NULL OR id = ?4)
                 ORDER BY id ASC"
            ),
            params![
                criteria.env.map(Environment::as_str),
                criteria.domain.map(DomainType::as_str),
                criteria.project_id.as_deref(),
                criteria.identity_id.as_ref().map(IdentityId::as_str),
            ],
        )
    }

    fn list_locked_before(&self, cutoff: u64) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn()?;
        Self::query_identities(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM identities
                 WHERE lock_state = 'Locked' AND locked_at < ?1
                 ORDER BY locked_at ASC, id ASC"
            ),
            params![cutoff],
        )
    }
}
