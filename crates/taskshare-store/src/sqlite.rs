//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Check-then-insert
//! sequences run inside `BEGIN IMMEDIATE` transactions and are backed by the
//! uniqueness constraints created in [`crate::migration`].

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use taskshare_core::{
    normalize_email, Category, CategoryId, GlobalGrant, Grant, GrantTarget, NewShareRequest,
    Permission, RequestId, RequestStatus, ShareRequest, ShareScope, ShareToken, Task, TaskId,
    Timestamp, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{GrantInsert, RequestInsert, Store, Transition};

const REQUEST_COLUMNS: &str = "id, requester_id, scope_type, resource_id, recipient_email, token,
     permission, status, expires_at, responded_at, created_at, granted_at";

/// How long a connection waits on another connection's write lock before
/// reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    /// Several stores may share one file; their writes serialize on the
    /// database lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Worker(format!("spawn_blocking failed: {}", e)))?
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn decode_err(idx: usize, e: taskshare_core::CoreError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_permission(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Permission> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| decode_err(idx, e))
}

// Helper to convert a row selected with REQUEST_COLUMNS to a ShareRequest
fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareRequest> {
    let scope_type: String = row.get(2)?;
    let resource_id: Option<i64> = row.get(3)?;
    let scope = ShareScope::from_parts(&scope_type, resource_id).map_err(|e| decode_err(2, e))?;

    let status: String = row.get(7)?;
    let status: RequestStatus = status.parse().map_err(|e| decode_err(7, e))?;

    Ok(ShareRequest {
        id: RequestId(row.get(0)?),
        requester_id: UserId(row.get(1)?),
        scope,
        recipient_email: row.get(4)?,
        token: ShareToken::from_stored(row.get(5)?),
        permission: parse_permission(row, 6)?,
        status,
        expires_at: row.get(8)?,
        responded_at: row.get(9)?,
        created_at: row.get(10)?,
        granted_at: row.get(11)?,
    })
}

// Helper for rows selected as (resource_type, resource_id, grantee_id, permission, created_at)
fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Grant> {
    let kind: String = row.get(0)?;
    let target = GrantTarget::from_parts(&kind, row.get(1)?).map_err(|e| decode_err(0, e))?;
    Ok(Grant {
        target,
        grantee_id: UserId(row.get(2)?),
        permission: parse_permission(row, 3)?,
        created_at: row.get(4)?,
    })
}

// Helper for rows selected as (owner_id, grantee_id, permission, created_at)
fn row_to_global_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlobalGrant> {
    Ok(GlobalGrant {
        owner_id: UserId(row.get(0)?),
        grantee_id: UserId(row.get(1)?),
        permission: parse_permission(row, 2)?,
        created_at: row.get(3)?,
    })
}

fn get_request_by_id(conn: &Connection, id: RequestId) -> Result<Option<ShareRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM share_requests WHERE id = ?1", REQUEST_COLUMNS),
        params![id.0],
        row_to_request,
    )
    .optional()
    .map_err(StoreError::from)
}

fn pending_for_tuple(conn: &Connection, request: &NewShareRequest) -> Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, expires_at FROM share_requests
         WHERE requester_id = ?1 AND scope_type = ?2
           AND IFNULL(resource_id, 0) = IFNULL(?3, 0)
           AND recipient_email = ?4 AND status = 'pending'",
    )?;
    let rows = stmt
        .query_map(
            params![
                request.requester_id.0,
                request.scope.kind(),
                request.scope.resource_id(),
                &request.recipient_email,
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let id = user.id;
        let email = normalize_email(&user.email);

        self.blocking(move |conn| {
            match conn.execute(
                "INSERT INTO users (id, email) VALUES (?1, ?2)",
                params![id.0, &email],
            ) {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(StoreError::AlreadyExists(format!(
                    "user {} or email {}",
                    id, email
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, email FROM users WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        email: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);

        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, email FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        email: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        let category = category.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO categories (id, owner_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, name = excluded.name",
                params![category.id.0, category.owner_id.0, &category.name],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, owner_id, name FROM categories WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Category {
                        id: CategoryId(row.get(0)?),
                        owner_id: UserId(row.get(1)?),
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn upsert_task(&self, task: &Task) -> Result<()> {
        let task = task.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, owner_id, category_id, title) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    category_id = excluded.category_id,
                    title = excluded.title",
                params![
                    task.id.0,
                    task.owner_id.0,
                    task.category_id.map(|c| c.0),
                    &task.title
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, owner_id, category_id, title FROM tasks WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Task {
                        id: TaskId(row.get(0)?),
                        owner_id: UserId(row.get(1)?),
                        category_id: row.get::<_, Option<i64>>(2)?.map(CategoryId),
                        title: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn insert_request(
        &self,
        request: &NewShareRequest,
        now: Timestamp,
    ) -> Result<RequestInsert> {
        let request = request.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let pending = pending_for_tuple(&tx, &request)?;
            if let Some((existing, _)) = pending.iter().find(|(_, expires_at)| now < *expires_at)
            {
                return Ok(RequestInsert::Duplicate {
                    existing: RequestId(*existing),
                });
            }

            let token_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM share_requests WHERE token = ?1)",
                params![request.token.expose()],
                |row| row.get(0),
            )?;
            if token_taken {
                return Ok(RequestInsert::TokenCollision);
            }

            // Whatever is still pending for this tuple is past expiry.
            for (stale, _) in &pending {
                tx.execute(
                    "UPDATE share_requests SET status = 'expired' WHERE id = ?1",
                    params![stale],
                )?;
                debug!(request_id = stale, "retired expired pending request");
            }

            let inserted = tx.execute(
                "INSERT INTO share_requests (
                    requester_id, scope_type, resource_id, recipient_email, token,
                    permission, status, expires_at, responded_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, NULL, ?8)",
                params![
                    request.requester_id.0,
                    request.scope.kind(),
                    request.scope.resource_id(),
                    &request.recipient_email,
                    request.token.expose(),
                    request.permission.as_str(),
                    request.expires_at,
                    request.created_at,
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    // Only reachable if another connection raced past the
                    // checks above; report whichever constraint fired.
                    return match pending_for_tuple(&tx, &request)?.first() {
                        Some((existing, _)) => Ok(RequestInsert::Duplicate {
                            existing: RequestId(*existing),
                        }),
                        None => Ok(RequestInsert::TokenCollision),
                    };
                }
                Err(e) => return Err(e.into()),
            }

            let id = RequestId(tx.last_insert_rowid());
            tx.commit()?;

            Ok(RequestInsert::Inserted(request.into_request(id)))
        })
        .await
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<ShareRequest>> {
        self.blocking(move |conn| get_request_by_id(conn, id)).await
    }

    async fn find_request_by_token(&self, token: &ShareToken) -> Result<Option<ShareRequest>> {
        let token = token.clone();

        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM share_requests WHERE token = ?1", REQUEST_COLUMNS),
                params![token.expose()],
                row_to_request,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn transition_request(
        &self,
        id: RequestId,
        to: RequestStatus,
        responded_at: Option<Timestamp>,
    ) -> Result<Transition> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let changed = if RequestStatus::Pending.can_transition_to(to) {
                tx.execute(
                    "UPDATE share_requests SET status = ?2, responded_at = ?3
                     WHERE id = ?1 AND status = 'pending'",
                    params![id.0, to.as_str(), responded_at],
                )?
            } else {
                0
            };

            let current = get_request_by_id(&tx, id)?;
            tx.commit()?;

            Ok(match current {
                None => Transition::NotFound,
                Some(request) if changed == 1 => Transition::Applied(request),
                Some(request) => Transition::Stale {
                    current: request.status,
                },
            })
        })
        .await
    }

    async fn mark_request_granted(&self, id: RequestId, at: Timestamp) -> Result<bool> {
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE share_requests SET granted_at = ?2
                 WHERE id = ?1 AND status = 'approved' AND granted_at IS NULL",
                params![id.0, at],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn list_requests_by_requester(&self, requester: UserId) -> Result<Vec<ShareRequest>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM share_requests WHERE requester_id = ?1
                 ORDER BY created_at DESC, id DESC",
                REQUEST_COLUMNS
            ))?;
            let requests = stmt
                .query_map(params![requester.0], row_to_request)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
        .await
    }

    async fn list_requests_for_recipient(&self, email: &str) -> Result<Vec<ShareRequest>> {
        let email = normalize_email(email);

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM share_requests WHERE recipient_email = ?1
                 ORDER BY created_at DESC, id DESC",
                REQUEST_COLUMNS
            ))?;
            let requests = stmt
                .query_map(params![email], row_to_request)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
        .await
    }

    async fn insert_grant(&self, grant: &Grant, max_grantees: usize) -> Result<GrantInsert> {
        let grant = grant.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let kind = grant.target.kind();
            let resource_id = grant.target.resource_id();

            let existing = |tx: &Connection| -> rusqlite::Result<Option<Permission>> {
                tx.query_row(
                    "SELECT permission FROM grants
                     WHERE resource_type = ?1 AND resource_id = ?2 AND grantee_id = ?3",
                    params![kind, resource_id, grant.grantee_id.0],
                    |row| parse_permission(row, 0),
                )
                .optional()
            };

            if let Some(existing) = existing(&tx)? {
                return Ok(GrantInsert::AlreadyExists { existing });
            }

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM grants WHERE resource_type = ?1 AND resource_id = ?2",
                params![kind, resource_id],
                |row| row.get(0),
            )?;
            if count as usize >= max_grantees {
                return Ok(GrantInsert::CapExceeded {
                    limit: max_grantees,
                });
            }

            let inserted = tx.execute(
                "INSERT INTO grants (resource_type, resource_id, grantee_id, permission, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kind,
                    resource_id,
                    grant.grantee_id.0,
                    grant.permission.as_str(),
                    grant.created_at
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    if let Some(existing) = existing(&tx)? {
                        return Ok(GrantInsert::AlreadyExists { existing });
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }

            tx.commit()?;
            Ok(GrantInsert::Inserted)
        })
        .await
    }

    async fn get_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<Option<Grant>> {
        let target = *target;

        self.blocking(move |conn| {
            conn.query_row(
                "SELECT resource_type, resource_id, grantee_id, permission, created_at
                 FROM grants WHERE resource_type = ?1 AND resource_id = ?2 AND grantee_id = ?3",
                params![target.kind(), target.resource_id(), grantee.0],
                row_to_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_grants(&self, target: &GrantTarget) -> Result<Vec<Grant>> {
        let target = *target;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT resource_type, resource_id, grantee_id, permission, created_at
                 FROM grants WHERE resource_type = ?1 AND resource_id = ?2
                 ORDER BY created_at, grantee_id",
            )?;
            let grants = stmt
                .query_map(params![target.kind(), target.resource_id()], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }

    async fn delete_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<bool> {
        let target = *target;

        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM grants
                 WHERE resource_type = ?1 AND resource_id = ?2 AND grantee_id = ?3",
                params![target.kind(), target.resource_id(), grantee.0],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn insert_global_grant(
        &self,
        grant: &GlobalGrant,
        max_grantees: usize,
    ) -> Result<GrantInsert> {
        let grant = grant.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<Permission> = tx
                .query_row(
                    "SELECT permission FROM global_grants WHERE owner_id = ?1 AND grantee_id = ?2",
                    params![grant.owner_id.0, grant.grantee_id.0],
                    |row| parse_permission(row, 0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Ok(GrantInsert::AlreadyExists { existing });
            }

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM global_grants WHERE owner_id = ?1",
                params![grant.owner_id.0],
                |row| row.get(0),
            )?;
            if count as usize >= max_grantees {
                return Ok(GrantInsert::CapExceeded {
                    limit: max_grantees,
                });
            }

            tx.execute(
                "INSERT INTO global_grants (owner_id, grantee_id, permission, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    grant.owner_id.0,
                    grant.grantee_id.0,
                    grant.permission.as_str(),
                    grant.created_at
                ],
            )?;
            tx.commit()?;
            Ok(GrantInsert::Inserted)
        })
        .await
    }

    async fn get_global_grant(
        &self,
        owner: UserId,
        grantee: UserId,
    ) -> Result<Option<GlobalGrant>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT owner_id, grantee_id, permission, created_at
                 FROM global_grants WHERE owner_id = ?1 AND grantee_id = ?2",
                params![owner.0, grantee.0],
                row_to_global_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_global_grants(&self, owner: UserId) -> Result<Vec<GlobalGrant>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT owner_id, grantee_id, permission, created_at
                 FROM global_grants WHERE owner_id = ?1 ORDER BY created_at, grantee_id",
            )?;
            let grants = stmt
                .query_map(params![owner.0], row_to_global_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }

    async fn delete_global_grant(&self, owner: UserId, grantee: UserId) -> Result<bool> {
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM global_grants WHERE owner_id = ?1 AND grantee_id = ?2",
                params![owner.0, grantee.0],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
