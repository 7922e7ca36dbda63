//! Durable, transactional persistence for rooms, messages, delivery state
//! and the undelivered queue. SQLite via `rusqlite`, guarded by a single
//! `Mutex<Connection>` — this *is* the single-writer discipline the Room
//! Registry relies on.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use chatcore_core::domain::{
    dm_unique_key, DeliveryState, Message, Room, RoomMember, RoomSpec, RoomType, Tenant,
    UndeliveredEntry,
};
use chatcore_core::error::CoreError;

/// Maps a `rusqlite` failure onto the shared error taxonomy. Busy/locked
/// conditions are `Transient` so callers can retry; anything else is
/// `Internal`. This conversion lives here, not in `chatcore-core`, because
/// the core crate has no SQL dependency.
fn map_err(e: rusqlite::Error) -> CoreError {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return CoreError::Transient(e.to_string());
        }
    }
    CoreError::Internal(e.to_string())
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) the store at `dsn`. `:memory:` is supported for
    /// tests; a file path otherwise.
    pub fn open(dsn: &str) -> chatcore_core::Result<Self> {
        let conn = Connection::open(dsn).map_err(map_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )
        .map_err(map_err)?;
        let store = Store { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Lock the connection, panicking only if a prior holder already
    /// panicked while holding it — an unrecoverable state we don't try to
    /// paper over. Isolated here so the crate-wide `expect_used` lint can
    /// stay denied everywhere else.
    #[allow(clippy::expect_used)]
    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    fn migrate(&self) -> chatcore_core::Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER NOT NULL);

            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                config TEXT
            );

            CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(tenant_id),
                type TEXT NOT NULL,
                unique_key TEXT,
                name TEXT,
                last_seq INTEGER NOT NULL DEFAULT 0,
                UNIQUE(tenant_id, unique_key)
            );
            CREATE INDEX IF NOT EXISTS idx_rooms_tenant ON rooms(tenant_id);

            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL REFERENCES rooms(room_id),
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_members_user ON room_members(tenant_id, user_id);

            CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                room_id TEXT NOT NULL REFERENCES rooms(room_id),
                sender_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                content TEXT NOT NULL,
                meta TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(room_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room_seq ON messages(room_id, seq);

            CREATE TABLE IF NOT EXISTS delivery_state (
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                last_ack INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, user_id, room_id)
            );

            CREATE TABLE IF NOT EXISTS undelivered_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT,
                dead INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_undelivered_user ON undelivered_messages(tenant_id, user_id, dead);
            CREATE INDEX IF NOT EXISTS idx_undelivered_due ON undelivered_messages(dead, attempts, created_at);
            CREATE INDEX IF NOT EXISTS idx_undelivered_room_seq ON undelivered_messages(tenant_id, user_id, room_id, seq);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS notification_subscriptions (
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                event TEXT NOT NULL,
                PRIMARY KEY (tenant_id, user_id, event)
            );",
        )
        .map_err(map_err)?;

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .map_err(map_err)?;
        if applied == 0 {
            conn.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])
                .map_err(map_err)?;
        }
        Ok(())
    }

    /// Periodic write-ahead-log checkpoint, analogous to a retention sweep.
    pub fn checkpoint(&self) {
        let conn = self.conn();
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            tracing::warn!(error = %e, "wal checkpoint failed");
        }
    }

    pub fn resolve_tenant(&self, api_key: &str) -> chatcore_core::Result<Option<Tenant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT tenant_id, api_key, name, config FROM tenants WHERE api_key = ?1",
            params![api_key],
            |row| {
                let config: Option<String> = row.get(3)?;
                Ok(Tenant {
                    tenant_id: row.get(0)?,
                    api_key: row.get(1)?,
                    name: row.get(2)?,
                    config: config.and_then(|c| serde_json::from_str(&c).ok()),
                })
            },
        )
        .optional()
        .map_err(map_err)
    }

    /// Test/seed helper: the core never provisions tenants itself (spec §1).
    pub fn seed_tenant(&self, tenant: &Tenant) -> chatcore_core::Result<()> {
        let conn = self.conn();
        let config = tenant.config.as_ref().map(|c| c.to_string());
        conn.execute(
            "INSERT OR REPLACE INTO tenants (tenant_id, api_key, name, config) VALUES (?1, ?2, ?3, ?4)",
            params![tenant.tenant_id, tenant.api_key, tenant.name, config],
        )
        .map_err(map_err)?;
        Ok(())
    }

    /// Create a room, or for `dm` rooms return the existing one on
    /// `unique_key` conflict (get-or-create semantics).
    pub fn create_room(&self, tenant_id: &str, spec: &RoomSpec) -> chatcore_core::Result<Room> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_err)?;

        let unique_key = match spec.room_type {
            RoomType::Dm => {
                if spec.members.len() != 2 {
                    return Err(CoreError::Invalid("dm rooms require exactly 2 members".into()));
                }
                Some(dm_unique_key(&spec.members[0], &spec.members[1]))
            }
            _ => spec.unique_key.clone(),
        };

        if let Some(ref key) = unique_key {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT room_id FROM rooms WHERE tenant_id = ?1 AND unique_key = ?2",
                    params![tenant_id, key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_err)?;
            if let Some(room_id) = existing {
                let room = fetch_room_tx(&tx, tenant_id, &room_id)?
                    .ok_or_else(|| CoreError::Internal("room vanished mid-transaction".into()))?;
                tx.commit().map_err(map_err)?;
                return Ok(room);
            }
        }

        let room_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO rooms (room_id, tenant_id, type, unique_key, name, last_seq) VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![room_id, tenant_id, spec.room_type.as_str(), unique_key, spec.name],
        )
        .map_err(map_err)?;

        let now = Utc::now().to_rfc3339();
        for user_id in &spec.members {
            tx.execute(
                "INSERT OR IGNORE INTO room_members (room_id, tenant_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, 'member', ?4)",
                params![room_id, tenant_id, user_id, now],
            )
            .map_err(map_err)?;
        }

        let room = Room {
            room_id: room_id.clone(),
            tenant_id: tenant_id.to_string(),
            room_type: spec.room_type,
            unique_key,
            name: spec.name.clone(),
            last_seq: 0,
        };
        tx.commit().map_err(map_err)?;
        Ok(room)
    }

    pub fn get_room(&self, tenant_id: &str, room_id: &str) -> chatcore_core::Result<Room> {
        let conn = self.conn();
        fetch_room(&conn, tenant_id, room_id)?
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))
    }

    /// Idempotent upsert of room membership.
    pub fn add_members(
        &self,
        tenant_id: &str,
        room_id: &str,
        users: &[String],
        role: &str,
    ) -> chatcore_core::Result<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        for user_id in users {
            conn.execute(
                "INSERT INTO room_members (room_id, tenant_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(room_id, user_id) DO UPDATE SET role = excluded.role",
                params![room_id, tenant_id, user_id, role, now],
            )
            .map_err(map_err)?;
        }
        Ok(())
    }

    pub fn list_members(&self, tenant_id: &str, room_id: &str) -> chatcore_core::Result<Vec<RoomMember>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT room_id, tenant_id, user_id, role, joined_at FROM room_members WHERE tenant_id = ?1 AND room_id = ?2",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![tenant_id, room_id], |row| {
                Ok(RoomMember {
                    room_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    user_id: row.get(2)?,
                    role: row.get(3)?,
                    joined_at: row.get(4)?,
                })
            })
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    pub fn is_member(&self, tenant_id: &str, room_id: &str, user_id: &str) -> chatcore_core::Result<bool> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM room_members WHERE tenant_id = ?1 AND room_id = ?2 AND user_id = ?3",
                params![tenant_id, room_id, user_id],
                |row| row.get(0),
            )
            .map_err(map_err)?;
        Ok(count > 0)
    }

    /// Atomically reads `rooms.last_seq`, increments it, and inserts the
    /// message row with the new `seq`. Callers are expected to funnel
    /// writes for a given room through the Room Registry so this rarely
    /// contends; SQLite's own locking makes it correct regardless.
    pub fn append_message(
        &self,
        tenant_id: &str,
        room_id: &str,
        sender_id: &str,
        content: &str,
        meta: Option<&serde_json::Value>,
    ) -> chatcore_core::Result<Message> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_err)?;

        let last_seq: i64 = tx
            .query_row(
                "SELECT last_seq FROM rooms WHERE tenant_id = ?1 AND room_id = ?2",
                params![tenant_id, room_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))?;

        let seq = last_seq + 1;
        tx.execute(
            "UPDATE rooms SET last_seq = ?1 WHERE tenant_id = ?2 AND room_id = ?3",
            params![seq, tenant_id, room_id],
        )
        .map_err(map_err)?;

        let message_id = Uuid::new_v4();
        let created_at = Utc::now().to_rfc3339();
        let meta_str = meta.map(|m| m.to_string());
        tx.execute(
            "INSERT INTO messages (message_id, tenant_id, room_id, sender_id, seq, content, meta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![message_id.to_string(), tenant_id, room_id, sender_id, seq, content, meta_str, created_at],
        )
        .map_err(map_err)?;

        tx.commit().map_err(map_err)?;

        Ok(Message {
            message_id,
            tenant_id: tenant_id.to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            seq,
            content: content.to_string(),
            meta: meta.cloned(),
            created_at,
        })
    }

    pub fn fetch_missed_since(
        &self,
        tenant_id: &str,
        room_id: &str,
        after_seq: i64,
        limit: i64,
    ) -> chatcore_core::Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT message_id, tenant_id, room_id, sender_id, seq, content, meta, created_at
                 FROM messages WHERE tenant_id = ?1 AND room_id = ?2 AND seq > ?3
                 ORDER BY seq ASC LIMIT ?4",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![tenant_id, room_id, after_seq, limit], row_to_message)
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    /// Look up a single message by its room-scoped `seq`, used by the
    /// Retry Worker to redeliver the real content rather than a stand-in.
    pub fn get_message(&self, tenant_id: &str, room_id: &str, seq: i64) -> chatcore_core::Result<Option<Message>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT message_id, tenant_id, room_id, sender_id, seq, content, meta, created_at
             FROM messages WHERE tenant_id = ?1 AND room_id = ?2 AND seq = ?3",
            params![tenant_id, room_id, seq],
            row_to_message,
        )
        .optional()
        .map_err(map_err)
    }

    pub fn enqueue_undelivered(&self, entries: &[(String, String, Uuid, i64)]) -> chatcore_core::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_err)?;
        let now = Utc::now().to_rfc3339();
        for (user_id, room_id, message_id, seq) in entries {
            // tenant_id is embedded in room_id's owning tenant; callers pass it via room lookup upstream.
            tx.execute(
                "INSERT INTO undelivered_messages (tenant_id, user_id, room_id, message_id, seq, attempts, created_at)
                 SELECT tenant_id, ?1, ?2, ?3, ?4, 0, ?5 FROM rooms WHERE room_id = ?2",
                params![user_id, room_id, message_id.to_string(), seq, now],
            )
            .map_err(map_err)?;
        }
        tx.commit().map_err(map_err)?;
        Ok(())
    }

    pub fn fetch_undelivered_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
        limit: i64,
    ) -> chatcore_core::Result<Vec<UndeliveredEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, user_id, room_id, message_id, seq, attempts, created_at, last_attempt_at
                 FROM undelivered_messages WHERE tenant_id = ?1 AND user_id = ?2 AND dead = 0
                 ORDER BY created_at ASC, seq ASC LIMIT ?3",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![tenant_id, user_id, limit], row_to_undelivered)
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    pub fn fetch_due_retries(
        &self,
        limit: i64,
        base: std::time::Duration,
        cap_exponent: u32,
    ) -> chatcore_core::Result<Vec<UndeliveredEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, user_id, room_id, message_id, seq, attempts, created_at, last_attempt_at
                 FROM undelivered_messages WHERE dead = 0
                 ORDER BY attempts ASC, created_at ASC LIMIT ?1",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![limit * 4], row_to_undelivered)
            .map_err(map_err)?;
        let candidates = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)?;

        let now = Utc::now();
        let due: Vec<UndeliveredEntry> = candidates
            .into_iter()
            .filter(|e| is_due(e, now, base, cap_exponent))
            .take(limit as usize)
            .collect();
        Ok(due)
    }

    /// Applies a client ack: advances `last_ack` (monotonically) and removes
    /// satisfied undelivered rows, in one transaction. `up_to_seq` beyond
    /// `rooms.last_seq` is clamped; `up_to_seq` below the current cursor is
    /// a no-op success (idempotent).
    pub fn ack(
        &self,
        tenant_id: &str,
        user_id: &str,
        room_id: &str,
        up_to_seq: i64,
    ) -> chatcore_core::Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_err)?;

        let last_seq: i64 = tx
            .query_row(
                "SELECT last_seq FROM rooms WHERE tenant_id = ?1 AND room_id = ?2",
                params![tenant_id, room_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))?;

        let clamped = up_to_seq.min(last_seq).max(0);

        let current: i64 = tx
            .query_row(
                "SELECT last_ack FROM delivery_state WHERE tenant_id = ?1 AND user_id = ?2 AND room_id = ?3",
                params![tenant_id, user_id, room_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?
            .unwrap_or(0);

        let new_ack = current.max(clamped);
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO delivery_state (tenant_id, user_id, room_id, last_ack, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id, user_id, room_id) DO UPDATE SET last_ack = ?4, updated_at = ?5",
            params![tenant_id, user_id, room_id, new_ack, now],
        )
        .map_err(map_err)?;

        tx.execute(
            "DELETE FROM undelivered_messages WHERE tenant_id = ?1 AND user_id = ?2 AND room_id = ?3 AND seq <= ?4",
            params![tenant_id, user_id, room_id, new_ack],
        )
        .map_err(map_err)?;

        tx.commit().map_err(map_err)?;
        Ok(new_ack)
    }

    pub fn get_last_ack(&self, tenant_id: &str, user_id: &str, room_id: &str) -> chatcore_core::Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT last_ack FROM delivery_state WHERE tenant_id = ?1 AND user_id = ?2 AND room_id = ?3",
            params![tenant_id, user_id, room_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_err)
        .map(|v| v.unwrap_or(0))
    }

    pub fn list_rooms_for_user(&self, tenant_id: &str, user_id: &str) -> chatcore_core::Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT room_id FROM room_members WHERE tenant_id = ?1 AND user_id = ?2")
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![tenant_id, user_id], |row| row.get(0))
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    pub fn increment_attempts(&self, ids: &[i64]) -> chatcore_core::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        for id in ids {
            conn.execute(
                "UPDATE undelivered_messages SET attempts = attempts + 1, last_attempt_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(map_err)?;
        }
        Ok(())
    }

    pub fn mark_dead(&self, ids: &[i64]) -> chatcore_core::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn();
        for id in ids {
            conn.execute("UPDATE undelivered_messages SET dead = 1 WHERE id = ?1", params![id])
                .map_err(map_err)?;
        }
        Ok(())
    }

    pub fn enqueue_notification(
        &self,
        tenant_id: &str,
        user_id: &str,
        payload: &serde_json::Value,
    ) -> chatcore_core::Result<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO notifications (tenant_id, user_id, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![tenant_id, user_id, payload.to_string(), now],
        )
        .map_err(map_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Liveness ping used by `/health`.
    pub fn ping(&self) -> chatcore_core::Result<()> {
        let conn = self.conn();
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(map_err)
    }
}

fn is_due(
    entry: &UndeliveredEntry,
    now: chrono::DateTime<Utc>,
    base: std::time::Duration,
    cap_exponent: u32,
) -> bool {
    let Some(ref last) = entry.last_attempt_at else {
        return true;
    };
    let Ok(last_at) = chrono::DateTime::parse_from_rfc3339(last) else {
        return true;
    };
    let exp = (entry.attempts as u32).min(cap_exponent);
    let backoff = base.as_secs().saturating_mul(1u64 << exp);
    let due_at = last_at.with_timezone(&Utc) + chrono::Duration::seconds(backoff as i64);
    now >= due_at
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let message_id: String = row.get(0)?;
    let meta: Option<String> = row.get(6)?;
    Ok(Message {
        message_id: Uuid::parse_str(&message_id).unwrap_or_default(),
        tenant_id: row.get(1)?,
        room_id: row.get(2)?,
        sender_id: row.get(3)?,
        seq: row.get(4)?,
        content: row.get(5)?,
        meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get(7)?,
    })
}

fn row_to_undelivered(row: &rusqlite::Row) -> rusqlite::Result<UndeliveredEntry> {
    let message_id: String = row.get(4)?;
    Ok(UndeliveredEntry {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        user_id: row.get(2)?,
        room_id: row.get(3)?,
        message_id: Uuid::parse_str(&message_id).unwrap_or_default(),
        seq: row.get(5)?,
        attempts: row.get(6)?,
        created_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
    })
}

fn fetch_room(conn: &Connection, tenant_id: &str, room_id: &str) -> chatcore_core::Result<Option<Room>> {
    conn.query_row(
        "SELECT room_id, tenant_id, type, unique_key, name, last_seq FROM rooms WHERE tenant_id = ?1 AND room_id = ?2",
        params![tenant_id, room_id],
        row_to_room,
    )
    .optional()
    .map_err(map_err)
}

fn fetch_room_tx(
    tx: &rusqlite::Transaction,
    tenant_id: &str,
    room_id: &str,
) -> chatcore_core::Result<Option<Room>> {
    tx.query_row(
        "SELECT room_id, tenant_id, type, unique_key, name, last_seq FROM rooms WHERE tenant_id = ?1 AND room_id = ?2",
        params![tenant_id, room_id],
        row_to_room,
    )
    .optional()
    .map_err(map_err)
}

fn row_to_room(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    let room_type: String = row.get(2)?;
    Ok(Room {
        room_id: row.get(0)?,
        tenant_id: row.get(1)?,
        room_type: room_type.parse().unwrap_or(RoomType::Group),
        unique_key: row.get(3)?,
        name: row.get(4)?,
        last_seq: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open(":memory:").unwrap()
    }

    #[test]
    fn create_dm_room_is_idempotent() {
        let store = test_store();
        let spec = RoomSpec {
            room_type: RoomType::Dm,
            members: vec!["alice".into(), "bob".into()],
            name: None,
            unique_key: None,
        };
        let r1 = store.create_room("t1", &spec).unwrap();
        let r2 = store.create_room("t1", &spec).unwrap();
        assert_eq!(r1.room_id, r2.room_id);
    }

    #[test]
    fn append_message_assigns_dense_monotonic_seq() {
        let store = test_store();
        let spec = RoomSpec {
            room_type: RoomType::Group,
            members: vec!["alice".into()],
            name: Some("g1".into()),
            unique_key: None,
        };
        let room = store.create_room("t1", &spec).unwrap();
        let m1 = store.append_message("t1", &room.room_id, "alice", "hi", None).unwrap();
        let m2 = store.append_message("t1", &room.room_id, "alice", "there", None).unwrap();
        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);
        let updated = store.get_room("t1", &room.room_id).unwrap();
        assert_eq!(updated.last_seq, 2);
    }

    #[test]
    fn get_message_returns_real_content_by_seq() {
        let store = test_store();
        let spec = RoomSpec {
            room_type: RoomType::Group,
            members: vec!["alice".into()],
            name: None,
            unique_key: None,
        };
        let room = store.create_room("t1", &spec).unwrap();
        let m1 = store.append_message("t1", &room.room_id, "alice", "hello there", None).unwrap();

        let fetched = store.get_message("t1", &room.room_id, m1.seq).unwrap().unwrap();
        assert_eq!(fetched.message_id, m1.message_id);
        assert_eq!(fetched.content, "hello there");
        assert_eq!(fetched.sender_id, "alice");

        assert!(store.get_message("t1", &room.room_id, 999).unwrap().is_none());
    }

    #[test]
    fn ack_is_monotonic_and_clamped() {
        let store = test_store();
        let spec = RoomSpec {
            room_type: RoomType::Group,
            members: vec!["alice".into()],
            name: None,
            unique_key: None,
        };
        let room = store.create_room("t1", &spec).unwrap();
        store.append_message("t1", &room.room_id, "alice", "m1", None).unwrap();

        let ack1 = store.ack("t1", "alice", &room.room_id, 100).unwrap();
        assert_eq!(ack1, 1); // clamped to last_seq

        let ack2 = store.ack("t1", "alice", &room.room_id, 0).unwrap();
        assert_eq!(ack2, 1); // never decreases
    }

    #[test]
    fn ack_removes_undelivered_rows_up_to_seq() {
        let store = test_store();
        let spec = RoomSpec {
            room_type: RoomType::Group,
            members: vec!["alice".into(), "bob".into()],
            name: None,
            unique_key: None,
        };
        let room = store.create_room("t1", &spec).unwrap();
        let m1 = store.append_message("t1", &room.room_id, "alice", "m1", None).unwrap();
        let m2 = store.append_message("t1", &room.room_id, "alice", "m2", None).unwrap();

        store
            .enqueue_undelivered(&[
                ("bob".into(), room.room_id.clone(), m1.message_id, m1.seq),
                ("bob".into(), room.room_id.clone(), m2.message_id, m2.seq),
            ])
            .unwrap();

        let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
        assert_eq!(pending.len(), 2);

        store.ack("t1", "bob", &room.room_id, 1).unwrap();
        let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, 2);
    }
}
