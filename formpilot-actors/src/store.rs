//! SQLite-backed TTL store for run artifacts.
//!
//! Every artifact (schema snapshot, screenshot, mapping log, outcome) is
//! written with an expiry; reads filter expired rows out, so an artifact
//! past its TTL is unreadable even before the sweep physically deletes it.
//! The pipeline never issues explicit deletes.
use crate::actor::{Actor, Addr, Context};
use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// One stored artifact as read back.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub key: String,
    pub kind: String,
    pub payload: Vec<u8>,
    /// Unix seconds.
    pub expires_at: i64,
}

pub enum StoreMsg {
    /// Write (or replace) an artifact under `key` with a TTL.
    PutArtifact {
        key: String,
        kind: String,
        payload: Vec<u8>,
        ttl_secs: i64,
    },
    /// Read an artifact; expired entries come back as `None`.
    GetArtifact {
        key: String,
        reply: oneshot::Sender<Result<Option<StoredArtifact>>>,
    },
    /// Physically delete expired rows.
    Sweep,
}

pub struct StoreActor {
    pool: SqlitePool,
}

impl StoreActor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the artifact table if this is a fresh database.
    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS run_artifact (
                key        TEXT PRIMARY KEY,
                kind       TEXT NOT NULL,
                payload    BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_run_artifact_expiry ON run_artifact (expires_at)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Actor for StoreActor {
    type Msg = StoreMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            StoreMsg::PutArtifact {
                key,
                kind,
                payload,
                ttl_secs,
            } => {
                let expires_at = Utc::now().timestamp() + ttl_secs;
                let res = sqlx::query(
                    r#"INSERT INTO run_artifact (key, kind, payload, expires_at)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(key) DO UPDATE SET
                         kind=excluded.kind,
                         payload=excluded.payload,
                         expires_at=excluded.expires_at"#,
                )
                .bind(&key)
                .bind(&kind)
                .bind(&payload)
                .bind(expires_at)
                .execute(&self.pool)
                .await;
                match res {
                    Ok(done) => debug!(
                        target: "store",
                        key = %key,
                        kind = %kind,
                        rows = done.rows_affected(),
                        expires_at,
                        "artifact stored"
                    ),
                    // a lost artifact must not take the whole store down
                    Err(err) => warn!(target: "store", key = %key, error = %err, "put failed"),
                }
            }
            StoreMsg::GetArtifact { key, reply } => {
                let res = get_live_artifact(&self.pool, &key).await;
                if reply.send(res).is_err() {
                    debug!(target: "store", key = %key, "get reply dropped");
                }
            }
            StoreMsg::Sweep => {
                let now = Utc::now().timestamp();
                match sqlx::query("DELETE FROM run_artifact WHERE expires_at <= ?1")
                    .bind(now)
                    .execute(&self.pool)
                    .await
                {
                    Ok(done) => {
                        if done.rows_affected() > 0 {
                            info!(target: "store.sweep", removed = done.rows_affected(), "expired artifacts purged");
                        }
                    }
                    Err(err) => warn!(target: "store.sweep", error = %err, "sweep failed"),
                }
            }
        }
        Ok(())
    }
}

/// Read one artifact, treating expired rows as absent.
async fn get_live_artifact(pool: &SqlitePool, key: &str) -> Result<Option<StoredArtifact>> {
    let now = Utc::now().timestamp();
    let row = sqlx::query(
        "SELECT key, kind, payload, expires_at FROM run_artifact WHERE key = ?1 AND expires_at > ?2",
    )
    .bind(key)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| StoredArtifact {
        key: r.try_get("key").unwrap_or_default(),
        kind: r.try_get("kind").unwrap_or_default(),
        payload: r.try_get("payload").unwrap_or_default(),
        expires_at: r.try_get("expires_at").unwrap_or_default(),
    }))
}

/// Periodic sweep, run until shutdown. The original deployment ran this as
/// a dedicated cleanup worker; here it is a supervised loop beside the
/// store actor.
pub async fn sweep_loop(
    store: Addr<StoreActor>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            _ = ticker.tick() => {
                if store.send(StoreMsg::Sweep).await.is_err() {
                    // store actor is gone; nothing left to sweep
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_actor;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        // one connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        StoreActor::migrate(&pool).await.unwrap();
        pool
    }

    async fn get(addr: &Addr<StoreActor>, key: &str) -> Option<StoredArtifact> {
        let (tx, rx) = oneshot::channel();
        addr.send(StoreMsg::GetArtifact {
            key: key.to_string(),
            reply: tx,
        })
        .await
        .map_err(|_| ())
        .unwrap();
        rx.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn artifacts_round_trip_within_ttl() {
        let pool = memory_pool().await;
        let handle = spawn_actor(StoreActor::new(pool), 16);

        handle
            .addr
            .send(StoreMsg::PutArtifact {
                key: "run-1/schema.json".into(),
                kind: "schema".into(),
                payload: b"{\"fields\":[]}".to_vec(),
                ttl_secs: 3600,
            })
            .await
            .map_err(|_| ())
            .unwrap();

        let got = get(&handle.addr, "run-1/schema.json").await.unwrap();
        assert_eq!(got.kind, "schema");
        assert_eq!(got.payload, b"{\"fields\":[]}".to_vec());
    }

    #[tokio::test]
    async fn expired_artifacts_are_unreadable_even_before_the_sweep() {
        let pool = memory_pool().await;
        let handle = spawn_actor(StoreActor::new(pool), 16);

        handle
            .addr
            .send(StoreMsg::PutArtifact {
                key: "run-2/shot.png".into(),
                kind: "screenshot".into(),
                payload: vec![1, 2, 3],
                // already expired the moment it lands
                ttl_secs: -1,
            })
            .await
            .map_err(|_| ())
            .unwrap();

        assert!(get(&handle.addr, "run-2/shot.png").await.is_none());
    }

    #[tokio::test]
    async fn sweep_physically_removes_expired_rows() {
        let pool = memory_pool().await;
        let handle = spawn_actor(StoreActor::new(pool.clone()), 16);

        handle
            .addr
            .send(StoreMsg::PutArtifact {
                key: "run-3/log.json".into(),
                kind: "mapping".into(),
                payload: vec![0],
                ttl_secs: -1,
            })
            .await
            .map_err(|_| ())
            .unwrap();
        handle
            .addr
            .send(StoreMsg::PutArtifact {
                key: "run-3/live.json".into(),
                kind: "mapping".into(),
                payload: vec![0],
                ttl_secs: 3600,
            })
            .await
            .map_err(|_| ())
            .unwrap();
        handle.addr.send(StoreMsg::Sweep).await.map_err(|_| ()).unwrap();

        // drain the mailbox before inspecting the table directly
        assert!(get(&handle.addr, "run-3/log.json").await.is_none());

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM run_artifact")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rewriting_a_key_replaces_payload_and_ttl() {
        let pool = memory_pool().await;
        let handle = spawn_actor(StoreActor::new(pool), 16);

        for payload in [vec![1], vec![2]] {
            handle
                .addr
                .send(StoreMsg::PutArtifact {
                    key: "run-4/outcome.json".into(),
                    kind: "outcome".into(),
                    payload,
                    ttl_secs: 3600,
                })
                .await
                .map_err(|_| ())
                .unwrap();
        }

        let got = get(&handle.addr, "run-4/outcome.json").await.unwrap();
        assert_eq!(got.payload, vec![2]);
    }
}
