use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("store unavailable: {0}")] Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Which records a [`RecordQuery`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Top-level records of one board.
    ThreadsOn(String),
    /// Records whose parent is the given thread.
    RepliesTo(Id),
}

/// Filtered lookup, always ordered newest-bumped first.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn threads_on(board: &str, limit: usize) -> Self {
        Self { filter: RecordFilter::ThreadsOn(board.to_string()), limit: Some(limit) }
    }

    pub fn replies_to(thread_id: Id, limit: usize) -> Self {
        Self { filter: RecordFilter::RepliesTo(thread_id), limit: Some(limit) }
    }

    pub fn matches(&self, r: &Record) -> bool {
        match &self.filter {
            RecordFilter::ThreadsOn(board) => r.is_thread() && &r.board == board,
            RecordFilter::RepliesTo(tid) => r.parent_id() == Some(*tid),
        }
    }
}

/// The document collection holding threads and replies.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, new: NewRecord) -> RepoResult<Record>;
    async fn find_by_id(&self, id: Id) -> RepoResult<Record>;
    async fn find(&self, query: RecordQuery) -> RepoResult<Vec<Record>>;
    async fn set_reported(&self, id: Id) -> RepoResult<()>;
    async fn set_text(&self, id: Id, text: &str) -> RepoResult<()>;
    /// Append `reply_id` to the thread's reply list, recount and bump, as one atomic step.
    async fn append_reply(&self, thread_id: Id, reply_id: Id, bumped_on: DateTime<Utc>) -> RepoResult<Record>;
    async fn delete(&self, id: Id) -> RepoResult<()>;
    /// Returns the number of records removed.
    async fn delete_all(&self) -> RepoResult<u64>;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tracing::{error, info, warn};
    use uuid::Uuid;

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        // insertion order; listings rely on it to break timestamp ties
        records: Vec<Record>,
    }

    impl State {
        fn get_mut(&mut self, id: Id) -> RepoResult<&mut Record> {
            self.records.iter_mut().find(|r| r.id == id).ok_or(RepoError::NotFound)
        }
    }

    /// The snapshot file plus the lock that orders writes to it.
    struct Snapshot {
        path: PathBuf,
        // held from the mutation until the file is renamed into place
        writer: tokio::sync::Mutex<()>,
    }

    impl Snapshot {
        async fn store(&self, bytes: Vec<u8>) {
            let path = self.path.clone();
            match tokio::task::spawn_blocking(move || write_replacing(&path, &bytes)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(path = %self.path.display(), error = %e, "failed to write snapshot"),
                Err(e) => error!(path = %self.path.display(), error = %e, "snapshot task failed"),
            }
        }
    }

    /// Writes a sibling temp file and renames it over `path`, so readers never see a partial snapshot.
    fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    }

    /// Process-local store, optionally mirrored to a JSON snapshot after every write.
    ///
    /// Memory is authoritative: a failed snapshot write is logged and the next
    /// successful one catches the file up.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot: Option<Arc<Snapshot>>,
    }

    impl InMemRepo {
        /// Snapshot-backed store under `data_dir`, loading whatever is already there.
        pub fn with_snapshot_dir(data_dir: impl AsRef<Path>) -> Self {
            let path = data_dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot: Some(Arc::new(Snapshot { path, writer: tokio::sync::Mutex::new(()) })),
            }
        }

        /// Store with no snapshot at all.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot: None }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!(path = %path.display(), records = s.records.len(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to parse snapshot, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Unavailable("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Unavailable("state lock poisoned".into()))
        }

        /// Applies `f` under the write lock, then writes the resulting state to the snapshot.
        /// Snapshot writes happen in the same order as the mutations that produced them.
        async fn mutate<T, F>(&self, f: F) -> RepoResult<T>
        where
            F: FnOnce(&mut State) -> RepoResult<T> + Send,
            T: Send,
        {
            let _writer = match &self.snapshot {
                Some(snap) => Some(snap.writer.lock().await),
                None => None,
            };
            let (out, bytes) = {
                let mut s = self.write()?;
                let out = f(&mut s)?;
                let bytes = match &self.snapshot {
                    Some(_) => serde_json::to_vec_pretty(&*s)
                        .map_err(|e| error!(error = %e, "failed to encode snapshot"))
                        .ok(),
                    None => None,
                };
                (out, bytes)
            };
            if let (Some(snap), Some(bytes)) = (&self.snapshot, bytes) {
                snap.store(bytes).await;
            }
            Ok(out)
        }
    }

    #[async_trait]
    impl RecordStore for InMemRepo {
        async fn insert(&self, new: NewRecord) -> RepoResult<Record> {
            let record = new.into_record(Uuid::new_v4());
            self.mutate(move |s| {
                s.records.push(record.clone());
                Ok(record)
            })
            .await
        }

        async fn find_by_id(&self, id: Id) -> RepoResult<Record> {
            let s = self.read()?;
            s.records.iter().find(|r| r.id == id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find(&self, query: RecordQuery) -> RepoResult<Vec<Record>> {
            let s = self.read()?;
            // newest insert first so the stable sort below favours it on equal timestamps
            let mut v: Vec<_> = s.records.iter().rev().filter(|r| query.matches(r)).cloned().collect();
            v.sort_by(|a, b| b.bumped_on().cmp(&a.bumped_on()));
            if let Some(limit) = query.limit {
                v.truncate(limit);
            }
            Ok(v)
        }

        async fn set_reported(&self, id: Id) -> RepoResult<()> {
            self.mutate(|s| {
                s.get_mut(id)?.reported = true;
                Ok(())
            })
            .await
        }

        async fn set_text(&self, id: Id, text: &str) -> RepoResult<()> {
            let text = text.to_string();
            self.mutate(move |s| {
                s.get_mut(id)?.text = text;
                Ok(())
            })
            .await
        }

        async fn append_reply(&self, thread_id: Id, reply_id: Id, bumped_on: DateTime<Utc>) -> RepoResult<Record> {
            self.mutate(|s| {
                let thread = s.get_mut(thread_id)?;
                let RecordKind::Thread(meta) = &mut thread.kind else { return Err(RepoError::NotFound) };
                meta.reply_ids.push(reply_id);
                meta.reply_count = meta.reply_ids.len() as u32;
                meta.bumped_on = bumped_on;
                Ok(thread.clone())
            })
            .await
        }

        async fn delete(&self, id: Id) -> RepoResult<()> {
            self.mutate(|s| {
                let before = s.records.len();
                s.records.retain(|r| r.id != id);
                if s.records.len() == before {
                    return Err(RepoError::NotFound);
                }
                Ok(())
            })
            .await
        }

        async fn delete_all(&self) -> RepoResult<u64> {
            self.mutate(|s| {
                let n = s.records.len() as u64;
                s.records.clear();
                Ok(n)
            })
            .await
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::{Pool, Postgres};
    use uuid::Uuid;

    const COLUMNS: &str = "id, board, text, delete_password_hash, created_on, bumped_on, reply_ids, reply_count, parent_id, reported";

    #[derive(sqlx::FromRow)]
    struct RecordRow {
        id: Uuid,
        board: String,
        text: String,
        delete_password_hash: String,
        created_on: DateTime<Utc>,
        bumped_on: DateTime<Utc>,
        reply_ids: Vec<Uuid>,
        reply_count: i32,
        parent_id: Option<Uuid>,
        reported: bool,
    }

    impl From<RecordRow> for Record {
        fn from(row: RecordRow) -> Self {
            let kind = match row.parent_id {
                Some(parent_id) => RecordKind::Reply { parent_id },
                None => RecordKind::Thread(ThreadMeta {
                    bumped_on: row.bumped_on,
                    reply_ids: row.reply_ids,
                    reply_count: row.reply_count.max(0) as u32,
                }),
            };
            Record {
                id: row.id,
                board: row.board,
                text: row.text,
                delete_password_hash: row.delete_password_hash,
                created_on: row.created_on,
                reported: row.reported,
                kind,
            }
        }
    }

    fn unavailable(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Unavailable(other.to_string()),
        }
    }

    fn expect_one(result: sqlx::postgres::PgQueryResult) -> RepoResult<()> {
        if result.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Open a pool and bring the schema up to date.
        pub async fn connect(url: &str, max_connections: u32) -> RepoResult<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(unavailable)?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| RepoError::Unavailable(format!("migrations: {e}")))?;
            Ok(Self::new(pool))
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl RecordStore for PgRepo {
        async fn insert(&self, new: NewRecord) -> RepoResult<Record> {
            let row = sqlx::query_as::<_, RecordRow>(&format!(
                "INSERT INTO records (id, board, text, delete_password_hash, created_on, bumped_on, parent_id) \
                 VALUES ($1,$2,$3,$4,$5,$5,$6) RETURNING {COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new.board)
            .bind(&new.text)
            .bind(&new.delete_password_hash)
            .bind(new.created_on)
            .bind(new.parent_id)
            .fetch_one(&self.pool).await.map_err(unavailable)?;
            Ok(row.into())
        }

        async fn find_by_id(&self, id: Id) -> RepoResult<Record> {
            let row = sqlx::query_as::<_, RecordRow>(&format!("SELECT {COLUMNS} FROM records WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(unavailable)?;
            Ok(row.into())
        }

        async fn find(&self, query: RecordQuery) -> RepoResult<Vec<Record>> {
            let limit = query.limit.map(|l| l as i64);
            let rows = match &query.filter {
                RecordFilter::ThreadsOn(board) => {
                    sqlx::query_as::<_, RecordRow>(&format!(
                        "SELECT {COLUMNS} FROM records WHERE board = $1 AND parent_id IS NULL \
                         ORDER BY bumped_on DESC, seq DESC LIMIT $2"
                    ))
                    .bind(board)
                    .bind(limit)
                    .fetch_all(&self.pool).await
                }
                RecordFilter::RepliesTo(thread_id) => {
                    sqlx::query_as::<_, RecordRow>(&format!(
                        "SELECT {COLUMNS} FROM records WHERE parent_id = $1 \
                         ORDER BY bumped_on DESC, seq DESC LIMIT $2"
                    ))
                    .bind(thread_id)
                    .bind(limit)
                    .fetch_all(&self.pool).await
                }
            }
            .map_err(unavailable)?;
            Ok(rows.into_iter().map(Record::from).collect())
        }

        async fn set_reported(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE records SET reported = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(unavailable)?;
            expect_one(res)
        }

        async fn set_text(&self, id: Id, text: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE records SET text = $2 WHERE id = $1")
                .bind(id)
                .bind(text)
                .execute(&self.pool).await.map_err(unavailable)?;
            expect_one(res)
        }

        async fn append_reply(&self, thread_id: Id, reply_id: Id, bumped_on: DateTime<Utc>) -> RepoResult<Record> {
            // single statement: the row lock serializes concurrent appends to one thread
            let row = sqlx::query_as::<_, RecordRow>(&format!(
                "UPDATE records SET reply_ids = array_append(reply_ids, $2), \
                 reply_count = cardinality(reply_ids) + 1, bumped_on = $3 \
                 WHERE id = $1 AND parent_id IS NULL RETURNING {COLUMNS}"
            ))
            .bind(thread_id)
            .bind(reply_id)
            .bind(bumped_on)
            .fetch_one(&self.pool).await.map_err(unavailable)?;
            Ok(row.into())
        }

        async fn delete(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM records WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(unavailable)?;
            expect_one(res)
        }

        async fn delete_all(&self) -> RepoResult<u64> {
            let res = sqlx::query("DELETE FROM records")
                .execute(&self.pool).await.map_err(unavailable)?;
            Ok(res.rows_affected())
        }
    }
}
