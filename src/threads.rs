use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::hasher::CredentialHasher;
use crate::models::*;
use crate::repo::{RecordQuery, RecordStore, RepoError};

/// Board listing plus thread create / report / delete.
#[derive(Clone)]
pub struct ThreadService {
    store: Arc<dyn RecordStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl ThreadService {
    pub fn new(store: Arc<dyn RecordStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    /// The ten most recently bumped threads of `board`, each with its three newest replies.
    pub async fn list(&self, board: &str) -> Result<Vec<ThreadView>, ApiError> {
        let threads = self.store.find(RecordQuery::threads_on(board, THREADS_PER_BOARD)).await?;
        let views = try_join_all(threads.into_iter().map(|t| async move {
            let replies = self.store.find(RecordQuery::replies_to(t.id, PREVIEW_REPLIES)).await?;
            let replies = replies.into_iter().filter_map(ReplyView::from_record).collect();
            Ok::<_, RepoError>(ThreadView::from_record(t, replies))
        }))
        .await?;
        Ok(views.into_iter().flatten().collect())
    }

    pub async fn create(&self, board: &str, text: String, password: &str) -> Result<Ack, ApiError> {
        let hash = self.hasher.hash(password).await?;
        let thread = self
            .store
            .insert(NewRecord::thread(board.to_string(), text, hash, Utc::now()))
            .await?;
        info!(board, thread_id = %thread.id, "thread created");
        Ok(Ack::thread(thread.board, thread.id))
    }

    /// Flags the thread if it exists; a missing id is not an error.
    pub async fn report(&self, thread_id: Id) -> Result<(), ApiError> {
        match self.store.find_by_id(thread_id).await {
            Ok(r) if r.is_thread() => {
                self.store.set_reported(r.id).await?;
                info!(%thread_id, "thread reported");
            }
            Ok(_) | Err(RepoError::NotFound) => debug!(%thread_id, "report for unknown thread ignored"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Removes the thread record only; its replies stay in the store.
    pub async fn delete(&self, thread_id: Id, password: &str) -> Result<DeleteOutcome, ApiError> {
        let thread = match self.store.find_by_id(thread_id).await {
            Ok(r) if r.is_thread() => r,
            Ok(_) | Err(RepoError::NotFound) => return Ok(DeleteOutcome::IncorrectPassword),
            Err(e) => return Err(e.into()),
        };
        if !self.hasher.verify(password, &thread.delete_password_hash).await? {
            return Ok(DeleteOutcome::IncorrectPassword);
        }
        match self.store.delete(thread.id).await {
            // lost a race with another delete
            Err(RepoError::NotFound) => return Ok(DeleteOutcome::IncorrectPassword),
            other => other?,
        }
        info!(%thread_id, "thread deleted");
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::hasher::{Argon2Hasher, HashCost};
    use crate::repo::inmem::InMemRepo;

    fn service() -> (ThreadService, Arc<InMemRepo>) {
        let store = Arc::new(InMemRepo::ephemeral());
        let hasher = Argon2Hasher::new(HashCost { memory_kib: 8, iterations: 1, parallelism: 1 }).unwrap();
        (ThreadService::new(store.clone(), Arc::new(hasher)), store)
    }

    #[tokio::test]
    async fn empty_board_lists_nothing() {
        let (svc, _) = service();
        assert!(svc.list("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_thread_is_listed_first() {
        let (svc, _) = service();
        svc.create("g", "older".into(), "pw").await.unwrap();
        let ack = svc.create("g", "newer".into(), "pw").await.unwrap();
        let list = svc.list("g").await.unwrap();
        assert_eq!(list[0].id, ack.thread_id);
        assert_eq!(list[0].text, "newer");
        assert_eq!(ack.board, "g");
    }

    #[tokio::test]
    async fn boards_do_not_leak_into_each_other() {
        let (svc, _) = service();
        svc.create("a", "x".into(), "pw").await.unwrap();
        assert!(svc.list("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn report_sets_flag_and_ignores_unknown_ids() {
        let (svc, store) = service();
        let ack = svc.create("g", "x".into(), "pw").await.unwrap();
        svc.report(ack.thread_id).await.unwrap();
        assert!(store.find_by_id(ack.thread_id).await.unwrap().reported);
        svc.report(uuid::Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn delete_needs_the_right_password() {
        let (svc, store) = service();
        let ack = svc.create("g", "x".into(), "pw").await.unwrap();
        assert_eq!(svc.delete(ack.thread_id, "nope").await.unwrap(), DeleteOutcome::IncorrectPassword);
        assert!(store.find_by_id(ack.thread_id).await.is_ok());
        assert_eq!(svc.delete(ack.thread_id, "pw").await.unwrap(), DeleteOutcome::Deleted);
        assert!(matches!(store.find_by_id(ack.thread_id).await, Err(RepoError::NotFound)));
        // second attempt looks exactly like a wrong password
        assert_eq!(svc.delete(ack.thread_id, "pw").await.unwrap(), DeleteOutcome::IncorrectPassword);
    }
}
