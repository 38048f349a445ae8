use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{join, try_join_all};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::hasher::CredentialHasher;
use crate::models::*;
use crate::repo::{RecordStore, RepoError};

/// Thread pages plus reply create / report / delete.
#[derive(Clone)]
pub struct ReplyService {
    store: Arc<dyn RecordStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl ReplyService {
    pub fn new(store: Arc<dyn RecordStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    async fn thread(&self, thread_id: Id) -> Result<Record, ApiError> {
        let record = self.store.find_by_id(thread_id).await?;
        if !record.is_thread() {
            return Err(ApiError::NotFound);
        }
        Ok(record)
    }

    /// The thread with every reply, in the order they were posted.
    pub async fn list(&self, thread_id: Id) -> Result<ThreadView, ApiError> {
        let thread = self.thread(thread_id).await?;
        let reply_ids = thread.thread_meta().map(|m| m.reply_ids.clone()).unwrap_or_default();
        let resolved = try_join_all(reply_ids.into_iter().map(|id| async move {
            match self.store.find_by_id(id).await {
                Ok(r) => Ok(Some(r)),
                Err(RepoError::NotFound) => {
                    debug!(%thread_id, reply_id = %id, "dangling reply id skipped");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }))
        .await?;
        let replies = resolved.into_iter().flatten().filter_map(ReplyView::from_record).collect();
        ThreadView::from_record(thread, replies).ok_or(ApiError::NotFound)
    }

    /// Inserts the reply while the parent lookup is in flight, then links it into the parent.
    pub async fn create(&self, board: &str, thread_id: Id, text: String, password: &str) -> Result<Ack, ApiError> {
        let insert = async {
            let hash = self.hasher.hash(password).await?;
            let reply = self
                .store
                .insert(NewRecord::reply(board.to_string(), text, hash, Utc::now(), thread_id))
                .await?;
            Ok::<_, ApiError>(reply)
        };
        let (parent, reply) = join(self.thread(thread_id), insert).await;
        let reply = reply?;
        if let Err(e) = parent {
            self.discard(reply.id).await;
            return Err(e);
        }
        // the reply is already stored, so the parent never points at a missing record
        let thread = match self.store.append_reply(thread_id, reply.id, Utc::now()).await {
            Ok(t) => t,
            Err(e) => {
                self.discard(reply.id).await;
                return Err(e.into());
            }
        };
        info!(
            %thread_id,
            reply_id = %reply.id,
            reply_count = thread.thread_meta().map(|m| m.reply_count).unwrap_or_default(),
            "reply created"
        );
        Ok(Ack::reply(board.to_string(), thread_id, reply.id))
    }

    async fn discard(&self, reply_id: Id) {
        if let Err(e) = self.store.delete(reply_id).await {
            warn!(%reply_id, error = %e, "failed to remove orphaned reply");
        }
    }

    /// Flags the reply if it exists; a missing id is not an error.
    pub async fn report(&self, reply_id: Id) -> Result<(), ApiError> {
        match self.store.find_by_id(reply_id).await {
            Ok(r) if !r.is_thread() => {
                self.store.set_reported(r.id).await?;
                info!(%reply_id, "reply reported");
            }
            Ok(_) | Err(RepoError::NotFound) => debug!(%reply_id, "report for unknown reply ignored"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Redacts the reply's text; the record and its place in the thread remain.
    pub async fn delete(&self, reply_id: Id, password: &str) -> Result<DeleteOutcome, ApiError> {
        let reply = match self.store.find_by_id(reply_id).await {
            Ok(r) if !r.is_thread() => r,
            Ok(_) | Err(RepoError::NotFound) => return Ok(DeleteOutcome::IncorrectPassword),
            Err(e) => return Err(e.into()),
        };
        if !self.hasher.verify(password, &reply.delete_password_hash).await? {
            return Ok(DeleteOutcome::IncorrectPassword);
        }
        self.store.set_text(reply.id, REDACTED_TEXT).await?;
        info!(%reply_id, "reply redacted");
        Ok(DeleteOutcome::Deleted)
    }
}
