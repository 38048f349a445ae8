use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub type Id = Uuid;

/// Text a reply is left with after a successful delete.
pub const REDACTED_TEXT: &str = "[deleted]";

/// Maximum length of thread / reply text (in characters).
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Threads returned per board listing.
pub const THREADS_PER_BOARD: usize = 10;

/// Replies embedded in each thread of a board listing.
pub const PREVIEW_REPLIES: usize = 3;

/// A stored thread or reply. Never serialized to clients; see [`ThreadView`] / [`ReplyView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Id,
    pub board: String,
    pub text: String,
    pub delete_password_hash: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub reported: bool,
    pub kind: RecordKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Thread(ThreadMeta),
    Reply { parent_id: Id },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub bumped_on: DateTime<Utc>,
    #[serde(default)]
    pub reply_ids: Vec<Id>,
    #[serde(default)]
    pub reply_count: u32,
}

impl Record {
    pub fn is_thread(&self) -> bool {
        matches!(self.kind, RecordKind::Thread(_))
    }

    pub fn parent_id(&self) -> Option<Id> {
        match self.kind {
            RecordKind::Reply { parent_id } => Some(parent_id),
            RecordKind::Thread(_) => None,
        }
    }

    /// Sort key for listings: a reply is bumped exactly once, when it is created.
    pub fn bumped_on(&self) -> DateTime<Utc> {
        match &self.kind {
            RecordKind::Thread(meta) => meta.bumped_on,
            RecordKind::Reply { .. } => self.created_on,
        }
    }

    pub fn thread_meta(&self) -> Option<&ThreadMeta> {
        match &self.kind {
            RecordKind::Thread(meta) => Some(meta),
            RecordKind::Reply { .. } => None,
        }
    }
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub board: String,
    pub text: String,
    pub delete_password_hash: String,
    pub created_on: DateTime<Utc>,
    pub parent_id: Option<Id>,
}

impl NewRecord {
    pub fn thread(board: String, text: String, delete_password_hash: String, now: DateTime<Utc>) -> Self {
        Self { board, text, delete_password_hash, created_on: now, parent_id: None }
    }

    pub fn reply(board: String, text: String, delete_password_hash: String, now: DateTime<Utc>, parent_id: Id) -> Self {
        Self { board, text, delete_password_hash, created_on: now, parent_id: Some(parent_id) }
    }

    pub fn into_record(self, id: Id) -> Record {
        let kind = match self.parent_id {
            Some(parent_id) => RecordKind::Reply { parent_id },
            None => RecordKind::Thread(ThreadMeta {
                bumped_on: self.created_on,
                reply_ids: Vec::new(),
                reply_count: 0,
            }),
        };
        Record {
            id,
            board: self.board,
            text: self.text,
            delete_password_hash: self.delete_password_hash,
            created_on: self.created_on,
            reported: false,
            kind,
        }
    }
}

// ---------------- client-facing projections ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplyView {
    pub id: Id,
    pub thread_id: Id,
    pub board: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadView {
    pub id: Id,
    pub board: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub reply_count: u32,
    pub replies: Vec<ReplyView>,
}

impl ReplyView {
    /// `None` when the record is a thread.
    pub fn from_record(r: Record) -> Option<Self> {
        let thread_id = r.parent_id()?;
        Some(Self { id: r.id, thread_id, board: r.board, text: r.text, created_on: r.created_on })
    }
}

impl ThreadView {
    /// `None` when the record is a reply.
    pub fn from_record(r: Record, replies: Vec<ReplyView>) -> Option<Self> {
        let RecordKind::Thread(meta) = r.kind else { return None };
        Some(Self {
            id: r.id,
            board: r.board,
            text: r.text,
            created_on: r.created_on,
            bumped_on: meta.bumped_on,
            reply_count: meta.reply_count,
            replies,
        })
    }
}

// ---------------- request payloads ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewThreadRequest {
    /// Ignored when the path names a board.
    #[serde(default)]
    pub board: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "text must be 1..=10000 characters"))]
    pub text: String,
    #[validate(length(min = 1, max = 128, message = "delete_password must be 1..=128 characters"))]
    pub delete_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ReportThreadRequest {
    #[serde(alias = "thread_id")]
    pub report_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct DeleteThreadRequest {
    pub thread_id: Id,
    #[validate(length(min = 1, max = 128, message = "delete_password must be 1..=128 characters"))]
    pub delete_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreadQuery {
    pub thread_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewReplyRequest {
    pub thread_id: Id,
    #[validate(length(min = 1, max = 10000, message = "text must be 1..=10000 characters"))]
    pub text: String,
    #[validate(length(min = 1, max = 128, message = "delete_password must be 1..=128 characters"))]
    pub delete_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ReportReplyRequest {
    #[serde(default)]
    pub thread_id: Option<Id>,
    pub reply_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct DeleteReplyRequest {
    #[serde(default)]
    pub thread_id: Option<Id>,
    pub reply_id: Id,
    #[validate(length(min = 1, max = 128, message = "delete_password must be 1..=128 characters"))]
    pub delete_password: String,
}

// ---------------- responses ----------------

/// Body of a successful POST.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    pub status: String,
    pub board: String,
    pub thread_id: Id,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_id: Option<Id>,
}

impl Ack {
    pub fn thread(board: String, thread_id: Id) -> Self {
        Self { status: "success".into(), board, thread_id, reply_id: None }
    }

    pub fn reply(board: String, thread_id: Id, reply_id: Id) -> Self {
        Self { status: "success".into(), board, thread_id, reply_id: Some(reply_id) }
    }

    /// Where an HTML form client should land after posting.
    pub fn location(&self) -> String {
        match self.reply_id {
            Some(_) => format!("/b/{}/{}/", self.board, self.thread_id),
            None => format!("/b/{}/", self.board),
        }
    }
}

/// Result of a password-checked delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    IncorrectPassword,
}

impl DeleteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeleteOutcome::Deleted => "success",
            DeleteOutcome::IncorrectPassword => "incorrect password",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteAllSummary {
    pub acknowledged: bool,
    pub deleted_count: u64,
}
