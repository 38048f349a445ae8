use std::sync::Arc;
use actix_web::{http::header, web, HttpRequest, HttpResponse};

use crate::error::ApiError;
use crate::extract::{Validated, ValidatedQuery};
use crate::hasher::CredentialHasher;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::replies::ReplyService;
use crate::repo::RecordStore;
use crate::threads::ThreadService;

/// Body cap: the longest text in four-byte characters, percent-encoded, plus the other fields.
pub const BODY_LIMIT: usize = MAX_TEXT_LENGTH * 4 * 3 + 8 * 1024;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::FormConfig::default().limit(BODY_LIMIT))
            .app_data(web::JsonConfig::default().limit(BODY_LIMIT))
            .service(
                web::resource("/threads/{board}")
                    .route(web::get().to(list_threads))
                    .route(web::post().to(create_thread))
                    .route(web::put().to(report_thread))
                    .route(web::delete().to(delete_thread)),
            )
            .service(
                web::resource("/replies/{board}")
                    .route(web::get().to(list_replies))
                    .route(web::post().to(create_reply))
                    .route(web::put().to(report_reply))
                    .route(web::delete().to(delete_reply)),
            ),
    );
    // test / reset hook, outside /api
    cfg.route("/_api/delete-all-threads", web::get().to(delete_all_threads));
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub threads: ThreadService,
    pub replies: ReplyService,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            threads: ThreadService::new(store.clone(), hasher.clone()),
            replies: ReplyService::new(store.clone(), hasher),
            store,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

fn status_text(text: &'static str) -> HttpResponse {
    HttpResponse::Ok().content_type(header::ContentType::plaintext()).body(text)
}

fn acknowledged(ack: Ack) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, ack.location()))
        .json(ack)
}

#[utoipa::path(
    get,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    responses(
        (status = 200, description = "Ten most recently bumped threads, three newest replies each", body = [ThreadView])
    ),
    tag = "threads"
)]
pub async fn list_threads(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let threads = data.threads.list(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[utoipa::path(
    post,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = NewThreadRequest,
    responses(
        (status = 303, description = "Thread created; Location points at the board", body = Ack),
        (status = 400, description = "Invalid body"),
        (status = 429, description = "Posting too fast")
    ),
    tag = "threads"
)]
pub async fn create_thread(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Validated<NewThreadRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_thread(&client_ip(&req)) { return Err(ApiError::TooManyRequests); }
    }
    let body = payload.into_inner();
    let board = path.into_inner();
    if body.board.as_deref().is_some_and(|b| b != board) {
        log::debug!("body board {:?} ignored in favour of path board '{board}'", body.board);
    }
    let ack = data.threads.create(&board, body.text, &body.delete_password).await?;
    Ok(acknowledged(ack))
}

#[utoipa::path(
    put,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReportThreadRequest,
    responses((status = 200, description = "Always `success`, whether or not the thread exists", body = String)),
    tag = "threads"
)]
pub async fn report_thread(data: web::Data<AppState>, payload: Validated<ReportThreadRequest>) -> Result<HttpResponse, ApiError> {
    data.threads.report(payload.into_inner().report_id).await?;
    Ok(status_text("success"))
}

#[utoipa::path(
    delete,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = DeleteThreadRequest,
    responses((status = 200, description = "`success` or `incorrect password`", body = String)),
    tag = "threads"
)]
pub async fn delete_thread(data: web::Data<AppState>, payload: Validated<DeleteThreadRequest>) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let outcome = data.threads.delete(body.thread_id, &body.delete_password).await?;
    Ok(status_text(outcome.as_str()))
}

#[utoipa::path(
    get,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name"), ThreadQuery),
    responses(
        (status = 200, description = "Thread with every reply in posting order", body = ThreadView),
        (status = 404, description = "Thread not found")
    ),
    tag = "replies"
)]
pub async fn list_replies(data: web::Data<AppState>, query: ValidatedQuery<ThreadQuery>) -> Result<HttpResponse, ApiError> {
    let thread = data.replies.list(query.0.thread_id).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    post,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = NewReplyRequest,
    responses(
        (status = 303, description = "Reply created; Location points at the thread", body = Ack),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "Thread not found"),
        (status = 429, description = "Posting too fast")
    ),
    tag = "replies"
)]
pub async fn create_reply(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Validated<NewReplyRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_reply(&client_ip(&req)) { return Err(ApiError::TooManyRequests); }
    }
    let body = payload.into_inner();
    let ack = data.replies.create(&path.into_inner(), body.thread_id, body.text, &body.delete_password).await?;
    Ok(acknowledged(ack))
}

#[utoipa::path(
    put,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReportReplyRequest,
    responses((status = 200, description = "Always `success`, whether or not the reply exists", body = String)),
    tag = "replies"
)]
pub async fn report_reply(data: web::Data<AppState>, payload: Validated<ReportReplyRequest>) -> Result<HttpResponse, ApiError> {
    data.replies.report(payload.into_inner().reply_id).await?;
    Ok(status_text("success"))
}

#[utoipa::path(
    delete,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = DeleteReplyRequest,
    responses((status = 200, description = "`success` (text redacted) or `incorrect password`", body = String)),
    tag = "replies"
)]
pub async fn delete_reply(data: web::Data<AppState>, payload: Validated<DeleteReplyRequest>) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let outcome = data.replies.delete(body.reply_id, &body.delete_password).await?;
    Ok(status_text(outcome.as_str()))
}

#[utoipa::path(
    get,
    path = "/_api/delete-all-threads",
    responses((status = 200, description = "Every record removed", body = DeleteAllSummary)),
    tag = "admin"
)]
pub async fn delete_all_threads(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let deleted_count = data.store.delete_all().await?;
    tracing::warn!(deleted_count, "all records deleted");
    Ok(HttpResponse::Ok().json(DeleteAllSummary { acknowledged: true, deleted_count }))
}
