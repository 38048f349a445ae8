use crate::models::{
    Ack, DeleteAllSummary, DeleteReplyRequest, DeleteThreadRequest, NewReplyRequest, NewThreadRequest,
    ReplyView, ReportReplyRequest, ReportThreadRequest, ThreadView,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_threads,
        crate::routes::create_thread,
        crate::routes::report_thread,
        crate::routes::delete_thread,
        crate::routes::list_replies,
        crate::routes::create_reply,
        crate::routes::report_reply,
        crate::routes::delete_reply,
        crate::routes::delete_all_threads,
    ),
    components(schemas(
        ThreadView, ReplyView, Ack, DeleteAllSummary,
        NewThreadRequest, ReportThreadRequest, DeleteThreadRequest,
        NewReplyRequest, ReportReplyRequest, DeleteReplyRequest,
    )),
    tags(
        (name = "threads", description = "Thread operations"),
        (name = "replies", description = "Reply operations"),
        (name = "admin", description = "Test / reset hooks"),
    )
)]
pub struct ApiDoc;
