use actix_web::{get, post, web, HttpResponse, Responder, Scope};
use serde::Deserialize;

use crate::{
    error::Error,
    message::{Message, MessageStatistics},
    service::Service,
};

#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    message: String,
}

fn log_failure(e: &Error) {
    tracing::warn!(error = %e, "failed to process request");
}

#[post("")]
async fn submit_message(
    service: web::Data<Service>,
    body: web::Json<SubmitMessageRequest>,
) -> Result<impl Responder, Error> {
    let message = service
        .submit(&body.message)
        .await
        .inspect_err(log_failure)?;

    Ok(HttpResponse::Created().json(message))
}

#[get("")]
async fn statistics(service: web::Data<Service>) -> Result<web::Json<MessageStatistics>, Error> {
    let stats = service.statistics().await.inspect_err(log_failure)?;

    Ok(web::Json(stats))
}

#[get("/{id}")]
async fn get_message(
    service: web::Data<Service>,
    path: web::Path<u64>,
) -> Result<web::Json<Message>, Error> {
    let message = service
        .get_message(path.into_inner())
        .await
        .inspect_err(log_failure)?;

    Ok(web::Json(message))
}

pub fn service() -> Scope {
    web::scope("/api/messages")
        .service(submit_message)
        .service(statistics)
        .service(get_message)
}
