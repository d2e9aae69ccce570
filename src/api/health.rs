use actix_web::{get, web, Responder, Scope};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[get("")]
async fn health() -> impl Responder {
    web::Json(HealthResponse { status: "OK" })
}

pub fn service() -> Scope {
    web::scope("/health").service(health)
}
