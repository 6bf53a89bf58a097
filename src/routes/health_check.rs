use actix_web::HttpResponse;

/// Liveness probe. Does not touch the subscriber store.
#[tracing::instrument(name = "Health check")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
