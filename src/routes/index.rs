use actix_web::{http::header::ContentType, HttpResponse};

const INDEX_PAGE: &str = include_str!("../../templates/index.html");

/// Subscription page. Also served for form posts that did not come from the page script.
#[tracing::instrument(name = "Render the subscription page")]
pub async fn index_page() -> HttpResponse {
    render_index()
}

pub fn render_index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_PAGE)
}
