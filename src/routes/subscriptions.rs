use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use crate::domain::subscriber_store::{Outcome, StoreError, SubscriberStore};
use crate::routes::index::render_index;

const AJAX_HEADER: &str = "X-Requested-With";
const AJAX_HEADER_VALUE: &str = "XMLHttpRequest";

#[derive(Deserialize, Debug)]
pub struct SubscriptionForm {
    pub email: Option<String>,
}

/// JSON body answered to the page script, both on success and on error.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubscriptionResponse {
    pub status: String,
    pub message: String,
}

impl SubscriptionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: String::from("success"),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: String::from("error"),
            message: message.into(),
        }
    }
}

#[tracing::instrument(
    name = "Handling a subscription form submission",
    skip(request, form, store),
    fields(subscriber_email = tracing::field::Empty)
)]
pub async fn handle_subscribe(
    request: HttpRequest,
    form: Option<web::Form<SubscriptionForm>>,
    store: web::Data<dyn SubscriberStore>,
) -> Result<HttpResponse, SubscribeError> {
    if !is_ajax(&request) {
        return Ok(render_index());
    }

    let email = form
        .and_then(|form| form.into_inner().email)
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .ok_or(SubscribeError::MissingEmail)?;

    tracing::Span::current().record("subscriber_email", &tracing::field::display(&email));

    let outcome = store.save(&email).await.map_err(|err| {
        match &err {
            StoreError::InvalidFormat(_) => tracing::info!("Rejected submission: {:?}", err),
            _ => tracing::error!("Failed to save a new subscriber: {:?}", err),
        }
        err
    })?;

    match outcome {
        Outcome::Created => Ok(HttpResponse::Ok().json(SubscriptionResponse::success(
            "Thank you for subscribing!",
        ))),
        Outcome::Duplicate => Err(SubscribeError::AlreadySubscribed),
    }
}

fn is_ajax(request: &HttpRequest) -> bool {
    request
        .headers()
        .get(AJAX_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some(AJAX_HEADER_VALUE)
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Email is required")]
    MissingEmail,
    #[error("This email is already subscribed!")]
    AlreadySubscribed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscribeError::Store(err) => write!(f, "Caused by:\n\t({:?})", err),
            _ => write!(f, "Caused by:\n\t({})", self),
        }
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::MissingEmail
            | SubscribeError::AlreadySubscribed
            | SubscribeError::Store(StoreError::InvalidFormat(_)) => StatusCode::BAD_REQUEST,
            SubscribeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(SubscriptionResponse::error(self.to_string()))
    }
}
