use chrono::{DateTime, Utc};

use crate::domain::subscriber_email::SubscriberEmail;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Subscriber {
    pub email: SubscriberEmail,
    pub subscribed_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Subscriber {
    pub fn new(email: SubscriberEmail, subscribed_at: DateTime<Utc>) -> Subscriber {
        Subscriber {
            email,
            subscribed_at,
            is_active: true,
        }
    }
}
