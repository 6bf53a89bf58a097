mod health_check;
mod index;
mod subscriptions;

pub use health_check::health_check;
pub use index::index_page;
pub use subscriptions::{handle_subscribe, SubscribeError, SubscriptionResponse};
