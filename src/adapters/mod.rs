pub mod postgres_subscriber_store;
pub mod spreadsheet_subscriber_store;
