use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    subscriber::Subscriber,
    subscriber_email::SubscriberEmail,
    subscriber_store::{Outcome, StoreError, SubscriberStore},
};

#[derive(Debug, Clone)]
pub struct PostgresSubscriberStore {
    db_pool: PgPool,
}

impl PostgresSubscriberStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.db_pool).await
    }

    #[tracing::instrument(name = "Fetch subscribers from the database", skip(self))]
    pub async fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT email, subscribed_at, is_active
            FROM subscribers
            ORDER BY subscribed_at, id
            "#,
        )
        .fetch_all(&self.db_pool)
        .await
        .map_err(into_store_error)?;

        rows.iter()
            .map(|row: &PgRow| -> Result<Subscriber, StoreError> {
                let email = SubscriberEmail::parse(row.try_get("email").map_err(into_store_error)?)
                    .map_err(StoreError::unexpected)?;

                Ok(Subscriber {
                    email,
                    subscribed_at: row.try_get("subscribed_at").map_err(into_store_error)?,
                    is_active: row.try_get("is_active").map_err(into_store_error)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SubscriberStore for PostgresSubscriberStore {
    /// Uniqueness is enforced by the `lower(email)` unique index, so concurrent
    /// submissions of the same address cannot both insert.
    #[tracing::instrument(name = "Insert a new subscriber into the database", skip(self))]
    async fn insert_if_absent(&self, email: &SubscriberEmail) -> Result<Outcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscribers (id, email, subscribed_at, is_active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.as_ref())
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            into_store_error(err)
        })?;

        match result.rows_affected() {
            0 => Ok(Outcome::Duplicate),
            _ => Ok(Outcome::Created),
        }
    }
}

fn into_store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Database(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => StoreError::io(err),
        _ => StoreError::unexpected(err),
    }
}
