use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::adapters::{
    postgres_subscriber_store::PostgresSubscriberStore,
    spreadsheet_subscriber_store::SpreadsheetSubscriberStore,
};
use crate::config::{DatabaseSettings, Settings, StoreBackend};
use crate::domain::subscriber_store::SubscriberStore;
use crate::routes::{handle_subscribe, health_check, index_page};

pub struct Application {
    pub port: u16,
    pub server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let store = build_store(&config);

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(listener, store)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn build_store(config: &Settings) -> Arc<dyn SubscriberStore> {
    tracing::info!("Subscribers are stored in {:?}", config.get_store_backend());

    match config.get_store_backend() {
        StoreBackend::Postgres => Arc::new(PostgresSubscriberStore::new(
            get_connection_db_pool(&config.database),
        )),
        StoreBackend::Spreadsheet => Arc::new(SpreadsheetSubscriberStore::new(
            config.get_spreadsheet_path(),
            config.get_corruption_policy(),
        )),
    }
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn SubscriberStore>,
) -> Result<Server, std::io::Error> {
    let store: web::Data<dyn SubscriberStore> = web::Data::from(store);

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/", web::get().to(index_page))
            .route("/", web::post().to(handle_subscribe))
            .app_data(store.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
