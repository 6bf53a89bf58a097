use once_cell::sync::Lazy;
use reqwest::Response;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::collections::HashMap;
use tempfile::TempDir;
use uuid::Uuid;

use subscription_form::{
    adapters::{
        postgres_subscriber_store::PostgresSubscriberStore,
        spreadsheet_subscriber_store::SpreadsheetSubscriberStore,
    },
    config::{get_configuration, Settings, StoreBackend},
    domain::subscriber::Subscriber,
    startup::{get_connection_db_pool, Application},
    telemetry::{get_subscriber, init_subscriber},
};

// Tracing is initialised only once for the whole test binary. Set TEST_LOG to see the logs.
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = String::from("info");
    let subscriber_name = String::from("test");

    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            std::io::stdout,
        ));
    } else {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            std::io::sink,
        ));
    }
});

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub db_pool: Option<PgPool>,
    // Keeps the spreadsheet directory alive while the test runs
    pub data_dir: TempDir,
}

impl TestApp {
    /// Application backed by a spreadsheet inside a fresh temporary directory.
    pub async fn spawn_app() -> TestApp {
        let mut config = base_config();
        config.set_store_backend(StoreBackend::Spreadsheet);

        TestApp::launch(config, None).await
    }

    /// Application backed by a brand new Postgres database. Needs a reachable server.
    pub async fn spawn_app_with_postgres() -> TestApp {
        let mut config = base_config();
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));

        config.set_store_backend(StoreBackend::Postgres);
        let db_pool = configure_db(&mut config, db_test_name).await;

        TestApp::launch(config, Some(db_pool)).await
    }

    async fn launch(mut config: Settings, db_pool: Option<PgPool>) -> TestApp {
        Lazy::force(&TRACING);

        let data_dir = TempDir::new().expect("Failed to create a temporary directory.");
        config.set_spreadsheet_path(data_dir.path().join("subscribers.csv"));

        let application = Application::build(config.clone())
            .await
            .expect("Failed to build application.");

        let address = format!("http://127.0.0.1:{}", application.get_port());

        tokio::spawn(application.run_until_stop());

        TestApp {
            config,
            address,
            db_pool,
            data_dir,
        }
    }

    /// Submits the form the way the page script does.
    pub async fn post_subscription(&self, body: HashMap<&str, &str>) -> Response {
        reqwest::Client::new()
            .post(format!("{}/", self.address))
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Submits the form like a plain browser post, without the script marker header.
    pub async fn post_plain_form(&self, body: HashMap<&str, &str>) -> Response {
        reqwest::Client::new()
            .post(format!("{}/", self.address))
            .form(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn subscribe(&self, email: &str) -> Response {
        self.post_subscription(HashMap::from([("email", email)])).await
    }

    pub async fn spreadsheet_subscribers(&self) -> Vec<Subscriber> {
        SpreadsheetSubscriberStore::new(
            self.config.get_spreadsheet_path(),
            self.config.get_corruption_policy(),
        )
        .subscribers()
        .await
        .expect("Failed to read the spreadsheet.")
    }

    pub async fn database_subscribers(&self) -> Vec<Subscriber> {
        let db_pool = self
            .db_pool
            .clone()
            .expect("Application was not started with Postgres.");

        PostgresSubscriberStore::new(db_pool)
            .subscribers()
            .await
            .expect("Failed to fetch subscribers.")
    }
}

fn base_config() -> Settings {
    let mut config = get_configuration().expect("Missing configuration file.");

    // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
    // take into account: when port is 0, the OS will search for the first available port
    config.set_app_port(0);

    config
}

async fn configure_db(config: &mut Settings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect_with(&config.database.get_server_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    config.set_db_name(db_test_name);

    let db_pool = get_connection_db_pool(&config.database);

    PostgresSubscriberStore::new(db_pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations.");

    db_pool
}
