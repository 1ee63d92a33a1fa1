//! PostgreSQL test infrastructure module.
//!
//! Starts one PostgreSQL container for the whole test run and hands out connection strings
//! to it.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Once;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Global PostgreSQL container port, set once the container is started
static POSTGRES_PORT: AtomicU16 = AtomicU16::new(0);

/// Ensures the container is started only once
static POSTGRES_INIT: Once = Once::new();

/// Tokio runtime for container management (kept alive for container lifecycle)
static mut TOKIO_RT: Option<tokio::runtime::Runtime> = None;

/// Default credentials for testcontainers-modules postgres
const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_DB: &str = "postgres";

/// Initialize the shared PostgreSQL container.
///
/// This function starts a PostgreSQL container using testcontainers and stores
/// the mapped port for use by tests. The container is kept alive for the duration
/// of the test run.
fn ensure_postgres_started() {
    POSTGRES_INIT.call_once(|| {
        // Create a dedicated tokio runtime for container management
        let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

        let port = rt.block_on(async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");

            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("failed to get postgres port");

            // Leak the container to keep it alive for the test duration
            // (the dtor will clean up via the runtime)
            std::mem::forget(container);

            port
        });

        POSTGRES_PORT.store(port, Ordering::SeqCst);

        // Store the runtime to keep it alive (and the container with it)
        // Safety: This is only called once via Once::call_once
        unsafe {
            TOKIO_RT = Some(rt);
        }
    });
}

/// Get the PostgreSQL port for the shared container.
fn get_postgres_port() -> u16 {
    ensure_postgres_started();
    POSTGRES_PORT.load(Ordering::SeqCst)
}

/// Connection string for the default database of the shared container.
///
/// Tests that create databases should name them with [fresh_database_name] so runs don't
/// collide.
pub fn get_test_connection_string() -> String {
    format!(
        "host=127.0.0.1 port={} user={} password={} dbname={}",
        get_postgres_port(),
        PG_USER,
        PG_PASSWORD,
        PG_DB
    )
}

/// A unique, lowercase database name.
pub fn fresh_database_name() -> String {
    format!("test_{}", Uuid::new_v4().simple())
}

/// Check whether a database exists in the shared container.
pub fn database_exists(name: &str) -> bool {
    let mut admin =
        Client::connect(&get_test_connection_string(), NoTls).expect("failed to connect as admin");
    let count: i64 = admin
        .query_one("SELECT COUNT(*) FROM pg_database WHERE datname = $1", &[&name])
        .expect("failed to query pg_database")
        .get(0);
    count > 0
}
