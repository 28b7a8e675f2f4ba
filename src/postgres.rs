//! PostgreSQL statement executor.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::NoTls;

use crate::config::SqlCredentials;
use crate::retry::StatementExecutor;

/// Maintenance database every server has.
pub const MAINTENANCE_DB: &str = "postgres";

/// Runs statements over a fresh connection per call.
///
/// A new connection per attempt means "connection refused" while the server
/// is still starting is retried like any other failure.
pub struct PostgresExecutor {
    config: tokio_postgres::Config,
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // tokio_postgres::Config already redacts the password.
        f.debug_struct("PostgresExecutor").field("config", &self.config).finish()
    }
}

impl PostgresExecutor {
    pub fn new(host: &str, port: u16, user: &str, password: &SecretString, dbname: &str) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(port)
            .user(user)
            .password(password.expose_secret())
            .dbname(dbname);
        Self { config }
    }

    /// Executor against the maintenance database with `credentials`.
    pub fn maintenance(host: &str, port: u16, credentials: &SqlCredentials) -> Self {
        Self::new(
            host,
            port,
            &credentials.username,
            &credentials.password,
            MAINTENANCE_DB,
        )
    }
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
    type Output = ();
    type Error = tokio_postgres::Error;

    async fn execute(&self, statement: &str) -> Result<(), tokio_postgres::Error> {
        let (client, connection) = self.config.connect(NoTls).await?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("PostgreSQL connection closed with error: {}", e);
            }
        });

        let result = client.batch_execute(statement).await;
        drop(client);
        let _ = driver.await;
        result
    }
}
