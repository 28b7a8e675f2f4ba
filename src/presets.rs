//! Named services with fixed images, ports and startup environment.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use secrecy::ExposeSecret;

use crate::config::FixtureConfig;
use crate::container::ProvisionedContainer;
use crate::error::ProvisionError;
use crate::provision::{Provisioner, ServiceSpec};

pub const MONGO_IMAGE: &str = "mongo:7";
pub const MYSQL_IMAGE: &str = "mysql:8.0";
pub const POSTGRES_IMAGE: &str = "postgres:16-alpine";
pub const REDIS_IMAGE: &str = "redis:7-alpine";
pub const NATS_IMAGE: &str = "nats:2";
pub const FLUENTD_IMAGE: &str = "fluent/fluentd:v1.16-1";
pub const ELASTICSEARCH_IMAGE: &str = "elasticsearch:7.17.18";

/// Database created when the caller does not name one.
pub const DEFAULT_DATABASE: &str = "fixturebox";

#[cfg(feature = "postgres")]
mod pg {
    use std::time::Duration;

    use crate::retry::RetryBudget;

    /// The server restarts once during first boot, so allow a long warm-up.
    pub const CREATE_DATABASE_BUDGET: RetryBudget = RetryBudget {
        max_attempts: 50,
        base_interval: RetryBudget::DEFAULT_BASE_INTERVAL,
        multiplier: 2,
        max_interval: Some(Duration::from_secs(5)),
    };
}

static DATABASE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("database name pattern is valid")
});

/// Database names end up in SQL and in environment values.
pub fn validate_database_name(name: &str) -> Result<(), ProvisionError> {
    if DATABASE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidDatabaseName {
            name: name.to_string(),
        })
    }
}

/// A supported service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Mongo,
    Mysql,
    Postgres,
    Redis,
    Nats,
    Fluentd,
    Elasticsearch,
}

impl Preset {
    pub fn all() -> &'static [Preset] {
        &[
            Preset::Mongo,
            Preset::Mysql,
            Preset::Postgres,
            Preset::Redis,
            Preset::Nats,
            Preset::Fluentd,
            Preset::Elasticsearch,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Mongo => "mongo",
            Preset::Mysql => "mysql",
            Preset::Postgres => "postgres",
            Preset::Redis => "redis",
            Preset::Nats => "nats",
            Preset::Fluentd => "fluentd",
            Preset::Elasticsearch => "elasticsearch",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            Preset::Mongo => MONGO_IMAGE,
            Preset::Mysql => MYSQL_IMAGE,
            Preset::Postgres => POSTGRES_IMAGE,
            Preset::Redis => REDIS_IMAGE,
            Preset::Nats => NATS_IMAGE,
            Preset::Fluentd => FLUENTD_IMAGE,
            Preset::Elasticsearch => ELASTICSEARCH_IMAGE,
        }
    }

    pub fn container_port(&self) -> u16 {
        match self {
            Preset::Mongo => 27017,
            Preset::Mysql => 3306,
            Preset::Postgres => 5432,
            Preset::Redis => 6379,
            Preset::Nats => 4222,
            Preset::Fluentd => 24224,
            Preset::Elasticsearch => 9200,
        }
    }

    /// Whether the preset creates a named database.
    pub fn takes_database(&self) -> bool {
        matches!(self, Preset::Mysql | Preset::Postgres)
    }

    /// Service description for this preset. `database` is ignored by presets
    /// without a database and defaults to [`DEFAULT_DATABASE`] otherwise.
    pub fn spec(&self, config: &FixtureConfig, database: Option<&str>) -> Result<ServiceSpec, ProvisionError> {
        let database = database.unwrap_or(DEFAULT_DATABASE);
        if self.takes_database() {
            validate_database_name(database)?;
        }

        let spec = ServiceSpec::new(self.image(), self.container_port());
        let spec = match self {
            Preset::Mysql => {
                let creds = &config.mysql;
                let spec = spec
                    .env("MYSQL_ROOT_PASSWORD", creds.password.expose_secret())
                    .env("MYSQL_DATABASE", database);
                if creds.username == "root" {
                    spec
                } else {
                    spec.env("MYSQL_USER", creds.username.as_str())
                        .env("MYSQL_PASSWORD", creds.password.expose_secret())
                }
            }
            Preset::Postgres => {
                let creds = &config.postgres;
                let spec = spec
                    .env("POSTGRES_USER", creds.username.as_str())
                    .env("POSTGRES_PASSWORD", creds.password.expose_secret());
                // With a driver available the database is created after startup,
                // with an explicit collation.
                if cfg!(feature = "postgres") {
                    spec
                } else {
                    spec.env("POSTGRES_DB", database)
                }
            }
            Preset::Elasticsearch => spec.env("discovery.type", "single-node"),
            Preset::Mongo | Preset::Redis | Preset::Nats | Preset::Fluentd => spec,
        };
        Ok(spec)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "mongodb" => "mongo",
            "postgresql" | "pg" => "postgres",
            "es" => "elasticsearch",
            other => other,
        };
        Preset::all()
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Preset::all().iter().map(|p| p.name()).collect();
                format!("unknown preset '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

impl Provisioner {
    /// Provision `preset`, creating its database where applicable.
    pub async fn provision_preset(
        &self,
        preset: Preset,
        database: Option<&str>,
        extra_args: &[&str],
    ) -> Result<ProvisionedContainer, ProvisionError> {
        let spec = preset
            .spec(self.config(), database)?
            .args(extra_args.iter().copied());

        let container = self.provision(&spec).await?;
        self.initialize(preset, database.unwrap_or(DEFAULT_DATABASE), container)
            .await
    }

    /// Post-start setup that needs a client driver.
    #[cfg(feature = "postgres")]
    async fn initialize(
        &self,
        preset: Preset,
        database: &str,
        mut container: ProvisionedContainer,
    ) -> Result<ProvisionedContainer, ProvisionError> {
        if preset == Preset::Postgres {
            self.create_postgres_database(&mut container, database, &pg::CREATE_DATABASE_BUDGET)
                .await?;
        }
        Ok(container)
    }

    #[cfg(not(feature = "postgres"))]
    async fn initialize(
        &self,
        _preset: Preset,
        _database: &str,
        container: ProvisionedContainer,
    ) -> Result<ProvisionedContainer, ProvisionError> {
        Ok(container)
    }

    pub async fn mongo(&self, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Mongo, None, extra_args).await
    }

    /// MySQL with `database` created through `MYSQL_DATABASE`.
    pub async fn mysql(&self, database: &str, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Mysql, Some(database), extra_args).await
    }

    /// PostgreSQL with `database` created (collation `C`, from `template0`).
    pub async fn postgres(&self, database: &str, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Postgres, Some(database), extra_args).await
    }

    pub async fn redis(&self, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Redis, None, extra_args).await
    }

    pub async fn nats(&self, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Nats, None, extra_args).await
    }

    pub async fn fluentd(&self, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Fluentd, None, extra_args).await
    }

    pub async fn elasticsearch(&self, extra_args: &[&str]) -> Result<ProvisionedContainer, ProvisionError> {
        self.provision_preset(Preset::Elasticsearch, None, extra_args).await
    }

    /// Create `database` in a freshly started server, tearing the container
    /// down if the server never accepts the statement.
    #[cfg(feature = "postgres")]
    async fn create_postgres_database(
        &self,
        container: &mut ProvisionedContainer,
        database: &str,
        budget: &crate::retry::RetryBudget,
    ) -> Result<(), ProvisionError> {
        use crate::postgres::PostgresExecutor;
        use crate::retry::retry_exec_with;

        let executor = PostgresExecutor::maintenance(container.host(), container.port(), &self.config().postgres);
        let statement = format!("CREATE DATABASE {database} LC_COLLATE = 'C' TEMPLATE = template0");

        match retry_exec_with(&executor, &statement, budget).await {
            Ok(()) => {
                tracing::info!("Created database {} in container {}", database, container.id());
                Ok(())
            }
            Err(source) => {
                let id = container.id().to_string();
                if let Err(e) = container.kill_and_remove().await {
                    tracing::warn!("Rollback of container {} failed: {}", id, e);
                }
                Err(ProvisionError::StatementRetryExhausted {
                    id,
                    database: database.to_string(),
                    source,
                })
            }
        }
    }
}
