//! Disposable containerized services for tests.
//!
//! A [`Provisioner`](provision::Provisioner) launches a container through the
//! engine's command-line interface, waits until it accepts TCP connections
//! and hands back a [`ProvisionedContainer`](container::ProvisionedContainer)
//! that the caller tears down with
//! [`kill_and_remove`](container::ProvisionedContainer::kill_and_remove).
//! Failures after the container was created tear it down before returning.
//!
//! ```rust,no_run
//! use fixturebox::config::FixtureConfig;
//! use fixturebox::provision::Provisioner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = Provisioner::new(FixtureConfig::from_env()?);
//! let mut redis = provisioner.redis(&[]).await?;
//! println!("redis at {}", redis.address());
//! redis.kill_and_remove().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod presets;
pub mod probe;
pub mod provision;
pub mod retry;
pub mod testing;
