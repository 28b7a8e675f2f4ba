//! Description of a service to launch.

use std::time::Duration;

/// Image, port and startup parameters for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Image to run.
    pub image: String,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// `-e KEY=VALUE` assignments.
    pub env: Vec<(String, String)>,
    /// Extra `run` options, placed before the image.
    pub extra_args: Vec<String>,
    /// Command and arguments, placed after the image.
    pub command: Vec<String>,
    /// Probe this host port instead of the forwarded one.
    pub probe_port: Option<u16>,
    /// Overrides the configured startup timeout.
    pub startup_timeout: Option<Duration>,
}

impl ServiceSpec {
    pub fn new(image: impl Into<String>, container_port: u16) -> Self {
        Self {
            image: image.into(),
            container_port,
            env: Vec::new(),
            extra_args: Vec::new(),
            command: Vec::new(),
            probe_port: None,
            startup_timeout: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn probe_port(mut self, port: u16) -> Self {
        self.probe_port = Some(port);
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Arguments for `run`, given the generated name, the host port and
    /// whether to bind to the loopback interface only.
    pub fn run_args(&self, name: &str, host_port: u16, bind_localhost: bool) -> Vec<String> {
        let publish = if bind_localhost {
            format!("127.0.0.1:{}:{}", host_port, self.container_port)
        } else {
            format!("{}:{}", host_port, self.container_port)
        };

        let mut args = vec![
            "--name".to_string(),
            name.to_string(),
            "-d".to_string(),
            "-P".to_string(),
            "-p".to_string(),
            publish,
        ];
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}
