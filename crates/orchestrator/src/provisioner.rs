use async_trait::async_trait;
use multiverse_core::ProvisionerConfig;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};

const ENV_VAR: &str = "MULTIVERSE_ENV";
const DEFAULT_TARGET: &str = "master";

/// Brings up a topology running exactly the requested apps.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, apps: &BTreeSet<String>) -> Result<()>;
}

#[derive(Serialize)]
struct ActiveApps<'a> {
    active_apps: BTreeMap<&'a str, ActiveApp>,
}

#[derive(Serialize)]
struct ActiveApp {
    target: &'static str,
}

/// Runs `<program> integrate <file>` where the file lists the apps to bring
/// up.
pub struct CommandProvisioner {
    config: ProvisionerConfig,
}

impl CommandProvisioner {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    fn render(apps: &BTreeSet<String>) -> Result<String> {
        let request = ActiveApps {
            active_apps: apps
                .iter()
                .map(|name| {
                    (
                        name.as_str(),
                        ActiveApp {
                            target: DEFAULT_TARGET,
                        },
                    )
                })
                .collect(),
        };
        toml::to_string_pretty(&request)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, apps: &BTreeSet<String>) -> Result<()> {
        let mut request = tempfile::Builder::new()
            .prefix("integration")
            .suffix(".toml")
            .tempfile()?;
        request.write_all(Self::render(apps)?.as_bytes())?;
        request.flush()?;

        info!(
            program = %self.config.program.display(),
            root = %self.config.root.display(),
            apps = ?apps,
            "Provisioning topology"
        );

        let mut command = Command::new(&self.config.program);
        command
            .arg("integrate")
            .arg(request.path())
            .current_dir(&self.config.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(env) = &self.config.env {
            command.env(ENV_VAR, env);
        }

        let mut child = command.spawn().map_err(|e| {
            OrchestratorError::Provision(format!(
                "failed to start {}: {}",
                self.config.program.display(),
                e
            ))
        })?;

        let stdout = child.stdout.take().map(|out| tokio::spawn(forward(out, false)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(forward(err, true)));

        let status = child.wait().await?;
        for reader in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = reader.await {
                debug!(error = %e, "Provisioner output reader ended abnormally");
            }
        }

        if !status.success() {
            return Err(OrchestratorError::Provision(format!(
                "{} integrate exited with {}",
                self.config.program.display(),
                status
            )));
        }
        info!("Provisioning finished");
        Ok(())
    }
}

/// Log every line the provisioning tool prints.
async fn forward<R>(stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => warn!(target: "provisioner", "{}", line),
            Ok(Some(line)) => info!(target: "provisioner", "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Stopped reading provisioner output");
                break;
            }
        }
    }
}

/// Used when no provisioning tool is configured; any topology change fails.
pub struct MissingProvisioner;

#[async_trait]
impl Provisioner for MissingProvisioner {
    async fn provision(&self, apps: &BTreeSet<String>) -> Result<()> {
        Err(OrchestratorError::Provision(format!(
            "no provisioner configured to bring up {:?}",
            apps
        )))
    }
}
