use crate::adapters::command::{CommandFailure, ToolCommand};
use crate::config::ApplicationConfig;
use crate::domain::ports::PeerApplication;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// 透過 transmission-remote 控制 Transmission
pub struct TransmissionRemote {
    command: ToolCommand,
    url: String,
    auth: Option<String>,
    timeout: Duration,
}

impl TransmissionRemote {
    pub fn new(command: ToolCommand, url: String, auth: Option<String>, timeout: Duration) -> Self {
        Self {
            command,
            url,
            auth,
            timeout,
        }
    }

    pub fn from_config(config: &ApplicationConfig) -> Result<Self> {
        Ok(Self::new(
            ToolCommand::from_parts(&config.command())?,
            config.url.clone(),
            config.auth.clone(),
            config.command_timeout(),
        ))
    }

    fn args(&self, mode: &[&str]) -> Vec<String> {
        let mut args = vec![self.url.clone()];
        if let Some(auth) = &self.auth {
            args.push("-n".to_string());
            args.push(auth.clone());
        }
        args.extend(mode.iter().map(|arg| arg.to_string()));
        args
    }

    async fn invoke(&self, mode: &[&str]) -> Result<()> {
        let tool = self.command.name();
        match self.command.run(&self.args(mode), self.timeout).await {
            Ok(_) => Ok(()),
            Err(CommandFailure::TimedOut) => Err(RelayError::ConnectivityError {
                reason: format!("{} did not answer within {:?}", tool, self.timeout),
            }),
            Err(CommandFailure::Launch(e)) => Err(RelayError::ConnectivityError {
                reason: format!("{} could not be started: {}", tool, e),
            }),
            Err(CommandFailure::Exit {
                status,
                stdout,
                stderr,
            }) => {
                tracing::error!("{} output: {}", tool, stdout);
                tracing::error!("{} stderr: {}", tool, stderr);
                Err(RelayError::ConnectivityError {
                    reason: format!("{} {}: {}", tool, status, stderr.trim()),
                })
            }
        }
    }
}

#[async_trait]
impl PeerApplication for TransmissionRemote {
    async fn ping(&self) -> Result<()> {
        self.invoke(&["-l"]).await
    }

    async fn set_port(&self, port: u16) -> Result<()> {
        let port_arg = port.to_string();
        self.invoke(&["-p", port_arg.as_str()]).await?;
        tracing::info!("Transmission: updated port to {}", port);
        Ok(())
    }
}
