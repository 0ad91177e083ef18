use crate::utils::error::{RelayError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// 外部命令列工具：執行檔加上固定的前置參數（例如 `sudo natpmpc`）
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    prefix_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum CommandFailure {
    Launch(std::io::Error),
    TimedOut,
    Exit {
        status: String,
        stdout: String,
        stderr: String,
    },
}

impl ToolCommand {
    pub fn from_parts(parts: &[String]) -> Result<Self> {
        let (program, prefix_args) = parts.split_first().ok_or_else(|| RelayError::ConfigError {
            message: "External command cannot be empty".to_string(),
        })?;

        Ok(Self {
            program: program.clone(),
            prefix_args: prefix_args.to_vec(),
        })
    }

    /// 用於日誌的工具名稱
    pub fn name(&self) -> &str {
        &self.program
    }

    /// 執行命令並在 `limit` 內等待結束；逾時會終止子行程
    pub async fn run(
        &self,
        args: &[String],
        limit: Duration,
    ) -> std::result::Result<CommandOutput, CommandFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {} {:?} {:?}", self.program, self.prefix_args, args);

        let output = match tokio::time::timeout(limit, command.output()).await {
            Err(_) => return Err(CommandFailure::TimedOut),
            Ok(Err(e)) => return Err(CommandFailure::Launch(e)),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandFailure::Exit {
                status: output.status.to_string(),
                stdout,
                stderr,
            })
        }
    }
}
