use crate::adapters::command::{CommandFailure, ToolCommand};
use crate::config::NatPmpConfig;
use crate::domain::model::Protocol;
use crate::domain::ports::PortMapper;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

static MAPPED_PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Mapped public port ([0-9]+) protocol (UDP|TCP) to local port 0")
        .expect("mapped port pattern is valid")
});

/// 從 natpmpc 輸出中找出指定協定的對外埠號
pub fn parse_mapped_port(stdout: &str, protocol: Protocol) -> Option<u16> {
    MAPPED_PORT_RE
        .captures_iter(stdout)
        .filter(|caps| &caps[2] == protocol.as_str())
        .find_map(|caps| caps[1].parse::<u16>().ok())
}

/// 透過 natpmpc 向閘道要求（或續約）對應
pub struct NatpmpcMapper {
    command: ToolCommand,
    gateway: IpAddr,
    lease_timeout: Duration,
    exec_timeout: Duration,
}

impl NatpmpcMapper {
    pub fn new(
        command: ToolCommand,
        gateway: IpAddr,
        lease_timeout: Duration,
        exec_timeout: Duration,
    ) -> Self {
        Self {
            command,
            gateway,
            lease_timeout,
            exec_timeout,
        }
    }

    pub fn from_config(config: &NatPmpConfig) -> Result<Self> {
        Ok(Self::new(
            ToolCommand::from_parts(&config.command())?,
            config.gateway,
            config.lease_timeout(),
            config.exec_timeout(),
        ))
    }

    fn request_args(&self, protocol: Protocol) -> Vec<String> {
        vec![
            "-a".to_string(),
            "1".to_string(),
            "0".to_string(),
            protocol.as_str().to_string(),
            self.lease_timeout.as_secs().to_string(),
            "-g".to_string(),
            self.gateway.to_string(),
        ]
    }
}

#[async_trait]
impl PortMapper for NatpmpcMapper {
    async fn get_port(&self, protocol: Protocol) -> Result<u16> {
        let tool = self.command.name().to_string();
        let output = self
            .command
            .run(&self.request_args(protocol), self.exec_timeout)
            .await
            .map_err(|failure| match failure {
                CommandFailure::TimedOut => RelayError::TimeoutError {
                    tool: tool.clone(),
                    timeout: self.exec_timeout,
                },
                CommandFailure::Launch(e) => RelayError::ToolExecutionError {
                    tool: tool.clone(),
                    reason: format!("could not be started: {}", e),
                },
                CommandFailure::Exit {
                    status,
                    stdout,
                    stderr,
                } => {
                    tracing::error!("{} output: {}", tool, stdout);
                    tracing::error!("{} stderr: {}", tool, stderr);
                    RelayError::ToolExecutionError {
                        tool: tool.clone(),
                        reason: format!("{}: {}", status, stderr.trim()),
                    }
                }
            })?;

        match parse_mapped_port(&output.stdout, protocol) {
            Some(port) => {
                tracing::debug!("NAT-PMP: {} mapped to public port {}", protocol, port);
                Ok(port)
            }
            None => {
                tracing::error!("{} output: {}", tool, output.stdout);
                tracing::error!("{} stderr: {}", tool, output.stderr);
                Err(RelayError::ParseError {
                    tool,
                    protocol: protocol.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logger::capture::capture_logs;

    const NATPMPC_OUTPUT: &str = "initnatpmp() returned 0 (SUCCESS)
using gateway : 10.2.0.1
sendpublicaddressrequest returned 2 (SUCCESS)
readnatpmpresponseorretry returned 0 (OK)
Public IP address : 185.65.134.77
epoch = 17581
sendnewportmappingrequest returned 12 (SUCCESS)
readnatpmpresponseorretry returned 0 (OK)
Mapped public port 51413 protocol TCP to local port 0 lifetime 60
epoch = 17581
closenatpmp() returned 0 (SUCCESS)
";

    fn shell_mapper(script: &str, exec_timeout: Duration) -> NatpmpcMapper {
        let command = ToolCommand::from_parts(&[
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "natpmpc".to_string(),
        ])
        .unwrap();
        NatpmpcMapper::new(
            command,
            "10.2.0.1".parse().unwrap(),
            Duration::from_secs(60),
            exec_timeout,
        )
    }

    #[test]
    fn test_parse_mapped_port() {
        assert_eq!(parse_mapped_port(NATPMPC_OUTPUT, Protocol::Tcp), Some(51413));
    }

    #[test]
    fn test_parse_ignores_other_protocol() {
        assert_eq!(parse_mapped_port(NATPMPC_OUTPUT, Protocol::Udp), None);

        let udp = NATPMPC_OUTPUT.replace("protocol TCP", "protocol UDP");
        assert_eq!(parse_mapped_port(&udp, Protocol::Udp), Some(51413));
    }

    #[test]
    fn test_parse_rejects_garbage_and_out_of_range() {
        assert_eq!(
            parse_mapped_port("readnatpmpresponseorretry() failed : 4", Protocol::Tcp),
            None
        );
        assert_eq!(
            parse_mapped_port(
                "Mapped public port 70000 protocol TCP to local port 0",
                Protocol::Tcp
            ),
            None
        );
        assert_eq!(
            parse_mapped_port(
                "Mapped public port 4000 protocol TCP to local port 4000",
                Protocol::Tcp
            ),
            None
        );
    }

    #[test]
    fn test_request_args() {
        let mapper = shell_mapper("true", Duration::from_secs(10));
        assert_eq!(
            mapper.request_args(Protocol::Udp),
            vec!["-a", "1", "0", "UDP", "60", "-g", "10.2.0.1"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_port_from_tool_output() {
        // $4 is the protocol argument, $7 the gateway
        let mapper = shell_mapper(
            "test \"$7\" = 10.2.0.1 || exit 9; echo \"Mapped public port 40123 protocol $4 to local port 0 lifetime $5\"",
            Duration::from_secs(5),
        );

        assert_eq!(mapper.get_port(Protocol::Tcp).await.unwrap(), 40123);
        assert_eq!(mapper.get_port(Protocol::Udp).await.unwrap(), 40123);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_port_tool_failure() {
        let mapper = shell_mapper("echo 'initnatpmp() failed' >&2; exit 1", Duration::from_secs(5));

        let err = mapper.get_port(Protocol::Tcp).await.unwrap_err();
        assert!(matches!(err, RelayError::ToolExecutionError { .. }));
        assert!(err.to_string().contains("initnatpmp() failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_port_timeout() {
        let mapper = shell_mapper("exec sleep 5", Duration::from_millis(200));

        let err = mapper.get_port(Protocol::Tcp).await.unwrap_err();
        assert!(matches!(err, RelayError::TimeoutError { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_port_unparseable_output() {
        let mapper = shell_mapper(
            "echo 'readnatpmpresponseorretry() failed : 4'; echo 'gateway busy' >&2",
            Duration::from_secs(5),
        );
        let (logs, _guard) = capture_logs();

        let err = mapper.get_port(Protocol::Udp).await.unwrap_err();
        assert!(matches!(err, RelayError::ParseError { ref protocol, .. } if protocol == "UDP"));

        let output = logs.contents();
        assert!(output.contains("output: readnatpmpresponseorretry() failed : 4"));
        assert!(output.contains("stderr: gateway busy"));
    }

    #[tokio::test]
    async fn test_get_port_missing_tool() {
        let command =
            ToolCommand::from_parts(&["pmp-relay-definitely-missing-natpmpc".to_string()]).unwrap();
        let mapper = NatpmpcMapper::new(
            command,
            "10.2.0.1".parse().unwrap(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let err = mapper.get_port(Protocol::Tcp).await.unwrap_err();
        assert!(matches!(err, RelayError::ToolExecutionError { .. }));
    }
}
