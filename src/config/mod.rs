#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{RelayError, Result};
use crate::utils::validation::{
    validate_command, validate_non_empty_string, validate_positive_number, validate_range,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FIREWALL_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_APPLICATION_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_NATPMPC_EXEC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFRESH_DELAY_SECS: u64 = 45;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub firewall: FirewallConfig,
    pub application: ApplicationConfig,
    pub natpmp: NatPmpConfig,
    #[serde(default)]
    pub relay: Option<LoopConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub alias_name: String,
    pub request_timeout_secs: Option<u64>,
    /// 僅適用於使用自簽憑證的區網設備
    pub accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub url: String,
    pub auth: Option<String>,
    pub command: Option<Vec<String>>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatPmpConfig {
    pub gateway: IpAddr,
    pub lease_timeout_secs: Option<u64>,
    pub command: Option<Vec<String>>,
    pub exec_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopConfig {
    pub refresh_delay_secs: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
}

impl FirewallConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_FIREWALL_TIMEOUT_SECS),
        )
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs.unwrap_or(false)
    }
}

impl ApplicationConfig {
    pub fn command(&self) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| vec!["transmission-remote".to_string()])
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.command_timeout_secs
                .unwrap_or(DEFAULT_APPLICATION_TIMEOUT_SECS),
        )
    }
}

impl NatPmpConfig {
    pub fn command(&self) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| vec!["natpmpc".to_string()])
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs.unwrap_or(DEFAULT_LEASE_TIMEOUT_SECS))
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(
            self.exec_timeout_secs
                .unwrap_or(DEFAULT_NATPMPC_EXEC_TIMEOUT_SECS),
        )
    }
}

impl RelayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RelayError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RelayError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPNSENSE_SECRET})，未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RelayError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 僅從環境變數建立配置（未指定 --config 時使用）
    pub fn from_env() -> Result<Self> {
        let gateway_raw = required_env("NAT_PMP_GATEWAY")?;
        let gateway = gateway_raw
            .parse::<IpAddr>()
            .map_err(|e| RelayError::InvalidConfigValueError {
                field: "NAT_PMP_GATEWAY".to_string(),
                value: gateway_raw.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            firewall: FirewallConfig {
                url: required_env("OPNSENSE_URL")?,
                api_key: required_env("OPNSENSE_KEY")?,
                api_secret: required_env("OPNSENSE_SECRET")?,
                alias_name: required_env("OPNSENSE_ALIAS_NAME")?,
                request_timeout_secs: None,
                accept_invalid_certs: optional_env_parsed("OPNSENSE_ACCEPT_INVALID_CERTS")?,
            },
            application: ApplicationConfig {
                url: required_env("TRANSMISSION_URL")?,
                auth: env::var("TRANSMISSION_AUTH").ok(),
                command: None,
                command_timeout_secs: None,
            },
            natpmp: NatPmpConfig {
                gateway,
                lease_timeout_secs: optional_env_parsed("NAT_PMP_TIMEOUT")?,
                command: None,
                exec_timeout_secs: None,
            },
            relay: Some(LoopConfig {
                refresh_delay_secs: optional_env_parsed("REFRESH_DELAY")?,
                max_consecutive_failures: None,
            }),
        })
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(
            self.relay
                .as_ref()
                .and_then(|r| r.refresh_delay_secs)
                .unwrap_or(DEFAULT_REFRESH_DELAY_SECS),
        )
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.relay
            .as_ref()
            .and_then(|r| r.max_consecutive_failures)
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }

    pub fn set_refresh_delay_secs(&mut self, secs: u64) {
        self.relay.get_or_insert_with(LoopConfig::default).refresh_delay_secs = Some(secs);
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_url("firewall.url", &self.firewall.url)?;
        validate_non_empty_string("firewall.api_key", &self.firewall.api_key)?;
        validate_non_empty_string("firewall.api_secret", &self.firewall.api_secret)?;
        validate_non_empty_string("firewall.alias_name", &self.firewall.alias_name)?;
        validate_positive_number(
            "firewall.request_timeout_secs",
            self.firewall.request_timeout().as_secs(),
            1,
        )?;

        validate_url("application.url", &self.application.url)?;
        validate_command("application.command", &self.application.command())?;
        validate_positive_number(
            "application.command_timeout_secs",
            self.application.command_timeout().as_secs(),
            1,
        )?;

        validate_command("natpmp.command", &self.natpmp.command())?;
        validate_positive_number(
            "natpmp.lease_timeout_secs",
            self.natpmp.lease_timeout().as_secs(),
            1,
        )?;
        validate_positive_number(
            "natpmp.exec_timeout_secs",
            self.natpmp.exec_timeout().as_secs(),
            1,
        )?;

        validate_positive_number("relay.refresh_delay_secs", self.refresh_delay().as_secs(), 1)?;
        validate_range(
            "relay.max_consecutive_failures",
            self.max_consecutive_failures(),
            1,
            u32::MAX,
        )?;

        if self.firewall.accept_invalid_certs() {
            tracing::warn!("⚠️ TLS certificate validation is disabled for the firewall API");
        }

        Ok(())
    }
}

impl Validate for RelayConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| RelayError::MissingConfigError {
        field: name.to_string(),
    })
}

fn optional_env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RelayError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
