use crate::config::RelayConfig;
use crate::domain::model::{AliasId, PortAssignment, Protocol};
use crate::domain::ports::{Firewall, PeerApplication, PortMapper, Sleeper};
use crate::utils::error::{ErrorCategory, RelayError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub alias_name: String,
    pub refresh_delay: Duration,
    /// 連續失敗超過此數值即終止
    pub max_consecutive_failures: u32,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            alias_name: config.firewall.alias_name.clone(),
            refresh_delay: config.refresh_delay(),
            max_consecutive_failures: config.max_consecutive_failures(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Startup,
    Polling,
    Terminated(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    StartupFailed,
    FailureThresholdExceeded,
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::StartupFailed | Termination::FailureThresholdExceeded => 1,
        }
    }
}

/// 單一輪詢週期的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Unchanged {
        port: u16,
    },
    Propagated {
        previous: Option<u16>,
        port: u16,
    },
    Failed {
        category: ErrorCategory,
        consecutive_failures: u32,
    },
}

/// 將 NAT-PMP 對外埠號同步到防火牆 alias 與下游應用程式
///
/// 狀態機：`Startup` → `Polling` → `Terminated`。`registered_port` 只在防火牆與應用程式
/// 都更新成功後才會寫入，失敗的週期會在下一輪重新嘗試整組更新。
pub struct PortRelay<M, F, A, S> {
    mapper: M,
    firewall: F,
    application: A,
    sleeper: S,
    settings: RelaySettings,
    state: RelayState,
    alias_id: Option<AliasId>,
    registered_port: Option<u16>,
    consecutive_failures: u32,
}

impl<M, F, A, S> PortRelay<M, F, A, S>
where
    M: PortMapper,
    F: Firewall,
    A: PeerApplication,
    S: Sleeper,
{
    pub fn new(mapper: M, firewall: F, application: A, sleeper: S, settings: RelaySettings) -> Self {
        Self {
            mapper,
            firewall,
            application,
            sleeper,
            settings,
            state: RelayState::Startup,
            alias_id: None,
            registered_port: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_registered_port(mut self, port: Option<u16>) -> Self {
        self.registered_port = port;
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn registered_port(&self) -> Option<u16> {
        self.registered_port
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn alias_id(&self) -> Option<&AliasId> {
        self.alias_id.as_ref()
    }

    /// 啟動前檢查：取得 alias id 並確認應用程式可連線，任一失敗即終止
    pub async fn startup(&mut self) -> Result<()> {
        if self.state != RelayState::Startup {
            return Err(RelayError::InvalidStateError {
                state: format!("{:?}", self.state),
            });
        }

        let alias_id = match self.firewall.resolve_alias(&self.settings.alias_name).await {
            Ok(alias_id) => alias_id,
            Err(e) => {
                tracing::error!(
                    "❌ Error while fetching alias '{}' from the firewall: {}",
                    self.settings.alias_name,
                    e.detailed_message()
                );
                tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
                self.state = RelayState::Terminated(Termination::StartupFailed);
                return Err(e);
            }
        };
        tracing::info!(
            "✅ Alias '{}' found in firewall ({})",
            self.settings.alias_name,
            alias_id
        );

        if let Err(e) = self.application.ping().await {
            tracing::error!(
                "❌ Error while contacting the application: {}",
                e.detailed_message()
            );
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            self.state = RelayState::Terminated(Termination::StartupFailed);
            return Err(e);
        }
        tracing::info!("✅ Connection to application OK");

        self.alias_id = Some(alias_id);
        self.state = RelayState::Polling;
        Ok(())
    }

    /// 執行一個輪詢週期；只在 `Polling` 狀態下可呼叫
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let alias_id = match (&self.state, &self.alias_id) {
            (RelayState::Polling, Some(alias_id)) => alias_id.clone(),
            _ => {
                return Err(RelayError::InvalidStateError {
                    state: format!("{:?}", self.state),
                })
            }
        };

        Ok(self.cycle(&alias_id).await)
    }

    /// 啟動並持續輪詢，直到終止為止
    pub async fn run(&mut self) -> Termination {
        if let RelayState::Terminated(termination) = self.state {
            return termination;
        }

        if self.state == RelayState::Startup && self.startup().await.is_err() {
            return Termination::StartupFailed;
        }

        let Some(alias_id) = self.alias_id.clone() else {
            tracing::error!("❌ Relay entered polling without an alias id");
            self.state = RelayState::Terminated(Termination::StartupFailed);
            return Termination::StartupFailed;
        };

        tracing::info!(
            "🚀 Relay started, polling every {:?}",
            self.settings.refresh_delay
        );

        loop {
            self.cycle(&alias_id).await;

            if let RelayState::Terminated(termination) = self.state {
                return termination;
            }

            self.sleeper.sleep(self.settings.refresh_delay).await;
        }
    }

    async fn cycle(&mut self, alias_id: &AliasId) -> CycleOutcome {
        match self.reconcile(alias_id).await {
            Ok(outcome) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        "✅ Recovered after {} failed cycle(s)",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                outcome
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::error!(
                    "❌ Error while updating port: {} (Category: {:?}, consecutive failures: {})",
                    e.detailed_message(),
                    e.category(),
                    self.consecutive_failures
                );
                tracing::debug!("Cycle error detail: {:?}", e);

                if self.consecutive_failures > self.settings.max_consecutive_failures {
                    tracing::error!(
                        "🛑 Bailing out after {} consecutive failures",
                        self.consecutive_failures
                    );
                    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
                    self.state = RelayState::Terminated(Termination::FailureThresholdExceeded);
                }

                CycleOutcome::Failed {
                    category: e.category(),
                    consecutive_failures: self.consecutive_failures,
                }
            }
        }
    }

    async fn reconcile(&mut self, alias_id: &AliasId) -> Result<CycleOutcome> {
        let tcp = PortAssignment::new(Protocol::Tcp, self.mapper.get_port(Protocol::Tcp).await?);
        let udp = PortAssignment::new(Protocol::Udp, self.mapper.get_port(Protocol::Udp).await?);

        // TCP 埠號為準，UDP 不一致只記錄警告
        if tcp.port != udp.port {
            tracing::warn!(
                "⚠️ TCP and UDP ports are different: tcp={} udp={}",
                tcp.port,
                udp.port
            );
        }

        if self.registered_port == Some(tcp.port) {
            tracing::debug!("Forwarded port {} unchanged", tcp.port);
            return Ok(CycleOutcome::Unchanged { port: tcp.port });
        }

        tracing::info!("🔄 Updating forwarded port to {}", tcp.port);
        self.firewall.set_alias_content(alias_id, tcp.port).await?;
        self.firewall.apply_configuration().await?;
        self.application.set_port(tcp.port).await?;

        let previous = self.registered_port.replace(tcp.port);
        tracing::info!("✅ Forwarded port {} registered", tcp.port);

        Ok(CycleOutcome::Propagated {
            previous,
            port: tcp.port,
        })
    }
}
