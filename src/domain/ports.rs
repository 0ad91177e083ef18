use crate::domain::model::{AliasId, Protocol};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 向 NAT-PMP 閘道查詢目前對應的對外埠號
#[async_trait]
pub trait PortMapper: Send + Sync {
    async fn get_port(&self, protocol: Protocol) -> Result<u16>;
}

/// 防火牆 alias 管理。`set_alias_content` 只是暫存，須再呼叫 `apply_configuration` 才會生效
#[async_trait]
pub trait Firewall: Send + Sync {
    async fn resolve_alias(&self, name: &str) -> Result<AliasId>;
    async fn set_alias_content(&self, alias_id: &AliasId, port: u16) -> Result<()>;
    async fn apply_configuration(&self) -> Result<()>;
}

/// 需要同步 peer port 的下游應用程式
#[async_trait]
pub trait PeerApplication: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn set_port(&self, port: u16) -> Result<()>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
