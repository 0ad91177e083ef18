use crate::domain::ports::Sleeper;
use async_trait::async_trait;
use std::time::Duration;

/// 正式執行時使用的 tokio 計時器
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
