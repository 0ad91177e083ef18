use crate::config::FirewallConfig;
use crate::domain::model::AliasId;
use crate::domain::ports::Firewall;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const ALIAS_LOOKUP_PATH: &str = "/api/firewall/alias/get_alias_u_u_i_d/";
const ALIAS_SET_ITEM_PATH: &str = "/api/firewall/alias/setItem/";
const ALIAS_RECONFIGURE_PATH: &str = "/api/firewall/alias/reconfigure";

#[derive(Debug, Deserialize)]
struct AliasLookupResponse {
    uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetItemResponse {
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReconfigureResponse {
    status: Option<String>,
}

/// OPNsense 防火牆 API 用戶端
pub struct OpnsenseFirewall {
    client: Client,
    base_url: Url,
    api_key: String,
    api_secret: String,
}

impl OpnsenseFirewall {
    pub fn new(
        base_url: &str,
        api_key: String,
        api_secret: String,
        request_timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RelayError::InvalidConfigValueError {
            field: "firewall.url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            api_secret,
        })
    }

    pub fn from_config(config: &FirewallConfig) -> Result<Self> {
        Self::new(
            &config.url,
            config.api_key.clone(),
            config.api_secret.clone(),
            config.request_timeout(),
            config.accept_invalid_certs(),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RelayError::InvalidConfigValueError {
                field: "firewall.url".to_string(),
                value: self.base_url.to_string(),
                reason: format!("cannot build {}: {}", path, e),
            })
    }

    /// 在固定路徑後附加一個經過編碼的路徑片段（alias 名稱或 uuid）
    fn endpoint_for(&self, path: &str, segment: &str) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidConfigValueError {
                field: "firewall.url".to_string(),
                value: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    /// 檢查 HTTP 狀態並解析 JSON 回應
    async fn read_json<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("Firewall {} responded {}: {}", operation, status, body);

        if !status.is_success() {
            return Err(RelayError::HttpStatusError {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| RelayError::UnexpectedResponseError {
            operation: operation.to_string(),
            body,
        })
    }
}

#[async_trait]
impl Firewall for OpnsenseFirewall {
    async fn resolve_alias(&self, name: &str) -> Result<AliasId> {
        let url = self.endpoint_for(ALIAS_LOOKUP_PATH, name)?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;

        let lookup: AliasLookupResponse = Self::read_json("get_alias_u_u_i_d", response).await?;
        match lookup.uuid {
            Some(uuid) if !uuid.trim().is_empty() => Ok(AliasId::new(uuid)),
            _ => Err(RelayError::UnexpectedResponseError {
                operation: "get_alias_u_u_i_d".to_string(),
                body: format!("no uuid for alias {}", name),
            }),
        }
    }

    async fn set_alias_content(&self, alias_id: &AliasId, port: u16) -> Result<()> {
        let url = self.endpoint_for(ALIAS_SET_ITEM_PATH, alias_id.as_str())?;
        let payload = serde_json::json!({ "alias": { "content": port.to_string() } });

        let response = self
            .client
            .post(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::info!("Firewall setItem response ({}): {}", status, body);

        if !status.is_success() {
            return Err(RelayError::HttpStatusError {
                operation: "setItem".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let saved = serde_json::from_str::<SetItemResponse>(&body)
            .ok()
            .and_then(|r| r.result)
            .is_some_and(|result| result == "saved");
        if !saved {
            return Err(RelayError::UnexpectedResponseError {
                operation: "setItem".to_string(),
                body,
            });
        }

        tracing::info!("Firewall: updated alias {} with new port {}", alias_id, port);
        Ok(())
    }

    async fn apply_configuration(&self) -> Result<()> {
        let url = self.endpoint(ALIAS_RECONFIGURE_PATH)?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;

        let reconfigure: ReconfigureResponse = Self::read_json("reconfigure", response).await?;
        if reconfigure.status.as_deref() != Some("ok") {
            return Err(RelayError::UnexpectedResponseError {
                operation: "reconfigure".to_string(),
                body: format!("status = {:?}", reconfigure.status),
            });
        }

        tracing::info!("Firewall: applied firewall configuration");
        Ok(())
    }
}
