use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use common::{
    AckResponse, MapCompleteRequest, ReduceCompleteRequest, RegisterRequest, RegisterResponse,
    TaskFailedRequest,
};

/// Cliente HTTP del worker hacia el master.
#[derive(Clone)]
pub struct MasterClient {
    client: Client,
    base_url: String,
}

impl MasterClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("no se pudo construir el cliente HTTP")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T, R>(&self, route: &str, body: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, route);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("no se pudo contactar al master en {}", url))?
            .error_for_status()
            .with_context(|| format!("el master rechazó POST {}", url))?;

        resp.json::<R>()
            .await
            .with_context(|| format!("respuesta inválida de POST {}", url))
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse> {
        self.post("register", req).await
    }

    /// Reintenta el registro `attempts` veces antes de rendirse.
    pub async fn register_with_retry(
        &self,
        req: &RegisterRequest,
        attempts: u32,
        delay: Duration,
    ) -> Result<RegisterResponse> {
        let attempts = attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.register(req).await {
                Ok(resp) => {
                    info!(
                        "worker {} registrado en {} (status={}, master={})",
                        req.worker_id, self.base_url, resp.status, resp.master
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    warn!(
                        "registro fallido ({}/{}) contra {}: {:#}",
                        attempt, attempts, self.base_url, e
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("registro sin intentos")))
    }

    pub async fn map_complete(&self, req: &MapCompleteRequest) -> Result<AckResponse> {
        self.post("map_complete", req).await
    }

    pub async fn reduce_complete(&self, req: &ReduceCompleteRequest) -> Result<AckResponse> {
        self.post("reduce_complete", req).await
    }

    pub async fn task_failed(&self, req: &TaskFailedRequest) -> Result<AckResponse> {
        self.post("task_failed", req).await
    }
}
