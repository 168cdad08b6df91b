use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::CoordinatorTransport;
use crate::{env::CoordinatorSettings, error::CoordinatorError, protocol::Envelope};

/// HTTP 기반 코디네이터 연결.
///
/// 요청 envelope 을 `POST {base_url}/gc/message` 로 보내고 응답 envelope 을 받는다.
/// 연결 상태는 heartbeat(`GET {base_url}/gc/health`)와 각 요청 결과로 갱신된다.
pub struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
    connected: AtomicBool,
}

impl HttpCoordinator {
    pub fn new(settings: &CoordinatorSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        }
    }

    fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::Relaxed);
        if previous != connected {
            if connected {
                info!("Coordinator session established ({})", self.base_url);
            } else {
                warn!("Coordinator session lost ({})", self.base_url);
            }
        }
        metrics::COORDINATOR_CONNECTED.set(connected as i64);
    }

    /// Probes the coordinator once and records the result.
    pub async fn heartbeat(&self) -> bool {
        let url = format!("{}/gc/health", self.base_url);
        let healthy = match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Coordinator heartbeat failed: {}", e);
                false
            }
        };
        self.set_connected(healthy);
        healthy
    }

    /// heartbeat 루프를 시작한다. shutdown token 이 취소되면 종료.
    pub fn spawn_heartbeat(self: Arc<Self>, interval: Duration, shutdown_token: CancellationToken) {
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = interval_timer.tick() => {
                        self.heartbeat().await;
                    }
                }
            }
            info!("Coordinator heartbeat stopped");
        });
    }
}

#[async_trait]
impl CoordinatorTransport for HttpCoordinator {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn send(&self, envelope: Envelope) -> Result<Envelope, CoordinatorError> {
        let url = format!("{}/gc/message", self.base_url);

        let resp = self
            .client
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                self.set_connected(false);
                CoordinatorError::SendFailed(e.to_string())
            })?;

        if !resp.status().is_success() {
            return Err(CoordinatorError::SendFailed(format!(
                "coordinator returned HTTP {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| CoordinatorError::SendFailed(format!("reply body lost: {}", e)))?;

        // 응답이 도착했으므로 세션은 살아 있다. 해석 실패는 재시도 대상이 아니다.
        self.set_connected(true);
        serde_json::from_slice::<Envelope>(&body).map_err(CoordinatorError::Malformed)
    }
}
