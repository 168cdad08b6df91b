use async_trait::async_trait;

use crate::{error::CoordinatorError, protocol::Envelope};

pub mod http;

pub use http::HttpCoordinator;

/// 코디네이터(GC)와의 메시지 교환 경계.
///
/// 구현체는 연결 상태만 보고하고 요청 하나를 보내 응답 하나를 돌려준다.
/// 타임아웃과 재시도는 reliable queue 쪽 책임이다.
#[async_trait]
pub trait CoordinatorTransport: Send + Sync + 'static {
    /// Whether a coordinator session is currently available.
    fn is_connected(&self) -> bool;

    /// Sends one request and resolves with whatever reply the coordinator produced.
    async fn send(&self, envelope: Envelope) -> Result<Envelope, CoordinatorError>;
}
