use std::sync::{Arc, RwLock};

use actix::{Actor, Addr};
use tracing::info;

use crate::{
    coordinator::CoordinatorTransport,
    env::CoordinatorSettings,
    protocol::CoordinatorRequest,
    reliable::{messages::Enqueue, ReliableMessage, ReliableMessageQueue},
};

/// Latest match id the coordinator assigned to this server's lobby.
///
/// prepare hook 에서 읽으므로 reply hook 이 동기적으로 갱신해야 다음 메시지가 새 id 를 본다.
#[derive(Clone, Default, Debug)]
pub struct MatchIdentity(Arc<RwLock<Option<u64>>>);

impl MatchIdentity {
    pub fn current(&self) -> Option<u64> {
        self.0.read().ok().and_then(|guard| *guard)
    }

    pub fn set(&self, match_id: Option<u64>) {
        if let Ok(mut guard) = self.0.write() {
            *guard = match_id;
        }
    }
}

/// 코디네이터 세션 하나에 묶인 컨텍스트. 세션 시작 시 만들고 하위 시스템에 명시적으로 넘긴다.
#[derive(Clone)]
pub struct GcSession {
    pub queue: Addr<ReliableMessageQueue>,
    pub transport: Arc<dyn CoordinatorTransport>,
    pub identity: MatchIdentity,
}

impl GcSession {
    /// Starts the reliable queue on the current arbiter.
    pub fn start(transport: Arc<dyn CoordinatorTransport>, settings: &CoordinatorSettings) -> Self {
        let queue = ReliableMessageQueue::new(transport.clone(), settings.clone()).start();
        info!("Coordinator session context created");

        Self {
            queue,
            transport,
            identity: MatchIdentity::default(),
        }
    }

    pub fn send_reliable<R: CoordinatorRequest>(&self, message: ReliableMessage<R>) {
        self.queue.do_send(Enqueue::from(message));
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
