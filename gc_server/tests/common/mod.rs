#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use gc_server::{
    coordinator::CoordinatorTransport,
    env::CoordinatorSettings,
    error::CoordinatorError,
    protocol::{Envelope, GcMessageType},
    reliable::messages::NumPendingMessages,
    session::GcSession,
};
use serde_json::{json, Value};
use tokio::time::Instant;

/// One request the mock actually received.
#[derive(Clone, Debug)]
pub struct SentRequest {
    pub envelope: Envelope,
    pub at: Instant,
}

/// 스크립트로 동작을 정하는 테스트용 코디네이터.
#[derive(Default)]
pub struct MockCoordinator {
    connected: AtomicBool,
    sent: Mutex<Vec<SentRequest>>,
    /// Remaining network failures per request type.
    failures: Mutex<HashMap<GcMessageType, u32>>,
    /// Remaining slow attempts per request type (the reply never beats the timeout).
    slow: Mutex<HashMap<GcMessageType, u32>>,
    wrong_reply: Mutex<HashSet<GcMessageType>>,
    payloads: Mutex<HashMap<GcMessageType, Value>>,
}

impl MockCoordinator {
    pub fn new() -> Arc<Self> {
        let mock = Self::default();
        mock.connected.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_next(&self, msg_type: GcMessageType, times: u32) {
        self.failures.lock().unwrap().insert(msg_type, times);
    }

    pub fn slow_next(&self, msg_type: GcMessageType, times: u32) {
        self.slow.lock().unwrap().insert(msg_type, times);
    }

    pub fn answer_with_wrong_type(&self, msg_type: GcMessageType) {
        self.wrong_reply.lock().unwrap().insert(msg_type);
    }

    pub fn reply_payload(&self, msg_type: GcMessageType, payload: Value) {
        self.payloads.lock().unwrap().insert(msg_type, payload);
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_types(&self) -> Vec<GcMessageType> {
        self.sent().into_iter().map(|r| r.envelope.msg_type).collect()
    }

    pub fn sent_of(&self, msg_type: GcMessageType) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|r| r.envelope.msg_type == msg_type)
            .map(|r| r.envelope.payload)
            .collect()
    }

    fn take_one(map: &Mutex<HashMap<GcMessageType, u32>>, msg_type: GcMessageType) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&msg_type) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

pub fn reply_type(request: GcMessageType) -> GcMessageType {
    match request {
        GcMessageType::NewMatchForLobbyRequest => GcMessageType::NewMatchForLobbyResponse,
        GcMessageType::ChangeMatchPlayerTeamsRequest => GcMessageType::ChangeMatchPlayerTeamsResponse,
        GcMessageType::PlayerLeftMatch => GcMessageType::PlayerLeftMatchResponse,
        GcMessageType::VoteKickCheckRequest => GcMessageType::VoteKickCheckResponse,
        GcMessageType::VoteKickResult => GcMessageType::VoteKickResultResponse,
        GcMessageType::MatchStatsUpdate => GcMessageType::MatchStatsUpdateResponse,
        GcMessageType::MatchResult => GcMessageType::MatchResultResponse,
        other => other,
    }
}

fn default_payload(reply: GcMessageType) -> Value {
    match reply {
        GcMessageType::NewMatchForLobbyResponse => json!({ "success": true, "new_match_id": 9001 }),
        GcMessageType::ChangeMatchPlayerTeamsResponse => json!({ "success": true }),
        GcMessageType::VoteKickCheckResponse => json!({ "allowed": true }),
        GcMessageType::MatchResultResponse => json!({ "recorded": true }),
        _ => json!({}),
    }
}

#[async_trait]
impl CoordinatorTransport for MockCoordinator {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, envelope: Envelope) -> Result<Envelope, CoordinatorError> {
        let msg_type = envelope.msg_type;
        self.sent.lock().unwrap().push(SentRequest {
            envelope,
            at: Instant::now(),
        });

        if Self::take_one(&self.failures, msg_type) {
            return Err(CoordinatorError::SendFailed("scripted failure".to_string()));
        }
        if Self::take_one(&self.slow, msg_type) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        let expected = reply_type(msg_type);
        if self.wrong_reply.lock().unwrap().contains(&msg_type) {
            // 요청 타입을 그대로 돌려보내 응답 타입을 어긋나게 한다
            return Ok(Envelope {
                msg_type,
                payload: json!({}),
            });
        }

        let payload = self
            .payloads
            .lock()
            .unwrap()
            .get(&msg_type)
            .cloned()
            .unwrap_or_else(|| default_payload(expected));
        Ok(Envelope {
            msg_type: expected,
            payload,
        })
    }
}

pub fn fast_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        request_timeout_ms: 200,
        min_retry_delay_ms: 20,
        max_retry_delay_ms: 20,
        ..Default::default()
    }
}

pub fn start_session(mock: &Arc<MockCoordinator>, settings: &CoordinatorSettings) -> GcSession {
    GcSession::start(mock.clone(), settings)
}

/// Polls the queue until nothing is pending, then lets hook-driven messages land.
pub async fn wait_for_idle(session: &GcSession) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let pending = session.queue.send(NumPendingMessages).await.unwrap();
        if pending == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "queue did not drain, {} pending", pending);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
}
