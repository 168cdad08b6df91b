use thiserror::Error;

use crate::protocol::GcMessageType;

/// 재시도로 해결될 수 있는 전송 계층 실패. 호출자에게는 stall 상태로만 보인다.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator session is not available")]
    NotConnected,
    #[error("failed to send to coordinator: {0}")]
    SendFailed(String),
    #[error("no reply from coordinator within {0:?}")]
    Timeout(std::time::Duration),
    /// The coordinator answered, but not with an envelope we understand. Never retried.
    #[error("unreadable reply from coordinator: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl CoordinatorError {
    /// Label used for the failed-attempt metric.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::SendFailed(_) => "send_failed",
            Self::Timeout(_) => "timeout",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Local defects. Retrying cannot fix these, so the message is abandoned.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("expected reply {expected:?}, coordinator answered {received:?}")]
    ReplyTypeMismatch {
        expected: GcMessageType,
        received: GcMessageType,
    },
    #[error("failed to encode {msg_type:?} request: {source}")]
    Encode {
        msg_type: GcMessageType,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {msg_type:?} reply: {source}")]
    Decode {
        msg_type: GcMessageType,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected match state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("no match is active")]
    NoActiveMatch,
    #[error("player {0} is not part of the match")]
    UnknownPlayer(u64),
    #[error("player {0} is already registered and not dropped")]
    PlayerAlreadyLive(u64),
    #[error("player {0} was dropped from the match")]
    PlayerDropped(u64),
    #[error("player {0} cannot become active before connecting")]
    PlayerNotConnected(u64),
    #[error("match has ended")]
    MatchEnded,
    #[error("team changes are not allowed for this match")]
    TeamChangesNotAllowed,
    #[error("a new match for the lobby cannot be requested now")]
    NewMatchNotAllowed,
    #[error("a new match for the lobby is already pending")]
    NewMatchPending,
}
