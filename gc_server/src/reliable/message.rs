use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::ExchangeError,
    protocol::{CoordinatorReply, CoordinatorRequest, Envelope, GcMessageType},
};

type QueuedHook<R> = Box<dyn FnOnce(&R, &mut String) + Send>;
type PrepareHook<R> = Box<dyn FnOnce(&mut R) + Send>;
type ReplyHook<R> = Box<dyn FnOnce(<R as CoordinatorRequest>::Reply) + Send>;
type AbortHook = Box<dyn FnOnce(&ExchangeError) + Send>;

/// Type-erased view of a queued exchange, as the queue and its job task see it.
pub trait QueuedMessage: Send {
    fn description(&self) -> &str;

    fn enqueued_at(&self) -> Option<DateTime<Utc>>;

    /// Runs synchronously inside `Enqueue`, before any networking happens.
    fn queued(&mut self, job_id: Uuid);

    /// Runs once when the message becomes the in-flight message.
    fn prepare(&mut self);

    fn encode(&self) -> Result<Envelope, ExchangeError>;

    fn expected_reply(&self) -> GcMessageType;

    /// Consumes the message with the reply. A body that does not decode runs the abort hook instead.
    fn finish(self: Box<Self>, reply: Envelope) -> Result<(), ExchangeError>;

    /// Consumes the message after a defect that ended it before any usable reply.
    fn abort(self: Box<Self>, error: &ExchangeError);
}

/// One outbound request/reply exchange with the coordinator.
///
/// 메시지 종류마다 서브클래스를 만드는 대신 요청 타입 `R` 과 훅 클로저로 구성한다.
/// 응답 타입은 `R::Reply` 로 고정되어 있다.
///
/// ```ignore
/// let msg = ReliableMessage::new(request, "change teams")
///     .prepare(move |req| req.match_id = identity.current())
///     .on_reply(move |reply| tracker.do_send(TeamChangeConfirmed { .. }));
/// session.send_reliable(msg);
/// ```
pub struct ReliableMessage<R: CoordinatorRequest> {
    request: R,
    description: String,
    enqueued_at: Option<DateTime<Utc>>,
    on_queued: Option<QueuedHook<R>>,
    prepare: Option<PrepareHook<R>>,
    on_reply: Option<ReplyHook<R>>,
    on_aborted: Option<AbortHook>,
}

impl<R: CoordinatorRequest> ReliableMessage<R> {
    pub fn new(request: R, description: impl Into<String>) -> Self {
        Self {
            request,
            description: description.into(),
            enqueued_at: None,
            on_queued: None,
            prepare: None,
            on_reply: None,
            on_aborted: None,
        }
    }

    /// Lets the caller finish the debug tag once the message is in a queue.
    pub fn on_queued(mut self, hook: impl FnOnce(&R, &mut String) + Send + 'static) -> Self {
        self.on_queued = Some(Box::new(hook));
        self
    }

    /// Captures state that may have changed while the message waited its turn.
    pub fn prepare(mut self, hook: impl FnOnce(&mut R) + Send + 'static) -> Self {
        self.prepare = Some(Box::new(hook));
        self
    }

    pub fn on_reply(mut self, hook: impl FnOnce(R::Reply) + Send + 'static) -> Self {
        self.on_reply = Some(Box::new(hook));
        self
    }

    pub fn on_aborted(mut self, hook: impl FnOnce(&ExchangeError) + Send + 'static) -> Self {
        self.on_aborted = Some(Box::new(hook));
        self
    }

    pub fn request(&self) -> &R {
        &self.request
    }
}

impl<R: CoordinatorRequest> QueuedMessage for ReliableMessage<R> {
    fn description(&self) -> &str {
        &self.description
    }

    fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.enqueued_at
    }

    fn queued(&mut self, job_id: Uuid) {
        self.enqueued_at = Some(Utc::now());

        let short_id = job_id.simple().to_string();
        self.description = format!("{} [{}]", self.description, &short_id[..8]);
        if let Some(hook) = self.on_queued.take() {
            hook(&self.request, &mut self.description);
        }
    }

    fn prepare(&mut self) {
        if let Some(hook) = self.prepare.take() {
            hook(&mut self.request);
        }
    }

    fn encode(&self) -> Result<Envelope, ExchangeError> {
        Envelope::encode(R::MSG_TYPE, &self.request).map_err(|source| ExchangeError::Encode {
            msg_type: R::MSG_TYPE,
            source,
        })
    }

    fn expected_reply(&self) -> GcMessageType {
        <R::Reply as CoordinatorReply>::MSG_TYPE
    }

    fn finish(mut self: Box<Self>, reply: Envelope) -> Result<(), ExchangeError> {
        match reply.decode::<R::Reply>() {
            Ok(decoded) => {
                if let Some(hook) = self.on_reply.take() {
                    hook(decoded);
                }
                Ok(())
            }
            Err(source) => {
                let e = ExchangeError::Decode {
                    msg_type: reply.msg_type,
                    source,
                };
                self.abort(&e);
                Err(e)
            }
        }
    }

    fn abort(mut self: Box<Self>, error: &ExchangeError) {
        if let Some(hook) = self.on_aborted.take() {
            hook(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::protocol::{ChangeMatchPlayerTeamsRequest, Team, TeamAssignment};

    fn team_request() -> ChangeMatchPlayerTeamsRequest {
        ChangeMatchPlayerTeamsRequest {
            lobby_id: 1,
            match_id: None,
            members: vec![TeamAssignment {
                steam_id: 10,
                team: Team::Blue,
            }],
        }
    }

    #[test]
    fn test_queued_hook_finalizes_description() {
        let mut msg: Box<dyn QueuedMessage> = Box::new(
            ReliableMessage::new(team_request(), "change teams")
                .on_queued(|req, tag| tag.push_str(&format!(" x{}", req.members.len()))),
        );

        msg.queued(Uuid::new_v4());

        assert!(msg.description().starts_with("change teams ["));
        assert!(msg.description().ends_with(" x1"));
        assert!(msg.enqueued_at().is_some());
    }

    #[test]
    fn test_prepare_hook_is_reflected_in_encoded_request() {
        let mut msg = ReliableMessage::new(team_request(), "change teams")
            .prepare(|req| req.match_id = Some(99));

        QueuedMessage::prepare(&mut msg);
        let envelope = msg.encode().unwrap();

        assert_eq!(envelope.msg_type, GcMessageType::ChangeMatchPlayerTeamsRequest);
        assert_eq!(envelope.payload["match_id"], 99);
    }

    #[test]
    fn test_undecodable_reply_fires_abort_hook() {
        let aborted = Arc::new(Mutex::new(false));
        let replied = Arc::new(Mutex::new(false));
        let (a, r) = (aborted.clone(), replied.clone());

        let msg: Box<dyn QueuedMessage> = Box::new(
            ReliableMessage::new(team_request(), "change teams")
                .on_reply(move |_| *r.lock().unwrap() = true)
                .on_aborted(move |_| *a.lock().unwrap() = true),
        );

        let bogus = Envelope {
            msg_type: GcMessageType::ChangeMatchPlayerTeamsResponse,
            payload: serde_json::json!({ "unexpected": true }),
        };
        let result = msg.finish(bogus);

        assert!(matches!(result, Err(ExchangeError::Decode { .. })));
        assert!(*aborted.lock().unwrap());
        assert!(!*replied.lock().unwrap());
    }
}
