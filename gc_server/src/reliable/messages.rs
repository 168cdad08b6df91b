use actix::Message;
use serde::Serialize;
use uuid::Uuid;

use super::message::{QueuedMessage, ReliableMessage};
use crate::protocol::CoordinatorRequest;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Enqueue {
    pub message: Box<dyn QueuedMessage>,
}

impl<R: CoordinatorRequest> From<ReliableMessage<R>> for Enqueue {
    fn from(message: ReliableMessage<R>) -> Self {
        Self {
            message: Box::new(message),
        }
    }
}

/// In-flight plus waiting messages. 0 means idle.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct NumPendingMessages;

#[derive(Message)]
#[rtype(result = "bool")]
pub struct IsStalled;

#[derive(Message)]
#[rtype(result = "QueueStatus")]
pub struct GetQueueStatus;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct QueueStatus {
    pub pending: usize,
    pub stalled: bool,
    pub in_flight: Option<String>,
    pub attempts: u32,
}

/// Sent by a running job when one of its attempts failed.
#[derive(Message)]
#[rtype(result = "()")]
pub struct JobStalled {
    pub job_id: Uuid,
    pub attempt: u32,
    pub cause: String,
}
