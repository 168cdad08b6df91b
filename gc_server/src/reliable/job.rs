use std::{sync::Arc, time::Duration};

use actix::Addr;
use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{message::QueuedMessage, messages::JobStalled, ReliableMessageQueue};
use crate::{
    coordinator::CoordinatorTransport,
    error::{CoordinatorError, ExchangeError},
    protocol::Envelope,
};

/// 메시지 하나의 송신 상태. 코루틴 대신 명시적인 상태 머신으로 구동한다.
#[derive(Debug)]
pub enum JobState {
    /// Prepare hook has not run yet.
    Preparing,
    /// Ready to start a new attempt.
    Sending,
    AwaitingReply {
        request: Envelope,
        attempt_started: Instant,
    },
    /// The last attempt failed; waiting out the retry floor.
    Retrying { attempt_started: Instant },
    Done(JobOutcome),
}

#[derive(Debug)]
pub enum JobOutcome {
    Replied(Envelope),
    Aborted(ExchangeError),
}

pub struct MessageJob {
    pub id: Uuid,
    pub message: Box<dyn QueuedMessage>,
    pub attempts: u32,
    pub first_attempt_at: Option<Instant>,
}

impl MessageJob {
    pub fn new(message: Box<dyn QueuedMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            attempts: 0,
            first_attempt_at: None,
        }
    }
}

/// Everything a running job needs besides the message itself.
pub struct JobContext {
    pub transport: Arc<dyn CoordinatorTransport>,
    pub request_timeout: Duration,
    pub retry_policy: ExponentialBackoff,
    pub queue: Addr<ReliableMessageQueue>,
}

/// Drives one message until it has a reply or a protocol defect.
///
/// 네트워크 실패와 타임아웃은 횟수 제한 없이 재시도한다. 해석할 수 없는 응답은 결함으로 끝낸다. 재시도 간격은
/// 실패한 시도의 시작 시점부터 측정한 retry floor 이며, 전체 timeout 을 다시 기다리지 않는다.
pub async fn run(mut job: MessageJob, ctx: JobContext) -> (MessageJob, JobOutcome) {
    let JobContext {
        transport,
        request_timeout,
        mut retry_policy,
        queue,
    } = ctx;
    let floor = retry_policy.initial_interval;
    let mut state = JobState::Preparing;

    loop {
        state = match state {
            JobState::Preparing => {
                job.message.prepare();
                JobState::Sending
            }
            JobState::Sending => {
                let attempt_started = Instant::now();
                job.attempts += 1;
                job.first_attempt_at.get_or_insert(attempt_started);

                if !transport.is_connected() {
                    report_stall(&job, &queue, CoordinatorError::NotConnected);
                    JobState::Retrying { attempt_started }
                } else {
                    match job.message.encode() {
                        Ok(request) => JobState::AwaitingReply {
                            request,
                            attempt_started,
                        },
                        Err(e) => JobState::Done(JobOutcome::Aborted(e)),
                    }
                }
            }
            JobState::AwaitingReply {
                request,
                attempt_started,
            } => {
                let result = tokio::time::timeout(request_timeout, transport.send(request))
                    .await
                    .unwrap_or(Err(CoordinatorError::Timeout(request_timeout)));

                match result {
                    Ok(reply) if reply.msg_type == job.message.expected_reply() => {
                        JobState::Done(JobOutcome::Replied(reply))
                    }
                    Ok(reply) => JobState::Done(JobOutcome::Aborted(
                        ExchangeError::ReplyTypeMismatch {
                            expected: job.message.expected_reply(),
                            received: reply.msg_type,
                        },
                    )),
                    Err(CoordinatorError::Malformed(source)) => {
                        JobState::Done(JobOutcome::Aborted(ExchangeError::Decode {
                            msg_type: job.message.expected_reply(),
                            source,
                        }))
                    }
                    Err(e) => {
                        report_stall(&job, &queue, e);
                        JobState::Retrying { attempt_started }
                    }
                }
            }
            JobState::Retrying { attempt_started } => {
                let delay = retry_policy.next_backoff().unwrap_or(floor);
                let remaining = delay.saturating_sub(attempt_started.elapsed());
                if !remaining.is_zero() {
                    tokio::time::sleep(remaining).await;
                }
                JobState::Sending
            }
            JobState::Done(outcome) => return (job, outcome),
        };
    }
}

fn report_stall(job: &MessageJob, queue: &Addr<ReliableMessageQueue>, error: CoordinatorError) {
    debug!(
        "Attempt {} for {} failed: {}",
        job.attempts,
        job.message.description(),
        error
    );
    metrics::RELIABLE_ATTEMPTS_FAILED_TOTAL
        .with_label_values(&[error.cause()])
        .inc();
    queue.do_send(JobStalled {
        job_id: job.id,
        attempt: job.attempts,
        cause: error.to_string(),
    });
}
