use std::{collections::VecDeque, sync::Arc};

use actix::{Actor, ActorFutureExt, AsyncContext, Context, WrapFuture};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{coordinator::CoordinatorTransport, env::CoordinatorSettings};

use self::job::{JobContext, JobOutcome, MessageJob};

pub mod handlers;
pub mod job;
pub mod message;
pub mod messages;

pub use message::{QueuedMessage, ReliableMessage};

struct InFlight {
    id: Uuid,
    description: String,
    stalled: bool,
    attempts: u32,
}

/// 코디네이터로 가는 요청을 순서대로 하나씩 전달하는 큐.
///
/// - 동시에 in-flight 인 메시지는 최대 하나.
/// - 나머지는 도착 순서대로 대기한다.
/// - stall 상태는 in-flight 메시지의 속성이다.
///
/// 메시지 task 는 이 actor 의 context 에 spawn 되므로 큐 상태는 항상 actor 스레드에서만 바뀐다.
pub struct ReliableMessageQueue {
    transport: Arc<dyn CoordinatorTransport>,
    settings: CoordinatorSettings,
    pending: VecDeque<MessageJob>,
    in_flight: Option<InFlight>,
}

impl ReliableMessageQueue {
    pub fn new(transport: Arc<dyn CoordinatorTransport>, settings: CoordinatorSettings) -> Self {
        Self {
            transport,
            settings,
            pending: VecDeque::new(),
            in_flight: None,
        }
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_stalled(&self) -> bool {
        self.in_flight.as_ref().map_or(false, |f| f.stalled)
    }

    fn update_gauges(&self) {
        metrics::RELIABLE_QUEUE_PENDING.set(self.num_pending() as i64);
        metrics::RELIABLE_QUEUE_STALLED.set(self.is_stalled() as i64);
    }

    fn enqueue(&mut self, message: Box<dyn QueuedMessage>, ctx: &mut Context<Self>) {
        let mut job = MessageJob::new(message);
        job.message.queued(job.id);
        metrics::RELIABLE_MESSAGES_ENQUEUED_TOTAL.inc();

        info!(
            "Queued reliable message {} ({} ahead)",
            job.message.description(),
            self.num_pending()
        );
        self.pending.push_back(job);

        if self.in_flight.is_none() {
            self.start_next(ctx);
        }
        self.update_gauges();
    }

    /// 다음 메시지를 in-flight 로 올리고 task 를 시작한다. 대기열이 비었으면 idle.
    fn start_next(&mut self, ctx: &mut Context<Self>) {
        let Some(job) = self.pending.pop_front() else {
            self.in_flight = None;
            return;
        };

        self.in_flight = Some(InFlight {
            id: job.id,
            description: job.message.description().to_string(),
            stalled: false,
            attempts: 0,
        });

        let job_ctx = JobContext {
            transport: self.transport.clone(),
            request_timeout: self.settings.request_timeout(),
            retry_policy: self.settings.retry_backoff(),
            queue: ctx.address(),
        };

        ctx.spawn(
            job::run(job, job_ctx)
                .into_actor(self)
                .map(|(job, outcome), act, ctx| act.on_complete(job, outcome, ctx)),
        );
    }

    /// Finishes the in-flight message and unblocks the next one.
    fn on_complete(&mut self, job: MessageJob, outcome: JobOutcome, ctx: &mut Context<Self>) {
        let description = job.message.description().to_string();
        let attempts = job.attempts;
        let first_attempt_at = job.first_attempt_at;

        match outcome {
            JobOutcome::Replied(reply) => match job.message.finish(reply) {
                Ok(()) => {
                    info!(
                        "Reliable message {} completed after {} attempt(s)",
                        description, attempts
                    );
                    metrics::RELIABLE_MESSAGES_COMPLETED_TOTAL.inc();
                    if let Some(started) = first_attempt_at {
                        metrics::RELIABLE_EXCHANGE_DURATION_SECONDS
                            .observe(started.elapsed().as_secs_f64());
                    }
                }
                Err(e) => {
                    error!("Protocol defect in reply to {}: {}", description, e);
                    metrics::RELIABLE_PROTOCOL_DEFECTS_TOTAL.inc();
                }
            },
            JobOutcome::Aborted(e) => {
                error!(
                    "Protocol defect while sending {}, abandoning it: {}",
                    description, e
                );
                metrics::RELIABLE_PROTOCOL_DEFECTS_TOTAL.inc();
                job.message.abort(&e);
            }
        }

        self.in_flight = None;
        self.start_next(ctx);
        self.update_gauges();
    }

    /// Only touches stall state; ordering never changes here.
    fn on_stalled(&mut self, job_id: Uuid, attempt: u32, cause: &str) {
        match self.in_flight.as_mut() {
            Some(in_flight) if in_flight.id == job_id => {
                if !in_flight.stalled {
                    warn!(
                        "Reliable message {} stalled: {}",
                        in_flight.description, cause
                    );
                }
                in_flight.stalled = true;
                in_flight.attempts = in_flight.attempts.max(attempt);
            }
            _ => {
                // 이미 완료된 메시지의 늦은 stall 보고
            }
        }
        self.update_gauges();
    }
}

impl Actor for ReliableMessageQueue {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("ReliableMessageQueue started");
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> actix::Running {
        if let Some(in_flight) = &self.in_flight {
            // in-flight task 는 context 와 함께 사라진다. 코디네이터가 처리했는지 알 수 없음.
            warn!(
                "ReliableMessageQueue stopping with {} in flight, abandoning {} message(s)",
                in_flight.description,
                self.num_pending()
            );
        }
        actix::Running::Stop
    }
}
