use actix::Handler;

use super::messages::*;
use super::ReliableMessageQueue;

impl Handler<Enqueue> for ReliableMessageQueue {
    type Result = ();

    fn handle(&mut self, msg: Enqueue, ctx: &mut Self::Context) -> Self::Result {
        self.enqueue(msg.message, ctx);
    }
}

impl Handler<NumPendingMessages> for ReliableMessageQueue {
    type Result = usize;

    fn handle(&mut self, _msg: NumPendingMessages, _ctx: &mut Self::Context) -> Self::Result {
        self.num_pending()
    }
}

impl Handler<IsStalled> for ReliableMessageQueue {
    type Result = bool;

    fn handle(&mut self, _msg: IsStalled, _ctx: &mut Self::Context) -> Self::Result {
        self.is_stalled()
    }
}

impl Handler<GetQueueStatus> for ReliableMessageQueue {
    type Result = actix::MessageResult<GetQueueStatus>;

    fn handle(&mut self, _msg: GetQueueStatus, _ctx: &mut Self::Context) -> Self::Result {
        let (in_flight, attempts) = match &self.in_flight {
            Some(f) => (Some(f.description.clone()), f.attempts),
            None => (None, 0),
        };

        actix::MessageResult(QueueStatus {
            pending: self.num_pending(),
            stalled: self.is_stalled(),
            in_flight,
            attempts,
        })
    }
}

impl Handler<JobStalled> for ReliableMessageQueue {
    type Result = ();

    fn handle(&mut self, msg: JobStalled, _ctx: &mut Self::Context) -> Self::Result {
        self.on_stalled(msg.job_id, msg.attempt, &msg.cause);
    }
}
