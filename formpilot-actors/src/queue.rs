//! The job queue actor.
//!
//! Delivery contract: `Dequeue` hands exactly one request to exactly one
//! waiting worker, and no run id is ever dispatched while another worker
//! still holds it active. `Requeue` returns a run the worker could not
//! start (context pool saturated); `Complete` releases the run id.
use crate::actor::{Actor, Context};
use anyhow::Result;
use formpilot_pipeline::ApplicationRequest;
use std::collections::{HashSet, VecDeque};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub enum QueueMsg {
    /// Accept a new application request.
    Enqueue(ApplicationRequest),
    /// Park until a dispatchable request is available.
    Dequeue {
        reply: oneshot::Sender<ApplicationRequest>,
    },
    /// Give a run back without completing it (e.g. no browser context).
    Requeue(ApplicationRequest),
    /// A worker finished (any terminal state) and releases the run id.
    Complete { run_id: Uuid },
}

#[derive(Default)]
pub struct QueueActor {
    pending: VecDeque<ApplicationRequest>,
    active: HashSet<Uuid>,
    waiters: VecDeque<oneshot::Sender<ApplicationRequest>>,
}

impl QueueActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match parked waiters to dispatchable requests. A request whose run
    /// id is still active stays pending until `Complete` releases it.
    fn dispatch(&mut self) {
        while !self.waiters.is_empty() {
            let Some(pos) = self
                .pending
                .iter()
                .position(|r| !self.active.contains(&r.run_id))
            else {
                break;
            };
            let request = self.pending.remove(pos).expect("position just found");
            let waiter = self.waiters.pop_front().expect("checked non-empty");

            self.active.insert(request.run_id);
            let run_id = request.run_id;
            if let Err(request) = waiter.send(request) {
                // worker went away between parking and dispatch
                debug!(target: "queue", run_id = %run_id, "waiter dropped; holding request");
                self.active.remove(&run_id);
                self.pending.push_front(request);
            } else {
                info!(target: "queue", run_id = %run_id, "run dispatched");
            }
        }
    }
}

#[async_trait::async_trait]
impl Actor for QueueActor {
    type Msg = QueueMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            QueueMsg::Enqueue(request) => {
                debug!(target: "queue", run_id = %request.run_id, url = %request.target_url, "enqueued");
                self.pending.push_back(request);
                self.dispatch();
            }
            QueueMsg::Dequeue { reply } => {
                self.waiters.push_back(reply);
                self.dispatch();
            }
            QueueMsg::Requeue(request) => {
                warn!(target: "queue", run_id = %request.run_id, "run requeued");
                self.active.remove(&request.run_id);
                self.pending.push_back(request);
                self.dispatch();
            }
            QueueMsg::Complete { run_id } => {
                self.active.remove(&run_id);
                debug!(target: "queue", run_id = %run_id, "run released");
                self.dispatch();
            }
        }
        Ok(())
    }
}
