//! Concurrent turn processing with per-case ordering.
//!
//! Each case id hashes to one lane and a lane runs its jobs one at a time,
//! so turns for the same case are applied in submission order while
//! different cases proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::apply::TurnService;
use crate::core::engine::TurnResult;
use crate::core::update::ProposedUpdate;

const LANE_CAPACITY: usize = 64;

struct Job {
    case_id: String,
    update: ProposedUpdate,
    reply: oneshot::Sender<Result<TurnResult>>,
}

pub struct LanePool {
    senders: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl LanePool {
    /// Start `lanes` workers (at least one) on the current tokio runtime.
    pub fn new(service: Arc<TurnService>, lanes: usize) -> Self {
        let lanes = lanes.max(1);
        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(LANE_CAPACITY);
            senders.push(tx);
            workers.push(tokio::spawn(run_lane(lane, Arc::clone(&service), rx)));
        }
        Self { senders, workers }
    }

    pub fn lanes(&self) -> usize {
        self.senders.len()
    }

    pub fn lane_for(&self, case_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        case_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue a turn and wait for its result.
    pub async fn submit(&self, case_id: &str, update: ProposedUpdate) -> Result<TurnResult> {
        let (reply, rx) = oneshot::channel();
        let lane = self.lane_for(case_id);
        self.senders[lane]
            .send(Job {
                case_id: case_id.to_string(),
                update,
                reply,
            })
            .await
            .map_err(|_| anyhow!("lane {lane} is closed"))?;
        rx.await
            .map_err(|_| anyhow!("lane {lane} dropped the turn for case '{case_id}'"))?
    }

    /// Stop accepting work and wait for queued turns to finish.
    pub async fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(err = %err, "lane worker failed");
            }
        }
    }
}

async fn run_lane(lane: usize, service: Arc<TurnService>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        debug!(lane, case_id = %job.case_id, "turn dequeued");
        let service = Arc::clone(&service);
        let Job {
            case_id,
            update,
            reply,
        } = job;
        let result = tokio::task::spawn_blocking(move || service.apply_update(&case_id, &update))
            .await
            .unwrap_or_else(|err| Err(anyhow!("turn task failed: {err}")));
        if reply.send(result).is_err() {
            debug!(lane, "turn submitter went away");
        }
    }
    debug!(lane, "lane stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Engine;
    use crate::io::case_store::MemoryCaseStore;
    use crate::test_support::{UpdateBuilder, draft};

    fn service(case_ids: &[&str]) -> Arc<TurnService> {
        let service = TurnService::new(Engine::default(), Arc::new(MemoryCaseStore::new()));
        for id in case_ids {
            service.open_case(id, "t").expect("open");
        }
        Arc::new(service)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn turns_for_one_case_apply_in_order() {
        let service = service(&["case-a"]);
        let pool = LanePool::new(Arc::clone(&service), 3);

        for n in 1..=5 {
            let update = UpdateBuilder::new()
                .evidence(draft(&format!("observation {n}"), None))
                .build();
            let result = pool.submit("case-a", update).await.expect("submit");
            assert_eq!(result.case.turn_count, n);
        }
        pool.shutdown().await;

        let case = service.load("case-a").expect("load");
        let summaries: Vec<&str> = case.evidence.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries.len(), 5);
        assert_eq!(summaries[0], "observation 1");
        assert_eq!(summaries[4], "observation 5");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cases_progress_concurrently() {
        let service = service(&["case-a", "case-b", "case-c"]);
        let pool = Arc::new(LanePool::new(Arc::clone(&service), 2));

        let mut handles = Vec::new();
        for id in ["case-a", "case-b", "case-c"] {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    pool.submit(id, UpdateBuilder::new().build())
                        .await
                        .expect("submit");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        for id in ["case-a", "case-b", "case-c"] {
            assert_eq!(service.load(id).expect("load").turn_count, 3);
        }
    }

    #[tokio::test]
    async fn errors_are_returned_to_the_submitter() {
        let pool = LanePool::new(service(&[]), 1);
        let err = pool
            .submit("missing", UpdateBuilder::new().build())
            .await
            .expect_err("missing case");
        assert!(err.to_string().contains("not found"));
        pool.shutdown().await;
    }

    #[test]
    fn lane_assignment_is_stable() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let pool = LanePool::new(service(&[]), 4);
            assert_eq!(pool.lane_for("case-x"), pool.lane_for("case-x"));
            assert!(pool.lane_for("case-y") < pool.lanes());
            pool.shutdown().await;
        });
    }
}
