//! The match engine: drains the waiting queue in rounds and pairs users.
//!
//! A round is a short critical section guarded by an async mutex, so two
//! rounds never run against the same queue snapshot. Persistence calls
//! suspend the task, which is why every pair is re-verified against the live
//! queue (atomically, via remove_pair) before a call is created.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::call::queue::MatchQueue;
use crate::call::registry::{ActiveCall, ActiveCallRegistry, CallStatus, Participant};
use crate::call::store::CallStore;
use crate::call::strategy::PairingStrategy;
use crate::db::models::CallRecord;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;
use crate::ws::registry::ConnectionRegistry;

/// Observability summary of one matching round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub pairs_matched: usize,
    pub remaining: usize,
}

#[derive(Clone)]
pub struct MatchEngine {
    queue: MatchQueue,
    calls: ActiveCallRegistry,
    registry: ConnectionRegistry,
    store: CallStore,
    strategy: Arc<dyn PairingStrategy>,
    round_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MatchEngine {
    pub fn new(
        queue: MatchQueue,
        calls: ActiveCallRegistry,
        registry: ConnectionRegistry,
        store: CallStore,
        strategy: Arc<dyn PairingStrategy>,
    ) -> Self {
        Self {
            queue,
            calls,
            registry,
            store,
            strategy,
            round_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run one matching round. No-op with fewer than two queued users.
    pub async fn run_matching_round(&self) -> RoundOutcome {
        let _round = self.round_lock.lock().await;

        let snapshot = self.queue.snapshot();
        if snapshot.len() < 2 {
            return RoundOutcome {
                pairs_matched: 0,
                remaining: snapshot.len(),
            };
        }

        let mut pairs_matched = 0;
        for (a, b) in self.strategy.pair(snapshot) {
            // Either side may have left between the snapshot and now; the
            // atomic check-and-remove leaves a surviving member queued.
            if !self.queue.remove_pair(&a.user_id, &b.user_id) {
                continue;
            }

            let call_id = Uuid::new_v4().to_string();
            let started_at = Utc::now();
            let record = CallRecord {
                id: call_id.clone(),
                caller_id: a.user_id.clone(),
                callee_id: b.user_id.clone(),
                status: "connecting".to_string(),
                started_at: started_at.to_rfc3339(),
                ended_at: None,
                duration_secs: None,
            };
            if let Err(e) = self.store.create(record).await {
                tracing::warn!(
                    error = %e,
                    "Call record persistence failed, returning pair to queue"
                );
                self.queue.restore(a);
                self.queue.restore(b);
                continue;
            }

            self.calls.insert(ActiveCall {
                call_id: call_id.clone(),
                participants: [
                    Participant {
                        user_id: a.user_id.clone(),
                        connection_id: a.connection_id.clone(),
                    },
                    Participant {
                        user_id: b.user_id.clone(),
                        connection_id: b.connection_id.clone(),
                    },
                ],
                status: CallStatus::Connecting,
                started_at,
            });

            // First element of the pair is the initiator, breaking symmetry
            // for the signaling handshake. A dropped connection here does not
            // roll the match back; the reachable side still proceeds.
            let notified_a = send_to_user(
                &self.registry,
                &a.user_id,
                &ServerEvent::MatchFound {
                    call_id: call_id.clone(),
                    peer_user_id: b.user_id.clone(),
                    peer_connection_id: b.connection_id.clone(),
                    is_initiator: true,
                },
            );
            let notified_b = send_to_user(
                &self.registry,
                &b.user_id,
                &ServerEvent::MatchFound {
                    call_id: call_id.clone(),
                    peer_user_id: a.user_id.clone(),
                    peer_connection_id: a.connection_id.clone(),
                    is_initiator: false,
                },
            );
            if !notified_a || !notified_b {
                tracing::warn!(
                    call_id = %call_id,
                    notified_a,
                    notified_b,
                    "Match notification dropped for an unreachable participant"
                );
            }

            tracing::info!(
                call_id = %call_id,
                initiator = %a.user_id,
                callee = %b.user_id,
                "Matched pair"
            );
            pairs_matched += 1;
        }

        RoundOutcome {
            pairs_matched,
            remaining: self.queue.len(),
        }
    }

    /// Spawn the periodic scheduler. Rounds also run on demand after each
    /// join, so the interval only mops up pairs left over by races.
    pub fn spawn_periodic(&self, interval: Duration) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // Skip the first immediate tick
            timer.tick().await;
            loop {
                timer.tick().await;
                let outcome = engine.run_matching_round().await;
                if outcome.pairs_matched > 0 {
                    tracing::debug!(
                        pairs_matched = outcome.pairs_matched,
                        remaining = outcome.remaining,
                        "Periodic matching round"
                    );
                }
            }
        });
    }
}
