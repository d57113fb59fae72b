use std::sync::Arc;

use crate::call::engine::MatchEngine;
use crate::call::queue::MatchQueue;
use crate::call::registry::ActiveCallRegistry;
use crate::call::store::CallStore;
use crate::call::strategy::{PairingStrategy, ShufflePairing};
use crate::chat::presence::PresenceTracker;
use crate::chat::store::ChatStore;
use crate::db::DbPool;
use crate::ws::registry::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
///
/// Every registry and queue is an explicitly constructed component (no
/// ambient statics), so tests instantiate isolated instances per case.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// user id -> live WebSocket session
    pub registry: ConnectionRegistry,
    /// In-memory presence records
    pub presence: PresenceTracker,
    /// Message persistence gateway
    pub chat_store: ChatStore,
    /// Users waiting to be paired for a video call
    pub queue: MatchQueue,
    /// Live calls, for signaling lookups
    pub calls: ActiveCallRegistry,
    /// Call record persistence gateway
    pub call_store: CallStore,
    /// Pairing rounds over the queue
    pub engine: MatchEngine,
    /// Maximum chat message length in characters
    pub max_message_len: usize,
}

impl AppState {
    /// Wire up all components with the default shuffle pairing strategy.
    pub fn new(db: DbPool, jwt_secret: Vec<u8>, max_message_len: usize) -> Self {
        Self::with_strategy(db, jwt_secret, max_message_len, Arc::new(ShufflePairing))
    }

    pub fn with_strategy(
        db: DbPool,
        jwt_secret: Vec<u8>,
        max_message_len: usize,
        strategy: Arc<dyn PairingStrategy>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let queue = MatchQueue::new();
        let calls = ActiveCallRegistry::new();
        let call_store = CallStore::new(db.clone());
        let engine = MatchEngine::new(
            queue.clone(),
            calls.clone(),
            registry.clone(),
            call_store.clone(),
            strategy,
        );

        Self {
            chat_store: ChatStore::new(db.clone()),
            db,
            jwt_secret,
            registry,
            presence: PresenceTracker::new(),
            queue,
            calls,
            call_store,
            engine,
            max_message_len,
        }
    }
}
