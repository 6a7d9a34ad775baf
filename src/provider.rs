//! Collaborators the protocol handlers call out to.
use std::sync::Arc;

use super::fsm::Persistence;
use super::messages::TradeMessage;
use super::store::TradeStore;
use super::trade::Trade;

/// Outbound side of the peer network. Delivery is fire-and-forget from the
/// point of view of the protocol.
pub trait Transport: Send + Sync {
    fn send(&self, message: TradeMessage) -> anyhow::Result<()>;
}

/// Everything a trade handler may touch besides the trade itself.
pub trait ServiceProvider: Persistence<Trade> {
    fn send_message(&self, message: TradeMessage) -> anyhow::Result<()>;
}

/// Default provider: sled persistence plus a host supplied transport.
pub struct TradeServices {
    store: TradeStore,
    transport: Arc<dyn Transport>,
}

impl TradeServices {
    pub fn new(store: TradeStore, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }
    pub fn store(&self) -> &TradeStore {
        &self.store
    }
}

impl Persistence<Trade> for TradeServices {
    fn persist(&self, trade: &Trade) -> anyhow::Result<()> {
        self.store.save(trade)
    }
}

impl ServiceProvider for TradeServices {
    fn send_message(&self, message: TradeMessage) -> anyhow::Result<()> {
        self.transport.send(message)
    }
}
