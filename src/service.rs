//! Service layer API for running trades
//!
//! Owns one state machine per trade. Calls for the same trade are
//! serialised by a per-trade lock, calls for different trades run in
//! parallel.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, info_span, warn};

use super::config::{ProtocolConfig, UnmatchedMessagePolicy};
use super::error::{FsmError, ServiceError};
use super::events::{TradeEvent, UserAction};
use super::fsm::Transitioned;
use super::handlers;
use super::messages::{MessagePayload, TradeMessage};
use super::protocol::{ProtocolTables, TradeFsm};
use super::provider::{ServiceProvider, TradeServices, Transport};
use super::state::TradeState;
use super::store::TradeStore;
use super::trade::{Contract, NetworkId, Trade};

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied(Transitioned<TradeState>),
    /// Not valid yet in the current state, retried after the next transition.
    Deferred,
    /// Same message id was applied before.
    Duplicate,
    /// Not valid in the current state and not kept.
    Dropped,
    /// No trade with this id yet.
    Pending,
}

struct TradeSlot {
    fsm: TradeFsm,
    deferred: VecDeque<TradeMessage>,
    seen: HashSet<String>,
}

impl TradeSlot {
    fn new(fsm: TradeFsm) -> Self {
        Self {
            fsm,
            deferred: VecDeque::new(),
            seen: HashSet::new(),
        }
    }
}

pub struct TradeService {
    my_identity: NetworkId,
    config: ProtocolConfig,
    tables: ProtocolTables,
    services: Arc<dyn ServiceProvider>,
    trades: RwLock<HashMap<String, Arc<Mutex<TradeSlot>>>>,
    pending: Mutex<HashMap<String, Vec<TradeMessage>>>,
}

impl TradeService {
    /// Builds the protocol tables, opens the trade store and restores every
    /// persisted trade.
    pub fn new(
        instance: Arc<sled::Db>,
        my_identity: NetworkId,
        transport: Arc<dyn Transport>,
        config: ProtocolConfig,
    ) -> anyhow::Result<Self> {
        let tables = ProtocolTables::build().context("invalid trade protocol definition")?;
        let store = TradeStore::open(instance, config.flush_on_commit())?;
        let restored = store.load_all()?;
        let services: Arc<dyn ServiceProvider> = Arc::new(TradeServices::new(store, transport));

        let mut trades = HashMap::new();
        for trade in restored {
            let table = tables.for_role(trade.role());
            let id = trade.id().to_string();
            let fsm = TradeFsm::new(table, trade, services.clone());
            trades.insert(id, Arc::new(Mutex::new(TradeSlot::new(fsm))));
        }
        info!(identity = %my_identity, restored = trades.len(), "trade service started");

        Ok(Self {
            my_identity,
            config,
            tables,
            services,
            trades: RwLock::new(trades),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn my_identity(&self) -> &NetworkId {
        &self.my_identity
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Opens a trade as taker and sends the take offer request.
    pub fn take_offer(&self, contract: Contract) -> anyhow::Result<Trade> {
        let trade = Trade::new(contract, self.my_identity.clone(), self.config.protocol_version())?;
        if !trade.role().is_taker() {
            return Err(anyhow::anyhow!(
                "Cannot take own offer {}",
                trade.contract().offer_id().unwrap_or_default()
            ));
        }
        let trade_id = trade.id().to_string();
        let _span = info_span!("trade", id = %trade_id).entered();

        let slot = self.insert(trade)?;
        let mut slot = slot.lock();
        slot.fsm.handle(UserAction::TakeOffer.into())?;
        self.replay_pending(&trade_id, &mut slot)?;
        Ok(slot.fsm.model().clone())
    }

    /// Routes a message from the network to its trade.
    ///
    /// A take offer request for an unknown trade opens it as maker. Other
    /// messages for unknown trades are kept until the trade exists.
    pub fn on_message(&self, message: TradeMessage) -> anyhow::Result<Delivery> {
        let trade_id = message.trade_id.clone();
        let _span = info_span!("trade", id = %trade_id).entered();

        if let Some(slot) = self.slot(&trade_id) {
            let mut slot = slot.lock();
            return Ok(self.deliver(&mut slot, message)?);
        }

        let MessagePayload::TakeOfferRequest { contract } = &message.payload else {
            return Ok(self.keep_pending(message)?);
        };
        let trade = Trade::new(
            contract.clone(),
            self.my_identity.clone(),
            self.config.protocol_version(),
        )
        .context("rejected take offer request")?;
        if trade.role().is_taker() {
            return Err(anyhow::anyhow!("Received take offer request for our own take offer"));
        }
        if trade.id() != trade_id {
            return Err(anyhow::anyhow!(
                "Take offer request for {trade_id} does not match its contract"
            ));
        }

        let slot = self.insert(trade)?;
        let mut slot = slot.lock();
        let delivery = self.deliver(&mut slot, message)?;
        self.replay_pending(&trade_id, &mut slot)?;
        Ok(delivery)
    }

    /// Applies a local user action to a trade.
    pub fn perform(
        &self,
        trade_id: &str,
        action: UserAction,
    ) -> Result<Transitioned<TradeState>, ServiceError> {
        let _span = info_span!("trade", id = %trade_id).entered();
        let slot = self
            .slot(trade_id)
            .ok_or_else(|| ServiceError::UnknownTrade(trade_id.to_string()))?;
        let mut slot = slot.lock();

        let transitioned = slot.fsm.handle(action.into())?;
        self.drain_deferred(&mut slot)?;
        Ok(transitioned)
    }

    pub fn send_account_data(
        &self,
        trade_id: &str,
        payment_account_data: &str,
    ) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(
            trade_id,
            UserAction::SendAccountData {
                payment_account_data: payment_account_data.to_string(),
            },
        )
    }

    pub fn send_btc_address(
        &self,
        trade_id: &str,
        btc_address: &str,
    ) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(
            trade_id,
            UserAction::SendBtcAddress {
                btc_address: btc_address.to_string(),
            },
        )
    }

    pub fn confirm_fiat_sent(&self, trade_id: &str) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::ConfirmFiatSent)
    }

    pub fn confirm_fiat_receipt(
        &self,
        trade_id: &str,
    ) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::ConfirmFiatReceipt)
    }

    pub fn confirm_btc_sent(
        &self,
        trade_id: &str,
        payment_proof: Option<&str>,
    ) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(
            trade_id,
            UserAction::ConfirmBtcSent {
                payment_proof: payment_proof.map(str::to_string),
            },
        )
    }

    pub fn btc_confirmed(&self, trade_id: &str) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::BtcConfirmed)
    }

    pub fn complete_trade(&self, trade_id: &str) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::CompleteTrade)
    }

    pub fn reject_trade(&self, trade_id: &str) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::RejectTrade)
    }

    pub fn cancel_trade(&self, trade_id: &str) -> Result<Transitioned<TradeState>, ServiceError> {
        self.perform(trade_id, UserAction::CancelTrade)
    }

    /// Snapshot of a trade.
    pub fn find_trade(&self, trade_id: &str) -> Option<Trade> {
        let slot = self.slot(trade_id)?;
        let slot = slot.lock();
        Some(slot.fsm.model().clone())
    }

    pub fn trades(&self) -> Vec<Trade> {
        let slots: Vec<_> = self.trades.read().values().cloned().collect();
        slots
            .iter()
            .map(|slot| slot.lock().fsm.model().clone())
            .collect()
    }

    /// Messages waiting for a trade that does not exist yet.
    pub fn pending_messages(&self) -> usize {
        self.pending.lock().values().map(Vec::len).sum()
    }

    fn slot(&self, trade_id: &str) -> Option<Arc<Mutex<TradeSlot>>> {
        self.trades.read().get(trade_id).cloned()
    }

    fn insert(&self, trade: Trade) -> Result<Arc<Mutex<TradeSlot>>, ServiceError> {
        let mut trades = self.trades.write();
        if trades.contains_key(trade.id()) {
            return Err(ServiceError::TradeExists(trade.id().to_string()));
        }
        info!(role = %trade.role(), peer = %trade.peer(), "trade opened");
        let id = trade.id().to_string();
        let table = self.tables.for_role(trade.role());
        let fsm = TradeFsm::new(table, trade, self.services.clone());
        let slot = Arc::new(Mutex::new(TradeSlot::new(fsm)));
        trades.insert(id, slot.clone());
        Ok(slot)
    }

    /// Keeps a message for a trade that does not exist yet.
    ///
    /// The trade is looked up again under the pending lock. A trade inserted
    /// since the first lookup has either replayed its pending messages
    /// already or will take the pending lock after us.
    fn keep_pending(&self, message: TradeMessage) -> Result<Delivery, FsmError> {
        let slot = {
            let mut pending = self.pending.lock();
            match self.slot(&message.trade_id) {
                Some(slot) => slot,
                None => {
                    let total: usize = pending.values().map(Vec::len).sum();
                    let queued = pending.get(&message.trade_id).map_or(0, Vec::len);
                    if total >= self.config.max_pending_messages()
                        || queued >= self.config.max_deferred_messages()
                    {
                        warn!(
                            message = %message.kind(),
                            total,
                            queued,
                            "too many messages for unknown trades, message dropped"
                        );
                        return Ok(Delivery::Dropped);
                    }
                    debug!(message = %message.kind(), "message for unknown trade kept");
                    pending.entry(message.trade_id.clone()).or_default().push(message);
                    return Ok(Delivery::Pending);
                }
            }
        };
        let mut slot = slot.lock();
        self.deliver(&mut slot, message)
    }

    // Takes the pending lock after the trade is visible in `trades`.
    fn replay_pending(&self, trade_id: &str, slot: &mut TradeSlot) -> Result<(), FsmError> {
        let messages = self.pending.lock().remove(trade_id).unwrap_or_default();
        for message in messages {
            self.deliver(slot, message)?;
        }
        Ok(())
    }

    fn deliver(&self, slot: &mut TradeSlot, message: TradeMessage) -> Result<Delivery, FsmError> {
        if slot.seen.contains(&message.id) {
            debug!(message_id = %message.id, "duplicate message dropped");
            return Ok(Delivery::Duplicate);
        }
        let message_id = message.id.clone();
        let kind = message.kind();

        match slot.fsm.handle(TradeEvent::Message(message.clone())) {
            Ok(transitioned) => {
                slot.seen.insert(message_id);
                self.drain_deferred(slot)?;
                Ok(Delivery::Applied(transitioned))
            }
            Err(FsmError::NoMatchingTransition { state, .. }) => {
                let keep = self.config.unmatched_message_policy() == UnmatchedMessagePolicy::Defer
                    && slot.fsm.table().handles(kind)
                    && !slot.deferred.iter().any(|m| m.id == message_id);
                if !keep {
                    warn!(%state, message = %kind, "message not valid in current state, dropped");
                    return Ok(Delivery::Dropped);
                }
                if let Err(e) = handlers::verify_message(slot.fsm.model(), &message) {
                    warn!(%state, message = %kind, error = %e, "early message failed verification, dropped");
                    return Ok(Delivery::Dropped);
                }
                if slot.deferred.len() >= self.config.max_deferred_messages() {
                    warn!(%state, message = %kind, "deferred queue full, message dropped");
                    return Ok(Delivery::Dropped);
                }
                warn!(%state, message = %kind, "message arrived early, deferred");
                slot.deferred.push_back(message);
                Ok(Delivery::Deferred)
            }
            Err(FsmError::FinalState { .. }) => Ok(Delivery::Dropped),
            Err(e) => Err(e),
        }
    }

    /// Retries deferred messages until none of them applies.
    fn drain_deferred(&self, slot: &mut TradeSlot) -> Result<(), FsmError> {
        loop {
            let state = slot.fsm.state();
            if state.is_final() {
                if !slot.deferred.is_empty() {
                    debug!(%state, dropped = slot.deferred.len(), "trade finished, deferred messages cleared");
                    slot.deferred.clear();
                }
                return Ok(());
            }

            let accepted = slot.fsm.table().accepted_events(state);
            let Some(position) = slot.deferred.iter().position(|m| accepted.contains(&m.kind()))
            else {
                return Ok(());
            };
            let Some(message) = slot.deferred.remove(position) else {
                return Ok(());
            };

            let message_id = message.id.clone();
            match slot.fsm.handle(TradeEvent::Message(message)) {
                Ok(transitioned) => {
                    info!(from = %transitioned.from, to = %transitioned.to, "deferred message applied");
                    slot.seen.insert(message_id);
                }
                Err(e) if !e.is_fatal() => {
                    warn!(error = %e, "deferred message dropped");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
