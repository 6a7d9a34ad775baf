//! sled backed trade storage
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use super::trade::Trade;

const TRADES_TREE: &str = "trades";

#[derive(Clone)]
pub struct TradeStore {
    instance: Arc<sled::Db>,
    trades: sled::Tree,
    flush_on_commit: bool,
}

impl TradeStore {
    pub fn open(instance: Arc<sled::Db>, flush_on_commit: bool) -> anyhow::Result<Self> {
        let trades = instance
            .open_tree(TRADES_TREE)
            .context("failed to open trades tree")?;
        Ok(Self {
            instance,
            trades,
            flush_on_commit,
        })
    }

    /// Writes the trade under its id, replacing any previous version.
    pub fn save(&self, trade: &Trade) -> anyhow::Result<()> {
        let cbor = minicbor::to_vec(trade)?;
        self.trades.insert(trade.id().as_bytes(), cbor)?;
        if self.flush_on_commit {
            self.trades.flush()?;
        }
        debug!(trade_id = trade.id(), state = %trade.state(), "trade saved");
        Ok(())
    }

    pub fn load(&self, trade_id: &str) -> anyhow::Result<Option<Trade>> {
        match self.trades.get(trade_id.as_bytes())? {
            Some(bytes) => {
                let trade = minicbor::decode(&bytes)
                    .with_context(|| format!("failed to decode trade {trade_id}"))?;
                Ok(Some(trade))
            }
            None => Ok(None),
        }
    }

    pub fn load_all(&self) -> anyhow::Result<Vec<Trade>> {
        self.trades
            .iter()
            .values()
            .map(|bytes| -> anyhow::Result<Trade> {
                let bytes = bytes?;
                Ok(minicbor::decode(&bytes).context("failed to decode trade")?)
            })
            .collect()
    }

    /// Returns whether a trade was stored under `trade_id`.
    pub fn remove(&self, trade_id: &str) -> anyhow::Result<bool> {
        let removed = self.trades.remove(trade_id.as_bytes())?.is_some();
        if self.flush_on_commit {
            self.instance.flush()?;
        }
        Ok(removed)
    }
}
