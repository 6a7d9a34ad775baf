//! Runs a full trade between two in-process peers.
//!
//! `RUST_LOG=trade_protocol=debug cargo run --example two_party_trade`

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use trade_protocol::config::ProtocolConfig;
use trade_protocol::logging::{LogFormat, init_logging};
use trade_protocol::messages::TradeMessage;
use trade_protocol::provider::Transport;
use trade_protocol::service::TradeService;
use trade_protocol::trade::{Contract, Currency, Direction, NetworkId, TimeStamp};

// messages travel as CBOR bytes, the way they would over the wire
#[derive(Default, Clone)]
struct Wire(Arc<Mutex<VecDeque<Vec<u8>>>>);

impl Transport for Wire {
    fn send(&self, message: TradeMessage) -> anyhow::Result<()> {
        self.0.lock().push_back(message.encode()?);
        Ok(())
    }
}

impl Wire {
    fn deliver(&self, peers: &[&TradeService]) -> anyhow::Result<()> {
        loop {
            let Some(bytes) = self.0.lock().pop_front() else {
                return Ok(());
            };
            let message = TradeMessage::decode(&bytes)?;
            let Some(peer) = peers.iter().find(|p| *p.my_identity() == message.receiver) else {
                continue;
            };
            let kind = message.kind();
            let delivery = peer.on_message(message)?;
            println!("  {kind} -> {}: {delivery:?}", peer.my_identity());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let format = std::env::var("LOG_FORMAT")
        .map(|f| LogFormat::from_str_lossy(&f))
        .unwrap_or_default();
    init_logging("warn", format)?;

    let dir = tempfile::tempdir()?;
    let wire = Wire::default();

    let alice_id = NetworkId::generate()?;
    let bob_id = NetworkId::generate()?;
    let alice = TradeService::new(
        Arc::new(sled::open(dir.path().join("alice"))?),
        alice_id.clone(),
        Arc::new(wire.clone()),
        ProtocolConfig::new(),
    )?;
    let bob = TradeService::new(
        Arc::new(sled::open(dir.path().join("bob"))?),
        bob_id.clone(),
        Arc::new(wire.clone()),
        ProtocolConfig::new(),
    )?;
    let peers = [&alice, &bob];

    // bob offers to sell 0.001 BTC for 65 EUR, alice takes it
    let contract = Contract::new()
        .set_offer_id("offer-1")
        .set_maker(bob_id)
        .set_taker(alice_id)
        .set_direction(Direction::Sell)
        .set_base_amount(100_000)
        .set_quote_amount(6_500)
        .set_quote_currency(Currency::EUR)
        .set_payment_method("SEPA")
        .set_take_offer_date(TimeStamp::new());

    let trade = alice.take_offer(contract)?;
    let id = trade.id().to_string();
    println!("alice takes offer as {}, trade {id}", trade.role());
    wire.deliver(&peers)?;

    alice.send_btc_address(&id, "bc1qalice")?;
    bob.send_account_data(&id, "IBAN DE89 3704 0044 0532 0130 00")?;
    wire.deliver(&peers)?;

    alice.confirm_fiat_sent(&id)?;
    wire.deliver(&peers)?;

    bob.confirm_fiat_receipt(&id)?;
    bob.confirm_btc_sent(&id, Some("4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"))?;
    wire.deliver(&peers)?;

    for peer in peers {
        peer.btc_confirmed(&id)?;
        peer.complete_trade(&id)?;
        if let Some(trade) = peer.find_trade(&id) {
            println!("{} ({}): {}", peer.my_identity(), trade.role(), trade.state());
        }
    }
    Ok(())
}
