//! End to end trade scenarios against the sled backed trade service.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tempfile::{TempDir, tempdir};
use trade_protocol::config::{PROTOCOL_VERSION, ProtocolConfig, UnmatchedMessagePolicy};
use trade_protocol::error::{FsmError, ServiceError};
use trade_protocol::messages::{MessagePayload, TradeMessage};
use trade_protocol::provider::Transport;
use trade_protocol::service::{Delivery, TradeService};
use trade_protocol::store::TradeStore;
use trade_protocol::state::TradeState;
use trade_protocol::trade::{Contract, Currency, Direction, NetworkId, TimeStamp, TradeRole};
use trade_protocol::utils;

/// Loopback network. Messages queue up until pumped.
#[derive(Default, Clone)]
struct Network {
    queue: Arc<Mutex<VecDeque<TradeMessage>>>,
    sent: Arc<Mutex<Vec<TradeMessage>>>,
}

impl Transport for Network {
    fn send(&self, message: TradeMessage) -> anyhow::Result<()> {
        self.queue.lock().push_back(message.clone());
        self.sent.lock().push(message);
        Ok(())
    }
}

impl Network {
    fn pump(&self, peers: &[&TradeService]) -> anyhow::Result<()> {
        loop {
            let Some(message) = self.queue.lock().pop_front() else {
                return Ok(());
            };
            if let Some(peer) = peers.iter().find(|p| *p.my_identity() == message.receiver) {
                peer.on_message(message)?;
            }
        }
    }

    fn sent_kinds(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|m| m.kind().to_string())
            .collect()
    }
}

fn service(
    dir: &TempDir,
    name: &str,
    identity: NetworkId,
    network: &Network,
) -> anyhow::Result<TradeService> {
    // Sled uses file-based locking, so every service gets its own database.
    let db = Arc::new(sled::open(dir.path().join(format!("{name}.db")))?);
    TradeService::new(db, identity, Arc::new(network.clone()), ProtocolConfig::new())
}

fn contract(maker: &NetworkId, taker: &NetworkId, direction: Direction) -> Contract {
    Contract::new()
        .set_offer_id("offer-42")
        .set_maker(maker.clone())
        .set_taker(taker.clone())
        .set_direction(direction)
        .set_base_amount(250_000)
        .set_quote_amount(15_000)
        .set_quote_currency(Currency::EUR)
        .set_payment_method("SEPA")
        .set_take_offer_date(TimeStamp::new())
}

fn peer_message(
    trade_id: &str,
    sender: &NetworkId,
    receiver: &NetworkId,
    payload: MessagePayload,
) -> TradeMessage {
    TradeMessage {
        id: utils::new_message_id(),
        trade_id: trade_id.to_string(),
        protocol_version: PROTOCOL_VERSION,
        sender: sender.clone(),
        receiver: receiver.clone(),
        payload,
    }
}

fn applied(delivery: Delivery) -> TradeState {
    match delivery {
        Delivery::Applied(step) => step.to,
        other => panic!("message not applied: {other:?}"),
    }
}

#[test]
fn seller_as_maker_happy_path() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let seller_id = NetworkId::generate()?;
    let buyer_id = NetworkId::from("buyer");
    let seller = service(&temp_dir, "seller", seller_id.clone(), &network)?;

    let terms = contract(&seller_id, &buyer_id, Direction::Sell);
    let trade_id = terms.trade_id()?;
    let from_buyer = |payload| peer_message(&trade_id, &buyer_id, &seller_id, payload);

    let state = applied(seller.on_message(from_buyer(MessagePayload::TakeOfferRequest {
        contract: terms.clone(),
    }))?);
    assert_eq!(state, TradeState::MakerReceivedTakeOfferRequest);
    assert_eq!(
        seller.find_trade(&trade_id).map(|t| t.role()),
        Some(TradeRole::SellerAsMaker)
    );

    let step = seller.send_account_data(&trade_id, "IBAN DE00 1234")?;
    assert_eq!(step.to, TradeState::SellerSentAccountData);

    let state = applied(seller.on_message(from_buyer(MessagePayload::ConfirmFiatSent))?);
    assert_eq!(state, TradeState::SellerReceivedFiatSentConfirmation);

    let step = seller.confirm_btc_sent(&trade_id, Some("txid"))?;
    assert_eq!(step.to, TradeState::SellerSentBtcSentConfirmation);
    let step = seller.btc_confirmed(&trade_id)?;
    assert_eq!(step.to, TradeState::BtcConfirmed);
    let step = seller.complete_trade(&trade_id)?;
    assert_eq!(step.to, TradeState::Completed);

    assert_eq!(
        network.sent_kinds(),
        vec!["TakeOfferResponse", "AccountDataMessage", "ConfirmBtcSentMessage"]
    );

    // nothing moves a finished trade
    let late = seller.on_message(from_buyer(MessagePayload::ConfirmFiatSent))?;
    assert_eq!(late, Delivery::Dropped);
    assert!(matches!(
        seller.cancel_trade(&trade_id),
        Err(ServiceError::Fsm(FsmError::FinalState { .. }))
    ));
    Ok(())
}

#[test]
fn buyer_as_taker_orderings_converge() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let seller_id = NetworkId::from("seller");
    let mut ends = vec![];

    for (i, address_first) in [false, true].into_iter().enumerate() {
        let network = Network::default();
        let buyer_id = NetworkId::generate()?;
        let buyer = service(&temp_dir, &format!("buyer-{i}"), buyer_id.clone(), &network)?;

        let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
        assert_eq!(trade.role(), TradeRole::BuyerAsTaker);
        assert_eq!(trade.state(), TradeState::TakerSentTakeOfferRequest);
        let from_seller = |payload| peer_message(trade.id(), &seller_id, &buyer_id, payload);
        let response = from_seller(MessagePayload::TakeOfferResponse {
            contract_hash: trade.contract_hash().to_string(),
        });

        if address_first {
            let step = buyer.send_btc_address(trade.id(), "bc1qbuyer")?;
            assert_eq!(step.to, TradeState::BuyerSentBtcAddressBeforeTakeOfferResponse);
            assert_eq!(applied(buyer.on_message(response)?), TradeState::BuyerSentBtcAddress);
        } else {
            assert_eq!(
                applied(buyer.on_message(response)?),
                TradeState::TakerReceivedTakeOfferResponse
            );
            let step = buyer.send_btc_address(trade.id(), "bc1qbuyer")?;
            assert_eq!(step.to, TradeState::BuyerSentBtcAddress);
        }

        let state = applied(buyer.on_message(from_seller(MessagePayload::AccountData {
            payment_account_data: "IBAN DE00 1234".into(),
        }))?);
        ends.push(state);

        let trade = buyer.find_trade(trade.id()).unwrap();
        assert_eq!(trade.btc_address(), Some("bc1qbuyer"));
        assert_eq!(trade.payment_account_data(), Some("IBAN DE00 1234"));
    }

    assert_eq!(
        ends,
        vec![TradeState::BuyerSentBtcAddressAndReceivedAccountData; 2]
    );
    Ok(())
}

#[test]
fn local_failure_reports_error_to_peer() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let response = peer_message(
        trade.id(),
        &seller_id,
        &buyer_id,
        MessagePayload::TakeOfferResponse {
            contract_hash: "not the agreed contract".into(),
        },
    );

    assert_eq!(applied(buyer.on_message(response)?), TradeState::Failed);

    let trade = buyer.find_trade(trade.id()).unwrap();
    assert!(trade.error_message().unwrap().contains("not the agreed contract"));
    assert_eq!(
        network.sent_kinds(),
        vec!["TakeOfferRequest", "ReportErrorMessage"]
    );
    Ok(())
}

#[test]
fn message_from_stranger_fails_trade() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let forged = peer_message(
        trade.id(),
        &NetworkId::from("mallory"),
        &buyer_id,
        MessagePayload::TakeOfferResponse {
            contract_hash: trade.contract_hash().to_string(),
        },
    );

    assert_eq!(applied(buyer.on_message(forged)?), TradeState::Failed);
    assert!(
        buyer
            .find_trade(trade.id())
            .and_then(|t| t.error_message().map(str::to_string))
            .unwrap()
            .contains("mallory")
    );
    Ok(())
}

#[test]
fn peer_failure_is_not_answered() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let report = peer_message(
        trade.id(),
        &seller_id,
        &buyer_id,
        MessagePayload::ReportError {
            error_message: "wallet offline".into(),
        },
    );

    assert_eq!(applied(buyer.on_message(report)?), TradeState::FailedAtPeer);
    let trade = buyer.find_trade(trade.id()).unwrap();
    assert_eq!(trade.peers_error_message(), Some("wallet offline"));
    assert_eq!(trade.error_message(), None);
    assert_eq!(network.sent_kinds(), vec!["TakeOfferRequest"]);
    Ok(())
}

#[test]
fn early_and_repeated_messages() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let from_seller = |payload| peer_message(trade.id(), &seller_id, &buyer_id, payload);

    // account data overtakes the take offer response
    let account_data = from_seller(MessagePayload::AccountData {
        payment_account_data: "IBAN DE00 1234".into(),
    });
    assert_eq!(buyer.on_message(account_data)?, Delivery::Deferred);
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::TakerSentTakeOfferRequest)
    );

    let response = from_seller(MessagePayload::TakeOfferResponse {
        contract_hash: trade.contract_hash().to_string(),
    });
    buyer.on_message(response.clone())?;
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::BuyerReceivedAccountData)
    );

    assert_eq!(buyer.on_message(response)?, Delivery::Duplicate);

    let step = buyer.send_btc_address(trade.id(), "bc1qbuyer")?;
    assert_eq!(step.to, TradeState::BuyerSentBtcAddressAndReceivedAccountData);
    Ok(())
}

#[test]
fn drop_policy_discards_early_messages() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let db = Arc::new(sled::open(temp_dir.path().join("buyer.db"))?);
    let config = ProtocolConfig::new().set_unmatched_message_policy(UnmatchedMessagePolicy::Drop);
    let buyer = TradeService::new(db, buyer_id.clone(), Arc::new(network.clone()), config)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let account_data = peer_message(
        trade.id(),
        &seller_id,
        &buyer_id,
        MessagePayload::AccountData {
            payment_account_data: "IBAN DE00 1234".into(),
        },
    );

    assert_eq!(buyer.on_message(account_data)?, Delivery::Dropped);
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::TakerSentTakeOfferRequest)
    );
    Ok(())
}

#[test]
fn messages_for_unknown_trade_wait_for_it() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let seller_id = NetworkId::generate()?;
    let buyer_id = NetworkId::from("buyer");
    let seller = service(&temp_dir, "seller", seller_id.clone(), &network)?;

    let terms = contract(&seller_id, &buyer_id, Direction::Sell);
    let trade_id = terms.trade_id()?;
    let from_buyer = |payload| peer_message(&trade_id, &buyer_id, &seller_id, payload);

    let address = from_buyer(MessagePayload::BtcAddress {
        btc_address: "bc1qbuyer".into(),
    });
    assert_eq!(seller.on_message(address)?, Delivery::Pending);
    assert_eq!(seller.pending_messages(), 1);

    seller.on_message(from_buyer(MessagePayload::TakeOfferRequest {
        contract: terms.clone(),
    }))?;
    assert_eq!(seller.pending_messages(), 0);
    // the address is still too early for the maker
    assert_eq!(
        seller.find_trade(&trade_id).map(|t| t.state()),
        Some(TradeState::MakerReceivedTakeOfferRequest)
    );

    let step = seller.send_account_data(&trade_id, "IBAN DE00 1234")?;
    assert_eq!(step.to, TradeState::SellerSentAccountData);
    let trade = seller.find_trade(&trade_id).unwrap();
    assert_eq!(trade.state(), TradeState::SellerReceivedBtcAddress);
    assert_eq!(trade.btc_address(), Some("bc1qbuyer"));
    Ok(())
}

#[test]
fn pending_messages_are_capped_across_trades() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let seller_id = NetworkId::generate()?;
    let stranger = NetworkId::from("mallory");
    let db = Arc::new(sled::open(temp_dir.path().join("seller.db"))?);
    let config = ProtocolConfig::new().set_max_pending_messages(8);
    let seller = TradeService::new(db, seller_id.clone(), Arc::new(network.clone()), config)?;

    let mut kept = 0;
    for i in 0..100 {
        let message = peer_message(
            &format!("bogus-{i}"),
            &stranger,
            &seller_id,
            MessagePayload::ConfirmFiatSent,
        );
        match seller.on_message(message)? {
            Delivery::Pending => kept += 1,
            Delivery::Dropped => {}
            other => panic!("unexpected delivery {other:?}"),
        }
    }

    assert_eq!(kept, 8);
    assert_eq!(seller.pending_messages(), 8);
    Ok(())
}

#[test]
fn early_message_racing_the_request_is_not_stranded() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let seller_id = NetworkId::generate()?;
    let buyer_id = NetworkId::from("buyer");
    let db = Arc::new(sled::open(temp_dir.path().join("seller.db"))?);
    let config = ProtocolConfig::new().set_flush_on_commit(false);
    let seller = TradeService::new(db, seller_id.clone(), Arc::new(network.clone()), config)?;

    for round in 0..64 {
        let terms = contract(&seller_id, &buyer_id, Direction::Sell)
            .set_offer_id(&format!("offer-{round}"));
        let trade_id = terms.trade_id()?;
        let request = peer_message(
            &trade_id,
            &buyer_id,
            &seller_id,
            MessagePayload::TakeOfferRequest { contract: terms },
        );
        let address = peer_message(
            &trade_id,
            &buyer_id,
            &seller_id,
            MessagePayload::BtcAddress {
                btc_address: "bc1qbuyer".into(),
            },
        );

        let (opened, early) = thread::scope(|s| {
            let opened = s.spawn(|| seller.on_message(request));
            let early = s.spawn(|| seller.on_message(address));
            (opened.join().unwrap(), early.join().unwrap())
        });
        assert_eq!(applied(opened?), TradeState::MakerReceivedTakeOfferRequest);
        assert!(matches!(early?, Delivery::Pending | Delivery::Deferred));

        let step = seller.send_account_data(&trade_id, "IBAN DE00 1234")?;
        assert_eq!(step.to, TradeState::SellerSentAccountData);
        assert_eq!(
            seller.find_trade(&trade_id).map(|t| t.state()),
            Some(TradeState::SellerReceivedBtcAddress),
            "round {round}"
        );
    }
    assert_eq!(seller.pending_messages(), 0);
    Ok(())
}

#[test]
fn forged_early_messages_are_not_deferred() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let account_data = |sender: &NetworkId| {
        peer_message(
            trade.id(),
            sender,
            &buyer_id,
            MessagePayload::AccountData {
                payment_account_data: "IBAN DE00 1234".into(),
            },
        )
    };

    let stranger = NetworkId::from("mallory");
    for _ in 0..buyer.config().max_deferred_messages() + 8 {
        assert_eq!(buyer.on_message(account_data(&stranger))?, Delivery::Dropped);
    }
    assert_eq!(buyer.on_message(account_data(&seller_id))?, Delivery::Deferred);

    let response = peer_message(
        trade.id(),
        &seller_id,
        &buyer_id,
        MessagePayload::TakeOfferResponse {
            contract_hash: trade.contract_hash().to_string(),
        },
    );
    buyer.on_message(response)?;
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::BuyerReceivedAccountData)
    );
    Ok(())
}

#[test]
fn concurrent_calls_for_one_trade_run_one_at_a_time() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::from("seller");
    let db = Arc::new(sled::open(temp_dir.path().join("buyer.db"))?);
    let config = ProtocolConfig::new().set_flush_on_commit(false);
    let buyer = TradeService::new(db.clone(), buyer_id.clone(), Arc::new(network.clone()), config)?;
    let store = TradeStore::open(db, false)?;

    for round in 0..64 {
        let terms = contract(&seller_id, &buyer_id, Direction::Sell)
            .set_offer_id(&format!("offer-{round}"));
        let trade = buyer.take_offer(terms)?;
        let from_seller = |payload| peer_message(trade.id(), &seller_id, &buyer_id, payload);
        let response = from_seller(MessagePayload::TakeOfferResponse {
            contract_hash: trade.contract_hash().to_string(),
        });
        assert_eq!(
            applied(buyer.on_message(response)?),
            TradeState::TakerReceivedTakeOfferResponse
        );
        let account_data = from_seller(MessagePayload::AccountData {
            payment_account_data: "IBAN DE00 1234".into(),
        });

        let (inbound, local) = thread::scope(|s| {
            let inbound = s.spawn(|| buyer.on_message(account_data));
            let local = s.spawn(|| buyer.send_btc_address(trade.id(), "bc1qbuyer"));
            (inbound.join().unwrap(), local.join().unwrap())
        });
        let inbound = match inbound? {
            Delivery::Applied(step) => step,
            other => panic!("account data not applied: {other:?}"),
        };
        let local = local?;

        // one commit saw the other's result
        let (first, second) = if inbound.to == local.from {
            (inbound, local)
        } else {
            (local, inbound)
        };
        assert_eq!(first.from, TradeState::TakerReceivedTakeOfferResponse, "round {round}");
        assert_eq!(first.to, second.from, "round {round}");
        assert_eq!(
            second.to,
            TradeState::BuyerSentBtcAddressAndReceivedAccountData,
            "round {round}"
        );

        let current = buyer.find_trade(trade.id()).unwrap();
        assert_eq!(current.btc_address(), Some("bc1qbuyer"));
        assert_eq!(current.payment_account_data(), Some("IBAN DE00 1234"));
        assert_eq!(store.load(trade.id())?, Some(current));
    }
    Ok(())
}

#[test]
fn trades_survive_restart() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let seller_id = NetworkId::generate()?;
    let buyer_id = NetworkId::from("buyer");
    let db = Arc::new(sled::open(temp_dir.path().join("seller.db"))?);

    let terms = contract(&seller_id, &buyer_id, Direction::Sell);
    let trade_id = terms.trade_id()?;
    let from_buyer = |payload| peer_message(&trade_id, &buyer_id, &seller_id, payload);

    {
        let seller = TradeService::new(
            db.clone(),
            seller_id.clone(),
            Arc::new(network.clone()),
            ProtocolConfig::new(),
        )?;
        seller.on_message(from_buyer(MessagePayload::TakeOfferRequest { contract: terms }))?;
        seller.send_account_data(&trade_id, "IBAN DE00 1234")?;
    }

    let seller = TradeService::new(
        db,
        seller_id.clone(),
        Arc::new(network.clone()),
        ProtocolConfig::new(),
    )?;
    let trade = seller.find_trade(&trade_id).unwrap();
    assert_eq!(trade.state(), TradeState::SellerSentAccountData);
    assert_eq!(trade.payment_account_data(), Some("IBAN DE00 1234"));

    let state = applied(seller.on_message(from_buyer(MessagePayload::ConfirmFiatSent))?);
    assert_eq!(state, TradeState::SellerReceivedFiatSentConfirmation);
    Ok(())
}

#[test]
fn user_action_out_of_turn_is_rejected() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;

    let trade = buyer.take_offer(contract(&NetworkId::from("seller"), &buyer_id, Direction::Sell))?;

    let err = buyer.confirm_fiat_sent(trade.id()).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Fsm(FsmError::NoMatchingTransition { .. })
    ));
    assert!(matches!(
        buyer.confirm_fiat_sent("no-such-trade"),
        Err(ServiceError::UnknownTrade(_))
    ));
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::TakerSentTakeOfferRequest)
    );
    Ok(())
}

#[test]
fn two_peers_complete_a_trade() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::generate()?;
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;
    let seller = service(&temp_dir, "seller", seller_id.clone(), &network)?;
    let peers = [&buyer, &seller];

    let trade = buyer.take_offer(contract(&seller_id, &buyer_id, Direction::Sell))?;
    let id = trade.id().to_string();
    network.pump(&peers)?;
    assert_eq!(
        seller.find_trade(&id).map(|t| t.state()),
        Some(TradeState::MakerReceivedTakeOfferRequest)
    );

    buyer.send_btc_address(&id, "bc1qbuyer")?;
    seller.send_account_data(&id, "IBAN DE00 1234")?;
    network.pump(&peers)?;

    buyer.confirm_fiat_sent(&id)?;
    network.pump(&peers)?;
    assert_eq!(
        seller.find_trade(&id).map(|t| t.state()),
        Some(TradeState::SellerReceivedFiatSentConfirmationAndBtcAddress)
    );

    seller.confirm_fiat_receipt(&id)?;
    seller.confirm_btc_sent(&id, Some("txid"))?;
    network.pump(&peers)?;
    assert_eq!(
        buyer.find_trade(&id).map(|t| t.state()),
        Some(TradeState::BuyerReceivedBtcSentConfirmation)
    );

    for peer in peers {
        peer.btc_confirmed(&id)?;
        peer.complete_trade(&id)?;
    }

    let buyer_view = buyer.find_trade(&id).unwrap();
    let seller_view = seller.find_trade(&id).unwrap();
    assert_eq!(buyer_view.state(), TradeState::Completed);
    assert_eq!(seller_view.state(), TradeState::Completed);
    assert_eq!(buyer_view.payment_account_data(), Some("IBAN DE00 1234"));
    assert_eq!(seller_view.btc_address(), Some("bc1qbuyer"));
    assert_eq!(buyer_view.payment_proof(), Some("txid"));
    assert_eq!(buyer_view.contract_hash(), seller_view.contract_hash());
    Ok(())
}

#[test]
fn cancel_reaches_both_peers() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let network = Network::default();
    let buyer_id = NetworkId::generate()?;
    let seller_id = NetworkId::generate()?;
    let buyer = service(&temp_dir, "buyer", buyer_id.clone(), &network)?;
    let seller = service(&temp_dir, "seller", seller_id.clone(), &network)?;
    let peers = [&buyer, &seller];

    // seller takes a buy offer this time
    let trade = seller.take_offer(contract(&buyer_id, &seller_id, Direction::Buy))?;
    assert_eq!(trade.role(), TradeRole::SellerAsTaker);
    network.pump(&peers)?;
    assert_eq!(
        buyer.find_trade(trade.id()).map(|t| t.role()),
        Some(TradeRole::BuyerAsMaker)
    );

    let step = buyer.cancel_trade(trade.id())?;
    assert_eq!(step.to, TradeState::Cancelled);
    network.pump(&peers)?;
    assert_eq!(
        seller.find_trade(trade.id()).map(|t| t.state()),
        Some(TradeState::PeerCancelled)
    );
    Ok(())
}
