//! Business logic run by the trade protocol transitions.
//!
//! Inbound-message handlers verify the envelope against the trade before
//! touching it. Handlers for local actions send the matching message to the
//! peer. A failed send is logged and does not fail the transition.
use tracing::{debug, warn};

use super::config::{
    MAX_BTC_ADDRESS_LENGTH, MAX_ERROR_MESSAGE_LENGTH, MAX_PAYMENT_ACCOUNT_DATA_LENGTH,
    MAX_PAYMENT_PROOF_LENGTH,
};
use super::error::HandlerError;
use super::events::{TradeEvent, UserAction};
use super::fsm::{Handler, HandlerContext};
use super::messages::{MessagePayload, TradeMessage};
use super::protocol::TradeProtocol;
use super::trade::Trade;
use super::utils::truncate;

type Ctx<'a> = HandlerContext<'a, TradeProtocol>;
type TradeHandler = Handler<TradeProtocol>;

pub const TAKE_OFFER: TradeHandler = Handler::new("TakeOfferHandler", take_offer);
pub const TAKE_OFFER_REQUEST: TradeHandler =
    Handler::new("TakeOfferRequestHandler", take_offer_request);
pub const TAKE_OFFER_RESPONSE: TradeHandler =
    Handler::new("TakeOfferResponseHandler", take_offer_response);
pub const SEND_ACCOUNT_DATA: TradeHandler = Handler::new("AccountDataHandler", send_account_data);
pub const ACCOUNT_DATA_MESSAGE: TradeHandler =
    Handler::new("AccountDataMessageHandler", account_data_message);
pub const SEND_BTC_ADDRESS: TradeHandler = Handler::new("SendBtcAddressHandler", send_btc_address);
pub const BTC_ADDRESS_MESSAGE: TradeHandler =
    Handler::new("BtcAddressMessageHandler", btc_address_message);
pub const CONFIRM_FIAT_SENT: TradeHandler =
    Handler::new("ConfirmFiatSentHandler", confirm_fiat_sent);
pub const CONFIRM_FIAT_SENT_MESSAGE: TradeHandler =
    Handler::new("ConfirmFiatSentMessageHandler", verified_message);
pub const CONFIRM_FIAT_RECEIPT: TradeHandler =
    Handler::new("ConfirmFiatReceiptHandler", confirm_fiat_receipt);
pub const CONFIRM_FIAT_RECEIPT_MESSAGE: TradeHandler =
    Handler::new("ConfirmFiatReceiptMessageHandler", verified_message);
pub const CONFIRM_BTC_SENT: TradeHandler = Handler::new("ConfirmBtcSentHandler", confirm_btc_sent);
pub const CONFIRM_BTC_SENT_MESSAGE: TradeHandler =
    Handler::new("ConfirmBtcSentMessageHandler", confirm_btc_sent_message);
pub const REJECT_TRADE: TradeHandler = Handler::new("RejectTradeHandler", reject_trade);
pub const REJECT_TRADE_MESSAGE: TradeHandler =
    Handler::new("RejectTradeMessageHandler", verified_message);
pub const CANCEL_TRADE: TradeHandler = Handler::new("CancelTradeHandler", cancel_trade);
pub const CANCEL_TRADE_MESSAGE: TradeHandler =
    Handler::new("CancelTradeMessageHandler", verified_message);
pub const REPORT_ERROR: TradeHandler = Handler::new("ReportErrorHandler", report_error);
pub const REPORT_ERROR_MESSAGE: TradeHandler =
    Handler::new("ReportErrorMessageHandler", report_error_message);

/// Checks that `message` belongs to `trade` and comes from its peer.
pub fn verify_message(trade: &Trade, message: &TradeMessage) -> Result<(), HandlerError> {
    if message.trade_id != trade.id() {
        return Err(HandlerError::InvalidMessage(format!(
            "trade id {} does not match {}",
            message.trade_id,
            trade.id()
        )));
    }
    if message.sender != *trade.peer() {
        return Err(HandlerError::InvalidMessage(format!(
            "sender {} is not the trade peer",
            message.sender
        )));
    }
    if message.receiver != *trade.my_identity() {
        return Err(HandlerError::InvalidMessage(format!(
            "receiver {} is not us",
            message.receiver
        )));
    }
    if message.protocol_version != trade.protocol_version() {
        return Err(HandlerError::InvalidMessage(format!(
            "protocol version {} not supported, expected {}",
            message.protocol_version,
            trade.protocol_version()
        )));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), HandlerError> {
    if value.trim().is_empty() {
        return Err(HandlerError::Validation(format!("{field} is empty")));
    }
    if value.chars().count() > max {
        return Err(HandlerError::Validation(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

fn inbound<'a>(ctx: &Ctx<'_>, event: &'a TradeEvent) -> Result<&'a TradeMessage, HandlerError> {
    let message = event
        .as_message()
        .ok_or_else(|| HandlerError::UnexpectedEvent(format!("{event:?}")))?;
    verify_message(ctx.model, message)?;
    Ok(message)
}

fn action<'a>(event: &'a TradeEvent) -> Result<&'a UserAction, HandlerError> {
    match event {
        TradeEvent::Action(action) => Ok(action),
        other => Err(HandlerError::UnexpectedEvent(format!("{other:?}"))),
    }
}

fn unexpected(event: &TradeEvent) -> HandlerError {
    HandlerError::UnexpectedEvent(format!("{event:?}"))
}

fn send(ctx: &Ctx<'_>, payload: MessagePayload) {
    let message = TradeMessage::new(ctx.model, payload);
    let kind = message.kind();
    match ctx.services.send_message(message) {
        Ok(()) => debug!(trade_id = ctx.model.id(), message = %kind, "message sent"),
        Err(e) => warn!(trade_id = ctx.model.id(), message = %kind, error = %e, "failed to send message"),
    }
}

fn take_offer(ctx: &mut Ctx<'_>, _event: &TradeEvent) -> Result<(), HandlerError> {
    let contract = ctx.model.contract().clone();
    send(ctx, MessagePayload::TakeOfferRequest { contract });
    Ok(())
}

/// Answers a take offer request with the hash of its contract.
///
/// The maker trade is opened from this very contract and `inbound` already
/// ties the sender to the contract taker, so there is nothing to compare
/// here. Agreement is checked by the taker against the returned hash.
fn take_offer_request(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::TakeOfferRequest { contract } = &message.payload else {
        return Err(unexpected(event));
    };
    let (contract_hash, _) = contract
        .validate_and_finalise()
        .map_err(|e| HandlerError::Validation(format!("{e:#}")))?;
    send(ctx, MessagePayload::TakeOfferResponse { contract_hash });
    Ok(())
}

fn take_offer_response(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::TakeOfferResponse { contract_hash } = &message.payload else {
        return Err(unexpected(event));
    };
    if contract_hash != ctx.model.contract_hash() {
        return Err(HandlerError::Validation(format!(
            "peer agreed to contract {contract_hash}, expected {}",
            ctx.model.contract_hash()
        )));
    }
    Ok(())
}

fn send_account_data(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let UserAction::SendAccountData {
        payment_account_data,
    } = action(event)?
    else {
        return Err(unexpected(event));
    };
    check_length(
        "payment account data",
        payment_account_data,
        MAX_PAYMENT_ACCOUNT_DATA_LENGTH,
    )?;
    ctx.model
        .set_payment_account_data(payment_account_data.clone());
    send(
        ctx,
        MessagePayload::AccountData {
            payment_account_data: payment_account_data.clone(),
        },
    );
    Ok(())
}

fn account_data_message(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::AccountData {
        payment_account_data,
    } = &message.payload
    else {
        return Err(unexpected(event));
    };
    check_length(
        "payment account data",
        payment_account_data,
        MAX_PAYMENT_ACCOUNT_DATA_LENGTH,
    )?;
    ctx.model
        .set_payment_account_data(payment_account_data.clone());
    Ok(())
}

fn send_btc_address(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let UserAction::SendBtcAddress { btc_address } = action(event)? else {
        return Err(unexpected(event));
    };
    check_length("btc address", btc_address, MAX_BTC_ADDRESS_LENGTH)?;
    ctx.model.set_btc_address(btc_address.clone());
    send(
        ctx,
        MessagePayload::BtcAddress {
            btc_address: btc_address.clone(),
        },
    );
    Ok(())
}

fn btc_address_message(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::BtcAddress { btc_address } = &message.payload else {
        return Err(unexpected(event));
    };
    check_length("btc address", btc_address, MAX_BTC_ADDRESS_LENGTH)?;
    ctx.model.set_btc_address(btc_address.clone());
    Ok(())
}

fn confirm_fiat_sent(ctx: &mut Ctx<'_>, _event: &TradeEvent) -> Result<(), HandlerError> {
    send(ctx, MessagePayload::ConfirmFiatSent);
    Ok(())
}

fn confirm_fiat_receipt(ctx: &mut Ctx<'_>, _event: &TradeEvent) -> Result<(), HandlerError> {
    send(ctx, MessagePayload::ConfirmFiatReceipt);
    Ok(())
}

fn confirm_btc_sent(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let UserAction::ConfirmBtcSent { payment_proof } = action(event)? else {
        return Err(unexpected(event));
    };
    if let Some(proof) = payment_proof {
        check_length("payment proof", proof, MAX_PAYMENT_PROOF_LENGTH)?;
    }
    ctx.model.set_payment_proof(payment_proof.clone());
    send(
        ctx,
        MessagePayload::ConfirmBtcSent {
            payment_proof: payment_proof.clone(),
        },
    );
    Ok(())
}

fn confirm_btc_sent_message(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::ConfirmBtcSent { payment_proof } = &message.payload else {
        return Err(unexpected(event));
    };
    if let Some(proof) = payment_proof {
        check_length("payment proof", proof, MAX_PAYMENT_PROOF_LENGTH)?;
    }
    ctx.model.set_payment_proof(payment_proof.clone());
    Ok(())
}

fn reject_trade(ctx: &mut Ctx<'_>, _event: &TradeEvent) -> Result<(), HandlerError> {
    send(ctx, MessagePayload::RejectTrade);
    Ok(())
}

fn cancel_trade(ctx: &mut Ctx<'_>, _event: &TradeEvent) -> Result<(), HandlerError> {
    send(ctx, MessagePayload::CancelTrade);
    Ok(())
}

// messages that carry nothing beyond the envelope
fn verified_message(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    inbound(ctx, event)?;
    Ok(())
}

fn report_error(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let TradeEvent::LocalError(error) = event else {
        return Err(unexpected(event));
    };
    let error_message = truncate(&error.message, MAX_ERROR_MESSAGE_LENGTH);
    ctx.model.set_error_message(error_message.clone());
    send(ctx, MessagePayload::ReportError { error_message });
    Ok(())
}

fn report_error_message(ctx: &mut Ctx<'_>, event: &TradeEvent) -> Result<(), HandlerError> {
    let message = inbound(ctx, event)?;
    let MessagePayload::ReportError { error_message } = &message.payload else {
        return Err(unexpected(event));
    };
    warn!(trade_id = ctx.model.id(), peer = %message.sender, "peer reported an error");
    ctx.model
        .set_peers_error_message(truncate(error_message, MAX_ERROR_MESSAGE_LENGTH));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::Persistence;
    use crate::provider::ServiceProvider;
    use crate::trade::{Contract, Currency, Direction, NetworkId, TimeStamp};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<TradeMessage>>,
    }

    impl Persistence<Trade> for Outbox {
        fn persist(&self, _trade: &Trade) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl ServiceProvider for Outbox {
        fn send_message(&self, message: TradeMessage) -> anyhow::Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }
    }

    fn buyer_trade() -> Trade {
        let contract = Contract::new()
            .set_offer_id("offer")
            .set_maker(NetworkId::from("seller"))
            .set_taker(NetworkId::from("buyer"))
            .set_direction(Direction::Sell)
            .set_base_amount(10_000)
            .set_quote_amount(700)
            .set_quote_currency(Currency::EUR)
            .set_payment_method("SEPA")
            .set_take_offer_date(TimeStamp::new());
        Trade::new(contract, NetworkId::from("buyer"), 1).unwrap()
    }

    fn from_peer(trade: &Trade, payload: MessagePayload) -> TradeMessage {
        TradeMessage {
            id: crate::utils::new_message_id(),
            trade_id: trade.id().to_string(),
            protocol_version: trade.protocol_version(),
            sender: trade.peer().clone(),
            receiver: trade.my_identity().clone(),
            payload,
        }
    }

    #[test]
    fn verification_rejects_foreign_envelopes() {
        let trade = buyer_trade();
        let good = from_peer(&trade, MessagePayload::ConfirmFiatReceipt);
        assert!(verify_message(&trade, &good).is_ok());

        let mut wrong_trade = good.clone();
        wrong_trade.trade_id = "other".into();
        let mut wrong_sender = good.clone();
        wrong_sender.sender = NetworkId::from("mallory");
        let mut wrong_receiver = good.clone();
        wrong_receiver.receiver = NetworkId::from("mallory");
        let mut wrong_version = good;
        wrong_version.protocol_version = 99;

        for message in [wrong_trade, wrong_sender, wrong_receiver, wrong_version] {
            assert!(matches!(
                verify_message(&trade, &message),
                Err(HandlerError::InvalidMessage(_))
            ));
        }
    }

    #[test]
    fn oversized_btc_address_fails_without_mutation() {
        let mut trade = buyer_trade();
        let outbox = Outbox::default();
        let mut ctx = Ctx {
            model: &mut trade,
            services: &outbox,
        };
        let event = TradeEvent::Action(UserAction::SendBtcAddress {
            btc_address: "x".repeat(MAX_BTC_ADDRESS_LENGTH + 1),
        });

        assert!(SEND_BTC_ADDRESS.run(&mut ctx, &event).is_err());
        assert!(trade.btc_address().is_none());
        assert!(outbox.sent.lock().is_empty());
    }

    #[test]
    fn report_error_truncates_and_notifies_peer() {
        let mut trade = buyer_trade();
        let outbox = Outbox::default();
        let mut ctx = Ctx {
            model: &mut trade,
            services: &outbox,
        };
        let event = TradeEvent::LocalError(crate::events::LocalError {
            message: "e".repeat(MAX_ERROR_MESSAGE_LENGTH * 2),
        });

        REPORT_ERROR.run(&mut ctx, &event).unwrap();

        assert_eq!(
            trade.error_message().map(|m| m.len()),
            Some(MAX_ERROR_MESSAGE_LENGTH)
        );
        let sent = outbox.sent.lock();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            MessagePayload::ReportError { error_message } => {
                assert_eq!(error_message.len(), MAX_ERROR_MESSAGE_LENGTH)
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn take_offer_request_answers_with_contract_hash() {
        let taker = buyer_trade();
        let mut maker =
            Trade::new(taker.contract().clone(), NetworkId::from("seller"), 1).unwrap();
        let outbox = Outbox::default();
        let request = from_peer(
            &maker,
            MessagePayload::TakeOfferRequest {
                contract: taker.contract().clone(),
            },
        );
        let mut ctx = Ctx {
            model: &mut maker,
            services: &outbox,
        };

        TAKE_OFFER_REQUEST
            .run(&mut ctx, &TradeEvent::Message(request))
            .unwrap();

        let sent = outbox.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receiver, NetworkId::from("buyer"));
        match &sent[0].payload {
            MessagePayload::TakeOfferResponse { contract_hash } => {
                assert_eq!(contract_hash, taker.contract_hash())
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn mismatched_contract_hash_fails_response() {
        let mut trade = buyer_trade();
        let outbox = Outbox::default();
        let response = from_peer(
            &trade,
            MessagePayload::TakeOfferResponse {
                contract_hash: "deadbeef".into(),
            },
        );
        let mut ctx = Ctx {
            model: &mut trade,
            services: &outbox,
        };

        let result = TAKE_OFFER_RESPONSE.run(&mut ctx, &TradeEvent::Message(response));
        assert!(matches!(result, Err(HandlerError::Validation(_))));
    }
}
