//! The trade protocol bound to the generic state machine, and its four
//! transition tables.
mod buyer_as_maker;
mod buyer_as_taker;
mod seller_as_maker;
mod seller_as_taker;

use std::sync::Arc;

use super::builder::{TableBuilder, TransitionTable};
use super::error::{FsmConfigError, HandlerError};
use super::events::{TradeEvent, TradeEventKind};
use super::fsm::{Fsm, Protocol};
use super::handlers;
use super::provider::ServiceProvider;
use super::state::TradeState;
use super::trade::{Trade, TradeRole};

pub use buyer_as_maker::buyer_as_maker;
pub use buyer_as_taker::buyer_as_taker;
pub use seller_as_maker::seller_as_maker;
pub use seller_as_taker::seller_as_taker;

pub struct TradeProtocol;

impl Protocol for TradeProtocol {
    type State = TradeState;
    type Event = TradeEvent;
    type Model = Trade;
    type Services = dyn ServiceProvider;

    const ERROR_EVENT: TradeEventKind = TradeEventKind::LocalErrorEvent;

    fn error_event(error: HandlerError) -> TradeEvent {
        TradeEvent::LocalError(error.into())
    }
}

pub type TradeFsm = Fsm<TradeProtocol>;
pub type TradeTable = TransitionTable<TradeProtocol>;
pub type TradeTableBuilder = TableBuilder<TradeProtocol>;

/// The four tables, built once at startup and shared by every trade.
#[derive(Clone)]
pub struct ProtocolTables {
    buyer_as_taker: Arc<TradeTable>,
    buyer_as_maker: Arc<TradeTable>,
    seller_as_taker: Arc<TradeTable>,
    seller_as_maker: Arc<TradeTable>,
}

impl ProtocolTables {
    pub fn build() -> Result<Self, FsmConfigError> {
        Ok(Self {
            buyer_as_taker: Arc::new(buyer_as_taker()?),
            buyer_as_maker: Arc::new(buyer_as_maker()?),
            seller_as_taker: Arc::new(seller_as_taker()?),
            seller_as_maker: Arc::new(seller_as_maker()?),
        })
    }

    pub fn for_role(&self, role: TradeRole) -> Arc<TradeTable> {
        match role {
            TradeRole::BuyerAsTaker => self.buyer_as_taker.clone(),
            TradeRole::BuyerAsMaker => self.buyer_as_maker.clone(),
            TradeRole::SellerAsTaker => self.seller_as_taker.clone(),
            TradeRole::SellerAsMaker => self.seller_as_maker.clone(),
        }
    }
}

/// Local failures end in FAILED and notify the peer, peer failures end in
/// FAILED_AT_PEER without an answer.
fn with_error_handling(builder: TradeTableBuilder) -> TradeTableBuilder {
    builder
        .from_any()
        .on(TradeEventKind::LocalErrorEvent)
        .run(handlers::REPORT_ERROR)
        .to(TradeState::Failed)
        .from_any()
        .on(TradeEventKind::ReportErrorMessage)
        .run(handlers::REPORT_ERROR_MESSAGE)
        .to(TradeState::FailedAtPeer)
}

fn with_reject_and_cancel(
    builder: TradeTableBuilder,
    cancellable: &[TradeState],
) -> TradeTableBuilder {
    builder
        .from_states(cancellable.iter().copied())
        .on(TradeEventKind::RejectTradeEvent)
        .run(handlers::REJECT_TRADE)
        .to(TradeState::Rejected)
        .from_states(cancellable.iter().copied())
        .on(TradeEventKind::RejectTradeMessage)
        .run(handlers::REJECT_TRADE_MESSAGE)
        .to(TradeState::PeerRejected)
        .from_states(cancellable.iter().copied())
        .on(TradeEventKind::CancelTradeEvent)
        .run(handlers::CANCEL_TRADE)
        .to(TradeState::Cancelled)
        .from_states(cancellable.iter().copied())
        .on(TradeEventKind::CancelTradeMessage)
        .run(handlers::CANCEL_TRADE_MESSAGE)
        .to(TradeState::PeerCancelled)
}

/// BTC confirmation and completion are observed, not acted on.
fn with_completion(builder: TradeTableBuilder, from: TradeState) -> TradeTableBuilder {
    builder
        .from(from)
        .on(TradeEventKind::BtcConfirmedEvent)
        .to(TradeState::BtcConfirmed)
        .then()
        .on(TradeEventKind::TradeCompletedEvent)
        .to(TradeState::Completed)
}

/// Seller side after the account data went out: the buyer's address and
/// fiat-sent confirmation may arrive in either order.
fn with_seller_settlement(builder: TradeTableBuilder) -> TradeTableBuilder {
    use super::builder::path;
    use TradeEventKind::*;
    use TradeState::*;

    let builder = builder
        .branch([
            path("btc address first")
                .from(SellerSentAccountData)
                .on(BtcAddressMessage)
                .run(handlers::BTC_ADDRESS_MESSAGE)
                .to(SellerReceivedBtcAddress)
                .then()
                .on(ConfirmFiatSentMessage)
                .run(handlers::CONFIRM_FIAT_SENT_MESSAGE)
                .to(SellerReceivedFiatSentConfirmationAndBtcAddress),
            path("fiat sent confirmation first")
                .from(SellerSentAccountData)
                .on(ConfirmFiatSentMessage)
                .run(handlers::CONFIRM_FIAT_SENT_MESSAGE)
                .to(SellerReceivedFiatSentConfirmation)
                .then()
                .on(BtcAddressMessage)
                .run(handlers::BTC_ADDRESS_MESSAGE)
                .to(SellerReceivedFiatSentConfirmationAndBtcAddress),
        ])
        .from(SellerReceivedFiatSentConfirmationAndBtcAddress)
        .on(ConfirmFiatReceiptEvent)
        .run(handlers::CONFIRM_FIAT_RECEIPT)
        .to(SellerConfirmedFiatReceipt)
        .from_states([
            SellerReceivedFiatSentConfirmation,
            SellerReceivedFiatSentConfirmationAndBtcAddress,
            SellerConfirmedFiatReceipt,
        ])
        .on(ConfirmBtcSentEvent)
        .run(handlers::CONFIRM_BTC_SENT)
        .to(SellerSentBtcSentConfirmation);

    with_completion(builder, SellerSentBtcSentConfirmation)
}

/// Buyer side once fiat is sent. `fiat_sent` lists the states where the
/// buyer has confirmed the fiat payment.
fn with_buyer_settlement(
    builder: TradeTableBuilder,
    fiat_sent_with_address: TradeState,
    fiat_sent: &[TradeState],
) -> TradeTableBuilder {
    use TradeEventKind::*;
    use TradeState::*;

    let builder = builder
        .from(fiat_sent_with_address)
        .on(ConfirmFiatReceiptMessage)
        .run(handlers::CONFIRM_FIAT_RECEIPT_MESSAGE)
        .to(BuyerReceivedFiatReceiptConfirmation)
        .from_states(
            fiat_sent
                .iter()
                .copied()
                .chain([BuyerReceivedFiatReceiptConfirmation]),
        )
        .on(ConfirmBtcSentMessage)
        .run(handlers::CONFIRM_BTC_SENT_MESSAGE)
        .to(BuyerReceivedBtcSentConfirmation);

    with_completion(builder, BuyerReceivedBtcSentConfirmation)
}
