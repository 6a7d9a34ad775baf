//! Events that drive a trade protocol instance.
use std::fmt;

use super::error::HandlerError;
use super::fsm::Event;
use super::messages::{MessagePayload, TradeMessage};

/// Dispatch key of every event a trade table can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradeEventKind {
    // local user actions
    TakeOfferEvent,
    AccountDataEvent,
    SendBtcAddressEvent,
    ConfirmFiatSentEvent,
    ConfirmFiatReceiptEvent,
    ConfirmBtcSentEvent,
    BtcConfirmedEvent,
    TradeCompletedEvent,
    RejectTradeEvent,
    CancelTradeEvent,

    // peer messages
    TakeOfferRequest,
    TakeOfferResponse,
    AccountDataMessage,
    BtcAddressMessage,
    ConfirmFiatSentMessage,
    ConfirmFiatReceiptMessage,
    ConfirmBtcSentMessage,
    RejectTradeMessage,
    CancelTradeMessage,
    ReportErrorMessage,

    LocalErrorEvent,
}

impl TradeEventKind {
    pub const ALL: [TradeEventKind; 21] = [
        TradeEventKind::TakeOfferEvent,
        TradeEventKind::AccountDataEvent,
        TradeEventKind::SendBtcAddressEvent,
        TradeEventKind::ConfirmFiatSentEvent,
        TradeEventKind::ConfirmFiatReceiptEvent,
        TradeEventKind::ConfirmBtcSentEvent,
        TradeEventKind::BtcConfirmedEvent,
        TradeEventKind::TradeCompletedEvent,
        TradeEventKind::RejectTradeEvent,
        TradeEventKind::CancelTradeEvent,
        TradeEventKind::TakeOfferRequest,
        TradeEventKind::TakeOfferResponse,
        TradeEventKind::AccountDataMessage,
        TradeEventKind::BtcAddressMessage,
        TradeEventKind::ConfirmFiatSentMessage,
        TradeEventKind::ConfirmFiatReceiptMessage,
        TradeEventKind::ConfirmBtcSentMessage,
        TradeEventKind::RejectTradeMessage,
        TradeEventKind::CancelTradeMessage,
        TradeEventKind::ReportErrorMessage,
        TradeEventKind::LocalErrorEvent,
    ];

    pub fn is_peer_message(&self) -> bool {
        matches!(
            self,
            TradeEventKind::TakeOfferRequest
                | TradeEventKind::TakeOfferResponse
                | TradeEventKind::AccountDataMessage
                | TradeEventKind::BtcAddressMessage
                | TradeEventKind::ConfirmFiatSentMessage
                | TradeEventKind::ConfirmFiatReceiptMessage
                | TradeEventKind::ConfirmBtcSentMessage
                | TradeEventKind::RejectTradeMessage
                | TradeEventKind::CancelTradeMessage
                | TradeEventKind::ReportErrorMessage
        )
    }
}

impl fmt::Display for TradeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A step the local user (or the host application on their behalf) takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    TakeOffer,
    SendAccountData { payment_account_data: String },
    SendBtcAddress { btc_address: String },
    ConfirmFiatSent,
    ConfirmFiatReceipt,
    /// Proof is a transaction id or a lightning preimage.
    ConfirmBtcSent { payment_proof: Option<String> },
    BtcConfirmed,
    CompleteTrade,
    RejectTrade,
    CancelTrade,
}

impl UserAction {
    pub fn kind(&self) -> TradeEventKind {
        match self {
            UserAction::TakeOffer => TradeEventKind::TakeOfferEvent,
            UserAction::SendAccountData { .. } => TradeEventKind::AccountDataEvent,
            UserAction::SendBtcAddress { .. } => TradeEventKind::SendBtcAddressEvent,
            UserAction::ConfirmFiatSent => TradeEventKind::ConfirmFiatSentEvent,
            UserAction::ConfirmFiatReceipt => TradeEventKind::ConfirmFiatReceiptEvent,
            UserAction::ConfirmBtcSent { .. } => TradeEventKind::ConfirmBtcSentEvent,
            UserAction::BtcConfirmed => TradeEventKind::BtcConfirmedEvent,
            UserAction::CompleteTrade => TradeEventKind::TradeCompletedEvent,
            UserAction::RejectTrade => TradeEventKind::RejectTradeEvent,
            UserAction::CancelTrade => TradeEventKind::CancelTradeEvent,
        }
    }
}

/// A handler failure rerouted through the error transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalError {
    pub message: String,
}

impl From<HandlerError> for LocalError {
    fn from(err: HandlerError) -> Self {
        Self {
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TradeEvent {
    Message(TradeMessage),
    Action(UserAction),
    LocalError(LocalError),
}

impl Event for TradeEvent {
    type Kind = TradeEventKind;

    fn kind(&self) -> TradeEventKind {
        match self {
            TradeEvent::Message(message) => message.kind(),
            TradeEvent::Action(action) => action.kind(),
            TradeEvent::LocalError(_) => TradeEventKind::LocalErrorEvent,
        }
    }
}

impl TradeEvent {
    pub fn as_message(&self) -> Option<&TradeMessage> {
        match self {
            TradeEvent::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_payload(&self) -> Option<&MessagePayload> {
        self.as_message().map(|m| &m.payload)
    }
}

impl From<TradeMessage> for TradeEvent {
    fn from(message: TradeMessage) -> Self {
        TradeEvent::Message(message)
    }
}

impl From<UserAction> for TradeEvent {
    fn from(action: UserAction) -> Self {
        TradeEvent::Action(action)
    }
}
