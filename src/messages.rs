//! Peer-to-peer trade messages and their CBOR wire encoding.
use super::events::TradeEventKind;
use super::trade::{Contract, NetworkId, Trade};
use super::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// Sent by the taker. Carries the full contract the maker must agree to.
    #[n(0)]
    TakeOfferRequest {
        #[n(0)]
        contract: Contract,
    },
    /// Maker's acceptance, bound to the contract by its hash.
    #[n(1)]
    TakeOfferResponse {
        #[n(0)]
        contract_hash: String,
    },
    #[n(2)]
    AccountData {
        #[n(0)]
        payment_account_data: String,
    },
    #[n(3)]
    BtcAddress {
        #[n(0)]
        btc_address: String,
    },
    #[n(4)]
    ConfirmFiatSent,
    #[n(5)]
    ConfirmFiatReceipt,
    #[n(6)]
    ConfirmBtcSent {
        #[n(0)]
        payment_proof: Option<String>,
    },
    #[n(7)]
    RejectTrade,
    #[n(8)]
    CancelTrade,
    #[n(9)]
    ReportError {
        #[n(0)]
        error_message: String,
    },
}

impl MessagePayload {
    pub fn kind(&self) -> TradeEventKind {
        match self {
            MessagePayload::TakeOfferRequest { .. } => TradeEventKind::TakeOfferRequest,
            MessagePayload::TakeOfferResponse { .. } => TradeEventKind::TakeOfferResponse,
            MessagePayload::AccountData { .. } => TradeEventKind::AccountDataMessage,
            MessagePayload::BtcAddress { .. } => TradeEventKind::BtcAddressMessage,
            MessagePayload::ConfirmFiatSent => TradeEventKind::ConfirmFiatSentMessage,
            MessagePayload::ConfirmFiatReceipt => TradeEventKind::ConfirmFiatReceiptMessage,
            MessagePayload::ConfirmBtcSent { .. } => TradeEventKind::ConfirmBtcSentMessage,
            MessagePayload::RejectTrade => TradeEventKind::RejectTradeMessage,
            MessagePayload::CancelTrade => TradeEventKind::CancelTradeMessage,
            MessagePayload::ReportError { .. } => TradeEventKind::ReportErrorMessage,
        }
    }
}

/// Envelope shared by all trade messages.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TradeMessage {
    /// Unique per message, used to drop replays.
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub trade_id: String,
    #[n(2)]
    pub protocol_version: u32,
    #[n(3)]
    pub sender: NetworkId,
    #[n(4)]
    pub receiver: NetworkId,
    #[n(5)]
    pub payload: MessagePayload,
}

impl TradeMessage {
    /// Addresses a message from our side of `trade` to its peer.
    pub fn new(trade: &Trade, payload: MessagePayload) -> Self {
        Self {
            id: utils::new_message_id(),
            trade_id: trade.id().to_string(),
            protocol_version: trade.protocol_version(),
            sender: trade.my_identity().clone(),
            receiver: trade.peer().clone(),
            payload,
        }
    }

    pub fn kind(&self) -> TradeEventKind {
        self.payload.kind()
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(minicbor::decode(bytes)?)
    }
}
