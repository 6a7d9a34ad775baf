//! Trade protocol states shared by the four protocol variants.
use std::fmt;

use super::fsm;

/// Declaration order is the ordinal. Every variant only moves forward
/// through this list, so new states must be inserted where they belong
/// in the progression.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeState {
    #[n(0)]
    Init,

    // taker opens the trade
    #[n(1)]
    TakerSentTakeOfferRequest,
    #[n(2)]
    TakerReceivedTakeOfferResponse,
    #[n(3)]
    BuyerSentBtcAddressBeforeTakeOfferResponse,

    // maker side
    #[n(4)]
    MakerReceivedTakeOfferRequest,

    // account data and btc address exchange
    #[n(5)]
    SellerSentAccountData,
    #[n(6)]
    SellerReceivedBtcAddress,
    #[n(7)]
    BuyerSentBtcAddress,
    #[n(8)]
    BuyerReceivedAccountData,
    #[n(9)]
    BuyerSentBtcAddressAndReceivedAccountData,

    // fiat settlement
    #[n(10)]
    BuyerSentFiatSentConfirmation,
    #[n(11)]
    BuyerSentFiatSentConfirmationAndBtcAddress,
    #[n(12)]
    SellerReceivedFiatSentConfirmation,
    #[n(13)]
    SellerReceivedFiatSentConfirmationAndBtcAddress,
    #[n(14)]
    SellerConfirmedFiatReceipt,
    #[n(15)]
    BuyerReceivedFiatReceiptConfirmation,

    // btc settlement
    #[n(16)]
    SellerSentBtcSentConfirmation,
    #[n(17)]
    BuyerReceivedBtcSentConfirmation,
    #[n(18)]
    BtcConfirmed,

    // final
    #[n(19)]
    Completed,
    #[n(20)]
    Rejected,
    #[n(21)]
    PeerRejected,
    #[n(22)]
    Cancelled,
    #[n(23)]
    PeerCancelled,
    #[n(24)]
    Failed,
    #[n(25)]
    FailedAtPeer,
}

impl TradeState {
    pub const ALL: [TradeState; 26] = [
        TradeState::Init,
        TradeState::TakerSentTakeOfferRequest,
        TradeState::TakerReceivedTakeOfferResponse,
        TradeState::BuyerSentBtcAddressBeforeTakeOfferResponse,
        TradeState::MakerReceivedTakeOfferRequest,
        TradeState::SellerSentAccountData,
        TradeState::SellerReceivedBtcAddress,
        TradeState::BuyerSentBtcAddress,
        TradeState::BuyerReceivedAccountData,
        TradeState::BuyerSentBtcAddressAndReceivedAccountData,
        TradeState::BuyerSentFiatSentConfirmation,
        TradeState::BuyerSentFiatSentConfirmationAndBtcAddress,
        TradeState::SellerReceivedFiatSentConfirmation,
        TradeState::SellerReceivedFiatSentConfirmationAndBtcAddress,
        TradeState::SellerConfirmedFiatReceipt,
        TradeState::BuyerReceivedFiatReceiptConfirmation,
        TradeState::SellerSentBtcSentConfirmation,
        TradeState::BuyerReceivedBtcSentConfirmation,
        TradeState::BtcConfirmed,
        TradeState::Completed,
        TradeState::Rejected,
        TradeState::PeerRejected,
        TradeState::Cancelled,
        TradeState::PeerCancelled,
        TradeState::Failed,
        TradeState::FailedAtPeer,
    ];

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TradeState::Completed
                | TradeState::Rejected
                | TradeState::PeerRejected
                | TradeState::Cancelled
                | TradeState::PeerCancelled
                | TradeState::Failed
                | TradeState::FailedAtPeer
        )
    }

    pub fn is_success(&self) -> bool {
        *self == TradeState::Completed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Init => "INIT",
            TradeState::TakerSentTakeOfferRequest => "TAKER_SENT_TAKE_OFFER_REQUEST",
            TradeState::TakerReceivedTakeOfferResponse => "TAKER_RECEIVED_TAKE_OFFER_RESPONSE",
            TradeState::BuyerSentBtcAddressBeforeTakeOfferResponse => {
                "BUYER_SENT_BTC_ADDRESS_BEFORE_TAKE_OFFER_RESPONSE"
            }
            TradeState::MakerReceivedTakeOfferRequest => "MAKER_RECEIVED_TAKE_OFFER_REQUEST",
            TradeState::SellerSentAccountData => "SELLER_SENT_ACCOUNT_DATA",
            TradeState::SellerReceivedBtcAddress => "SELLER_RECEIVED_BTC_ADDRESS",
            TradeState::BuyerSentBtcAddress => "BUYER_SENT_BTC_ADDRESS",
            TradeState::BuyerReceivedAccountData => "BUYER_RECEIVED_ACCOUNT_DATA",
            TradeState::BuyerSentBtcAddressAndReceivedAccountData => {
                "BUYER_SENT_BTC_ADDRESS_AND_RECEIVED_ACCOUNT_DATA"
            }
            TradeState::BuyerSentFiatSentConfirmation => "BUYER_SENT_FIAT_SENT_CONFIRMATION",
            TradeState::BuyerSentFiatSentConfirmationAndBtcAddress => {
                "BUYER_SENT_FIAT_SENT_CONFIRMATION_AND_BTC_ADDRESS"
            }
            TradeState::SellerReceivedFiatSentConfirmation => {
                "SELLER_RECEIVED_FIAT_SENT_CONFIRMATION"
            }
            TradeState::SellerReceivedFiatSentConfirmationAndBtcAddress => {
                "SELLER_RECEIVED_FIAT_SENT_CONFIRMATION_AND_BTC_ADDRESS"
            }
            TradeState::SellerConfirmedFiatReceipt => "SELLER_CONFIRMED_FIAT_RECEIPT",
            TradeState::BuyerReceivedFiatReceiptConfirmation => {
                "BUYER_RECEIVED_FIAT_RECEIPT_CONFIRMATION"
            }
            TradeState::SellerSentBtcSentConfirmation => "SELLER_SENT_BTC_SENT_CONFIRMATION",
            TradeState::BuyerReceivedBtcSentConfirmation => "BUYER_RECEIVED_BTC_SENT_CONFIRMATION",
            TradeState::BtcConfirmed => "BTC_CONFIRMED",
            TradeState::Completed => "COMPLETED",
            TradeState::Rejected => "REJECTED",
            TradeState::PeerRejected => "PEER_REJECTED",
            TradeState::Cancelled => "CANCELLED",
            TradeState::PeerCancelled => "PEER_CANCELLED",
            TradeState::Failed => "FAILED",
            TradeState::FailedAtPeer => "FAILED_AT_PEER",
        }
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fsm::State for TradeState {
    fn is_final(&self) -> bool {
        TradeState::is_final(self)
    }
    fn ordinal(&self) -> u16 {
        *self as u16
    }
}
