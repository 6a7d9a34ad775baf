use super::{
    TradeTable, TradeTableBuilder, with_buyer_settlement, with_error_handling,
    with_reject_and_cancel,
};
use crate::builder::path;
use crate::error::FsmConfigError;
use crate::events::TradeEventKind::*;
use crate::handlers;
use crate::state::TradeState::{self, *};

// Where the buyer may still back out.
const CANCELLABLE: [TradeState; 8] = [
    TakerSentTakeOfferRequest,
    TakerReceivedTakeOfferResponse,
    BuyerSentBtcAddressBeforeTakeOfferResponse,
    BuyerSentBtcAddress,
    BuyerReceivedAccountData,
    BuyerSentBtcAddressAndReceivedAccountData,
    BuyerSentFiatSentConfirmation,
    BuyerReceivedFiatReceiptConfirmation,
];

/// The buyer takes a sell offer.
///
/// The take offer response, the seller's account data and our own btc
/// address can line up in several orders. All of them converge on
/// `BUYER_SENT_BTC_ADDRESS_AND_RECEIVED_ACCOUNT_DATA` before the fiat
/// payment is confirmed.
pub fn buyer_as_taker() -> Result<TradeTable, FsmConfigError> {
    let builder = TradeTableBuilder::new()
        .from(Init)
        .on(TakeOfferEvent)
        .run(handlers::TAKE_OFFER)
        .to(TakerSentTakeOfferRequest)
        .branch([
            path("take offer response first")
                .from(TakerSentTakeOfferRequest)
                .on(TakeOfferResponse)
                .run(handlers::TAKE_OFFER_RESPONSE)
                .to(TakerReceivedTakeOfferResponse)
                .branch([
                    path("account data before btc address")
                        .from(TakerReceivedTakeOfferResponse)
                        .on(AccountDataMessage)
                        .run(handlers::ACCOUNT_DATA_MESSAGE)
                        .to(BuyerReceivedAccountData)
                        .then()
                        .on(SendBtcAddressEvent)
                        .run(handlers::SEND_BTC_ADDRESS)
                        .to(BuyerSentBtcAddressAndReceivedAccountData),
                    path("btc address before account data")
                        .from(TakerReceivedTakeOfferResponse)
                        .on(SendBtcAddressEvent)
                        .run(handlers::SEND_BTC_ADDRESS)
                        .to(BuyerSentBtcAddress),
                ]),
            path("btc address before take offer response")
                .from(TakerSentTakeOfferRequest)
                .on(SendBtcAddressEvent)
                .run(handlers::SEND_BTC_ADDRESS)
                .to(BuyerSentBtcAddressBeforeTakeOfferResponse)
                .then()
                .on(TakeOfferResponse)
                .run(handlers::TAKE_OFFER_RESPONSE)
                .to(BuyerSentBtcAddress),
        ])
        .from(BuyerSentBtcAddress)
        .on(AccountDataMessage)
        .run(handlers::ACCOUNT_DATA_MESSAGE)
        .to(BuyerSentBtcAddressAndReceivedAccountData)
        .then()
        .on(ConfirmFiatSentEvent)
        .run(handlers::CONFIRM_FIAT_SENT)
        .to(BuyerSentFiatSentConfirmation);

    let builder = with_buyer_settlement(
        builder,
        BuyerSentFiatSentConfirmation,
        &[BuyerSentFiatSentConfirmation],
    );
    let builder = with_reject_and_cancel(builder, &CANCELLABLE);
    with_error_handling(builder).build()
}
