use super::{
    TradeTable, TradeTableBuilder, with_buyer_settlement, with_error_handling,
    with_reject_and_cancel,
};
use crate::error::FsmConfigError;
use crate::events::TradeEventKind::*;
use crate::handlers;
use crate::state::TradeState::{self, *};

const CANCELLABLE: [TradeState; 5] = [
    MakerReceivedTakeOfferRequest,
    BuyerReceivedAccountData,
    BuyerSentFiatSentConfirmation,
    BuyerSentFiatSentConfirmationAndBtcAddress,
    BuyerReceivedFiatReceiptConfirmation,
];

/// A seller took our buy offer. The seller moves first, so every step is
/// a single edge.
pub fn buyer_as_maker() -> Result<TradeTable, FsmConfigError> {
    let builder = TradeTableBuilder::new()
        .from(Init)
        .on(TakeOfferRequest)
        .run(handlers::TAKE_OFFER_REQUEST)
        .to(MakerReceivedTakeOfferRequest)
        .then()
        .on(AccountDataMessage)
        .run(handlers::ACCOUNT_DATA_MESSAGE)
        .to(BuyerReceivedAccountData)
        .then()
        .on(ConfirmFiatSentEvent)
        .run(handlers::CONFIRM_FIAT_SENT)
        .to(BuyerSentFiatSentConfirmation)
        .then()
        .on(SendBtcAddressEvent)
        .run(handlers::SEND_BTC_ADDRESS)
        .to(BuyerSentFiatSentConfirmationAndBtcAddress);

    let builder = with_buyer_settlement(
        builder,
        BuyerSentFiatSentConfirmationAndBtcAddress,
        &[
            BuyerSentFiatSentConfirmation,
            BuyerSentFiatSentConfirmationAndBtcAddress,
        ],
    );
    let builder = with_reject_and_cancel(builder, &CANCELLABLE);
    with_error_handling(builder).build()
}
