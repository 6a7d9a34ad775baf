use super::{
    TradeTable, TradeTableBuilder, with_error_handling, with_reject_and_cancel,
    with_seller_settlement,
};
use crate::error::FsmConfigError;
use crate::events::TradeEventKind::*;
use crate::handlers;
use crate::state::TradeState::{self, *};

const CANCELLABLE: [TradeState; 7] = [
    TakerSentTakeOfferRequest,
    TakerReceivedTakeOfferResponse,
    SellerSentAccountData,
    SellerReceivedBtcAddress,
    SellerReceivedFiatSentConfirmation,
    SellerReceivedFiatSentConfirmationAndBtcAddress,
    SellerConfirmedFiatReceipt,
];

/// We take a buy offer and sell. Account data goes out only after the
/// maker accepted.
pub fn seller_as_taker() -> Result<TradeTable, FsmConfigError> {
    let builder = TradeTableBuilder::new()
        .from(Init)
        .on(TakeOfferEvent)
        .run(handlers::TAKE_OFFER)
        .to(TakerSentTakeOfferRequest)
        .then()
        .on(TakeOfferResponse)
        .run(handlers::TAKE_OFFER_RESPONSE)
        .to(TakerReceivedTakeOfferResponse)
        .then()
        .on(AccountDataEvent)
        .run(handlers::SEND_ACCOUNT_DATA)
        .to(SellerSentAccountData);

    let builder = with_seller_settlement(builder);
    let builder = with_reject_and_cancel(builder, &CANCELLABLE);
    with_error_handling(builder).build()
}
