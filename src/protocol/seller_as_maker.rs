use super::{
    TradeTable, TradeTableBuilder, with_error_handling, with_reject_and_cancel,
    with_seller_settlement,
};
use crate::error::FsmConfigError;
use crate::events::TradeEventKind::*;
use crate::handlers;
use crate::state::TradeState::{self, *};

const CANCELLABLE: [TradeState; 6] = [
    MakerReceivedTakeOfferRequest,
    SellerSentAccountData,
    SellerReceivedBtcAddress,
    SellerReceivedFiatSentConfirmation,
    SellerReceivedFiatSentConfirmationAndBtcAddress,
    SellerConfirmedFiatReceipt,
];

/// A buyer took our sell offer.
pub fn seller_as_maker() -> Result<TradeTable, FsmConfigError> {
    let builder = TradeTableBuilder::new()
        .from(Init)
        .on(TakeOfferRequest)
        .run(handlers::TAKE_OFFER_REQUEST)
        .to(MakerReceivedTakeOfferRequest)
        .then()
        .on(AccountDataEvent)
        .run(handlers::SEND_ACCOUNT_DATA)
        .to(SellerSentAccountData);

    let builder = with_seller_settlement(builder);
    let builder = with_reject_and_cancel(builder, &CANCELLABLE);
    with_error_handling(builder).build()
}
