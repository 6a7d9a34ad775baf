//! The trade aggregate and the contract both peers agree on.
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use super::config::NETWORK_ID_HRP;
use super::error::ContractError;
use super::fsm::FsmModel;
use super::state::TradeState;
use super::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Currency {
    #[n(0)]
    USD,
    #[n(1)]
    GBP,
    #[n(2)]
    EUR,
}

/// Direction of the offer, seen from the maker.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Direction {
    #[n(0)]
    Buy,
    #[n(1)]
    Sell,
}

impl Direction {
    pub fn mirror(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Into::into)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Address of a peer on the network.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(#[n(0)] String);

impl NetworkId {
    /// A fresh bech32 encoded id.
    pub fn generate() -> anyhow::Result<Self> {
        Ok(Self(utils::new_uuid_to_bech32(NETWORK_ID_HRP)?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects which of the four protocol tables drives a trade.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeRole {
    #[n(0)]
    BuyerAsTaker,
    #[n(1)]
    BuyerAsMaker,
    #[n(2)]
    SellerAsTaker,
    #[n(3)]
    SellerAsMaker,
}

impl TradeRole {
    pub fn new(is_buyer: bool, is_taker: bool) -> Self {
        match (is_buyer, is_taker) {
            (true, true) => TradeRole::BuyerAsTaker,
            (true, false) => TradeRole::BuyerAsMaker,
            (false, true) => TradeRole::SellerAsTaker,
            (false, false) => TradeRole::SellerAsMaker,
        }
    }
    pub fn is_buyer(&self) -> bool {
        matches!(self, TradeRole::BuyerAsTaker | TradeRole::BuyerAsMaker)
    }
    pub fn is_taker(&self) -> bool {
        matches!(self, TradeRole::BuyerAsTaker | TradeRole::SellerAsTaker)
    }
}

impl fmt::Display for TradeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            TradeRole::BuyerAsTaker => "buyer as taker",
            TradeRole::BuyerAsMaker => "buyer as maker",
            TradeRole::SellerAsTaker => "seller as taker",
            TradeRole::SellerAsMaker => "seller as maker",
        };
        f.write_str(role)
    }
}

// Sent in full with the take offer request. Both sides refer to it by the
// hash of its CBOR encoding afterwards.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, Eq, PartialEq)]
pub struct Contract {
    #[n(0)]
    offer_id: Option<String>,
    #[n(1)]
    maker: Option<NetworkId>,
    #[n(2)]
    taker: Option<NetworkId>,
    #[n(3)]
    direction: Option<Direction>,
    #[n(4)]
    base_amount: u64, // sats
    #[n(5)]
    quote_amount: u64, // minor units of the quote currency
    #[n(6)]
    quote_currency: Option<Currency>,
    #[n(7)]
    payment_method: Option<String>,
    #[n(8)]
    take_offer_date: Option<TimeStamp<Utc>>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_offer_id(mut self, offer_id: &str) -> Self {
        self.offer_id = Some(offer_id.to_string());
        self
    }
    pub fn set_maker(mut self, maker: NetworkId) -> Self {
        self.maker = Some(maker);
        self
    }
    pub fn set_taker(mut self, taker: NetworkId) -> Self {
        self.taker = Some(taker);
        self
    }
    pub fn set_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn set_base_amount(mut self, amount: u64) -> Self {
        self.base_amount = amount;
        self
    }
    pub fn set_quote_amount(mut self, amount: u64) -> Self {
        self.quote_amount = amount;
        self
    }
    pub fn set_quote_currency(mut self, currency: Currency) -> Self {
        self.quote_currency = Some(currency);
        self
    }
    pub fn set_payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }
    pub fn set_take_offer_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.take_offer_date = Some(date);
        self
    }

    pub fn offer_id(&self) -> Option<&str> {
        self.offer_id.as_deref()
    }
    pub fn maker(&self) -> Option<&NetworkId> {
        self.maker.as_ref()
    }
    pub fn taker(&self) -> Option<&NetworkId> {
        self.taker.as_ref()
    }
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }
    pub fn base_amount(&self) -> u64 {
        self.base_amount
    }
    pub fn quote_amount(&self) -> u64 {
        self.quote_amount
    }
    pub fn quote_currency(&self) -> Option<Currency> {
        self.quote_currency
    }
    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }
    pub fn take_offer_date(&self) -> Option<&TimeStamp<Utc>> {
        self.take_offer_date.as_ref()
    }

    /// Id both peers derive for the trade opened on this contract.
    pub fn trade_id(&self) -> Result<String, ContractError> {
        let offer_id = self.offer_id().ok_or(ContractError::MissingField("offer_id"))?;
        let taker = self.taker().ok_or(ContractError::MissingField("taker"))?;
        let date = self
            .take_offer_date()
            .ok_or(ContractError::MissingField("take_offer_date"))?;
        Ok(Trade::create_id(offer_id, taker, date))
    }

    // Checks fields, returns the hash of the contract and its cbor encoding
    pub fn validate_and_finalise(&self) -> anyhow::Result<(String, Vec<u8>)> {
        if self.offer_id.is_none() {
            return Err(ContractError::MissingField("offer_id").into());
        }
        let (Some(maker), Some(taker)) = (&self.maker, &self.taker) else {
            return Err(ContractError::MissingField("maker/taker").into());
        };
        if maker == taker {
            return Err(ContractError::SameParties.into());
        }
        if self.direction.is_none() {
            return Err(ContractError::MissingField("direction").into());
        }
        if self.base_amount == 0 {
            return Err(ContractError::ZeroAmount("base_amount").into());
        }
        if self.quote_amount == 0 {
            return Err(ContractError::ZeroAmount("quote_amount").into());
        }
        if self.quote_currency.is_none() {
            return Err(ContractError::MissingField("quote_currency").into());
        }
        if self.payment_method.as_deref().is_none_or(str::is_empty) {
            return Err(ContractError::MissingField("payment_method").into());
        }
        if self.take_offer_date.is_none() {
            return Err(ContractError::MissingField("take_offer_date").into());
        }

        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

/// State of one trade as seen by one peer.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    #[n(0)]
    id: String,
    #[n(1)]
    role: TradeRole,
    #[n(2)]
    protocol_version: u32,
    #[n(3)]
    state: TradeState,
    #[n(4)]
    my_identity: NetworkId,
    #[n(5)]
    peer: NetworkId,
    #[n(6)]
    contract: Contract,
    #[n(7)]
    contract_hash: String,
    #[n(8)]
    payment_account_data: Option<String>,
    #[n(9)]
    btc_address: Option<String>,
    #[n(10)]
    payment_proof: Option<String>,
    #[n(11)]
    error_message: Option<String>,
    #[n(12)]
    peers_error_message: Option<String>,
    #[n(13)]
    created_at: TimeStamp<Utc>,
}

impl Trade {
    /// Both peers compute the same id without exchanging it.
    pub fn create_id(offer_id: &str, taker: &NetworkId, take_offer_date: &TimeStamp<Utc>) -> String {
        let millis = take_offer_date.to_datetime_utc().timestamp_millis();
        sha256::digest(format!("{offer_id}{taker}{millis}"))
    }

    /// Opens a trade on a validated contract from the side of `my_identity`.
    pub fn new(contract: Contract, my_identity: NetworkId, protocol_version: u32) -> anyhow::Result<Self> {
        let (contract_hash, _) = contract.validate_and_finalise()?;
        let id = contract.trade_id()?;

        let (Some(maker), Some(taker), Some(direction)) =
            (contract.maker(), contract.taker(), contract.direction())
        else {
            return Err(ContractError::MissingField("maker/taker/direction").into());
        };

        let is_taker = *taker == my_identity;
        if !is_taker && *maker != my_identity {
            return Err(ContractError::NotAParty(my_identity.to_string()).into());
        }
        let peer = if is_taker { maker.clone() } else { taker.clone() };
        // the offer direction is the maker's, the taker mirrors it
        let is_buyer = if is_taker {
            direction.mirror() == Direction::Buy
        } else {
            direction == Direction::Buy
        };

        Ok(Self {
            id,
            role: TradeRole::new(is_buyer, is_taker),
            protocol_version,
            state: TradeState::Init,
            my_identity,
            peer,
            contract,
            contract_hash,
            payment_account_data: None,
            btc_address: None,
            payment_proof: None,
            error_message: None,
            peers_error_message: None,
            created_at: TimeStamp::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn role(&self) -> TradeRole {
        self.role
    }
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
    pub fn state(&self) -> TradeState {
        self.state
    }
    pub fn my_identity(&self) -> &NetworkId {
        &self.my_identity
    }
    pub fn peer(&self) -> &NetworkId {
        &self.peer
    }
    pub fn contract(&self) -> &Contract {
        &self.contract
    }
    pub fn contract_hash(&self) -> &str {
        &self.contract_hash
    }
    pub fn payment_account_data(&self) -> Option<&str> {
        self.payment_account_data.as_deref()
    }
    pub fn btc_address(&self) -> Option<&str> {
        self.btc_address.as_deref()
    }
    pub fn payment_proof(&self) -> Option<&str> {
        self.payment_proof.as_deref()
    }
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
    pub fn peers_error_message(&self) -> Option<&str> {
        self.peers_error_message.as_deref()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }

    // mutated by handlers only
    pub(crate) fn set_payment_account_data(&mut self, data: String) {
        self.payment_account_data = Some(data);
    }
    pub(crate) fn set_btc_address(&mut self, address: String) {
        self.btc_address = Some(address);
    }
    pub(crate) fn set_payment_proof(&mut self, proof: Option<String>) {
        self.payment_proof = proof;
    }
    pub(crate) fn set_error_message(&mut self, message: String) {
        self.error_message = Some(message);
    }
    pub(crate) fn set_peers_error_message(&mut self, message: String) {
        self.peers_error_message = Some(message);
    }
}

impl FsmModel for Trade {
    type State = TradeState;

    fn state(&self) -> TradeState {
        self.state
    }
    fn set_state(&mut self, state: TradeState) {
        self.state = state;
    }
}
