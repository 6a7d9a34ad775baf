//! Bilateral peer-to-peer trade protocol.
//!
//! [`fsm`] and [`builder`] hold a generic state machine engine driven by
//! declarative transition tables. The remaining modules instantiate it for
//! the four trade roles and run trades through [`service::TradeService`].

pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod handlers;
pub mod logging;
pub mod messages;
pub mod protocol;
pub mod provider;
pub mod service;
pub mod state;
pub mod store;
pub mod trade;
pub mod utils;

pub use builder::{TableBuilder, TransitionTable, path};
pub use error::{FsmConfigError, FsmError, HandlerError, ServiceError};
pub use fsm::{Fsm, Handler, HandlerContext, Protocol, Transitioned};
pub use service::{Delivery, TradeService};
