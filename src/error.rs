/// Outcome of a dispatch that did not commit the intended transition.
#[derive(thiserror::Error, Debug)]
pub enum FsmError {
    #[error("No transition for event {event} in state {state}")]
    NoMatchingTransition { state: String, event: String },
    #[error("State {state} is final, event {event} ignored")]
    FinalState { state: String, event: String },
    #[error("Handler failed in state {state} and no error transition is registered")]
    MissingErrorTransition { state: String },
    #[error("Failed to persist committed state: {0:#}")]
    Persistence(anyhow::Error),
}

impl FsmError {
    /// Rejections leave the model untouched and may be ignored by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FsmError::NoMatchingTransition { .. } | FsmError::FinalState { .. }
        )
    }
}

/// Definition-time errors. A table that fails to build must abort startup.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FsmConfigError {
    #[error("Transition from final state {state} on {event}")]
    FinalSource { state: String, event: String },
    #[error("Transition from {state} on {event} is defined twice")]
    Duplicate { state: String, event: String },
    #[error("Transition from {source_state} to {target} does not move forward")]
    BackwardTransition { source_state: String, target: String },
    #[error("Transition to {target} has no event")]
    MissingEvent { target: String },
    #[error("from_states called without states")]
    EmptySourceStates,
    #[error("then() without a preceding transition")]
    DanglingThen,
    #[error("branch() needs at least two paths")]
    SingleBranch,
    #[error("No transition handles the error event {0}")]
    MissingErrorTransition(String),
}

/// Raised by a handler. The runtime routes it to the error transition.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unexpected event {0} for handler")]
    UnexpectedEvent(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ContractError {
    #[error("Contract field {0} is not set")]
    MissingField(&'static str),
    #[error("Contract amount {0} is zero")]
    ZeroAmount(&'static str),
    #[error("Maker and taker are the same identity")]
    SameParties,
    #[error("Own identity {0} is not a party of the contract")]
    NotAParty(String),
}

/// Errors surfaced by the trade service to the host application.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Trade {0} not found")]
    UnknownTrade(String),
    #[error("Trade {0} already exists")]
    TradeExists(String),
    #[error(transparent)]
    Fsm(#[from] FsmError),
}
