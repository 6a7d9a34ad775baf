//! Generic protocol state machine runtime.
//!
//! A [`Protocol`] plugs its state set, event union, owned model and
//! collaborators into the engine. An [`Fsm`] owns one model and a shared
//! reference to an immutable [`TransitionTable`]. Every call to
//! [`Fsm::handle`] runs to completion: lookup, handler, commit, persist.
use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::builder::TransitionTable;
use super::error::{FsmError, HandlerError};

pub trait State: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    fn is_final(&self) -> bool;
    /// Position in the protocol progression. Transitions only move forward.
    fn ordinal(&self) -> u16;
}

pub trait Event: Debug {
    /// Stable dispatch key of a concrete event type.
    type Kind: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

pub trait FsmModel {
    type State: State;

    fn state(&self) -> Self::State;
    fn set_state(&mut self, state: Self::State);
}

/// Persistence trigger invoked after every committed transition.
pub trait Persistence<M>: Send + Sync {
    fn persist(&self, model: &M) -> anyhow::Result<()>;
}

pub type EventKind<P> = <<P as Protocol>::Event as Event>::Kind;

pub trait Protocol: Sized + 'static {
    type State: State;
    type Event: Event;
    type Model: FsmModel<State = Self::State>;
    type Services: Persistence<Self::Model> + ?Sized;

    /// Kind of the event produced by [`Protocol::error_event`].
    const ERROR_EVENT: EventKind<Self>;

    /// Wraps a handler failure into the event routed through the error transition.
    fn error_event(error: HandlerError) -> Self::Event;
}

/// A handler bound to its model and collaborators for one invocation.
pub struct HandlerContext<'a, P: Protocol> {
    pub model: &'a mut P::Model,
    pub services: &'a P::Services,
}

pub type HandlerFn<P> =
    fn(&mut HandlerContext<'_, P>, &<P as Protocol>::Event) -> Result<(), HandlerError>;

/// Named business logic run by a transition.
pub struct Handler<P: Protocol> {
    name: &'static str,
    run: HandlerFn<P>,
}

impl<P: Protocol> Handler<P> {
    pub const fn new(name: &'static str, run: HandlerFn<P>) -> Self {
        Self { name, run }
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn run(
        &self,
        ctx: &mut HandlerContext<'_, P>,
        event: &P::Event,
    ) -> Result<(), HandlerError> {
        (self.run)(ctx, event)
    }
}

impl<P: Protocol> Clone for Handler<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Protocol> Copy for Handler<P> {}

impl<P: Protocol> Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}

/// The state change committed by a successful [`Fsm::handle`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transitioned<S> {
    pub from: S,
    pub to: S,
}

pub struct Fsm<P: Protocol> {
    table: Arc<TransitionTable<P>>,
    model: P::Model,
    services: Arc<P::Services>,
}

impl<P: Protocol> Fsm<P> {
    pub fn new(table: Arc<TransitionTable<P>>, model: P::Model, services: Arc<P::Services>) -> Self {
        Self {
            table,
            model,
            services,
        }
    }

    pub fn model(&self) -> &P::Model {
        &self.model
    }
    pub fn state(&self) -> P::State {
        self.model.state()
    }
    pub fn table(&self) -> &TransitionTable<P> {
        &self.table
    }

    /// Dispatches one event.
    ///
    /// Returns `NoMatchingTransition` or `FinalState` without touching the
    /// model when the event is not valid in the current state. A handler
    /// failure is not returned: it is rerouted through the error transition
    /// and the resulting state change is reported instead.
    pub fn handle(&mut self, event: P::Event) -> Result<Transitioned<P::State>, FsmError> {
        let current = self.model.state();
        let kind = event.kind();

        if current.is_final() {
            warn!(state = %current, event = %kind, "final state reached, event ignored");
            return Err(FsmError::FinalState {
                state: current.to_string(),
                event: kind.to_string(),
            });
        }

        let Some(transition) = self.table.find(current, kind) else {
            info!(state = %current, event = %kind, "no transition found");
            return Err(FsmError::NoMatchingTransition {
                state: current.to_string(),
                event: kind.to_string(),
            });
        };
        let target = transition.target();

        if let Some(handler) = transition.handler() {
            debug!(handler = handler.name(), event = %kind, "running handler");
            let mut ctx = HandlerContext {
                model: &mut self.model,
                services: &*self.services,
            };

            if let Err(err) = handler.run(&mut ctx, &event) {
                if kind == P::ERROR_EVENT {
                    // the error path must still terminate the protocol
                    error!(handler = handler.name(), error = %err, "error handler failed");
                } else {
                    error!(handler = handler.name(), state = %current, error = %err, "handler failed");
                    return self.handle_failure(current, err);
                }
            }
        }

        self.commit(current, target, kind)
    }

    fn handle_failure(
        &mut self,
        current: P::State,
        err: HandlerError,
    ) -> Result<Transitioned<P::State>, FsmError> {
        match self.handle(P::error_event(err)) {
            Ok(transitioned) => Ok(Transitioned {
                from: current,
                to: transitioned.to,
            }),
            Err(FsmError::NoMatchingTransition { state, .. }) => {
                error!(%state, "no error transition registered");
                Err(FsmError::MissingErrorTransition { state })
            }
            Err(e) => Err(e),
        }
    }

    fn commit(
        &mut self,
        from: P::State,
        to: P::State,
        kind: EventKind<P>,
    ) -> Result<Transitioned<P::State>, FsmError> {
        self.model.set_state(to);

        if let Err(e) = self.services.persist(&self.model) {
            error!(%from, %to, error = %e, "failed to persist committed state");
            return Err(FsmError::Persistence(e));
        }

        info!(%from, %to, event = %kind, "transition completed");
        Ok(Transitioned { from, to })
    }
}
