//! Transition table definition and validation.
//!
//! Tables are written with a fluent syntax that only collects data:
//!
//! ```text
//! TableBuilder::new()
//!     .from(INIT).on(TakeOffer).run(handler).to(SENT)
//!     .then().on(Response).run(handler).to(RECEIVED)
//!     .branch([path("a").from(RECEIVED)..., path("b").from(RECEIVED)...])
//!     .from_any().on(LocalError).run(handler).to(FAILED)
//!     .build()?
//! ```
//!
//! [`TableBuilder::build`] validates the collected transitions and produces
//! an immutable [`TransitionTable`]. Nothing is checked at dispatch time that
//! could have been rejected here.
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::error::FsmConfigError;
use super::fsm::{EventKind, Handler, Protocol, State};

/// How specific a transition's source set is. Higher wins at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    Any,
    States,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sources<S> {
    /// A single state given with `from`.
    Explicit(S),
    /// An explicit list given with `from_states`.
    States(Vec<S>),
    /// Every non-final state.
    Any,
}

impl<S: State> Sources<S> {
    pub fn specificity(&self) -> Specificity {
        match self {
            Sources::Explicit(_) => Specificity::Explicit,
            Sources::States(_) => Specificity::States,
            Sources::Any => Specificity::Any,
        }
    }

    pub fn contains(&self, state: S) -> bool {
        match self {
            Sources::Explicit(s) => *s == state,
            Sources::States(states) => states.contains(&state),
            Sources::Any => !state.is_final(),
        }
    }

    fn listed(&self) -> &[S] {
        match self {
            Sources::Explicit(s) => std::slice::from_ref(s),
            Sources::States(states) => states,
            Sources::Any => &[],
        }
    }
}

pub struct Transition<P: Protocol> {
    sources: Sources<P::State>,
    event: EventKind<P>,
    handler: Option<Handler<P>>,
    target: P::State,
}

impl<P: Protocol> Transition<P> {
    pub fn sources(&self) -> &Sources<P::State> {
        &self.sources
    }
    pub fn event(&self) -> EventKind<P> {
        self.event
    }
    pub fn handler(&self) -> Option<Handler<P>> {
        self.handler
    }
    pub fn target(&self) -> P::State {
        self.target
    }
}

impl<P: Protocol> fmt::Debug for Transition<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("sources", &self.sources)
            .field("event", &self.event)
            .field("handler", &self.handler)
            .field("target", &self.target)
            .finish()
    }
}

/// Immutable lookup structure produced by [`TableBuilder::build`].
pub struct TransitionTable<P: Protocol> {
    transitions: Vec<Transition<P>>,
    explicit: HashMap<(P::State, EventKind<P>), usize>,
    listed: HashMap<(P::State, EventKind<P>), usize>,
    any: HashMap<EventKind<P>, usize>,
}

impl<P: Protocol> fmt::Debug for TransitionTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl<P: Protocol> TransitionTable<P> {
    pub fn builder() -> TableBuilder<P> {
        TableBuilder::new()
    }

    /// Finds the transition for `event` in `state`.
    ///
    /// Explicit `from` transitions win over `from_states`, which win over
    /// `from_any`. Final states never match.
    pub fn find(&self, state: P::State, event: EventKind<P>) -> Option<&Transition<P>> {
        if state.is_final() {
            return None;
        }
        self.explicit
            .get(&(state, event))
            .or_else(|| self.listed.get(&(state, event)))
            .or_else(|| self.any.get(&event))
            .map(|&i| &self.transitions[i])
    }

    pub fn transitions(&self) -> &[Transition<P>] {
        &self.transitions
    }

    /// Event kinds accepted in `state`, wildcard transitions included.
    pub fn accepted_events(&self, state: P::State) -> HashSet<EventKind<P>> {
        self.transitions
            .iter()
            .filter(|t| t.sources.contains(state))
            .map(|t| t.event)
            .collect()
    }

    /// Whether any transition of the table reacts to `event`.
    pub fn handles(&self, event: EventKind<P>) -> bool {
        self.transitions.iter().any(|t| t.event == event)
    }

    /// Every state named as a source or target.
    pub fn states(&self) -> HashSet<P::State> {
        self.transitions
            .iter()
            .flat_map(|t| t.sources.listed().iter().copied().chain([t.target]))
            .collect()
    }
}

/// Collects transitions. Also used for branch paths, see [`path`].
pub struct TableBuilder<P: Protocol> {
    description: Option<&'static str>,
    transitions: Vec<Transition<P>>,
    last_target: Option<P::State>,
    errors: Vec<FsmConfigError>,
}

/// Starts a branch path. The description documents the ordering it covers.
pub fn path<P: Protocol>(description: &'static str) -> TableBuilder<P> {
    TableBuilder {
        description: Some(description),
        ..TableBuilder::new()
    }
}

impl<P: Protocol> Default for TableBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Protocol> TableBuilder<P> {
    pub fn new() -> Self {
        Self {
            description: None,
            transitions: vec![],
            last_target: None,
            errors: vec![],
        }
    }

    pub fn description(&self) -> Option<&'static str> {
        self.description
    }

    pub fn from(self, state: P::State) -> TransitionBuilder<P> {
        TransitionBuilder::new(self, Sources::Explicit(state))
    }

    pub fn from_states(mut self, states: impl IntoIterator<Item = P::State>) -> TransitionBuilder<P> {
        let mut listed: Vec<P::State> = vec![];
        for state in states {
            if !listed.contains(&state) {
                listed.push(state);
            }
        }
        if listed.is_empty() {
            self.errors.push(FsmConfigError::EmptySourceStates);
        }
        TransitionBuilder::new(self, Sources::States(listed))
    }

    pub fn from_any(self) -> TransitionBuilder<P> {
        TransitionBuilder::new(self, Sources::Any)
    }

    /// Continues from the target of the previous transition.
    pub fn then(mut self) -> TransitionBuilder<P> {
        match self.last_target {
            Some(state) => TransitionBuilder::new(self, Sources::Explicit(state)),
            None => {
                self.errors.push(FsmConfigError::DanglingThen);
                TransitionBuilder::new(self, Sources::States(vec![]))
            }
        }
    }

    /// Adds alternative paths. Each path names its own starting state; paths
    /// converge by later transitions that list each path's end state.
    pub fn branch(mut self, paths: impl IntoIterator<Item = TableBuilder<P>>) -> Self {
        let mut count = 0;
        for path in paths {
            count += 1;
            self.transitions.extend(path.transitions);
            self.errors.extend(path.errors);
        }
        if count < 2 {
            self.errors.push(FsmConfigError::SingleBranch);
        }
        self.last_target = None;
        self
    }

    pub fn build(self) -> Result<TransitionTable<P>, FsmConfigError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut explicit = HashMap::new();
        let mut listed = HashMap::new();
        let mut any = HashMap::new();

        for (i, transition) in self.transitions.iter().enumerate() {
            let event = transition.event;
            let target = transition.target;

            for &source in transition.sources.listed() {
                if source.is_final() {
                    return Err(FsmConfigError::FinalSource {
                        state: source.to_string(),
                        event: event.to_string(),
                    });
                }
                if target.ordinal() <= source.ordinal() {
                    return Err(FsmConfigError::BackwardTransition {
                        source_state: source.to_string(),
                        target: target.to_string(),
                    });
                }
                let index = match transition.sources.specificity() {
                    Specificity::Explicit => &mut explicit,
                    _ => &mut listed,
                };
                if index.insert((source, event), i).is_some() {
                    return Err(FsmConfigError::Duplicate {
                        state: source.to_string(),
                        event: event.to_string(),
                    });
                }
            }

            if matches!(transition.sources, Sources::Any) && any.insert(event, i).is_some() {
                return Err(FsmConfigError::Duplicate {
                    state: "ANY".to_string(),
                    event: event.to_string(),
                });
            }
        }

        if !self.transitions.iter().any(|t| t.event == P::ERROR_EVENT) {
            return Err(FsmConfigError::MissingErrorTransition(
                P::ERROR_EVENT.to_string(),
            ));
        }

        Ok(TransitionTable {
            transitions: self.transitions,
            explicit,
            listed,
            any,
        })
    }
}

/// One transition under construction.
pub struct TransitionBuilder<P: Protocol> {
    parent: TableBuilder<P>,
    sources: Sources<P::State>,
    event: Option<EventKind<P>>,
    handler: Option<Handler<P>>,
}

impl<P: Protocol> TransitionBuilder<P> {
    fn new(parent: TableBuilder<P>, sources: Sources<P::State>) -> Self {
        Self {
            parent,
            sources,
            event: None,
            handler: None,
        }
    }

    pub fn on(mut self, event: EventKind<P>) -> Self {
        self.event = Some(event);
        self
    }

    pub fn run(mut self, handler: Handler<P>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn to(self, target: P::State) -> TableBuilder<P> {
        let TransitionBuilder {
            mut parent,
            sources,
            event,
            handler,
        } = self;

        match event {
            Some(event) => parent.transitions.push(Transition {
                sources,
                event,
                handler,
                target,
            }),
            None => parent.errors.push(FsmConfigError::MissingEvent {
                target: target.to_string(),
            }),
        }
        parent.last_target = Some(target);
        parent
    }
}
