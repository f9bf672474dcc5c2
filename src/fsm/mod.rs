//! Function-pointer charge state machine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                    │
//! │  ┌─────────────┬──────────────┬─────────────┬────────────────┐ │
//! │  │ ChargeState │ on_enter     │ on_exit     │ on_update      │ │
//! │  ├─────────────┼──────────────┼─────────────┼────────────────┤ │
//! │  │ PowerOn     │ fn(ctx, out) │             │ fn(ctx,ev,out) │ │
//! │  │ RcdSelfTest │              │             │ fn(ctx,ev,out) │ │
//! │  │ A / B       │ fn(ctx, out) │             │ fn(ctx,ev,out) │ │
//! │  │ C / D       │ fn(ctx, out) │             │ fn(ctx,ev,out) │ │
//! │  │ RelayOpen   │ fn(ctx, out) │             │ fn(ctx,ev,out) │ │
//! │  │ CheckRelay  │ fn(ctx, out) │ fn(ctx,out) │ fn(ctx,ev,out) │ │
//! │  │ Fault       │ fn(ctx, out) │ fn(ctx,out) │ fn(ctx,ev,out) │ │
//! │  └─────────────┴──────────────┴─────────────┴────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The classifiers move `ctx.current_state` directly.  [`Fsm::resolve`]
//! notices the move, runs `on_exit` for the state it last entered and
//! `on_enter` for the new one, then lets the current state's `on_update`
//! re-derive the event.  Handlers never touch hardware: they append
//! [`Action`]s that the service applies afterwards, so tests can assert
//! on actions alone.

pub mod context;
pub mod states;

use context::ControllerContext;
use log::info;

use crate::drivers::{IndicatorPattern, PilotOutput};
use crate::error::FaultKind;
use crate::events::Event;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChargeState {
    PowerOn = 0,
    RcdSelfTest = 1,
    /// Vehicle disconnected.
    A = 2,
    /// Vehicle connected, not charging.
    B = 3,
    /// Charging, no ventilation.
    C = 4,
    /// Charging, ventilation required.
    D = 5,
    RelayOpen = 6,
    CheckRelay = 7,
    Fault = 8,
}

impl ChargeState {
    pub const COUNT: usize = 9;

    /// Out-of-range indices map to `Fault`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::PowerOn,
            1 => Self::RcdSelfTest,
            2 => Self::A,
            3 => Self::B,
            4 => Self::C,
            5 => Self::D,
            6 => Self::RelayOpen,
            7 => Self::CheckRelay,
            8 => Self::Fault,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Fault
            }
        }
    }

    pub fn is_charging(self) -> bool {
        matches!(self, Self::C | Self::D)
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Side effect requested by a state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenRelay,
    CloseRelay,
    StartCharging,
    StopCharging,
    SetPilot(PilotOutput),
    Display(IndicatorPattern),
}

pub const MAX_ACTIONS: usize = 16;

pub type ActionList = heapless::Vec<Action, MAX_ACTIONS>;

/// Outcome of one [`Fsm::resolve`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub event: Event,
    pub actions: ActionList,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

pub type StateActionFn = fn(&mut ControllerContext, &mut ActionList);

/// Returns the event carried into the next tick.
pub type StateUpdateFn = fn(&mut ControllerContext, Event, &mut ActionList) -> Event;

pub struct StateDescriptor {
    pub id: ChargeState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; ChargeState::COUNT],
    /// State whose `on_enter` ran last.
    entered: ChargeState,
    /// Fault shown when `Fault` was entered; a different kind re-enters.
    entered_fault: Option<FaultKind>,
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new(states::build_state_table())
    }
}

impl Fsm {
    pub fn new(table: [StateDescriptor; ChargeState::COUNT]) -> Self {
        Self {
            table,
            entered: ChargeState::PowerOn,
            entered_fault: None,
        }
    }

    /// Run `on_enter` for the context's current state.  Call once after boot.
    pub fn start(&mut self, ctx: &mut ControllerContext) -> ActionList {
        let mut actions = ActionList::new();
        let idx = ctx.current_state as usize;
        info!("charge FSM starting in {}", self.table[idx].name);
        self.entered = ctx.current_state;
        self.entered_fault = ctx.fault;
        if let Some(enter) = self.table[idx].on_enter {
            enter(ctx, &mut actions);
        }
        actions
    }

    /// Consume this tick's classified event.
    ///
    /// 1. Catch up with any state change the classifiers made.
    /// 2. Run `on_update` for the current state.
    /// 3. Catch up again so a fault raised by the handler is entered in
    ///    the same tick.
    pub fn resolve(&mut self, ctx: &mut ControllerContext, event: Event) -> Resolution {
        let mut actions = ActionList::new();
        self.sync_entry(ctx, &mut actions);
        let event = (self.table[ctx.current_state as usize].on_update)(ctx, event, &mut actions);
        self.sync_entry(ctx, &mut actions);
        Resolution { event, actions }
    }

    /// Jump to `next` and run its entry action.
    pub fn force_transition(
        &mut self,
        ctx: &mut ControllerContext,
        next: ChargeState,
    ) -> ActionList {
        let mut actions = ActionList::new();
        ctx.transition(next);
        self.sync_entry(ctx, &mut actions);
        actions
    }

    pub fn entered_state(&self) -> ChargeState {
        self.entered
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn sync_entry(&mut self, ctx: &mut ControllerContext, actions: &mut ActionList) {
        let next = ctx.current_state;
        let refault = next == ChargeState::Fault && ctx.fault != self.entered_fault;
        if next == self.entered && !refault {
            return;
        }

        let prev_idx = self.entered as usize;
        let next_idx = next as usize;
        info!(
            "charge FSM: {} -> {}",
            self.table[prev_idx].name, self.table[next_idx].name
        );

        if next != self.entered {
            if let Some(exit) = self.table[prev_idx].on_exit {
                exit(ctx, actions);
            }
        }
        self.entered = next;
        self.entered_fault = ctx.fault;
        if let Some(enter) = self.table[next_idx].on_enter {
            enter(ctx, actions);
        }
    }
}

/// Append `action`, logging if the list is full.
pub(crate) fn push(actions: &mut ActionList, action: Action) {
    if actions.push(action).is_err() {
        log::error!("action list full, dropped {:?}", action);
    }
}
