//! Events for the keysoak soak loop state machine.
//!
//! This module is private and restricted to the [`soak`](crate::soak)
//! scope. The public interface of the soak loop state machine is provided
//! by [`soak`](crate::soak).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.
//!
//! Every event carries the settings, the run counters and the token
//! driver: the counters survive every transition, and the driver is a
//! resource owned by exactly one state at a time, handed over by move.

use super::driver::TokenDriver;
use super::states::RunStats;
use crate::settings::Settings;

// ProbeEvent ==================================================================

/// Event fired to trigger a transition to [`ProbeState`](super::states::ProbeState).
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `Init` state, once the driver has been constructed.
///  2. After any acting state ([`LoadAppState`](super::states::LoadAppState),
///     [`SignState`](super::states::SignState),
///     [`ReconnectState`](super::states::ReconnectState)) finishes its
///     work; the loop always comes back to probing.
pub(crate) struct ProbeEvent {
    pub settings: Settings,
    pub stats: RunStats,
    /// The token driver to be used in the next state. Consumed and moved
    /// to the next state.
    pub driver: Box<dyn TokenDriver>,
}
debug_fmt_with_stats!(ProbeEvent, "ProbeEvent");

// LoadAppEvent ================================================================

/// Event fired to trigger a transition to
/// [`LoadAppState`](super::states::LoadAppState), after a probe found the
/// token sitting in its bootloader.
pub(crate) struct LoadAppEvent {
    pub settings: Settings,
    pub stats: RunStats,
    /// The token driver to be used in the next state. Consumed and moved
    /// to the next state.
    pub driver: Box<dyn TokenDriver>,
}
debug_fmt_with_stats!(LoadAppEvent, "LoadAppEvent");

// SignEvent ===================================================================

/// Event fired to trigger a transition to
/// [`SignState`](super::states::SignState), after a probe found the signer
/// app running.
pub(crate) struct SignEvent {
    pub settings: Settings,
    pub stats: RunStats,
    /// The token driver to be used in the next state. Consumed and moved
    /// to the next state.
    pub driver: Box<dyn TokenDriver>,
}
debug_fmt_with_stats!(SignEvent, "SignEvent");

// ReconnectEvent ==============================================================

/// Event fired to trigger a transition to
/// [`ReconnectState`](super::states::ReconnectState), after a probe got no
/// valid answer out of the token.
pub(crate) struct ReconnectEvent {
    pub settings: Settings,
    pub stats: RunStats,
    /// The token driver to be used in the next state. Consumed and moved
    /// to the next state.
    pub driver: Box<dyn TokenDriver>,
}
debug_fmt_with_stats!(ReconnectEvent, "ReconnectEvent");

// Events enum =================================================================

/// Events that can be triggered within the soak loop state machine of
/// `keysoak`.
///
/// Each possible value holds an `event`, which in turn may hold additional
/// data for the state transition. Such data is passed by the origin state
/// for potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    Probe(ProbeEvent),
    LoadApp(LoadAppEvent),
    Sign(SignEvent),
    Reconnect(ReconnectEvent),
}
