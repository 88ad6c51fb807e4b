//! The keysoak soak loop state machine.
//!
//! The loop cycles the token through its working life: a probe names the
//! firmware state, the matching action runs, the counters and the detected
//! state are reported, and the loop probes again.
//!
//! ```text
//!                 START
//!                   |
//!                   v
//!               .-------.
//!               | Init  |
//!               '-------'
//!                   |
//!                   v
//!              .---------.
//!    .-------->|  Probe  |<--------.
//!    |         '---------'         |
//!    |        /     |     \        |
//!    | bootloader signer  unknown  |
//!    |      v       v        v     |
//!    | .---------..------..-----------.
//!    | | LoadApp || Sign || Reconnect |
//!    | '---------''------''-----------'
//!    |      |       |        |
//!    '------'-------'--------'
//! ```
//!
//! There is no terminal state; the process is stopped from the outside.

use super::events::*;
use super::states::*;
use crate::settings::Settings;

// =============================================================================
// Public Interface
// =============================================================================

/// Represents the `keysoak` soak loop state machine. Use the `factory()`
/// function to get an instance then run it by calling its `run()` method.
pub struct TokenSoak {
    sm: SoakStates,
}
impl TokenSoak {
    /// The soak loop event loop. It has no terminal state and therefore
    /// never returns; every error along the way is absorbed into the
    /// `unknown`/failure reporting of the corresponding state. Stop the
    /// process to stop the loop.
    pub fn run(&mut self) -> ! {
        loop {
            self.sm = self.sm.step();
        }
    }
}

/// Factory function for the `keysoak` soak loop state machine. Use it to
/// get an instance of the state machine, which you can run by invoking its
/// `run()` method.
pub fn factory(settings: Settings) -> TokenSoak {
    TokenSoak {
        // The machine naturally starts in the `Init` state.
        sm: SoakStates::Init(SoakSM::new(settings)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine implementing `keysoak`'s soak loop.
///
/// This is a private interface, abstracted for a simpler and more
/// intuitive use in the public `TokenSoak` interface.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having data shared by all states that is
/// not really part of state data (the settings). Additionally, it's nicer
/// when debugging to see the state machine and the current state it is
/// holding at any time.
#[derive(Debug)]
struct SoakSM<S: Runnable> {
    settings: Settings,
    state: S,
}
impl<S: Runnable> SoakSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.settings)
    }
}

/// The state machine starts in the `InitState`.
impl SoakSM<InitState> {
    fn new(settings: Settings) -> Self {
        SoakSM {
            settings,
            state: InitState {},
        }
    }
}

/// An enum wrapper around the states of the soak loop state machine. It
/// provides a simpler and more intuitive model for manipulating states and
/// their transitions.
enum SoakStates {
    Init(SoakSM<InitState>),
    Probe(SoakSM<ProbeState>),
    LoadApp(SoakSM<LoadAppState>),
    Sign(SoakSM<SignState>),
    Reconnect(SoakSM<ReconnectState>),
}
impl SoakStates {
    /// The unit of work in the state machine event loop. It checks the
    /// current state and the current event and decides the next
    /// transition. State transitions from events are implemented using the
    /// rust `From`/`Into` pattern. Most of the potential errors of
    /// state/event/transition mismatches can be caught at compile time.
    fn step(&mut self) -> Self {
        match self {
            SoakStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::Probe(ev) => SoakStates::Probe(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SoakStates::Probe(sm) => {
                let event = sm.run();
                match event {
                    Event::LoadApp(ev) => SoakStates::LoadApp(ev.into()),
                    Event::Sign(ev) => SoakStates::Sign(ev.into()),
                    Event::Reconnect(ev) => SoakStates::Reconnect(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SoakStates::LoadApp(sm) => {
                let event = sm.run();
                match event {
                    Event::Probe(ev) => SoakStates::Probe(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SoakStates::Sign(sm) => {
                let event = sm.run();
                match event {
                    Event::Probe(ev) => SoakStates::Probe(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SoakStates::Reconnect(sm) => {
                let event = sm.run();
                match event {
                    Event::Probe(ev) => SoakStates::Probe(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<ProbeEvent> for SoakSM<ProbeState> {
    fn from(event: ProbeEvent) -> SoakSM<ProbeState> {
        SoakSM {
            settings: event.settings,
            state: ProbeState {
                stats: event.stats,
                driver: Some(event.driver),
            },
        }
    }
}

impl From<LoadAppEvent> for SoakSM<LoadAppState> {
    fn from(event: LoadAppEvent) -> SoakSM<LoadAppState> {
        SoakSM {
            settings: event.settings,
            state: LoadAppState {
                stats: event.stats,
                driver: Some(event.driver),
            },
        }
    }
}

impl From<SignEvent> for SoakSM<SignState> {
    fn from(event: SignEvent) -> SoakSM<SignState> {
        SoakSM {
            settings: event.settings,
            state: SignState {
                stats: event.stats,
                driver: Some(event.driver),
            },
        }
    }
}

impl From<ReconnectEvent> for SoakSM<ReconnectState> {
    fn from(event: ReconnectEvent) -> SoakSM<ReconnectState> {
        SoakSM {
            settings: event.settings,
            state: ReconnectState {
                stats: event.stats,
                driver: Some(event.driver),
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::super::driver::TokenDriver;
    use super::*;
    use crate::actions::ActionError;
    use crate::probe::TokenState;
    use crate::settings::{Settings, SettingsBuilder};

    #[derive(Default)]
    struct CallLog {
        loads: usize,
        signs: usize,
    }

    /// Replays a scripted sequence of probe outcomes and records which
    /// actions the loop asked for.
    struct FakeDriver {
        script: VecDeque<TokenState>,
        calls: Arc<Mutex<CallLog>>,
        loader_times_out: bool,
    }

    impl TokenDriver for FakeDriver {
        fn probe(&mut self, _settings: &Settings) -> TokenState {
            self.script.pop_front().unwrap_or(TokenState::Unknown)
        }

        fn load_app(&mut self, _settings: &Settings) -> Result<(), ActionError> {
            self.calls.lock().unwrap().loads += 1;
            if self.loader_times_out {
                Err(ActionError::Timeout(Duration::from_secs(10)))
            } else {
                Ok(())
            }
        }

        fn sign_fresh_message(&mut self, _settings: &Settings) -> Result<(), ActionError> {
            self.calls.lock().unwrap().signs += 1;
            Ok(())
        }
    }

    fn test_settings() -> Settings {
        SettingsBuilder::new()
            .path("/dev/null")
            .settle_delay(Duration::from_millis(0))
            .reconnect_delay(Duration::from_millis(0))
            .finalize()
    }

    fn soak_over(
        script: Vec<TokenState>,
        calls: Arc<Mutex<CallLog>>,
        loader_times_out: bool,
    ) -> SoakStates {
        let driver = FakeDriver {
            script: script.into(),
            calls,
            loader_times_out,
        };
        SoakStates::Probe(SoakSM {
            settings: test_settings(),
            state: ProbeState {
                stats: RunStats::default(),
                driver: Some(Box::new(driver)),
            },
        })
    }

    fn stats_of(sm: &SoakStates) -> RunStats {
        match sm {
            SoakStates::Init(_) => RunStats::default(),
            SoakStates::Probe(sm) => sm.state.stats,
            SoakStates::LoadApp(sm) => sm.state.stats,
            SoakStates::Sign(sm) => sm.state.stats,
            SoakStates::Reconnect(sm) => sm.state.stats,
        }
    }

    fn drive(sm: &mut SoakStates, steps: usize) {
        for _ in 0..steps {
            *sm = sm.step();
        }
    }

    #[test]
    fn bootloader_cycle_loads_once_and_counts_a_restart() {
        let calls = Arc::new(Mutex::new(CallLog::default()));
        let mut sm = soak_over(vec![TokenState::Bootloader], calls.clone(), false);

        drive(&mut sm, 1);
        assert!(matches!(sm, SoakStates::LoadApp(_)));

        drive(&mut sm, 1);
        assert!(matches!(sm, SoakStates::Probe(_)));

        let stats = stats_of(&sm);
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.signatures, 0);
        assert_eq!(stats.disconnects, 0);
        assert_eq!(calls.lock().unwrap().loads, 1);
        assert_eq!(calls.lock().unwrap().signs, 0);
    }

    #[test]
    fn signer_cycle_requests_one_signature() {
        let calls = Arc::new(Mutex::new(CallLog::default()));
        let mut sm = soak_over(vec![TokenState::SignerApp], calls.clone(), false);

        drive(&mut sm, 2);

        let stats = stats_of(&sm);
        assert_eq!(stats.signatures, 1);
        assert_eq!(stats.restarts, 0);
        assert_eq!(stats.disconnects, 0);
        assert_eq!(calls.lock().unwrap().signs, 1);
    }

    #[test]
    fn unknown_cycle_counts_a_disconnect_and_no_actions() {
        let calls = Arc::new(Mutex::new(CallLog::default()));
        let mut sm = soak_over(vec![TokenState::Unknown], calls.clone(), false);

        drive(&mut sm, 2);

        let stats = stats_of(&sm);
        assert_eq!(stats.disconnects, 1);
        assert_eq!(stats.restarts, 0);
        assert_eq!(stats.signatures, 0);
        assert_eq!(calls.lock().unwrap().loads, 0);
        assert_eq!(calls.lock().unwrap().signs, 0);
    }

    #[test]
    fn counter_sum_matches_cycles() {
        let calls = Arc::new(Mutex::new(CallLog::default()));
        let script = vec![
            TokenState::Bootloader,
            TokenState::SignerApp,
            TokenState::SignerApp,
            TokenState::Unknown,
            TokenState::Bootloader,
        ];
        let cycles = script.len() as u64;
        let mut sm = soak_over(script, calls, false);

        // Each probe/act cycle is two steps.
        drive(&mut sm, 2 * cycles as usize);

        let stats = stats_of(&sm);
        assert_eq!(stats.restarts, 2);
        assert_eq!(stats.signatures, 2);
        assert_eq!(stats.disconnects, 1);
        assert_eq!(
            stats.restarts + stats.signatures + stats.disconnects,
            cycles
        );
    }

    #[test]
    fn loader_timeout_is_not_fatal_and_still_counts() {
        let calls = Arc::new(Mutex::new(CallLog::default()));
        let mut sm = soak_over(
            vec![TokenState::Bootloader, TokenState::SignerApp],
            calls.clone(),
            true,
        );

        drive(&mut sm, 4);

        let stats = stats_of(&sm);
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.signatures, 1);
        assert_eq!(calls.lock().unwrap().loads, 1);
        assert_eq!(calls.lock().unwrap().signs, 1);
    }
}
