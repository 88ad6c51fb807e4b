//! States for the keysoak soak loop state machine.
//!
//! This module is private and restricted to the [`soak`](crate::soak)
//! scope. The public interface of the soak loop state machine is provided
//! by [`soak`](crate::soak).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::{fmt, thread};

use console::style;
use log::info;

use super::driver::{SerialTokenDriver, TokenDriver};
use super::events::*;
use crate::actions::ActionError;
use crate::probe::TokenState;
use crate::settings::Settings;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Counters accumulated over the lifetime of a soak run. Each probe/act
/// cycle bumps exactly one of them; they only ever grow, and they start
/// over with the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunStats {
    /// Times the bootloader was found and the signer app (re)loaded.
    pub restarts: u64,
    /// Signatures requested from a running signer app.
    pub signatures: u64,
    /// Iterations where the token answered neither query.
    pub disconnects: u64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "restarts: {}, signatures: {}, disconnects: {}",
            self.restarts, self.signatures, self.disconnects
        )
    }
}

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done
    /// and when finished, requests a transition to a `new state` by
    /// returning the appropriate `event`. The `state` and the `event` are
    /// consumed to create the `new state` using the corresponding [`From`]
    /// trait implementation (provided such implementation exists).
    fn run(&mut self, settings: &Settings) -> Event;
}

// Init State ==================================================================

/// The initial state of the soak loop state machine.
///
/// It checks that a serial device path is configured, builds the
/// production token driver, and fires **[`ProbeEvent`] => [`ProbeState`]**.
/// There is no failure transition: everything that can go wrong later is
/// absorbed inside the loop.
#[derive(Debug)]
pub(crate) struct InitState {}
impl Runnable for InitState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Init");
        assert_ne!(settings.path, None);

        Event::Probe(ProbeEvent {
            settings: settings.clone(),
            stats: RunStats::default(),
            driver: Box::new(SerialTokenDriver),
        })
    }
}

// Probe State =================================================================

/// A `state` that runs one device probe and reports what it found.
///
/// The probe owns a fresh serial connection for its duration and never
/// fails; the detected state picks the transition:
///
///  * **[`LoadAppEvent`] => [`LoadAppState`]** when the bootloader answered,
///  * **[`SignEvent`] => [`SignState`]** when the signer app answered,
///  * **[`ReconnectEvent`] => [`ReconnectState`]** when nothing answered.
pub(crate) struct ProbeState {
    pub stats: RunStats,
    /// Consumed and moved along with every transition out of this state.
    pub driver: Option<Box<dyn TokenDriver>>,
}
impl Runnable for ProbeState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Probe");

        if let Some(mut driver) = self.driver.take() {
            let detected = driver.probe(settings);
            let label = match detected {
                TokenState::SignerApp => style(detected.to_string()).green(),
                TokenState::Bootloader => style(detected.to_string()).cyan(),
                TokenState::Unknown => style(detected.to_string()).red(),
            };
            println!("[KS] 🔎 token state: {}", label);

            let settings = settings.clone();
            let stats = self.stats;
            return match detected {
                TokenState::Bootloader => Event::LoadApp(LoadAppEvent {
                    settings,
                    stats,
                    driver,
                }),
                TokenState::SignerApp => Event::Sign(SignEvent {
                    settings,
                    stats,
                    driver,
                }),
                TokenState::Unknown => Event::Reconnect(ReconnectEvent {
                    settings,
                    stats,
                    driver,
                }),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}
debug_fmt_with_stats!(ProbeState, "ProbeState");

// LoadApp State ===============================================================

/// A `state` that has the external loader install the signer app image on
/// a token sitting in its bootloader.
///
/// A loader timeout or failure is reported and swallowed; the next probe
/// will tell whether the load took. Either way the state waits the settle
/// delay so a freshly started app is not probed mid-boot, counts a
/// restart, and goes back to probing:
///
///  * **[`ProbeEvent`] => [`ProbeState`]** always.
pub(crate) struct LoadAppState {
    pub stats: RunStats,
    /// Consumed and moved upon the transition back to [`ProbeState`].
    pub driver: Option<Box<dyn TokenDriver>>,
}
impl Runnable for LoadAppState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> LoadApp");

        if let Some(mut driver) = self.driver.take() {
            match driver.load_app(settings) {
                Ok(()) => {
                    println!("{}", style("[KS] ⏫ signer app loaded").green());
                }
                Err(ActionError::Timeout(limit)) => {
                    info!("loader timed out after {:?}", limit);
                    println!("{}", style("[KS] ⏰ loader process timeout").yellow());
                }
                Err(ref e) => {
                    info!("error: {:?}", e.to_string());
                    println!("{}", style("[KS] 💥 failed to load the signer app!").red());
                }
            }

            // Give the app time to start before it is probed again.
            thread::sleep(settings.settle_delay);

            self.stats.restarts += 1;
            println!("[KS] 📊 {}", self.stats);

            return Event::Probe(ProbeEvent {
                settings: settings.clone(),
                stats: self.stats,
                driver,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
debug_fmt_with_stats!(LoadAppState, "LoadAppState");

// Sign State ==================================================================

/// A `state` that puts a running signer app to work on one freshly
/// generated message.
///
/// As with loading, a signer timeout or failure is reported and swallowed.
/// The signature itself is not inspected here; the point of the soak run
/// is that the token keeps answering.
///
///  * **[`ProbeEvent`] => [`ProbeState`]** always.
pub(crate) struct SignState {
    pub stats: RunStats,
    /// Consumed and moved upon the transition back to [`ProbeState`].
    pub driver: Option<Box<dyn TokenDriver>>,
}
impl Runnable for SignState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Sign");

        if let Some(mut driver) = self.driver.take() {
            match driver.sign_fresh_message(settings) {
                Ok(()) => {
                    println!("{}", style("[KS] ✒️ signature made").green());
                }
                Err(ActionError::Timeout(limit)) => {
                    info!("signer timed out after {:?}", limit);
                    println!("{}", style("[KS] ⏰ signature process timeout").yellow());
                }
                Err(ref e) => {
                    info!("error: {:?}", e.to_string());
                    println!("{}", style("[KS] 💥 signature request failed!").red());
                }
            }

            self.stats.signatures += 1;
            println!("[KS] 📊 {}", self.stats);

            return Event::Probe(ProbeEvent {
                settings: settings.clone(),
                stats: self.stats,
                driver,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
debug_fmt_with_stats!(SignState, "SignState");

// Reconnect State =============================================================

/// A `state` reached when the token answered neither query: unplugged,
/// still booting, or wedged. It counts a disconnect and waits before the
/// next probe so an absent device is not hammered in a tight loop.
///
///  * **[`ProbeEvent`] => [`ProbeState`]** always.
pub(crate) struct ReconnectState {
    pub stats: RunStats,
    /// Consumed and moved upon the transition back to [`ProbeState`].
    pub driver: Option<Box<dyn TokenDriver>>,
}
impl Runnable for ReconnectState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Reconnect");

        if let Some(driver) = self.driver.take() {
            println!(
                "{}",
                style("[KS] 🔌 token in unknown state: reconnecting").red()
            );
            self.stats.disconnects += 1;
            thread::sleep(settings.reconnect_delay);
            println!("[KS] 📊 {}", self.stats);

            return Event::Probe(ProbeEvent {
                settings: settings.clone(),
                stats: self.stats,
                driver,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
debug_fmt_with_stats!(ReconnectState, "ReconnectState");
