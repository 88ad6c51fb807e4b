//! Keysoak exercises a removable USB security token over its serial
//! interface, around the clock. The token runs exactly one of two firmware
//! images at a time: a bootloader that can receive an application image,
//! or the signer app that produces signatures. Keysoak keeps probing which
//! of the two is talking, reloads the signer app whenever the token falls
//! back to the bootloader, puts a running signer app to work on freshly
//! generated messages, and patiently waits out the stretches where the
//! token answers nothing at all. Restarts, signatures and disconnects are
//! counted along the way for the operator watching the log.
//!
//! The loading and signing themselves are done by the stock companion
//! tools (`tkey-runapp`, `tkey-sign`), invoked as child processes with a
//! wall-clock deadline. Keysoak owns the part with actual protocol in it:
//! framing the identity and public-key queries, validating what comes
//! back, and telling the firmware states apart under noise.
//!
//! The control flow is implemented as a state machine, in terms of
//! **states** and typed **events** that trigger **transitions** between
//! them:
//!
//! * The machine is in exactly one state at any time, and each state can
//!   carry its own data.
//! * A state does its work when it is run, then hands back the event
//!   naming the transition it wants.
//! * Transitioning consumes the origin state; data moves to the target
//!   state by riding on the event.
//! * A transition exists only where a `From<event>` implementation for
//!   the target state exists, so an illegal transition is a compile
//!   error, not a runtime surprise.

mod actions;
mod probe;
mod proto;
mod settings;
mod soak;
mod utils;

pub use settings::{Settings, SettingsBuilder};
pub use soak::{factory, TokenSoak};
