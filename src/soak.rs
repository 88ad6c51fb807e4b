//! The keysoak probe/act/report loop.
//!
//! Every iteration probes the token for its current firmware state and
//! then runs the matching action: load the signer app when the bootloader
//! answers, request a signature when the signer app answers, back off and
//! wait when nothing answers. Run counters accumulate across iterations
//! and are reported after each one.
//!
//! **Example** - Executing the state machine event loop:
//! ```ignore
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyACM0")
//!     .baud_rate(62_500)
//!     .finalize();
//! let mut soak = soak::factory(settings);
//! soak.run();
//! ```

#[macro_use]
mod macros;

mod driver;
mod events;
mod state_machine;
mod states;

pub use state_machine::{factory, TokenSoak};
