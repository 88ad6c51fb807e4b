//! The work items the soak loop performs against the token.
//!
//! Bundling them behind one trait keeps the state machine free of serial
//! and subprocess plumbing, and lets the loop be driven against a scripted
//! stand-in in tests.

use std::io::Write;

use log::debug;
use rand::RngCore;
use tempfile::NamedTempFile;

use crate::actions::{self, ActionError};
use crate::probe::{self, TokenState};
use crate::settings::Settings;

/// Length of the randomly generated message handed to the signer tool.
const SIGN_MSG_LEN: usize = 128;

/// Everything the loop asks of the token and its companion tools.
pub(crate) trait TokenDriver {
    /// Classify the token's current firmware state. Never fails.
    fn probe(&mut self, settings: &Settings) -> TokenState;

    /// Install the configured signer app image on the token.
    fn load_app(&mut self, settings: &Settings) -> Result<(), ActionError>;

    /// Have the token sign a freshly generated message.
    fn sign_fresh_message(&mut self, settings: &Settings) -> Result<(), ActionError>;
}

/// The production driver: real serial port, real external tools.
pub(crate) struct SerialTokenDriver;

impl TokenDriver for SerialTokenDriver {
    fn probe(&mut self, settings: &Settings) -> TokenState {
        probe::probe_state(settings)
    }

    fn load_app(&mut self, settings: &Settings) -> Result<(), ActionError> {
        actions::run_loader(settings)
    }

    fn sign_fresh_message(&mut self, settings: &Settings) -> Result<(), ActionError> {
        // The signer tool reads its message from a file, so the payload
        // goes through a temp file that lives exactly as long as the run.
        let mut msgf = NamedTempFile::new()?;
        let mut msg = [0u8; SIGN_MSG_LEN];
        rand::thread_rng().fill_bytes(&mut msg);
        msgf.write_all(&msg)?;
        msgf.flush()?;
        debug!("message file: {}", msgf.path().display());

        actions::run_signer(settings, msgf.path())
    }
}
