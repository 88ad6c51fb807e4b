//! Launching the external loader and signer tools.
//!
//! Installing an app image and requesting a signature are both somebody
//! else's program. All this module owes them is a port name, the right
//! arguments and a wall-clock deadline; all it wants back is whether the
//! run completed, failed or had to be cut off.

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

use crate::settings::Settings;

/// How often a running tool is checked against its deadline.
const WAIT_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Outcome of an external tool run that did not succeed. A timeout is its
/// own kind: the loop treats it as a hiccup, not as a broken setup.
#[derive(Error, Debug)]
pub(crate) enum ActionError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("exited with {0}")]
    Failed(ExitStatus),
    #[error("could not run: {0}")]
    Io(#[from] io::Error),
}

/// Install the configured app image on the token.
pub(crate) fn run_loader(settings: &Settings) -> Result<(), ActionError> {
    let image = settings
        .app_image
        .clone()
        .unwrap_or_else(|| "app.bin".into());
    let port = settings.path.clone().unwrap_or_default();
    debug!("running {} for image {}", settings.loader_bin, image);

    let mut cmd = Command::new(&settings.loader_bin);
    cmd.arg("--port").arg(&port).arg(&image);
    run_with_deadline(cmd, settings.loader_timeout)
}

/// Ask the token to sign the message in `message_file`.
pub(crate) fn run_signer(settings: &Settings, message_file: &Path) -> Result<(), ActionError> {
    let port = settings.path.clone().unwrap_or_default();
    debug!(
        "running {} over {}",
        settings.signer_bin,
        message_file.display()
    );

    let mut cmd = Command::new(&settings.signer_bin);
    cmd.arg("--port").arg(&port).arg(message_file);
    run_with_deadline(cmd, settings.signer_timeout)
}

/// Run a command to completion or to its deadline, whichever comes first.
/// A tool that overruns is killed and reaped, since it is most likely
/// sitting on the serial port the next probe needs.
fn run_with_deadline(mut cmd: Command, limit: Duration) -> Result<(), ActionError> {
    let mut child = cmd.spawn()?;
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(ActionError::Failed(status))
            };
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ActionError::Timeout(limit));
        }
        thread::sleep(WAIT_POLL_PERIOD);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::settings::SettingsBuilder;

    #[test]
    fn completed_run_is_ok() {
        let cmd = Command::new("true");
        assert!(run_with_deadline(cmd, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn nonzero_exit_is_failed() {
        let cmd = Command::new("false");
        match run_with_deadline(cmd, Duration::from_secs(5)) {
            Err(ActionError::Failed(status)) => assert_eq!(status.code(), Some(1)),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn overrun_is_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        match run_with_deadline(cmd, Duration::from_millis(100)) {
            Err(ActionError::Timeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(100))
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn missing_tool_is_io() {
        let cmd = Command::new("keysoak-no-such-tool");
        match run_with_deadline(cmd, Duration::from_secs(1)) {
            Err(ActionError::Io(_)) => {}
            other => panic!("expected Io, got {:?}", other),
        }
    }

    #[test]
    fn loader_arguments_reach_the_tool() {
        // `true` swallows any arguments, so a well-formed invocation of a
        // stand-in loader completes cleanly end to end.
        let settings = SettingsBuilder::new()
            .path("/dev/ttyACM0")
            .loader_bin("true")
            .app_image("app.bin")
            .finalize();
        assert!(run_loader(&settings).is_ok());
    }
}
