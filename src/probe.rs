//! Token state probing over the serial link.
//!
//! The token runs exactly one of two firmware images at a time: the
//! bootloader, which answers the name/version query, or the signer app,
//! which answers the public-key query. A probe writes a block of idle bytes
//! to resynchronize the token's command parser, issues a query, and tries
//! to decode the answer. Whichever query decodes first names the state; a
//! token that answers neither is reported as unknown rather than as an
//! error, because an unplugged or still-booting device is a normal sight
//! in a long soak run.

use std::fmt;
use std::io::{self, Read, Write};

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, Level::Debug};
use retry::{delay::NoDelay, retry_with_index};
use serialport::SerialPort;
use thiserror::Error;

use crate::proto::{self, FrameError, NameVersion, PubKey};
use crate::settings::Settings;
use crate::utils::open_and_setup_port;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Size of the idle-byte block written before each query. The token's
/// command parser may be mid-frame from an earlier, unrelated exchange;
/// a full block of the idle opcode value walks it back to a frame start.
const SYNC_BLOCK_LEN: usize = 128;

/// Retries per detection phase, on top of the initial attempt. Two
/// attempts per phase keeps the probe bounded in time.
const CHECK_RETRIES: usize = 1;

/// The firmware state a probe detected on the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenState {
    /// The signer app answered the public-key query.
    SignerApp,
    /// The bootloader answered the name/version query.
    Bootloader,
    /// Neither query got a valid answer.
    Unknown,
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenState::SignerApp => "signer",
            TokenState::Bootloader => "bootloader",
            TokenState::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One failed query exchange. Matched only to log it and move on to the
/// next attempt; it never leaves this module.
#[derive(Error, Debug)]
pub(crate) enum CheckError {
    #[error("link error: {0}")]
    Link(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Byte-level access to the token, narrow enough to script in tests.
///
/// `recv` blocks up to the configured read timeout and hands back whatever
/// arrived, which may be fewer bytes than asked for, including none. A
/// short read is not an error here; the frame codec's length check decides
/// what to make of it.
pub(crate) trait TokenLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn recv(&mut self, len: usize) -> io::Result<Vec<u8>>;
}

impl TokenLink for Box<dyn SerialPort> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }

    fn recv(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut got = 0;
        while got < len {
            match self.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(got);
        Ok(buf)
    }
}

/// Probe the token and classify its current firmware state.
///
/// This never fails: a port that cannot be opened, a link that errors out
/// and a token that stays silent all degrade to [`TokenState::Unknown`].
pub(crate) fn probe_state(settings: &Settings) -> TokenState {
    match open_and_setup_port(settings) {
        Ok(mut port) => classify(&mut port),
        Err(ref e) => {
            info!("error: {}", e.to_string());
            TokenState::Unknown
        }
    }
}

/// Classify the device behind an already open link.
///
/// Signer detection runs first and short-circuits: a token that is busy
/// being a signer app is never asked whether it is also a bootloader.
pub(crate) fn classify(link: &mut dyn TokenLink) -> TokenState {
    match retry_with_index(NoDelay.take(CHECK_RETRIES), |attempt| {
        debug!("signer app check, attempt {}", attempt);
        signer_check(link)
    }) {
        Ok(key) => {
            debug!("token public key: {}", key);
            return TokenState::SignerApp;
        }
        Err(retry::Error::Operation { error, tries, .. }) => {
            debug!("no signer app after {} tries: {}", tries, error);
        }
        Err(retry::Error::Internal(msg)) => {
            info!("internal retry error: {}", msg);
        }
    }

    match retry_with_index(NoDelay.take(CHECK_RETRIES), |attempt| {
        debug!("bootloader check, attempt {}", attempt);
        bootloader_check(link)
    }) {
        Ok(ident) => {
            debug!("bootloader identity: {}", ident);
            return TokenState::Bootloader;
        }
        Err(retry::Error::Operation { error, tries, .. }) => {
            debug!("no bootloader after {} tries: {}", tries, error);
        }
        Err(retry::Error::Internal(msg)) => {
            info!("internal retry error: {}", msg);
        }
    }

    TokenState::Unknown
}

// =============================================================================
// Private stuff
// =============================================================================

/// One signer-app detection attempt: sync, query, decode. Any key value is
/// accepted; presence of a well-formed answer is the whole check.
fn signer_check(link: &mut dyn TokenLink) -> Result<PubKey, CheckError> {
    link.send(&[0u8; SYNC_BLOCK_LEN])?;
    link.send(&proto::pubkey_query())?;
    let rsp = link.recv(proto::PUBKEY_RSP_LEN)?;
    dump_frame(&rsp);
    Ok(proto::parse_pubkey(&rsp)?)
}

/// One bootloader detection attempt. The reported name fields are not
/// compared against the known firmware identity, only logged by the caller.
fn bootloader_check(link: &mut dyn TokenLink) -> Result<NameVersion, CheckError> {
    link.send(&[0u8; SYNC_BLOCK_LEN])?;
    link.send(&proto::name_version_query())?;
    let rsp = link.recv(proto::NAME_VERSION_RSP_LEN)?;
    dump_frame(&rsp);
    Ok(proto::parse_name_version(&rsp)?)
}

/// Dump a received frame in a hex table for debugging.
fn dump_frame(rsp: &[u8]) {
    if log_enabled!(Debug) {
        let view = HexViewBuilder::new(rsp)
            .address_offset(0)
            .row_width(16)
            .finish();
        println!("{}", view);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// A link that replays scripted responses and records every write.
    struct ScriptedLink {
        responses: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        fail_sends: bool,
    }

    impl ScriptedLink {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            ScriptedLink {
                responses: responses.into(),
                writes: Vec::new(),
                fail_sends: false,
            }
        }

        fn silent() -> Self {
            ScriptedLink::new(Vec::new())
        }
    }

    impl TokenLink for ScriptedLink {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_sends {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"));
            }
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn recv(&mut self, _len: usize) -> io::Result<Vec<u8>> {
            // An empty answer is what a read timeout looks like.
            Ok(self.responses.pop_front().unwrap_or_default())
        }
    }

    fn pubkey_frame() -> Vec<u8> {
        let mut rsp = vec![0u8; proto::PUBKEY_RSP_LEN];
        rsp[0] = 0x5b;
        rsp[1] = 0x02;
        for b in rsp[2..2 + proto::PUBKEY_LEN].iter_mut() {
            *b = 0xab;
        }
        rsp
    }

    fn name_version_frame() -> Vec<u8> {
        let mut rsp = vec![0u8; proto::NAME_VERSION_RSP_LEN];
        rsp[0] = 0x52;
        rsp[1] = 0x02;
        rsp[2..6].copy_from_slice(b"tk1 ");
        rsp[6..10].copy_from_slice(b"mkdf");
        rsp[10] = 4;
        rsp
    }

    #[test]
    fn signer_detected_short_circuits() {
        let mut link = ScriptedLink::new(vec![pubkey_frame()]);
        assert_eq!(classify(&mut link), TokenState::SignerApp);
        // One attempt only: one sync block, one query, and no bootloader
        // traffic afterwards.
        assert_eq!(link.writes.len(), 2);
        assert_eq!(link.writes[0], vec![0u8; SYNC_BLOCK_LEN]);
        assert_eq!(link.writes[1], proto::pubkey_query().to_vec());
    }

    #[test]
    fn bootloader_detected_after_signer_misses() {
        let mut link = ScriptedLink::new(vec![
            Vec::new(),
            Vec::new(),
            name_version_frame(),
        ]);
        assert_eq!(classify(&mut link), TokenState::Bootloader);
        // Two failed signer attempts, then the first bootloader attempt hit.
        assert_eq!(link.writes.len(), 6);
        assert_eq!(link.writes[5], proto::name_version_query().to_vec());
    }

    #[test]
    fn silent_token_is_unknown_after_bounded_attempts() {
        let mut link = ScriptedLink::silent();
        assert_eq!(classify(&mut link), TokenState::Unknown);
        // Exactly 2 + 2 attempts: each writes a sync block and a query.
        assert_eq!(link.writes.len(), 8);
    }

    #[test]
    fn send_failure_is_swallowed() {
        let mut link = ScriptedLink::silent();
        link.fail_sends = true;
        assert_eq!(classify(&mut link), TokenState::Unknown);
    }

    #[test]
    fn second_attempt_recovers_from_noise() {
        let garbled = vec![0xffu8; proto::PUBKEY_RSP_LEN];
        let mut link = ScriptedLink::new(vec![garbled, pubkey_frame()]);
        assert_eq!(classify(&mut link), TokenState::SignerApp);
        assert_eq!(link.writes.len(), 4);
    }

    #[test]
    fn truncated_identity_falls_through_to_unknown() {
        // The bootloader answers, but a byte short both times.
        let short = name_version_frame()[..32].to_vec();
        let mut link = ScriptedLink::new(vec![
            Vec::new(),
            Vec::new(),
            short.clone(),
            short,
        ]);
        assert_eq!(classify(&mut link), TokenState::Unknown);
    }
}
