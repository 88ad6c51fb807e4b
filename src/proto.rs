//! Command and response frames understood by the token.
//!
//! The token speaks a fixed-layout framing protocol: a request is an opcode
//! byte followed by a protocol version tag, a response is the matching
//! response opcode and version tag followed by a payload of a length fixed
//! per command family. Everything in here is a pure transformation over byte
//! sequences; reading and writing the bytes is the caller's business.

use std::fmt;

use thiserror::Error;

// Request opcodes, each sent with the protocol version tag behind it.
const CMD_GET_NAME_VERSION: u8 = 0x50;
const CMD_GET_PUBKEY: u8 = 0x58;
const CMD_VERSION_TAG: u8 = 0x01;

// Response opcodes and the version tag the token answers with.
const RSP_GET_NAME_VERSION: u8 = 0x52;
const RSP_GET_PUBKEY: u8 = 0x5B;
const RSP_VERSION_TAG: u8 = 0x02;

/// Total length of a name/version response: opcode, version tag, two
/// 4-character names, one version byte and 22 unused bytes.
pub(crate) const NAME_VERSION_RSP_LEN: usize = 33;

/// Total length of a public-key response: opcode, version tag and a
/// 128-byte payload area.
pub(crate) const PUBKEY_RSP_LEN: usize = 129;

/// Length of the key material at the front of the public-key payload. The
/// frame reserves 128 payload bytes but only these carry the key; the rest
/// is padding as far as anyone has observed.
pub(crate) const PUBKEY_LEN: usize = 32;

/// A response that failed header, version or length validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("bad frame length: expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },
    #[error("unexpected response code: expected {expected:#04x}, got {got:#04x}")]
    BadResponseCode { expected: u8, got: u8 },
    #[error("unexpected protocol version: expected {expected:#04x}, got {got:#04x}")]
    BadVersion { expected: u8, got: u8 },
}

/// Name and version information reported by the bootloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NameVersion {
    pub name0: String,
    pub name1: String,
    pub version: u8,
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} v{}", self.name0, self.name1, self.version)
    }
}

/// The signer app's public key, as pulled out of a public-key response.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct PubKey(pub [u8; PUBKEY_LEN]);

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self)
    }
}

/// Build the 2-byte name/version query frame.
pub(crate) fn name_version_query() -> [u8; 2] {
    [CMD_GET_NAME_VERSION, CMD_VERSION_TAG]
}

/// Build the 2-byte public-key query frame.
pub(crate) fn pubkey_query() -> [u8; 2] {
    [CMD_GET_PUBKEY, CMD_VERSION_TAG]
}

/// Validate the fixed parts of a response frame. Length first, so a short
/// read never gets indexed past.
fn check_frame(rsp: &[u8], expected_len: usize, expected_code: u8) -> Result<(), FrameError> {
    if rsp.len() != expected_len {
        return Err(FrameError::BadLength {
            expected: expected_len,
            got: rsp.len(),
        });
    }
    if rsp[0] != expected_code {
        return Err(FrameError::BadResponseCode {
            expected: expected_code,
            got: rsp[0],
        });
    }
    if rsp[1] != RSP_VERSION_TAG {
        return Err(FrameError::BadVersion {
            expected: RSP_VERSION_TAG,
            got: rsp[1],
        });
    }
    Ok(())
}

/// Decode a name/version response from the bootloader.
pub(crate) fn parse_name_version(rsp: &[u8]) -> Result<NameVersion, FrameError> {
    check_frame(rsp, NAME_VERSION_RSP_LEN, RSP_GET_NAME_VERSION)?;
    Ok(NameVersion {
        name0: ascii_field(&rsp[2..6]),
        name1: ascii_field(&rsp[6..10]),
        version: rsp[10],
    })
}

/// Decode a public-key response from the signer app.
pub(crate) fn parse_pubkey(rsp: &[u8]) -> Result<PubKey, FrameError> {
    check_frame(rsp, PUBKEY_RSP_LEN, RSP_GET_PUBKEY)?;
    let mut key = [0u8; PUBKEY_LEN];
    key.copy_from_slice(&rsp[2..2 + PUBKEY_LEN]);
    Ok(PubKey(key))
}

/// One character per byte, the way the token lays its name fields out.
fn ascii_field(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn name_version_frame() -> Vec<u8> {
        let mut rsp = vec![0u8; NAME_VERSION_RSP_LEN];
        rsp[0] = RSP_GET_NAME_VERSION;
        rsp[1] = RSP_VERSION_TAG;
        rsp[2..6].copy_from_slice(b"tk1 ");
        rsp[6..10].copy_from_slice(b"mkdf");
        rsp[10] = 4;
        rsp
    }

    fn pubkey_frame() -> Vec<u8> {
        let mut rsp = vec![0u8; PUBKEY_RSP_LEN];
        rsp[0] = RSP_GET_PUBKEY;
        rsp[1] = RSP_VERSION_TAG;
        for (i, b) in rsp[2..2 + PUBKEY_LEN].iter_mut().enumerate() {
            *b = i as u8;
        }
        rsp
    }

    #[test]
    fn query_frames() {
        assert_eq!(name_version_query(), [0x50, 0x01]);
        assert_eq!(pubkey_query(), [0x58, 0x01]);
    }

    #[test]
    fn name_version_well_formed() {
        let ident = parse_name_version(&name_version_frame()).unwrap();
        assert_eq!(ident.name0, "tk1 ");
        assert_eq!(ident.name1, "mkdf");
        assert_eq!(ident.version, 4);
    }

    #[test]
    fn name_version_is_deterministic() {
        let rsp = name_version_frame();
        assert_eq!(parse_name_version(&rsp), parse_name_version(&rsp));
    }

    #[test]
    fn name_version_bad_code() {
        let mut rsp = name_version_frame();
        rsp[0] = 0x51;
        assert_eq!(
            parse_name_version(&rsp),
            Err(FrameError::BadResponseCode {
                expected: 0x52,
                got: 0x51
            })
        );
    }

    #[test]
    fn name_version_bad_version_tag() {
        let mut rsp = name_version_frame();
        rsp[1] = 0x01;
        assert_eq!(
            parse_name_version(&rsp),
            Err(FrameError::BadVersion {
                expected: 0x02,
                got: 0x01
            })
        );
    }

    #[test]
    fn name_version_short_read() {
        // A read timeout hands the caller whatever arrived; a single header
        // byte must fail on length without touching the name fields.
        let rsp = [RSP_GET_NAME_VERSION];
        assert_eq!(
            parse_name_version(&rsp),
            Err(FrameError::BadLength {
                expected: 33,
                got: 1
            })
        );
    }

    #[test]
    fn pubkey_well_formed() {
        let key = parse_pubkey(&pubkey_frame()).unwrap();
        assert_eq!(key.0[0], 0);
        assert_eq!(key.0[31], 31);
    }

    #[test]
    fn pubkey_takes_only_leading_payload() {
        // Bytes past the 32-byte key are frame padding and must not leak
        // into the key material.
        let mut rsp = pubkey_frame();
        for b in rsp[2 + PUBKEY_LEN..].iter_mut() {
            *b = 0xff;
        }
        let key = parse_pubkey(&rsp).unwrap();
        assert!(key.0.iter().all(|&b| b != 0xff));
        assert_eq!(key.0[31], 31);
    }

    #[test]
    fn pubkey_truncated() {
        let rsp = vec![RSP_GET_PUBKEY, RSP_VERSION_TAG, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            parse_pubkey(&rsp),
            Err(FrameError::BadLength {
                expected: 129,
                got: 10
            })
        );
    }

    #[test]
    fn pubkey_hex_rendering() {
        let mut rsp = pubkey_frame();
        rsp[2] = 0xab;
        let key = parse_pubkey(&rsp).unwrap();
        assert!(key.to_string().starts_with("ab01"));
        assert_eq!(key.to_string().len(), 64);
    }
}
