//! Settings for the keysoak serial link, external tools and loop timing.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `keysoak` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,
    /// How long a port read may block before handing back whatever arrived.
    pub read_timeout: Duration,

    /// Path to the signer app image handed to the loader tool. When not
    /// set, `app.bin` in the current working directory is assumed.
    pub app_image: Option<String>,
    /// The external tool that installs the app image on the token.
    pub loader_bin: String,
    /// The external tool that requests a signature from the token.
    pub signer_bin: String,
    /// Wall-clock deadline for one loader run.
    pub loader_timeout: Duration,
    /// Wall-clock deadline for one signer run.
    pub signer_timeout: Duration,

    /// Wait after loading an app image, before the token is probed again.
    pub settle_delay: Duration,
    /// Wait before re-probing a token that answered nothing.
    pub reconnect_delay: Duration,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set. The defaults match the reference deployment: 62500 baud,
/// 8N1, a 100 ms read timeout and the `tkey-runapp`/`tkey-sign` tools.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 62_500,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                read_timeout: Duration::from_millis(100),
                app_image: None,
                loader_bin: "tkey-runapp".into(),
                signer_bin: "tkey-sign".into(),
                loader_timeout: Duration::from_secs(10),
                signer_timeout: Duration::from_secs(1),
                settle_delay: Duration::from_secs(2),
                reconnect_delay: Duration::from_secs(1),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set how long a port read may block
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = read_timeout;
        self
    }

    /// Set the path to the signer app image
    pub fn app_image<'a>(mut self, app_image: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.app_image = Some(app_image.into().as_ref().to_owned());
        self
    }

    /// Set the loader tool to invoke for installing the app image
    pub fn loader_bin<'a>(mut self, loader_bin: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.loader_bin = loader_bin.into().as_ref().to_owned();
        self
    }

    /// Set the signer tool to invoke for signature requests
    pub fn signer_bin<'a>(mut self, signer_bin: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.signer_bin = signer_bin.into().as_ref().to_owned();
        self
    }

    /// Set the wall-clock deadline for one loader run
    pub fn loader_timeout(mut self, loader_timeout: Duration) -> Self {
        self.settings.loader_timeout = loader_timeout;
        self
    }

    /// Set the wall-clock deadline for one signer run
    pub fn signer_timeout(mut self, signer_timeout: Duration) -> Self {
        self.settings.signer_timeout = signer_timeout;
        self
    }

    /// Set the wait applied after loading an app image
    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settings.settle_delay = settle_delay;
        self
    }

    /// Set the wait applied before re-probing an unresponsive token
    pub fn reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.settings.reconnect_delay = reconnect_delay;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(settings.path, None);
    assert_eq!(settings.baud_rate, 62_500);
    assert_eq!(settings.data_bits, DataBits::Eight);
    assert_eq!(settings.flow_control, FlowControl::None);
    assert_eq!(settings.parity, Parity::None);
    assert_eq!(settings.stop_bits, StopBits::One);
    assert_eq!(settings.read_timeout, Duration::from_millis(100));
    assert_eq!(settings.app_image, None);
    assert_eq!(settings.loader_bin, "tkey-runapp");
    assert_eq!(settings.signer_bin, "tkey-sign");
    assert_eq!(settings.loader_timeout, Duration::from_secs(10));
    assert_eq!(settings.signer_timeout, Duration::from_secs(1));
    assert_eq!(settings.settle_delay, Duration::from_secs(2));
    assert_eq!(settings.reconnect_delay, Duration::from_secs(1));
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyACM0");
}

#[test]
fn baud_rate() {
    let baud_rate = 115_200;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn data_bits() {
    let data_bits = DataBits::Seven;
    let settings = SettingsBuilder::new().data_bits(data_bits).finalize();
    assert_eq!(settings.data_bits, data_bits);
}

#[test]
fn app_image() {
    let settings = SettingsBuilder::new().app_image("signer/app.bin").finalize();
    assert_eq!(settings.app_image.unwrap(), "signer/app.bin");
}

#[test]
fn external_tools() {
    let settings = SettingsBuilder::new()
        .loader_bin("/opt/tkey/tkey-runapp")
        .signer_bin("/opt/tkey/tkey-sign")
        .finalize();
    assert_eq!(settings.loader_bin, "/opt/tkey/tkey-runapp");
    assert_eq!(settings.signer_bin, "/opt/tkey/tkey-sign");
}

#[test]
fn loop_timing() {
    let settings = SettingsBuilder::new()
        .settle_delay(Duration::from_millis(0))
        .reconnect_delay(Duration::from_millis(0))
        .signer_timeout(Duration::from_millis(250))
        .finalize();
    assert_eq!(settings.settle_delay, Duration::from_millis(0));
    assert_eq!(settings.reconnect_delay, Duration::from_millis(0));
    assert_eq!(settings.signer_timeout, Duration::from_millis(250));
}
