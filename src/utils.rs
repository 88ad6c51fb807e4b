//! Helper functions to deal with serial ports.

use log::debug;
use serialport::SerialPort;

use crate::settings::Settings;

/// Open the configured serial device and apply the line settings, including
/// the short read timeout the probing protocol relies on. One port instance
/// is opened per probe and dropped at its end, so stale bytes buffered by a
/// previous session never leak into the next classification.
pub(crate) fn open_and_setup_port(
    settings: &Settings,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let path = settings.path.clone().unwrap();
    let port = serialport::new(&path, settings.baud_rate)
        .data_bits(settings.data_bits)
        .stop_bits(settings.stop_bits)
        .parity(settings.parity)
        .flow_control(settings.flow_control)
        .timeout(settings.read_timeout)
        .open()?;

    debug!(
        "connected to {} at {} baud, read timeout {:?}",
        path, settings.baud_rate, settings.read_timeout
    );

    Ok(port)
}
