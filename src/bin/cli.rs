//! Keysoak command line interface.

use std::process;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, trace, LevelFilter};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use simplelog::*;

use keysoak as ks;

fn main() {
    println!("[KS] keysoak v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Keysoak cycles a USB security token through its working life, \
            forever. Each round it probes the token over the serial port to \
            see which firmware is talking:\n\
            \n\
               \t* the bootloader -> the signer app image is loaded with the \
            loader tool, \n\
               \t* the signer app -> a signature over a fresh random message \
            is requested with the signer tool, \n\
               \t* neither -> keysoak waits for the token to come back.\n\
            \n\
            Restart, signature and disconnect counters are printed after \
            every round. Keysoak runs until interrupted and survives the \
            token being unplugged and re-plugged.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the USB tty device to use")
                .long_help(
                    "the USB tty device to use; may change when the token \
                     is unplugged and re-plugged and may differ between \
                     systems.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .default_value("/dev/ttyACM0")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .long_help("serial baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("62500")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits per byte")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking protocol")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLOW_CONTROL")
                .help("flow control mode")
                .short("-f")
                .long("--flow-control")
                .takes_value(true)
                .possible_values(&["none", "soft", "hard"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("LOADER")
                .help("external tool that loads the app image")
                .long("--loader")
                .takes_value(true)
                .default_value("tkey-runapp")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("SIGNER")
                .help("external tool that requests a signature")
                .long("--signer")
                .takes_value(true)
                .default_value("tkey-sign")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("APP_IMAGE")
                .help("path to the signer app image to load")
                .long_help(
                    "path to the signer app image handed to the loader \
                     tool; when not set, keysoak assumes `app.bin` in the \
                     current working directory.",
                )
                .index(1),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'keysoak -v -v -v' or 'keysoak -vvv' vs 'keysoak -v'
    let log_level: LevelFilter;
    match matches.occurrences_of("v") {
        0 => log_level = LevelFilter::Warn,
        1 => log_level = LevelFilter::Info,
        2 => log_level = LevelFilter::Debug,
        _ => log_level = LevelFilter::Trace,
    }

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value will either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style("baud-rate").cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of("BAUD_RATE").unwrap()).on_red()
        );
        process::exit(-1);
    });

    let data_bits = match matches.value_of("DATA_BITS").unwrap() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => unreachable!(),
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap() {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => unreachable!(),
    };

    let parity = match matches.value_of("PARITY").unwrap() {
        "none" => Parity::None,
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => unreachable!(),
    };

    let flow_control = match matches.value_of("FLOW_CONTROL").unwrap() {
        "none" => FlowControl::None,
        "soft" => FlowControl::Software,
        "hard" => FlowControl::Hardware,
        _ => unreachable!(),
    };

    // END - Arguments with default values =====================================

    let mut settings = ks::SettingsBuilder::new()
        .path(matches.value_of("DEVICE_TTY").unwrap())
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .loader_bin(matches.value_of("LOADER").unwrap())
        .signer_bin(matches.value_of("SIGNER").unwrap())
        .finalize();

    // START - Arguments with NO default values ================================

    if matches.is_present("APP_IMAGE") {
        settings.app_image = Some(matches.value_of("APP_IMAGE").unwrap().into());
    }

    // END - Arguments =========================================================

    // Run the state machine ===================================================

    debug!("{:#?}", settings);

    let mut soak = ks::factory(settings);
    soak.run();
}
