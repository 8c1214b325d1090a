use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use van_rs::{init_logger, log_info, Packet, SimBus, VanBus, VanConfig};

#[derive(Parser)]
#[command(name = "van-cli")]
#[command(about = "CLI tool for the PSA VAN comfort bus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a captured edge trace and print the decoded packets
    Decode {
        /// Trace file: one `<cycle> <0|1>` edge per line, `#` comments
        file: String,
        /// Cycle rate the trace timestamps were captured at
        #[arg(long, default_value = "1000000")]
        clock_hz: u64,
        /// Edge classification window in percent of a bit time
        #[arg(long, default_value = "25")]
        tolerance: u8,
        /// Attempt single-bit repair on CRC-flagged packets
        #[arg(long)]
        repair: bool,
        /// Emit the final statistics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Send one frame (requires the raspberry-pi feature)
    Send {
        /// Frame identifier, hex (e.g. 8A4)
        iden: String,
        /// COM nibble, hex (e.g. 8)
        com: String,
        /// Payload bytes, hex (e.g. "0f 07 00 00 00 00 60")
        data: String,
        #[arg(long, default_value = "17")]
        rx_pin: u8,
        #[arg(long, default_value = "27")]
        tx_pin: u8,
    },
    /// Monitor live bus traffic (requires the raspberry-pi feature)
    Live {
        #[arg(long, default_value = "17")]
        rx_pin: u8,
    },
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode {
            file,
            clock_hz,
            tolerance,
            repair,
            json,
        } => decode_trace(&file, clock_hz, tolerance, repair, json),
        Commands::Send {
            iden,
            com,
            data,
            rx_pin,
            tx_pin,
        } => send_frame(&iden, &com, &data, rx_pin, tx_pin),
        Commands::Live { rx_pin } => live_monitor(rx_pin),
    }
}

fn decode_trace(file: &str, clock_hz: u64, tolerance: u8, repair: bool, json: bool) -> Result<()> {
    use van_rs::util::logging::LogThrottle;

    let text = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;

    let config = VanConfig::default()
        .with_clock_hz(clock_hz)
        .with_tolerance_percent(tolerance);
    let mut bus = VanBus::with_hal(SimBus::new(), config)?;

    let mut last_cycle = 0u64;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(cycle), Some(level)) = (parts.next(), parts.next()) else {
            bail!("line {}: expected `<cycle> <0|1>`", lineno + 1);
        };
        let cycle: u64 = cycle
            .parse()
            .with_context(|| format!("line {}: bad cycle count", lineno + 1))?;
        let level = match level {
            "0" => false,
            "1" => true,
            other => bail!("line {}: bad level {other:?}", lineno + 1),
        };
        bus.inject_edge(level, cycle);
        last_cycle = last_cycle.max(cycle);
    }

    // run the clock past the last edge so the tail frame finalizes
    let settle = bus.timing().idle_cycles() * 2;
    bus.hal_mut().advance(last_cycle + settle);

    let mut pkt = Packet::default();
    let mut overrun = false;
    let mut decoded = 0u32;
    let mut damage_throttle = LogThrottle::new(5, std::time::Duration::from_millis(200));
    while bus.receive(&mut pkt, &mut overrun) {
        if repair && !bus.check_and_repair(&mut pkt) && damage_throttle.allow() {
            log::warn!("unrepairable CRC damage in frame IDEN {:03X}", pkt.iden);
        }
        if overrun {
            println!("-- queue overrun before this packet --");
        }
        println!("{pkt}");
        decoded += 1;
    }
    log_info(&format!("decoded {decoded} packets from {file}"));

    if json {
        println!("{}", serde_json::to_string_pretty(&bus.stats())?);
    } else {
        bus.dump_stats(&mut std::io::stdout())?;
    }
    Ok(())
}

#[cfg(feature = "raspberry-pi")]
fn send_frame(iden: &str, com: &str, data: &str, rx_pin: u8, tx_pin: u8) -> Result<()> {
    use van_rs::ComFlags;

    let iden = u16::from_str_radix(iden, 16).context("IDEN must be hex")?;
    let com = u8::from_str_radix(com, 16).context("COM must be a hex nibble")?;
    let data = van_rs::util::hex::decode_hex(data).context("payload must be hex bytes")?;

    let mut bus = VanBus::setup_transceiver(rx_pin, tx_pin)?;
    let ack = bus.sync_send_packet(iden, ComFlags::from_bits_truncate(com), &data)?;
    log_info(&format!("sent IDEN {iden:03X}, ack: {ack:?}"));
    Ok(())
}

#[cfg(not(feature = "raspberry-pi"))]
fn send_frame(_: &str, _: &str, _: &str, _: u8, _: u8) -> Result<()> {
    bail!("`send` needs a build with the raspberry-pi feature");
}

#[cfg(feature = "raspberry-pi")]
fn live_monitor(rx_pin: u8) -> Result<()> {
    use van_rs::util::logging::LogThrottle;

    let mut bus = VanBus::setup(rx_pin)?;
    let mut pkt = Packet::default();
    let mut overrun = false;
    let mut overrun_throttle = LogThrottle::new(5, std::time::Duration::from_millis(200));

    loop {
        while bus.receive(&mut pkt, &mut overrun) {
            if overrun && overrun_throttle.allow() {
                log::warn!("queue overrun: frames lost before seq {}", pkt.seq_no);
            }
            println!("{pkt}");
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

#[cfg(not(feature = "raspberry-pi"))]
fn live_monitor(_: u8) -> Result<()> {
    bail!("`live` needs a build with the raspberry-pi feature");
}
