use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bltool_core::image::pt_text::parse_int;
use bltool_core::session::{BootRomSession, ShortReadPolicy};
use bltool_core::transport::{SerialTransport, Transport};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Sync attempts before giving up on an unresponsive device.
const SYNC_ATTEMPTS: u32 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "BL602 serial flashing tool", long_about = None)]
struct Args {
    /// Serial port to use (default: last enumerated port)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = 115200)]
    baudrate: u32,

    /// Read BootROM version and OTP information
    #[arg(short, long)]
    info: bool,

    /// Erase the whole flash
    #[arg(short, long)]
    erase: bool,

    /// Write a file to flash: ADDRESS FILE
    #[arg(short, long, num_args = 2, value_names = ["ADDRESS", "FILE"])]
    write: Option<Vec<String>>,

    /// Read from flash: ADDRESS LENGTH FILE
    #[arg(short, long, num_args = 3, value_names = ["ADDRESS", "LENGTH", "FILE"])]
    read: Option<Vec<String>>,

    /// Read back and compare after writing
    #[arg(long)]
    verify: bool,

    /// Second-stage flash loader image
    #[arg(long, default_value = "eflash_loader_rc32m.bin")]
    loader: PathBuf,

    /// Keep going when the loader returns fewer bytes than requested
    #[arg(long)]
    tolerate_short_reads: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let port = match &args.port {
        Some(port) => port.clone(),
        None => default_port()?,
    };
    let transport = SerialTransport::open(&port, args.baudrate)?;

    let mut bootrom = BootRomSession::new(transport)?;
    sync_with_retries("BootROM", || bootrom.sync())?;

    if args.info {
        print_boot_info(&mut bootrom)?;
    }

    if !(args.erase || args.write.is_some() || args.read.is_some()) {
        return Ok(());
    }

    let loader = fs::read(&args.loader)
        .with_context(|| format!("reading loader image {}", args.loader.display()))?;
    info!("Starting flash loader");
    let mut eflash = bootrom.boot_into_loader(&loader)?;
    sync_with_retries("flash loader", || eflash.sync())?;

    if args.erase {
        info!("Erasing flash, this takes a while");
        eflash.erase_flash()?;
    }

    if let Some(write) = &args.write {
        let address = parse_address(&write[0])?;
        let file = write[1].as_str();
        let data = fs::read(file).with_context(|| format!("reading {file}"))?;
        info!(address = format_args!("{address:#010x}"), file, "Writing to flash");
        let bar = progress_bar(data.len() as u64);
        eflash.write_flash(&data, address, |done, _| bar.set_position(done))?;
        bar.finish();

        if args.verify {
            info!("Verifying");
            let bar = progress_bar(data.len() as u64);
            let readback = eflash.read_flash(
                address,
                data.len(),
                read_policy(args),
                |done, _| bar.set_position(done),
            )?;
            bar.finish();
            bltool_core::session::verify(&data, &readback)?;
            info!("Verified");
        }
    }

    if let Some(read) = &args.read {
        let address = parse_address(&read[0])?;
        let length = parse_address(&read[1])? as usize;
        let file = read[2].as_str();
        info!(
            address = format_args!("{address:#010x}"),
            length,
            file,
            "Reading from flash"
        );
        let bar = progress_bar(length as u64);
        let data = eflash.read_flash(address, length, read_policy(args), |done, _| {
            bar.set_position(done)
        })?;
        bar.finish();
        fs::write(file, &data).with_context(|| format!("writing {file}"))?;
    }

    Ok(())
}

fn read_policy(args: &Args) -> ShortReadPolicy {
    if args.tolerate_short_reads {
        ShortReadPolicy::Tolerant
    } else {
        ShortReadPolicy::Strict
    }
}

fn parse_address(value: &str) -> Result<u32> {
    parse_int(value).with_context(|| format!("{value:?} is not a valid address or length"))
}

/// Last enumerated port, which on most systems is the USB adapter
/// plugged in most recently.
fn default_port() -> Result<String> {
    let mut names: Vec<String> = serialport::available_ports()
        .context("enumerating serial ports")?
        .into_iter()
        .map(|p| p.port_name)
        .collect();
    names.sort();
    names.pop().context("no serial ports found, pass --port")
}

fn sync_with_retries<E>(stage: &str, mut sync: impl FnMut() -> Result<bool, E>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    for attempt in 1..=SYNC_ATTEMPTS {
        if sync()? {
            info!("{stage} is in sync");
            return Ok(());
        }
        eprintln!("No response from the {stage} (attempt {attempt}/{SYNC_ATTEMPTS}).");
        eprintln!("Hold BOOT/IO8 and toggle reset to enter the bootloader, then release BOOT.");
    }
    bail!("could not sync with the {stage} after {SYNC_ATTEMPTS} attempts")
}

fn print_boot_info<T: Transport>(session: &mut BootRomSession<T>) -> Result<()> {
    let info = session.get_boot_info()?;
    println!("BootROM version: {}", info.rom_version);
    println!("OTP flags:");
    for row in info.otp_flags.chunks(4) {
        for byte in row {
            print!("{byte:08b} ");
        }
        println!();
    }
    Ok(())
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
