use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bltool_core::image::{
    assemble_flash_image, BootHeader, PartitionTable, PtDocument, SECTOR_SIZE,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "BL602 boot image tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a boot header, hashed over an optional payload
    GenHeader {
        /// Payload the header should cover
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Assemble a complete flash image
    GenImage {
        /// Second-stage bootloader binary
        #[arg(long)]
        bootloader: PathBuf,

        /// Partition table description (text form)
        #[arg(long)]
        partition_table: PathBuf,

        /// Application binary
        #[arg(long)]
        app: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decode and dump a boot header
    Print {
        /// File starting with a boot header
        file: PathBuf,

        /// Payload to check the embedded hash against
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Convert a text partition table to its binary form
    PtToBin {
        input: PathBuf,
        output: PathBuf,
    },

    /// Convert a binary partition table back to text
    BinToPt {
        input: PathBuf,

        /// Sector of the input file the table sits in
        #[arg(long, default_value_t = 0)]
        sector: usize,
    },
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

    if let Err(e) = run(args.command) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::GenHeader { payload, output } => {
            let header = match payload {
                Some(path) => {
                    let data = read(&path)?;
                    BootHeader::for_payload(&data)
                }
                None => BootHeader::default(),
            };
            fs::write(&output, header.to_bytes())
                .with_context(|| format!("writing {}", output.display()))?;
            info!(output = %output.display(), "Wrote boot header");
        }

        Command::GenImage {
            bootloader,
            partition_table,
            app,
            output,
        } => {
            let bootloader = read(&bootloader)?;
            let text = fs::read_to_string(&partition_table)
                .with_context(|| format!("reading {}", partition_table.display()))?;
            let doc = PtDocument::parse(&text)
                .with_context(|| format!("parsing {}", partition_table.display()))?;
            let app = read(&app)?;

            let image = assemble_flash_image(&bootloader, &doc.table, &app)?;
            fs::write(&output, &image)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                output = %output.display(),
                sectors = image.len() / SECTOR_SIZE,
                "Wrote flash image"
            );
        }

        Command::Print { file, payload } => {
            let data = read(&file)?;
            if data.len() < BootHeader::SIZE {
                bail!("{} is too short to hold a boot header", file.display());
            }
            let header = BootHeader::from_bytes(&data[..BootHeader::SIZE])?;
            print_header(&header);
            if let Some(path) = payload {
                let payload = read(&path)?;
                if header.verify_payload(&payload) {
                    println!("payload hash\t\tmatches");
                } else {
                    warn!("Payload does not match the embedded hash");
                    println!("payload hash\t\tMISMATCH");
                }
            }
        }

        Command::PtToBin { input, output } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let doc =
                PtDocument::parse(&text).with_context(|| format!("parsing {}", input.display()))?;
            info!(entries = doc.table.entries.len(), "Parsed partition table");
            fs::write(&output, doc.table.to_bytes()?)
                .with_context(|| format!("writing {}", output.display()))?;
        }

        Command::BinToPt { input, sector } => {
            let data = read(&input)?;
            let offset = sector * SECTOR_SIZE;
            if offset >= data.len() {
                bail!("sector {sector} is past the end of {}", input.display());
            }
            let table = PartitionTable::from_bytes(&data[offset..])?;
            let mut doc = PtDocument::new(table);
            doc.address0 = Some(0xe000);
            doc.address1 = Some(0xf000);
            print!("{}", doc.render());
        }
    }
    Ok(())
}

fn read(path: &PathBuf) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_header(header: &BootHeader) {
    println!("revision\t\t{}", header.revision);
    println!("bootCfg\t\t\t{:#06x}", header.boot_cfg);
    println!("imgSegmentInfo\t\t{:#x}", header.img_segment_info);
    println!("bootEntry\t\t{:#x}", header.boot_entry);
    println!("imgStart\t\t{:#x}", header.img_start);
    print!("hash\t\t\t");
    for byte in header.hash {
        print!("{byte:02x}");
    }
    println!();
    let clock = &header.clock_config;
    println!("xtalType\t\t{:#04x}", clock.xtal_type);
    println!("pllClk\t\t\t{:#04x}", clock.pll_clk);
    println!("hclkDiv\t\t\t{:#04x}", clock.hclk_div);
    println!("bclkDiv\t\t\t{:#04x}", clock.bclk_div);
    println!("flashClkType\t\t{:#04x}", clock.flash_clk_type);
    println!("flashClkDiv\t\t{:#04x}", clock.flash_clk_div);
    let flash = &header.flash_config;
    println!("ioMode\t\t\t{:#04x}", flash.io_mode);
    println!("mid\t\t\t{:#04x}", flash.mid);
    println!("pageSize\t\t{}", flash.page_size);
    println!("sectorSize\t\t{} KiB", flash.sector_size);
}
