use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dsmr_rs::dsmr::encrypted::{DecryptionKey, EncryptedFrameHeader, TelegramDecryptor};
use dsmr_rs::publish::OutputTable;
use dsmr_rs::util::hex::{encode_hex_upper, parse_hex_lenient, pretty_hex};
use dsmr_rs::{
    init_logger, listen, DsmrConfig, DsmrError, DsmrHub, OutputHandle, P1Reader, ReadingSink,
    ReadingValue, SerialConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "dsmr-cli")]
#[command(about = "CLI tool for DSMR P1 smart meter telegrams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read telegrams from a P1 port
    Listen {
        port: String,
        #[arg(short, long, default_value = "115200")]
        baudrate: u32,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Drive DTR as the data request line
        #[arg(long)]
        request_line: bool,
        /// Stop after this many accepted telegrams
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Parse a telegram stored in a file
    Parse {
        file: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Decrypt an encrypted frame stored in a file (binary or hex dump)
    Decrypt {
        file: PathBuf,
        /// 32 hex character key
        #[arg(short, long)]
        key: String,
    },
}

/// Prints readings with their output names and units.
struct PrintSink {
    outputs: OutputTable,
    units: HashMap<OutputHandle, &'static str>,
    show_telegram: bool,
}

impl PrintSink {
    fn new(hub: &DsmrHub, show_telegram: bool) -> Self {
        let outputs = hub.outputs().clone();
        let units = hub
            .registry()
            .iter()
            .filter(|d| d.parser.is_numeric() && !d.parser.unit().is_empty())
            .filter_map(|d| Some((outputs.handle(d.name)?, d.parser.unit())))
            .collect();
        Self {
            outputs,
            units,
            show_telegram,
        }
    }
}

impl ReadingSink for PrintSink {
    fn publish(&mut self, handle: OutputHandle, value: &ReadingValue) {
        let name = self.outputs.name(handle).unwrap_or("?");
        match self.units.get(&handle) {
            Some(unit) => println!("{name}: {value} {unit}"),
            None => println!("{name}: {value}"),
        }
    }

    fn publish_telegram(&mut self, telegram: &str) {
        if self.show_telegram {
            println!("{telegram}");
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DsmrConfig> {
    match path {
        Some(path) => DsmrConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(DsmrConfig::default()),
    }
}

fn read_frame(path: &Path) -> anyhow::Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if raw.first() == Some(&dsmr_rs::constants::ENCRYPTED_START) {
        return Ok(raw);
    }
    let text = String::from_utf8(raw).context("frame file is neither binary nor hex text")?;
    Ok(parse_hex_lenient(&text)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            port,
            baudrate,
            config,
            request_line,
            count,
        } => {
            let config = load_config(config.as_deref())?;
            let mut hub = DsmrHub::from_config(&config);
            let mut sink = PrintSink::new(&hub, config.telegram);
            let serial = SerialConfig {
                baudrate,
                timeout: Duration::from_millis(50),
                request_line,
            };
            let mut reader = P1Reader::connect_with_config(&port, serial).await?;
            log::info!("Listening on {port} ({:?} frames)", hub.mode());

            let stats = listen(&mut reader, &mut hub, &mut sink, count).await?;
            log::info!("{stats:?}");
        }
        Commands::Parse { file, config } => {
            let config = load_config(config.as_deref())?;
            let telegram =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let mut hub = DsmrHub::from_config(&config);
            let mut sink = PrintSink::new(&hub, config.telegram);

            match hub.process_telegram(&telegram, Instant::now(), &mut sink) {
                Ok(readings) => log::info!("{readings} readings published"),
                Err(DsmrError::Telegram(e)) => bail!("{}", e.full_error(&telegram)),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Decrypt { file, key } => {
            let key = DecryptionKey::from_hex(&key)?;
            let frame = read_frame(&file)?;
            log::debug!("Frame read from {}:\n{}", file.display(), pretty_hex(&frame, 16));
            let header = EncryptedFrameHeader::parse(&frame)?;
            if frame.len() < header.total_length() {
                bail!(
                    "frame truncated: header announces {} bytes, file has {}",
                    header.total_length(),
                    frame.len()
                );
            }
            let plaintext = TelegramDecryptor::new(&key).decrypt(&frame)?;
            log::info!(
                "Frame counter {}, system title {}",
                header.frame_counter(),
                encode_hex_upper(&header.system_title)
            );
            print!("{}", String::from_utf8_lossy(&plaintext));
        }
    }

    Ok(())
}
