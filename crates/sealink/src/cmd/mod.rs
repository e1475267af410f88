use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use sealink_crypto::{PrivateKey, DEFAULT_KEY_BITS};
use sealink_frame::USER_PROTOCOL_START;

use crate::exit::{crypto_error, io_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod keygen;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

/// Exit code after Ctrl-C.
pub const INTERRUPTED: i32 = 130;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an RSA private key.
    Keygen(KeygenArgs),
    /// Run an echo server.
    Serve(ServeArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Accept connections and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Keygen(args) => keygen::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Where to write the PKCS#8 private key.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub out: PathBuf,
    /// Modulus size in bits.
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    pub bits: usize,
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (host:port). Port 0 picks a free port.
    pub addr: String,
    /// Private key (PEM) handed out to clients that request it.
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port).
    pub addr: String,
    /// Protocol id to send on.
    #[arg(long, short = 'p', default_value_t = USER_PROTOCOL_START)]
    pub protocol: u16,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Request the peer's public key first and encrypt the message.
    #[arg(long)]
    pub encrypt: bool,
    /// Local private key (PEM). Its public half is delivered to the peer so
    /// replies come back encrypted. Combined with `--encrypt`, the delivery is
    /// itself encrypted and must fit within the peer key's capacity.
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the key exchange or a reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port). Port 0 picks a free port.
    pub addr: String,
    /// Private key (PEM) used to decrypt messages.
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,
    /// Filter to specific protocol ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub protocols: Option<Vec<u16>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn load_private_key(path: &Path) -> CliResult<PrivateKey> {
    let pem = std::fs::read(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    PrivateKey::from_pem(&pem)
        .map_err(|err| crypto_error(&format!("failed loading {}", path.display()), err))
}

/// Exit with [`INTERRUPTED`] on Ctrl-C. Blocking accepts and reads have no
/// other way out.
pub(crate) fn install_ctrlc_handler() -> CliResult<()> {
    ctrlc::set_handler(|| {
        tracing::info!("interrupted");
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
