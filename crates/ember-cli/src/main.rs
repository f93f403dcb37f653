//! Ember CLI — a reference chat/file-transfer client over the Ember core.
//!
//! Runs a single in-process [`ember_core::node::node::Node`] for the
//! lifetime of the process: `keygen` needs no node at all; every other
//! subcommand starts one, does its work, and (for `run`) drops into an
//! interactive REPL until the user quits.

mod config;
mod progress;

use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use zeroize::Zeroizing;

use config::Config;
use ember_contact::session_manager::SessionManager;
use ember_contact::{ChatContent, CommandPipeline, Contact, ContactStore, Profile};
use ember_core::node::config::{LogLevel, LogOutput, NodeConfig};
use ember_core::node::node::Node;
use ember_core::OverlayTransport;
use ember_crypto::identity::{Identity, PeerId};
use ember_files::transfer::FileMetadata;
use progress::{format_bytes, TransferProgress};

/// Ember — secure, decentralized peer-to-peer chat and file transfer.
#[derive(Parser)]
#[command(name = "ember", author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging, overriding the config file's level.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new Ed25519 identity and print its Peer ID.
    Keygen {
        /// Save the private key (base64 seed) to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start a node and open an interactive session.
    ///
    /// Type `/help` once connected for the command list; bare text
    /// broadcasts to every currently routed peer.
    Run,

    /// Print this node's identity and a snapshot of its idle state, then exit.
    Status,

    /// Hash and chunk a file and send its announcement to a peer.
    ///
    /// Requires the peer to already have an active route (see `/connect`
    /// in `run`); this binary does not itself dial out.
    Send {
        /// File to announce.
        file: PathBuf,
        /// Recipient Peer ID, base32 text form.
        peer_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default()?
    };
    config.validate()?;

    init_logging(&config, cli.verbose);

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Keygen { output } => keygen(output),
        Commands::Run => runtime.block_on(run(&config)),
        Commands::Status => runtime.block_on(status(&config)),
        Commands::Send { file, peer_id } => runtime.block_on(send(&config, &file, &peer_id)),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        parse_log_level(&config.logging.level).to_tracing()
    };
    let builder = tracing_subscriber::fmt().with_max_level(level);
    match &config.logging.file {
        Some(path) => {
            if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
                builder.with_writer(std::sync::Mutex::new(file)).init();
                return;
            }
        }
        None => {}
    }
    builder.init();
}

fn parse_log_level(level: &str) -> LogLevel {
    match level.to_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

fn node_config(config: &Config) -> anyhow::Result<NodeConfig> {
    let mut node_config = config.to_node_config()?;
    node_config.logging = ember_core::node::config::LoggingConfig {
        level: parse_log_level(&config.logging.level),
        output: config
            .logging
            .file
            .clone()
            .map(LogOutput::File)
            .unwrap_or(LogOutput::Stderr),
    };
    Ok(node_config)
}

/// Load the identity named by `identity.private_key_file`, or generate and
/// persist a fresh one if no path is configured.
fn load_or_generate_identity(config: &Config) -> anyhow::Result<Identity> {
    match &config.identity.private_key_file {
        Some(path) if path.exists() => {
            let encoded = Zeroizing::new(std::fs::read_to_string(path)?);
            let mut seed = Zeroizing::new([0u8; 32]);
            let decoded = Zeroizing::new(BASE64.decode(encoded.trim())?);
            anyhow::ensure!(decoded.len() == 32, "private key file does not hold a 32-byte seed");
            seed.copy_from_slice(&decoded);
            Ok(Identity::from_seed(&seed))
        }
        Some(path) => {
            let identity = Identity::generate(&mut rand_core::OsRng);
            persist_identity(&identity, path)?;
            println!("generated a new identity and saved it to {}", path.display());
            Ok(identity)
        }
        None => Ok(Identity::generate(&mut rand_core::OsRng)),
    }
}

fn persist_identity(identity: &Identity, path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = BASE64.encode(identity.seed_bytes());
    std::fs::write(path, encoded)?;
    Ok(())
}

fn keygen(output: Option<PathBuf>) -> anyhow::Result<()> {
    let identity = Identity::generate(&mut rand_core::OsRng);
    println!("Peer ID: {}", identity.peer_id().to_base32());
    println!("Fingerprint: {}", identity.fingerprint().as_str());

    match output {
        Some(path) => {
            persist_identity(&identity, &path)?;
            println!("Private key saved to: {}", path.display());
            println!("Keep this file secret; anyone holding it can impersonate this identity.");
        }
        None => println!("Private key not saved (pass --output to save it)."),
    }
    Ok(())
}

struct Session {
    node: Arc<Node>,
    profile: Profile,
    contacts: Arc<ContactStore>,
    command_pipeline: Arc<CommandPipeline>,
}

async fn start_session(config: &Config) -> anyhow::Result<Session> {
    let identity = load_or_generate_identity(config)?;
    let peer_id = identity.peer_id();
    let profile = Profile::new(config.identity.nickname.clone(), &peer_id);
    let node_config = node_config(config)?;
    let listen_addr = node_config.listen_addr;

    let transport = Arc::new(ember_transport::udp_overlay::UdpOverlay::bind(listen_addr).await?);
    let bound_addr = transport.local_addr()?;
    let rendezvous_config = ember_discovery::manager::DiscoveryConfig::new(
        peer_id,
        bound_addr,
        "ember-rendezvous-v1".to_string(),
    );
    let (discovery, _discovered_rx) = ember_discovery::manager::DiscoveryManager::new(rendezvous_config);
    let discovery = Arc::new(discovery);
    if let Err(err) = discovery.start().await {
        tracing::warn!(%err, "discovery manager failed to start");
    }

    let node = Arc::new(Node::with_full_backends(
        node_config,
        identity,
        Some(discovery as Arc<dyn ember_core::DiscoveryHandle>),
        Some(Arc::clone(&transport) as Arc<dyn ember_core::Dialer>),
        Some(transport as Arc<dyn ember_core::OverlayTransport>),
    ));
    node.start();

    let receive_node = Arc::clone(&node);
    tokio::spawn(async move {
        if let Err(err) = receive_node.run_receive_loop().await {
            tracing::warn!(%err, "node receive loop exited");
        }
    });

    let contacts = Arc::new(ContactStore::new());
    let command_pipeline = Arc::new(CommandPipeline::new(
        Arc::clone(node.identity()),
        Arc::new(SessionManager::new()),
        Arc::clone(&contacts),
        Arc::clone(node.controller()),
    ));
    if let Some(events) = node.controller().take_event_receiver().await {
        tokio::spawn(Arc::clone(&command_pipeline).run(events));
    }

    Ok(Session {
        node,
        profile,
        contacts,
        command_pipeline,
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        self.node.stop();
    }
}

async fn status(config: &Config) -> anyhow::Result<()> {
    let session = start_session(config).await?;
    println!("Peer ID: {}", session.node.peer_id().to_base32());
    println!("Profile: {}", session.profile.full_address());
    println!("Listening on: {}", session.node.config().listen_addr);
    println!("Routed peers: {}", session.node.routing().active_routes().len());
    println!(
        "Discovery: dht={} local_broadcast={} nat_traversal={} relay={}",
        session.node.config().discovery.enable_dht,
        session.node.config().discovery.enable_local_broadcast,
        session.node.config().discovery.enable_nat_traversal,
        session.node.config().discovery.enable_relay,
    );
    Ok(())
}

async fn send(config: &Config, file: &std::path::Path, peer_id_text: &str) -> anyhow::Result<()> {
    anyhow::ensure!(file.exists(), "file not found: {}", file.display());
    let peer_id = PeerId::from_base32(peer_id_text).map_err(|_| anyhow::anyhow!("invalid peer id: {peer_id_text}"))?;

    let size = std::fs::metadata(file)?.len();
    let progress = TransferProgress::new(size, &file.to_string_lossy());
    let metadata = FileMetadata::from_path(file, uuid::Uuid::new_v4())?;
    progress.finish_with_message(format!(
        "hashed {} ({})",
        metadata.filename,
        format_bytes(metadata.size_bytes)
    ));

    let session = start_session(config).await?;
    let payload = ChatContent::File { metadata }.encode()?;
    match session.node.controller().send_to_peer(&peer_id, &payload).await {
        Ok(()) => println!("Announcement sent to {peer_id_text}."),
        Err(err) => {
            anyhow::bail!(
                "could not reach {peer_id_text}: {err}\n(connect to the peer from `ember run` first with /connect)"
            );
        }
    }
    Ok(())
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let session = start_session(config).await?;
    println!("Ember node started.");
    println!("Peer ID: {}", session.node.peer_id().to_base32());
    println!("Profile: {}", session.profile.full_address());
    println!("Type /help for commands, /quit to exit.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !dispatch(&session, line).await {
            break;
        }
    }
    println!("Shutting down.");
    Ok(())
}

/// Handle one REPL line. Returns `false` when the session should end.
async fn dispatch(session: &Session, line: &str) -> bool {
    let mut parts = line.splitn(2, ' ');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match head {
        "/quit" | "/exit" => return false,
        "/help" => print_help(),
        "/status" => print_status(session),
        "/peers" => print_peers(session),
        "/connect" => connect(session, rest).await,
        "/msg" => send_direct(session, rest).await,
        "/history" => print_history(rest),
        "/protect" => println!(
            "contact protection state is not persisted across invocations without a \
             host application's storage layer; track {rest} in your own process if needed"
        ),
        _ if line.starts_with('/') => println!("unknown command: {head} (try /help)"),
        _ => broadcast(session, line).await,
    }
    true
}

fn print_help() {
    println!("/status              show this node's identity and route count");
    println!("/peers               list routed peers");
    println!("/connect <peer_id> <addr>  run the reachability ladder against a peer");
    println!("/msg <peer_id> <text>      send text to exactly one peer");
    println!("/history <peer_id>         placeholder: history is host-application state");
    println!("/quit                      exit");
    println!("(anything else is broadcast to every routed peer)");
}

fn print_status(session: &Session) {
    println!("Peer ID: {}", session.node.peer_id().to_base32());
    println!("Running: {}", session.node.is_running());
    println!("Routed peers: {}", session.node.routing().active_routes().len());
    println!("Open streams: {}", session.node.controller().open_stream_count());
}

fn print_peers(session: &Session) {
    let routes = session.node.routing().active_routes();
    if routes.is_empty() {
        println!("no routed peers");
        return;
    }
    for peer_id in routes {
        let nickname = session
            .contacts
            .get(&peer_id)
            .map(|c: Contact| c.nickname)
            .unwrap_or_else(|| "(unknown)".to_string());
        println!("{} — {}", peer_id.to_base32(), nickname);
    }
}

async fn connect(session: &Session, args: &str) {
    let mut parts = args.split_whitespace();
    let (Some(peer_id_text), Some(addr_text)) = (parts.next(), parts.next()) else {
        println!("usage: /connect <peer_id> <addr>");
        return;
    };
    let Ok(peer_id) = PeerId::from_base32(peer_id_text) else {
        println!("invalid peer id: {peer_id_text}");
        return;
    };
    let Ok(addr) = addr_text.parse() else {
        println!("invalid address: {addr_text}");
        return;
    };
    match session.node.connect(peer_id, addr).await {
        Ok(()) => {
            println!("connected to {peer_id_text}");
            match session
                .command_pipeline
                .initiate_contact(peer_id, session.profile.clone())
                .await
            {
                Ok(()) => println!("contact request sent to {peer_id_text}"),
                Err(err) => println!("contact request failed: {err}"),
            }
        }
        Err(err) => println!("connect failed: {err}"),
    }
}

async fn send_direct(session: &Session, args: &str) {
    let mut parts = args.splitn(2, ' ');
    let (Some(peer_id_text), Some(body)) = (parts.next(), parts.next()) else {
        println!("usage: /msg <peer_id> <text>");
        return;
    };
    let Ok(peer_id) = PeerId::from_base32(peer_id_text) else {
        println!("invalid peer id: {peer_id_text}");
        return;
    };
    let Ok(payload) = (ChatContent::Text { body: body.to_string() }).encode() else {
        println!("failed to encode message");
        return;
    };
    match session.node.controller().send_to_peer(&peer_id, &payload).await {
        Ok(()) => println!("sent"),
        Err(err) => println!("send failed: {err}"),
    }
}

async fn broadcast(session: &Session, text: &str) {
    match (ChatContent::Text { body: text.to_string() }).encode() {
        Ok(payload) => {
            session.node.controller().broadcast(&payload).await;
            println!("broadcast to {} peer(s)", session.node.routing().active_routes().len());
        }
        Err(err) => println!("failed to encode message: {err}"),
    }
}

fn print_history(peer_id: &str) {
    if peer_id.is_empty() {
        println!("usage: /history <peer_id>");
        return;
    }
    println!("chat history for {peer_id} is owned by the host application's storage, not this process");
}
