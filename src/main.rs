use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use drumcall::client::run_client;
use drumcall::{logging, ClientConfig, FeedbackPolicy, SignalEncoding, Transport};
use tracing::error;

#[derive(Parser, Debug)]
#[command(author, version, about = "Join a session and play drums together", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "DRUMCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Session to join
    #[arg(short, long)]
    session: Option<String>,

    /// Display name shown to other participants
    #[arg(short, long)]
    user: Option<String>,

    /// Application server issuing sessions and tokens
    #[arg(long, env = "DRUMCALL_SERVER")]
    server: Option<String>,

    /// Session relay WebSocket URL
    #[arg(long)]
    relay: Option<String>,

    /// SDP signaling WebSocket URL (peer transport)
    #[arg(long)]
    signaling: Option<String>,

    /// Directory holding the drum clips
    #[arg(long)]
    assets: Option<PathBuf>,

    #[arg(long, value_enum)]
    transport: Option<TransportArg>,

    /// Play your own hits before the relay confirms them
    #[arg(long)]
    optimistic: bool,

    /// Send {userName, keyCode} payloads instead of bare clip keys
    #[arg(long)]
    structured: bool,

    /// Play through the audio device (needs the `playback` feature)
    #[arg(long)]
    audio: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TransportArg {
    Relay,
    Peer,
}

impl Args {
    fn into_config(self) -> drumcall::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(session) = self.session {
            config.session_id = session;
        }
        if let Some(user) = self.user {
            config.user_name = user;
        }
        if let Some(server) = self.server {
            config.application_server_url = server;
        }
        if let Some(relay) = self.relay {
            config.relay_url = relay;
        }
        if let Some(signaling) = self.signaling {
            config.signaling_url = signaling;
        }
        if let Some(assets) = self.assets {
            config.asset_dir = assets;
        }
        match self.transport {
            Some(TransportArg::Relay) => config.transport = Transport::Relay,
            Some(TransportArg::Peer) => config.transport = Transport::Peer,
            None => {}
        }
        if self.optimistic {
            config.feedback = FeedbackPolicy::Optimistic;
        }
        if self.structured {
            config.encoding = SignalEncoding::Structured;
        }
        if self.audio {
            config.audio_output = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(logging::level_for(args.verbose));

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_client(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
