use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dialoguer::Input;
use snapshell::capture::{CaptureConfig, DeviceKind, Pattern};
use snapshell::encoder::{DENSE_RAMP, EncoderConfig, GlyphRamp, MINIMAL_RAMP, STANDARD_RAMP};
use snapshell::pipeline::PipelineConfig;
use snapshell::signaling::SignalingConfig;
use snapshell::{CloseReason, SessionConfig, run_preview, run_session};
use snapshell_core::{GridSize, IceServerConfig, Role, RoomId};
use snapshell_relay::{DEFAULT_STUN_SERVER, RelayConfig};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snapshell", version)]
#[command(about = "Your webcam as ASCII art, streamed peer-to-peer to another terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a call and send the offer.
    Offer(CallArgs),
    /// Join a call and answer the offer.
    Answer(CallArgs),
    /// Run the signaling relay.
    Relay(RelayArgs),
    /// Show the local camera as ASCII, without any network.
    Preview(CaptureArgs),
}

#[derive(clap::Args)]
struct CallArgs {
    /// Room code shared with the other side. Prompted for when omitted.
    #[arg(short, long)]
    room: Option<String>,

    #[arg(short, long, env = "SNAPSHELL_SERVER", default_value = "ws://localhost:8080/ws")]
    server: String,

    #[command(flatten)]
    capture: CaptureArgs,

    /// Received frames held back for reordering.
    #[arg(long, default_value_t = 3)]
    buffer: usize,

    /// Send changed cells between keyframes instead of full frames.
    #[arg(long)]
    delta: bool,

    #[arg(long, default_value_t = 30)]
    keyframe_interval: u32,
}

#[derive(clap::Args, Clone)]
struct CaptureArgs {
    #[arg(long, default_value_t = 80)]
    cols: u16,

    #[arg(long, default_value_t = 24)]
    rows: u16,

    #[arg(long, default_value_t = 10)]
    fps: u32,

    #[arg(long, value_enum, default_value_t = RampChoice::Standard)]
    ramp: RampChoice,

    /// Camera index.
    #[arg(long, default_value_t = 0)]
    device: u32,

    /// Stream a synthetic gradient instead of the camera.
    #[arg(long)]
    test_pattern: bool,

    /// Flip horizontally, like a mirror.
    #[arg(long)]
    mirror: bool,

    /// Swap dark and light, for light terminal themes.
    #[arg(long)]
    invert: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RampChoice {
    Standard,
    Minimal,
    Dense,
}

#[derive(clap::Args)]
struct RelayArgs {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    #[arg(long, default_value = DEFAULT_STUN_SERVER)]
    stun: Vec<String>,

    #[arg(long, env = "TURN_URLS", value_delimiter = ',')]
    turn_urls: Vec<String>,

    #[arg(long, env = "TURN_USERNAME")]
    turn_username: Option<String>,

    #[arg(long, env = "TURN_PASSWORD", hide_env_values = true)]
    turn_password: Option<String>,

    /// Seconds a dropped participant keeps its slot.
    #[arg(long, default_value_t = 5)]
    rejoin_grace: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Relay(_) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    match cli.command {
        Commands::Offer(args) => run_call(Role::Offerer, args).await,
        Commands::Answer(args) => run_call(Role::Answerer, args).await,
        Commands::Relay(args) => report(run_relay(args).await),
        Commands::Preview(args) => report(
            run_preview(
                capture_config(&args),
                encoder_config(&args),
                io::stdout(),
                shutdown_signal(),
            )
            .await
            .context("preview failed"),
        ),
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run_call(role: Role, args: CallArgs) -> ExitCode {
    let room = match resolve_room(args.room.clone()) {
        Ok(room) => room,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "{}",
        format!("📡 Joining room '{}' as {} via {}", room, role, args.server).cyan()
    );

    let config = session_config(room, role, &args);
    match run_session(config, io::stdout(), shutdown_signal()).await {
        Ok(reason) => {
            let message = match reason {
                CloseReason::LocalClose => "👋 Call ended.",
                CloseReason::PeerLeft => "👋 The other side left the call.",
            };
            eprintln!("{}", message.green().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run_relay(args: RelayArgs) -> Result<()> {
    let mut ice_servers: Vec<IceServerConfig> =
        args.stun.iter().map(IceServerConfig::stun).collect();
    if !args.turn_urls.is_empty() {
        ice_servers.push(IceServerConfig {
            urls: args.turn_urls.clone(),
            username: args.turn_username.clone(),
            credential: args.turn_password.clone(),
        });
    }

    let config = RelayConfig {
        ice_servers,
        rejoin_grace: Duration::from_secs(args.rejoin_grace),
        ..RelayConfig::default()
    };

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    println!(
        "{}",
        format!("🚀 SnapShell relay on ws://{}/ws", args.bind).green().bold()
    );

    tokio::select! {
        served = snapshell_relay::serve(listener, config) => served,
        _ = shutdown_signal() => {
            info!("Relay shutting down");
            Ok(())
        }
    }
}

fn resolve_room(room: Option<String>) -> Result<RoomId> {
    let raw = match room {
        Some(room) => room,
        None if io::stdin().is_terminal() => Input::<String>::new()
            .with_prompt("Room code")
            .interact_text()
            .context("failed to read the room code")?,
        None => bail!("--room is required when stdin is not a terminal"),
    };
    RoomId::new(raw).context("invalid room code")
}

fn session_config(room: RoomId, role: Role, args: &CallArgs) -> SessionConfig {
    let mut config = SessionConfig::new(room, role);
    config.signaling = SignalingConfig {
        server_url: args.server.clone(),
        ..SignalingConfig::default()
    };
    config.encoder = encoder_config(&args.capture);
    config.capture = capture_config(&args.capture);
    config.pipeline = PipelineConfig {
        buffer_capacity: args.buffer,
        delta_frames: args.delta,
        keyframe_interval: args.keyframe_interval,
        ..PipelineConfig::default()
    };
    config
}

fn encoder_config(args: &CaptureArgs) -> EncoderConfig {
    let glyphs = match args.ramp {
        RampChoice::Standard => STANDARD_RAMP,
        RampChoice::Minimal => MINIMAL_RAMP,
        RampChoice::Dense => DENSE_RAMP,
    };
    EncoderConfig {
        grid: GridSize::new(args.cols, args.rows),
        ramp: GlyphRamp::new(glyphs).unwrap_or_default(),
        mirror: args.mirror,
        invert: args.invert,
    }
}

fn capture_config(args: &CaptureArgs) -> CaptureConfig {
    let device = if args.test_pattern {
        DeviceKind::TestPattern(Pattern::Gradient)
    } else {
        DeviceKind::Webcam { index: args.device }
    };
    CaptureConfig {
        device,
        fps: args.fps,
        ..CaptureConfig::default()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn report(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
