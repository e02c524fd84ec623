//! `pocket-booth` command-line front-end.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use pocket_booth_app::{
    AppError, Booth, BoothCommand, BoothEvent, BoothSettings, UploadPolicy, api_base_url_from_env,
    app_version, upload_timeout_from_env,
};
use pocket_booth_capture::{
    CameraDevice, SessionObserver, SessionTimings, SyntheticCamera, SystemScheduler,
};
use pocket_booth_config::{
    ConfigResolver, EnvConfigSource, JsonFileStore, ManualConfig, UploadConfig,
};
use pocket_booth_core::StripLength;
use pocket_booth_filters::FilterKind;
use pocket_booth_upload::{HttpUploadTransport, UploadClient};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pocket-booth", version = app_version(), about = "Terminal photo booth")]
struct Cli {
    /// Page URL of this load; its `key` parameter selects a key-based configuration.
    #[arg(long, global = true)]
    page_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take one or more photo strips.
    Shoot(ShootArgs),
    /// Show or edit upload configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List available filters.
    Filters,
}

#[derive(Parser, Debug)]
struct ShootArgs {
    /// Shots per strip (1-4).
    #[arg(long, default_value_t = 4)]
    shots: usize,

    /// Strips to take in this session.
    #[arg(long, default_value_t = 1)]
    strips: usize,

    /// Filter applied to every shot.
    #[arg(long, default_value = "normal")]
    filter: FilterKind,

    /// Camera backend.
    #[arg(long, value_enum, default_value_t = CameraChoice::Synthetic)]
    camera: CameraChoice,

    /// V4L2 device node.
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Directory receiving exported strips.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Upload API base URL (defaults to POCKET_BOOTH_API_BASE_URL).
    #[arg(long)]
    api_base: Option<String>,

    /// What to upload after each strip.
    #[arg(long, value_enum, default_value_t = PolicyChoice::Strip)]
    upload: PolicyChoice,

    /// Skip the countdown and shot delays.
    #[arg(long)]
    fast: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the resolved configuration.
    Show,
    /// Save manual upload settings.
    Set {
        /// Turn uploads on.
        #[arg(long)]
        enabled: bool,
        /// Remote folder id.
        #[arg(long, default_value = "")]
        destination: String,
    },
    /// Forget the session configuration key.
    ClearKey,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CameraChoice {
    /// Generated frames; no hardware needed.
    Synthetic,
    /// Linux webcam (needs the `v4l` feature).
    V4l,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyChoice {
    Strip,
    EachPhoto,
}

impl From<PolicyChoice> for UploadPolicy {
    fn from(choice: PolicyChoice) -> Self {
        match choice {
            PolicyChoice::Strip => UploadPolicy::Strip,
            PolicyChoice::EachPhoto => UploadPolicy::EachPhoto,
        }
    }
}

/// Prints countdown cues and rings the terminal bell on every shutter.
struct TerminalObserver;

impl SessionObserver for TerminalObserver {
    fn on_countdown(&self, remaining: u32) {
        if remaining > 0 {
            println!("{remaining}...");
        } else {
            println!("Smile!");
        }
    }

    fn on_shutter(&self) {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }

    fn on_shot(&self, shot: usize, of: usize) {
        println!("  photo {shot}/{of}");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "pocket-booth failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let resolver = build_resolver();
    if let Some(page_url) = &cli.page_url {
        match resolver.initialize_from_url(page_url)? {
            Some(key) => info!(key = %key, "session configuration key active"),
            None => info!("no session configuration key"),
        }
    }

    match cli.command {
        Command::Shoot(args) => shoot(resolver, args),
        Command::Config { action } => configure(resolver, action),
        Command::Filters => {
            for filter in FilterKind::ALL {
                println!(
                    "{:<16} {:<14} {}",
                    filter.as_str(),
                    filter.display_name(),
                    filter.css_descriptor()
                );
            }
            Ok(())
        }
    }
}

fn build_resolver() -> ConfigResolver {
    let durable_path = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pocket-booth")
        .join("settings.json");
    let session_path = std::env::temp_dir().join("pocket-booth").join("session.json");

    ConfigResolver::new(
        Arc::new(JsonFileStore::open(session_path)),
        Arc::new(JsonFileStore::open(durable_path)),
        Arc::new(EnvConfigSource::new()),
    )
}

fn build_camera(args: &ShootArgs) -> Result<Arc<dyn CameraDevice>, AppError> {
    match args.camera {
        CameraChoice::Synthetic => Ok(Arc::new(SyntheticCamera::new())),
        #[cfg(all(target_os = "linux", feature = "v4l"))]
        CameraChoice::V4l => Ok(Arc::new(pocket_booth_capture::V4lCamera::new(
            args.device.clone(),
        ))),
        #[cfg(not(all(target_os = "linux", feature = "v4l")))]
        CameraChoice::V4l => Err(AppError::Capture(pocket_booth_capture::CaptureError::DeviceAccess(
            format!("{} needs a build with the v4l feature", args.device),
        ))),
    }
}

fn shoot(resolver: ConfigResolver, args: ShootArgs) -> Result<(), AppError> {
    let camera = build_camera(&args)?;
    let timings = if args.fast {
        SessionTimings {
            settle: Duration::ZERO,
            countdown_tick: Duration::ZERO,
            pre_shot: Duration::ZERO,
            inter_shot: Duration::ZERO,
            ..SessionTimings::default()
        }
    } else {
        SessionTimings::default()
    };
    let settings = BoothSettings {
        strip_length: StripLength::new(args.shots)?,
        filter: args.filter,
        timings,
        upload_policy: args.upload.into(),
        ..BoothSettings::default()
    };

    let mut booth = Booth::new(camera, Arc::new(SystemScheduler), resolver, settings)
        .with_observer(Arc::new(TerminalObserver));

    let config = booth.resolver().resolve();
    if config.enabled {
        let api_base = args.api_base.clone().unwrap_or_else(api_base_url_from_env);
        let transport = Arc::new(HttpUploadTransport::new(upload_timeout_from_env())?);
        booth = booth.with_uploads(UploadClient::new(&api_base, transport)?)?;
        info!(api_base = %api_base, "uploads enabled");
    }

    let out_dir = args
        .out
        .clone()
        .or_else(|| dirs::picture_dir().map(|dir| dir.join("pocket-booth")))
        .unwrap_or_else(|| PathBuf::from("pocket-booth-strips"));

    for index in 0..args.strips.max(1) {
        let command = if index == 0 {
            BoothCommand::InsertCoin
        } else {
            BoothCommand::TakeAnother
        };
        let event = match booth.dispatch(command) {
            Ok(event) => event,
            Err(AppError::QuotaExhausted) => {
                warn!("photo limit reached; no more strips for this configuration");
                break;
            }
            Err(error) => return Err(error),
        };

        if let BoothEvent::StripReady { id, uploads_queued } = event {
            if let BoothEvent::StripExported(path) = booth.dispatch(BoothCommand::ExportStrip {
                id,
                dir: out_dir.clone(),
            })? {
                println!("Saved {}", path.display());
            }
            if uploads_queued > 0 {
                println!("Uploading {uploads_queued} file(s)...");
            }
        }
        println!("{}", booth.ui().status_line());
    }

    booth.dispatch(BoothCommand::LeaveBooth)?;

    for outcome in booth.wait_for_uploads(upload_timeout_from_env() * 2) {
        match outcome.result {
            Ok(receipt) => println!("Uploaded {} -> {}", outcome.filename, receipt.web_view_link),
            Err(error) => println!(
                "Upload of {} failed: {error} (strip kept locally)",
                outcome.filename
            ),
        }
    }
    Ok(())
}

fn configure(resolver: ConfigResolver, action: ConfigAction) -> Result<(), AppError> {
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set {
            enabled,
            destination,
        } => resolver.save_manual(&ManualConfig {
            enabled,
            destination_id: destination,
        })?,
        ConfigAction::ClearKey => resolver.clear_key()?,
    }

    print_config(&resolver.resolve(), &resolver);
    Ok(())
}

fn print_config(config: &UploadConfig, resolver: &ConfigResolver) {
    println!("source:        {:?}", config.tier);
    println!("key:           {}", resolver.current_key().unwrap_or_else(|| "-".to_string()));
    println!("uploads:       {}", if config.enabled { "on" } else { "off" });
    println!("locked:        {}", config.locked);
    let destination = if config.destination_id.is_empty() {
        "-"
    } else {
        config.destination_id.as_str()
    };
    println!("destination:   {destination}");
    match resolver.photos_remaining() {
        Some(remaining) => println!(
            "strips left:   {remaining} ({} taken)",
            resolver.photos_taken()
        ),
        None => println!("strips left:   unlimited"),
    }
}
