//! Simulate command - run one acquisition against the simulated platform.
//!
//! The scenario (which sources are on, how long each takes to produce a fix,
//! whether a vendor service exists, what the user answers) comes from the
//! command line; the acquisition settings come from the config file.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use locus::config::{config_file_path, ConfigFile, VendorBackendConfig};
use locus::event::{DialogKind, Event, SourceKind, SourceStatus};
use locus::fix::Fix;
use locus::listener::LocationListener;
use locus::logging::{init_logging, LoggingGuard};
use locus::manager::LocationSession;
use locus::platform::{Availability, UiContext};
use locus::sim::{Callback, Prompt, Reply, SimulatedPlatform};
use locus::{FailReason, ProcessStage};

use crate::error::CliError;

/// On/off switch.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Toggle::On
    }
}

/// Vendor service presence.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum VendorMode {
    /// Installed and usable
    Available,
    /// Installed but needs a device-level resolution
    Resolvable,
    /// Installed and unusable
    Unavailable,
    /// Not installed
    Absent,
}

/// Permission state at start.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PermissionMode {
    /// Already granted
    Granted,
    /// Not granted; the OS request is accepted
    Prompt,
    /// Not granted; the OS request is denied
    Deny,
}

/// UI context offered by the simulated host.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum UiMode {
    /// Dialogs and result-returning surfaces
    Foreground,
    /// Context without UI
    Background,
    /// No context
    Detached,
}

impl From<UiMode> for UiContext {
    fn from(mode: UiMode) -> Self {
        match mode {
            UiMode::Foreground => UiContext::Foreground {
                can_launch_for_result: true,
            },
            UiMode::Background => UiContext::Background,
            UiMode::Detached => UiContext::Detached,
        }
    }
}

/// How long a source takes to produce a fix: milliseconds, or `never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay(Option<Duration>);

impl FromStr for Delay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(Delay(None));
        }
        s.parse::<u64>()
            .map(|ms| Delay(Some(Duration::from_millis(ms))))
            .map_err(|_| format!("expected milliseconds or 'never', got '{}'", s))
    }
}

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Configuration file (defaults to ~/.locus/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep delivering fixes after the first one
    #[arg(long)]
    pub keep_tracking: bool,

    /// Whether GNSS is switched on
    #[arg(long, value_enum, default_value = "on")]
    pub gnss: Toggle,

    /// Whether network positioning has connectivity
    #[arg(long, value_enum, default_value = "on")]
    pub network_connected: Toggle,

    /// Milliseconds until GNSS produces a fix (or 'never')
    #[arg(long, default_value = "1500")]
    pub gnss_fix_after: Delay,

    /// Milliseconds until network positioning produces a fix (or 'never')
    #[arg(long, default_value = "3000")]
    pub network_fix_after: Delay,

    /// Vendor fused-location service
    #[arg(long, value_enum, default_value = "absent")]
    pub vendor: VendorMode,

    /// Milliseconds until the vendor service produces a fix (or 'never')
    #[arg(long, default_value = "800")]
    pub vendor_fix_after: Delay,

    /// Permission state
    #[arg(long, value_enum, default_value = "granted")]
    pub permission: PermissionMode,

    /// UI context
    #[arg(long, value_enum, default_value = "foreground")]
    pub ui: UiMode,

    /// Answer dialogs and prompts interactively
    #[arg(long)]
    pub interactive: bool,

    /// Print callbacks as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Stop after this many fixes when tracking
    #[arg(long, default_value = "5")]
    pub max_fixes: usize,
}

/// Listener forwarding every callback to the command loop.
struct ChannelListener {
    tx: mpsc::UnboundedSender<Callback>,
}

impl ChannelListener {
    fn send(&self, callback: Callback) {
        let _ = self.tx.send(callback);
    }
}

impl LocationListener for ChannelListener {
    fn on_location_changed(&mut self, fix: Fix) {
        self.send(Callback::Location(fix));
    }

    fn on_location_failed(&mut self, reason: FailReason) {
        self.send(Callback::Failed(reason));
    }

    fn on_process_stage_changed(&mut self, stage: ProcessStage) {
        self.send(Callback::Stage(stage));
    }

    fn on_permission_granted(&mut self, already_had: bool) {
        self.send(Callback::PermissionGranted { already_had });
    }

    fn on_source_status(&mut self, status: SourceStatus) {
        self.send(Callback::Status(status));
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let path = args.config.clone().unwrap_or_else(config_file_path);
    let mut config = ConfigFile::load_from(&path)?;
    if args.keep_tracking {
        config.location.keep_tracking = true;
    }
    if args.vendor != VendorMode::Absent && config.location.vendor_backend.is_none() {
        config.location.vendor_backend = Some(VendorBackendConfig::default());
    }
    config.location.validate()?;

    let logging =
        init_logging(&config.logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;
    tracing::info!(
        config = %path.display(),
        vendor = ?args.vendor,
        keep_tracking = config.location.keep_tracking,
        "Starting simulated acquisition"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(simulate(args, config, &logging))
}

fn build_platform(args: &SimulateArgs, config: &ConfigFile) -> Arc<SimulatedPlatform> {
    let sim = SimulatedPlatform::new();

    sim.set_source_enabled(SourceKind::Gnss, args.gnss.is_on());
    sim.set_network_connected(args.network_connected.is_on());
    sim.set_fix_after(SourceKind::Gnss, args.gnss_fix_after.0);
    sim.set_fix_after(SourceKind::Network, args.network_fix_after.0);
    sim.set_ui(args.ui.into());

    match args.vendor {
        VendorMode::Absent => {}
        mode => {
            sim.install_vendor();
            sim.set_vendor_fix_after(args.vendor_fix_after.0);
            sim.set_vendor_availability(match mode {
                VendorMode::Resolvable => Availability::Unavailable {
                    code: 2,
                    resolvable: true,
                },
                VendorMode::Unavailable => Availability::Unavailable {
                    code: 9,
                    resolvable: false,
                },
                _ => Availability::Available,
            });
        }
    }

    match args.permission {
        PermissionMode::Granted => {
            for permission in &config.location.permissions.required {
                sim.grant(permission);
            }
        }
        PermissionMode::Prompt => sim.set_permission_reply(Reply::Accept),
        PermissionMode::Deny => sim.set_permission_reply(Reply::Decline),
    }

    if args.interactive {
        if args.permission == PermissionMode::Prompt {
            sim.set_permission_reply(Reply::Prompt);
        }
        sim.set_dialog_reply(DialogKind::PermissionRationale, Reply::Prompt);
        sim.set_dialog_reply(DialogKind::EnableGnss, Reply::Prompt);
        sim.set_launch_reply(Reply::Prompt);
    }
    sim
}

async fn simulate(
    args: SimulateArgs,
    config: ConfigFile,
    logging: &LoggingGuard,
) -> Result<(), CliError> {
    // Diagnostics on stderr would tear through interactive prompts.
    let mute_for_prompts = config.logging.enabled;
    let sim = build_platform(&args, &config);
    let (prompt_tx, mut prompts) = mpsc::unbounded_channel();
    sim.set_prompt_channel(prompt_tx);

    let keep_tracking = config.location.keep_tracking;
    let (callback_tx, mut callbacks) = mpsc::unbounded_channel();
    let session = LocationSession::spawn(
        config.location,
        sim.platform(),
        Box::new(ChannelListener { tx: callback_tx }),
    )?;
    sim.attach(session.weak_sender());

    let interrupted = CancellationToken::new();
    let handler_token = interrupted.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let started = Instant::now();
    let mut fixes = 0usize;
    session.post(Event::Get);

    let result = loop {
        tokio::select! {
            _ = interrupted.cancelled() => {
                if !args.json {
                    println!("{}", style("Interrupted").yellow());
                }
                break Ok(());
            }
            Some(prompt) = prompts.recv() => {
                if mute_for_prompts {
                    set_logging(logging, false);
                }
                let answered = answer(&sim, prompt).await;
                if mute_for_prompts {
                    set_logging(logging, true);
                }
                answered?;
            }
            callback = callbacks.recv() => {
                let Some(callback) = callback else {
                    break Ok(());
                };
                let elapsed = started.elapsed();
                if args.json {
                    println!("{}", callback_json(&callback, elapsed));
                } else {
                    println!("{}", describe(&callback, elapsed));
                }
                match callback {
                    Callback::Location(_) => {
                        fixes += 1;
                        if !keep_tracking || fixes >= args.max_fixes {
                            break Ok(());
                        }
                    }
                    Callback::Failed(reason) => break Err(CliError::Acquisition(reason)),
                    _ => {}
                }
            }
        }
    };

    session.shutdown().await;
    result
}

fn set_logging(logging: &LoggingGuard, enabled: bool) {
    if let Err(e) = logging.set_enabled(enabled) {
        eprintln!("Failed to switch logging: {}", e);
    }
}

/// Ask the user a forwarded question and hand the answer back to the simulation.
async fn answer(sim: &Arc<SimulatedPlatform>, prompt: Prompt) -> Result<(), CliError> {
    let question = match &prompt {
        Prompt::Permission { permissions } => {
            format!("Grant location permissions ({})?", permissions.join(", "))
        }
        Prompt::Dialog { content, .. } => format!("{}: {}", content.title, content.message),
        Prompt::Launch { surface, .. } => format!("Complete {:?}?", surface),
    };

    let accepted = tokio::task::spawn_blocking(move || {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(true)
            .interact()
    })
    .await
    .map_err(|e| CliError::Prompt(e.to_string()))?
    .map_err(|e| CliError::Prompt(e.to_string()))?;

    match prompt {
        Prompt::Permission { permissions } => sim.answer_permissions(permissions, accepted),
        Prompt::Dialog { dialog, .. } => sim.answer_dialog(dialog, accepted),
        Prompt::Launch {
            surface,
            request_code,
        } => sim.answer_launch(surface, request_code, accepted),
    }
    Ok(())
}

fn describe_status(status: &SourceStatus) -> String {
    match status {
        SourceStatus::Enabled { source } => format!("{} enabled", source),
        SourceStatus::Disabled { source } => format!("{} disabled", source),
        SourceStatus::Changed { source, code } => format!("{} status {}", source, code),
    }
}

fn describe(callback: &Callback, elapsed: Duration) -> String {
    let at = format!("[{:>8.3}s]", elapsed.as_secs_f64());
    let body = match callback {
        Callback::Location(fix) => format!("{} {}", style("fix").green().bold(), fix),
        Callback::Failed(reason) => format!("{} {}", style("failed").red().bold(), reason),
        Callback::Stage(stage) => format!("{} {}", style("stage").cyan(), stage),
        Callback::PermissionGranted { already_had: true } => {
            format!("{} already held", style("permission").cyan())
        }
        Callback::PermissionGranted { already_had: false } => {
            format!("{} granted", style("permission").cyan())
        }
        Callback::Status(status) => {
            format!("{} {}", style("status").dim(), describe_status(status))
        }
    };
    format!("{} {}", style(at).dim(), body)
}

fn callback_json(callback: &Callback, elapsed: Duration) -> serde_json::Value {
    let elapsed_ms = elapsed.as_millis() as u64;
    match callback {
        Callback::Location(fix) => json!({ "event": "location", "elapsed_ms": elapsed_ms, "fix": fix }),
        Callback::Failed(reason) => {
            json!({ "event": "failed", "elapsed_ms": elapsed_ms, "reason": reason })
        }
        Callback::Stage(stage) => json!({ "event": "stage", "elapsed_ms": elapsed_ms, "stage": stage }),
        Callback::PermissionGranted { already_had } => {
            json!({ "event": "permission_granted", "elapsed_ms": elapsed_ms, "already_had": already_had })
        }
        Callback::Status(status) => {
            json!({ "event": "source_status", "elapsed_ms": elapsed_ms, "status": status })
        }
    }
}
