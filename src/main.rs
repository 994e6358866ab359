//! # BoraBuz: shuttle departure alerts
//!
//! Configures recurring alerts for UFBA shuttle lines and stops and delivers
//! them from a background runtime.
//!
//! Usage:
//!   borabuz daemon                              # Deliver alerts until Ctrl-C
//!   borabuz alert set line b1 --advance 10      # Alert 10 min before every B1 departure
//!   borabuz alert set stop reitoria --times 07:00 --after 5 --stop-directions volta
//!   borabuz queue                               # Show pending notifications
//!   borabuz test                                # Send a test notification

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use borabuz_core::alert::{AlertConfig, Direction, ItemType, Permission};
use borabuz_core::config::BoraBuzConfig;
use borabuz_core::dataset::LineDirectory;
use borabuz_scheduler::{
    AlertDb, DeliveryRuntime, ForegroundBridge, NotificationPlatform, RuntimeHandle,
    RuntimeOptions, create_platform,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "borabuz", version, about = "🚌 BoraBuz — shuttle departure alerts")]
struct Cli {
    /// Config file (default: ~/.borabuz/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery runtime until Ctrl-C
    Daemon,
    /// Configure alerts
    Alert {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// List queued notifications
    Queue {
        /// Include already delivered records
        #[arg(long)]
        all: bool,
    },
    /// Send a test notification (never queued)
    Test {
        #[arg(long, default_value = "Teste BoraBuz")]
        title: String,
        #[arg(long, default_value = "As notificações estão funcionando!")]
        body: String,
    },
    /// Show or change notification permission
    Permission {
        /// Prompt now if undetermined
        #[arg(long)]
        request: bool,
        /// Overwrite the stored answer
        #[arg(long, value_enum, conflicts_with = "request")]
        set: Option<PermissionArg>,
    },
    /// List lines and their stops
    Lines,
    /// Recent delivery attempts
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// Create or replace an alert
    Set {
        #[arg(value_enum)]
        item_type: ItemArg,
        item_id: String,
        /// Per-direction alert key
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
        /// Departure times (HH:MM). Defaults to the published schedule.
        #[arg(short, long, value_delimiter = ',')]
        times: Vec<String>,
        /// Minutes before departure (0 = at departure)
        #[arg(short, long, value_delimiter = ',', default_value = "0")]
        advance: Vec<u32>,
        /// Minutes after departure
        #[arg(long, value_delimiter = ',')]
        after: Vec<u32>,
        /// Stop alerts: directions to list in the message
        #[arg(long, value_enum, value_delimiter = ',')]
        stop_directions: Vec<DirectionArg>,
        /// Display name (defaults to the dataset name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Disable an alert but keep its settings
    Off {
        #[arg(value_enum)]
        item_type: ItemArg,
        item_id: String,
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
    },
    /// Remove every alert of an item (all directions)
    Remove {
        #[arg(value_enum)]
        item_type: ItemArg,
        item_id: String,
    },
    /// Show one alert
    Show {
        #[arg(value_enum)]
        item_type: ItemArg,
        item_id: String,
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
    },
    /// List all alerts
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemArg {
    #[value(alias = "linha")]
    Line,
    #[value(alias = "ponto")]
    Stop,
}

impl From<ItemArg> for ItemType {
    fn from(arg: ItemArg) -> Self {
        match arg {
            ItemArg::Line => ItemType::Line,
            ItemArg::Stop => ItemType::Stop,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    #[value(alias = "outbound")]
    Ida,
    #[value(alias = "inbound")]
    Volta,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Ida => Direction::Outbound,
            DirectionArg::Volta => Direction::Inbound,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PermissionArg {
    Granted,
    Denied,
    Default,
}

impl From<PermissionArg> for Permission {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Granted => Permission::Granted,
            PermissionArg::Denied => Permission::Denied,
            PermissionArg::Default => Permission::Default,
        }
    }
}

/// Everything a command needs: config, dataset, platform and the DB path.
struct App {
    config: BoraBuzConfig,
    directory: Arc<LineDirectory>,
    platform: Arc<dyn NotificationPlatform>,
}

impl App {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        let config = match path {
            Some(p) => BoraBuzConfig::load_from(p)?,
            None => BoraBuzConfig::load()?,
        };
        let directory = Arc::new(config.load_directory()?);
        let platform = create_platform(&config.notifications)?;
        tracing::debug!(
            "📂 Config loaded: database {}, {} line(s), platform {}",
            config.db_path().display(),
            directory.lines.len(),
            platform.name()
        );
        Ok(Self {
            config,
            directory,
            platform,
        })
    }

    /// A new connection, one per execution context.
    fn connect(&self) -> Result<Arc<AlertDb>> {
        let path = self.config.db_path();
        let db = AlertDb::open(&path)
            .with_context(|| format!("opening alert database {}", path.display()))?;
        Ok(Arc::new(db))
    }

    fn runtime(&self) -> Result<DeliveryRuntime> {
        Ok(DeliveryRuntime::new(
            self.connect()?,
            self.platform.clone(),
            self.directory.clone(),
            RuntimeOptions::from(&self.config),
        ))
    }

    /// Bridge wired to a dormant runtime living as long as the command.
    fn bridge(&self) -> Result<(ForegroundBridge, RuntimeHandle)> {
        let handle = self.runtime()?.spawn();
        let bridge = ForegroundBridge::new(self.connect()?, self.platform.clone(), handle.sender());
        Ok((bridge, handle))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "borabuz=debug,borabuz_scheduler=debug,borabuz_core=debug"
    } else {
        "borabuz=info,borabuz_scheduler=info,borabuz_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let app = App::load(cli.config.as_ref())?;

    match cli.command {
        Command::Daemon => run_daemon(&app).await,
        Command::Alert { action } => run_alert(&app, action).await,
        Command::Queue { all } => show_queue(&app, all),
        Command::Test { title, body } => {
            let (bridge, handle) = app.bridge()?;
            let sent = bridge.send_test(&title, &body).await;
            handle.shutdown().await;
            if !sent {
                bail!("test notification not sent (permission: {})", bridge.permission().as_str());
            }
            Ok(())
        }
        Command::Permission { request, set } => {
            let (bridge, handle) = app.bridge()?;
            if let Some(p) = set {
                app.connect()?.set_permission(p.into())?;
            } else if request {
                bridge.request_permission().await;
            }
            handle.shutdown().await;
            println!("🔔 Notification permission: {}", bridge.permission().as_str());
            Ok(())
        }
        Command::Lines => {
            show_lines(&app.directory);
            Ok(())
        }
        Command::History { limit } => show_history(&app, limit),
    }
}

async fn run_daemon(app: &App) -> Result<()> {
    let handle = app.runtime()?.spawn_active();
    println!("🚌 BoraBuz v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:  {}", app.config.db_path().display());
    println!("   🔔 Platform:  {}", app.platform.name());
    println!(
        "   ⏰ Polling:   every {}s",
        app.config.scheduler.poll_interval_secs
    );
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    println!("\n⏹️  Stopping...");
    handle.shutdown().await;
    Ok(())
}

async fn run_alert(app: &App, action: AlertAction) -> Result<()> {
    match action {
        AlertAction::Set {
            item_type,
            item_id,
            direction,
            times,
            advance,
            after,
            stop_directions,
            name,
        } => {
            let item_type = ItemType::from(item_type);
            let times = if times.is_empty() {
                app.directory.schedules_for(item_type, &item_id)
            } else {
                times
            };
            if times.is_empty() {
                bail!("no departure times for {item_type} '{item_id}'; pass --times HH:MM");
            }
            let name = name.unwrap_or_else(|| app.directory.item_name(item_type, &item_id));
            let mut config = AlertConfig::new(item_type, &item_id, &name, direction.map(Into::into))
                .with_recurring_times(times)
                .with_advance_times(advance)
                .with_after_departure_times(after);
            if !stop_directions.is_empty() {
                config = config.with_stop_directions(stop_directions.into_iter().map(Into::into));
            }

            let (bridge, handle) = app.bridge()?;
            let result = bridge.try_apply_config(&config).await;
            handle.shutdown().await;
            let saved = result?;

            let pending = app
                .connect()?
                .records_for_item(item_type, &item_id)?
                .into_iter()
                .filter(|r| !r.processed && r.config_snapshot.direction == saved.direction)
                .count();
            println!("✅ Alert saved: {} ({pending} notification(s) queued)", saved.id);
            Ok(())
        }
        AlertAction::Off {
            item_type,
            item_id,
            direction,
        } => {
            let item_type = ItemType::from(item_type);
            let (bridge, handle) = app.bridge()?;
            let existing = bridge
                .store()
                .load(item_type, &item_id, direction.map(Into::into))?;
            let Some(config) = existing else {
                handle.shutdown().await;
                bail!("no alert configured for {item_type} '{item_id}'");
            };
            let result = bridge.try_apply_config(&config.disabled()).await;
            handle.shutdown().await;
            let saved = result?;
            println!("🔕 Alert disabled: {}", saved.id);
            Ok(())
        }
        AlertAction::Remove { item_type, item_id } => {
            let item_type = ItemType::from(item_type);
            let (bridge, handle) = app.bridge()?;
            let result = bridge.try_teardown(item_type, &item_id);
            handle.shutdown().await;
            result?;
            println!("🗑️  Alerts removed for {item_type} '{item_id}'");
            Ok(())
        }
        AlertAction::Show {
            item_type,
            item_id,
            direction,
        } => {
            let db = app.connect()?;
            let id = AlertConfig::config_id(item_type.into(), &item_id, direction.map(Into::into));
            match db.get_config(&id)? {
                Some(config) => println!("{}", serde_json::to_string_pretty(&config)?),
                None => bail!("no alert configured ({id})"),
            }
            Ok(())
        }
        AlertAction::List => {
            let configs = app.connect()?.list_configs()?;
            if configs.is_empty() {
                println!("No alerts configured.");
            }
            for c in configs {
                let status = if c.enabled { "🔔" } else { "🔕" };
                println!(
                    "{status} {:<32} {} | times: {} | advance: {:?} | after: {:?}",
                    c.id,
                    c.item_name,
                    c.recurring_times.join(","),
                    c.advance_times,
                    c.after_departure_times
                );
            }
            Ok(())
        }
    }
}

fn show_queue(app: &App, all: bool) -> Result<()> {
    let records = app.connect()?.all_records()?;
    let mut shown = 0;
    for r in records.iter().filter(|r| all || !r.processed) {
        let when = r
            .scheduled_local()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| r.scheduled_time_epoch_ms.to_string());
        let mark = if r.processed { "✔" } else { "⏳" };
        println!("{mark} {when}  {}", r.id);
        shown += 1;
    }
    if shown == 0 {
        println!("Queue is empty.");
    }
    Ok(())
}

fn show_lines(directory: &LineDirectory) {
    for line in &directory.lines {
        println!("🚌 {} — {} ({} departures)", line.name, line.display_name, line.schedules.len());
        for (label, route) in [("Ida", &line.route_ida), ("Volta", &line.route_volta)] {
            let names: Vec<_> = route
                .iter()
                .map(|id| directory.item_name(ItemType::Stop, id))
                .collect();
            println!("   {label}: {}", names.join(" → "));
        }
    }
}

fn show_history(app: &App, limit: usize) -> Result<()> {
    let entries = app.connect()?.recent_deliveries(limit)?;
    if entries.is_empty() {
        println!("No notifications delivered yet.");
    }
    for e in entries {
        let mark = if e.status == "sent" { "✅" } else { "❌" };
        println!("{mark} {} {} — {}", e.created_at, e.title, e.body);
        if let Some(err) = e.error {
            println!("   error: {err}");
        }
    }
    Ok(())
}
