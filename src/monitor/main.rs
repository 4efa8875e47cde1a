use core::time::Duration;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use omon::{
    config::{Credentials, PortalConfig, Timings, constants, default_data_file},
    dashboard::{self, DashboardState},
    poller::{self, PollStats},
    portal::{ChromeLauncher, Orchestrator, status_message},
    snapshot::SnapshotStore,
    util::{Clock, ZoneClock},
};

#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    common: Common,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Common {
    /// Snapshot file shared by the scraper and the dashboard.
    #[arg(long, env = "ORDER_DATA_FILE", value_name = "file", global = true)]
    data_file: Option<PathBuf>,
    #[arg(long, env = "UTC_OFFSET_HOURS", default_value_t = constants::UTC_OFFSET_HOURS, allow_negative_numbers = true, global = true)]
    utc_offset_hours: i32,
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = constants::POLL_INTERVAL.as_secs(), global = true)]
    interval_secs: u64,
}

#[derive(clap::Args)]
struct ScrapeArgs {
    #[arg(long, env = "HKTV_USERNAME", hide_env_values = true)]
    username: Option<String>,
    #[arg(long, env = "HKTV_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "PORTAL_ORIGIN", default_value = constants::PORTAL_ORIGIN)]
    portal: String,
    #[arg(long, value_delimiter = ',', default_values_t = constants::STOREFRONTS.map(String::from))]
    storefronts: Vec<String>,
    /// Show the browser window.
    #[arg(long)]
    headed: bool,
    /// Scrape even when the login form is still shown after logging in.
    #[arg(long)]
    skip_login_check: bool,
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,
    #[arg(short, long, env = "DASHBOARD_PORT", default_value_t = 8501)]
    port: u16,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Scrape in the background and serve the dashboard.
    Serve {
        #[command(flatten)]
        scrape: ScrapeArgs,
        #[command(flatten)]
        server: ServeArgs,
    },
    /// Serve the dashboard only, reading whatever the scraper last wrote.
    Dashboard {
        #[command(flatten)]
        server: ServeArgs,
    },
    /// Run a single cycle and print the snapshot.
    Once {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },
}

impl ScrapeArgs {
    fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }

    fn orchestrator(
        &self,
        credentials: Credentials,
        store: SnapshotStore,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Orchestrator<ChromeLauncher> {
        let timings = Timings::default();
        Orchestrator {
            launcher: ChromeLauncher {
                config: PortalConfig {
                    origin: self.portal.as_str().into(),
                    storefronts: self.storefronts.iter().map(|s| s.trim().into()).collect(),
                    headless: !self.headed,
                },
                timings: timings.clone(),
            },
            credentials,
            store,
            clock,
            timings,
            status_msg: status_message(interval),
            verify_login: !self.skip_login_check,
        }
    }
}

impl ServeArgs {
    const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();

    let clock: Arc<dyn Clock> = Arc::new(ZoneClock::from_hours(args.common.utc_offset_hours)?);
    let store = SnapshotStore::new(args.common.data_file.unwrap_or_else(default_data_file));
    let interval = Duration::from_secs(args.common.interval_secs.max(1));

    let state = |stats: Option<Arc<parking_lot::Mutex<PollStats>>>| DashboardState {
        store: store.clone(),
        clock: Arc::clone(&clock),
        stale_after: interval * 2,
        refresh: constants::DASHBOARD_REFRESH,
        stats,
    };

    match args.command {
        Commands::Serve { scrape, server } => {
            let handle = poller::start_if_configured(scrape.credentials(), interval, |credentials| {
                scrape.orchestrator(credentials, store.clone(), Arc::clone(&clock), interval)
            });
            dashboard::serve(server.addr(), state(handle.as_ref().map(poller::PollerHandle::shared_stats))).await?;
        }
        Commands::Dashboard { server } => {
            dashboard::serve(server.addr(), state(None)).await?;
        }
        Commands::Once { scrape } => {
            let credentials = scrape
                .credentials()
                .ok_or_else(|| anyhow::anyhow!("account or password missing (HKTV_USERNAME / HKTV_PASSWORD)"))?;
            let orchestrator = scrape.orchestrator(credentials, store.clone(), Arc::clone(&clock), interval);
            let snapshot = tokio::task::spawn_blocking(move || orchestrator.run_cycle()).await??;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
