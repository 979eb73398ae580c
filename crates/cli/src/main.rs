use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use slurmrest_api::{
    ClientConfig, EventKind, SlurmClient, WatchEvent, WatchJobsOptions, WatchNodesOptions, WatchOptions, WatchPhase,
    Watchable,
};
use slurmrest_core::prelude::*;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "slurmrestctl", version, about = "Query and watch a Slurm cluster through slurmrestd")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// API version or alias (latest, stable); detected from the server when unset
    #[arg(long = "api-version", global = true)]
    api_version: Option<String>,

    /// slurmrestd base URL (default: SLURM_REST_URL)
    #[arg(long = "url", global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Client API version and cluster release
    Version,
    /// Ping the controllers
    Ping,
    /// Node and job totals
    Stats,
    /// List jobs
    Jobs {
        #[arg(long = "user")]
        user: Option<String>,
        /// Job state filter, repeatable (e.g. RUNNING)
        #[arg(long = "state")]
        state: Vec<String>,
    },
    /// Show one job
    Job { id: u32 },
    /// List nodes
    Nodes,
    /// List partitions
    Partitions,
    /// List accounts
    Accounts,
    /// List reservations (API v0.0.43+)
    Reservations,
    /// Cancel a job
    Cancel { id: u32 },
    /// Stream lifecycle events until Ctrl-C
    Watch {
        #[command(subcommand)]
        target: WatchTarget,
    },
}

#[derive(Subcommand, Debug)]
enum WatchTarget {
    Jobs {
        /// Poll interval in seconds
        #[arg(long = "interval")]
        interval: Option<u64>,
    },
    Nodes {
        #[arg(long = "interval")]
        interval: Option<u64>,
    },
}

fn init_tracing() {
    let env = std::env::var("SLURMREST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SLURMREST_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid SLURMREST_METRICS_ADDR; expected host:port");
        }
    }
}

async fn connect(cli: &Cli) -> Result<SlurmClient> {
    let mut cfg = ClientConfig::from_env();
    if let Some(v) = &cli.api_version {
        cfg.api_version = v.clone();
    }
    if let Some(u) = &cli.url {
        cfg.base_url = u.clone();
    }
    info!(url = %cfg.base_url, api_version = %cfg.api_version, "connecting");
    match cfg.builder()?.build().await {
        Ok(c) => Ok(c),
        Err(SlurmError::VersionDetection(msg)) => {
            warn!(reason = %msg, "version detection failed; using stable");
            Ok(cfg.builder()?.version("stable").build().await?)
        }
        Err(e) => Err(e.into()),
    }
}

fn emit<T: Serialize>(out: Output, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match out {
        Output::Human => human(value),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn opt_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "-".into())
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::New => "new",
        EventKind::StateChanged => "changed",
        EventKind::Completed => "completed",
        EventKind::Removed => "removed",
        EventKind::Error => "error",
    }
}

fn print_event<R: Watchable>(out: Output, ev: &WatchEvent<R>) -> Result<()> {
    match out {
        Output::Human => {
            let at = ev.at.format("%H:%M:%S");
            let id = ev.id.as_ref().map(|i| i.to_string()).unwrap_or_else(|| "-".into());
            let show = |s: &Option<R::State>| s.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            match &ev.error {
                Some(e) => println!("{at} {:<9} {} {e}", kind_label(ev.kind), ev.resource_kind),
                None => println!(
                    "{at} {:<9} {} {id} {} -> {}",
                    kind_label(ev.kind),
                    ev.resource_kind,
                    show(&ev.old_state),
                    show(&ev.new_state)
                ),
            }
        }
        Output::Json => println!("{}", serde_json::to_string(ev)?),
        Output::Yaml => print!("---\n{}", serde_yaml::to_string(ev)?),
    }
    Ok(())
}

#[derive(Serialize)]
struct VersionOut {
    api_version: String,
    cluster: String,
    release: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let client = connect(&cli).await?;
    let out = cli.output;

    match cli.command {
        Commands::Version => {
            let info = client.info(CallContext::new()).await?;
            let v = VersionOut { api_version: client.version().to_string(), cluster: info.cluster_name, release: info.release };
            emit(out, &v, |v| println!("api {} • cluster {} • slurm {}", v.api_version, v.cluster, v.release))?;
        }
        Commands::Ping => {
            let info = client.ping(CallContext::new()).await?;
            emit(out, &info, |info| {
                println!("CONTROLLER       MODE       STATUS  LATENCY");
                for c in &info.controllers {
                    let status = if c.responding { "UP" } else { "DOWN" };
                    println!("{:<16} {:<10} {:<7} {}us", c.hostname, c.mode, status, c.latency_us);
                }
            })?;
        }
        Commands::Stats => {
            let s = client.stats(CallContext::new()).await?;
            emit(out, &s, |s| {
                println!("nodes {} ({} idle, {} allocated)", s.total_nodes, s.idle_nodes, s.allocated_nodes);
                println!("cpus  {} ({} idle, {} allocated)", s.total_cpus, s.idle_cpus, s.allocated_cpus);
                println!("jobs  {} ({} running, {} pending, {} completed)", s.total_jobs, s.running_jobs, s.pending_jobs, s.completed_jobs);
            })?;
        }
        Commands::Jobs { user, state } => {
            let opts = JobListOptions { user, states: state.iter().map(|s| JobState::from_wire(s)).collect(), ..Default::default() };
            let jobs = client.list_jobs(CallContext::new(), &opts).await?;
            emit(out, &jobs, |jobs| {
                println!("JOBID    NAME                 USER       STATE        PARTITION  NODES");
                for j in jobs {
                    println!("{:<8} {:<20} {:<10} {:<12} {:<10} {}", j.job_id, j.name, j.user_name, j.state, j.partition, j.node_list);
                }
            })?;
        }
        Commands::Job { id } => {
            let job = client.get_job(CallContext::new(), id).await?;
            emit(out, &job, |j| {
                println!("job {} ({}) • {} • {}", j.job_id, j.name, j.state, j.user_name);
                println!("account {} • partition {} • qos {}", j.account, j.partition, j.qos);
                println!("submitted {} • started {} • ended {}", opt_time(j.submit_time), opt_time(j.start_time), opt_time(j.end_time));
                if !j.node_list.is_empty() {
                    println!("nodes {} ({} cpus)", j.node_list, j.cpus);
                }
            })?;
        }
        Commands::Nodes => {
            let nodes = client.list_nodes(CallContext::new(), &NodeListOptions::default()).await?;
            emit(out, &nodes, |nodes| {
                println!("NAME         STATE        CPUS   LOAD   PARTITIONS");
                for n in nodes {
                    println!("{:<12} {:<12} {:<6} {:<6.2} {}", n.name, n.state, n.cpus, n.cpu_load, n.partitions.join(","));
                }
            })?;
        }
        Commands::Partitions => {
            let parts = client.list_partitions(CallContext::new(), &PartitionListOptions::default()).await?;
            emit(out, &parts, |parts| {
                println!("NAME         STATE      NODES  CPUS");
                for p in parts {
                    let name = if p.is_default { format!("{}*", p.name) } else { p.name.clone() };
                    println!("{:<12} {:<10} {:<6} {}", name, p.state, p.total_nodes, p.total_cpus);
                }
            })?;
        }
        Commands::Accounts => {
            let accounts = client.list_accounts(CallContext::new(), &AccountListOptions::default()).await?;
            emit(out, &accounts, |accounts| {
                for a in accounts {
                    println!("{:<16} {:<16} {}", a.name, a.organization, a.description);
                }
            })?;
        }
        Commands::Reservations => {
            let resv = client.list_reservations(CallContext::new(), &ReservationListOptions::default()).await?;
            emit(out, &resv, |resv| {
                println!("NAME             STATE     START             END               NODES");
                for r in resv {
                    println!("{:<16} {:<9} {:<17} {:<17} {}", r.name, r.state, opt_time(r.start_time), opt_time(r.end_time), r.node_list);
                }
            })?;
        }
        Commands::Cancel { id } => {
            client.cancel_job(CallContext::new(), id).await?;
            info!(job_id = id, "cancel requested");
            if out == Output::Human {
                println!("job {id} cancelled");
            }
        }
        Commands::Watch { target } => {
            let ctx = CallContext::new();
            let token = ctx.cancel_token().clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    info!("ctrl-c received; stopping watch");
                    token.cancel();
                }
            });
            let phase = match target {
                WatchTarget::Jobs { interval } => {
                    let opts = WatchJobsOptions { watch: interval.map(watch_opts), ..Default::default() };
                    let mut h = client.watch_jobs(&ctx, opts);
                    while let Some(ev) = h.recv().await {
                        print_event(out, &ev)?;
                    }
                    h.phase()
                }
                WatchTarget::Nodes { interval } => {
                    let opts = WatchNodesOptions { watch: interval.map(watch_opts), ..Default::default() };
                    let mut h = client.watch_nodes(&ctx, opts);
                    while let Some(ev) = h.recv().await {
                        print_event(out, &ev)?;
                    }
                    h.phase()
                }
            };
            if phase == WatchPhase::Fatal {
                anyhow::bail!("watch stopped on a permanent error");
            }
        }
    }
    client.close();
    Ok(())
}

fn watch_opts(secs: u64) -> WatchOptions { WatchOptions { interval: Duration::from_secs(secs.max(1)), ..Default::default() } }
