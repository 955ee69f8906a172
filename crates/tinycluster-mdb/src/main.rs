//! tcmdb
//!
//! Operator CLI for the tinycluster machine database.

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tinycluster_core::{Machine, MachineSpec};
use tinycluster_mdb::config::{parse_endpoints, MdbConfig};
use tinycluster_mdb::observability::{init_metrics, init_tracing, MetricsState, TracingConfig};
use tinycluster_mdb::store::{ClientFactory, EtcdStore};
use tinycluster_mdb::{
    version, CallContext, MachineQuery, MachineService, MachineUsecase, QueryField,
    StoreMachineRepository,
};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "tcmdb")]
#[command(about = "Inspect and edit the tinycluster machine database")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// etcd endpoints (comma-separated) [env: ETCD_ENDPOINTS]
    #[arg(long, global = true)]
    etcd_endpoints: Option<String>,

    /// Key namespace [env: TC_NAMESPACE]
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Seconds allowed for connecting to etcd [env: TC_DIAL_TIMEOUT_SECS]
    #[arg(long, global = true, value_name = "SECS")]
    dial_timeout: Option<u64>,

    /// Seconds allowed for the whole command [env: TC_REQUEST_TIMEOUT_SECS]
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log format: text or json [env: LOG_FORMAT]
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every machine
    List,
    /// Show the first machine with the given name
    Get { name: String },
    /// List machines matching the given fields
    Query {
        #[arg(long)]
        mac: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ipv4: Option<String>,
        /// Match machines satisfying any field instead of all
        #[arg(long)]
        any: bool,
    },
    /// Register a machine, or update it if its name, address or MAC is known
    Register(RegisterArgs),
    /// Delete the machine with the given MAC
    Delete {
        #[arg(long)]
        mac: String,
    },
    /// Print build information
    Version,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    mac: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    ipv4: String,
    /// CPU cores
    #[arg(long, default_value_t = 0)]
    core: i32,
    /// Memory in MB
    #[arg(long, default_value_t = 0)]
    memory: i64,
    /// Disk in GB
    #[arg(long, default_value_t = 0)]
    disk: i64,
    /// Unix seconds; defaults to now
    #[arg(long)]
    deployed_date: Option<i64>,
}

impl RegisterArgs {
    fn into_machine(self) -> Machine {
        let deployed_date = self
            .deployed_date
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        Machine::new(self.mac, self.name, self.ipv4)
            .with_deployed_date(deployed_date)
            .with_spec(MachineSpec {
                core: self.core,
                memory: self.memory,
                disk: self.disk,
            })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("{}", version::build_info());
        return Ok(());
    }

    let mut tracing_config = TracingConfig::from_env();
    if let Some(format) = &cli.global.log_format {
        tracing_config.log_format = format.clone();
    }
    init_tracing(tracing_config).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let metrics = if cli.global.metrics {
        Some(init_metrics().map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?)
    } else {
        None
    };

    let config = resolve_config(&cli.global)?;
    debug!(
        endpoints = ?config.etcd_endpoints,
        namespace = %config.namespace,
        "Resolved configuration"
    );

    let result = run(cli.command, &config).await;
    if let Some(metrics) = metrics {
        dump_metrics(&metrics);
    }
    result
}

fn resolve_config(global: &GlobalArgs) -> anyhow::Result<MdbConfig> {
    let mut config = MdbConfig::from_env();
    if let Some(endpoints) = &global.etcd_endpoints {
        config.etcd_endpoints = parse_endpoints(endpoints);
    }
    if let Some(namespace) = &global.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(secs) = global.dial_timeout {
        config.dial_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = global.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }
    if config.etcd_endpoints.is_empty() {
        bail!("no etcd endpoints configured");
    }
    Ok(config)
}

async fn run(command: Commands, config: &MdbConfig) -> anyhow::Result<()> {
    let store = EtcdStore::new(config.etcd_endpoints.clone(), config.dial_timeout);
    let factory = ClientFactory::new(store, config.dial_timeout);
    let repo = StoreMachineRepository::new(factory, &config.namespace)
        .with_retry_policy(config.retry_policy());
    let usecase = MachineService::new(Arc::new(repo));

    let (base, cancel) = CallContext::cancellable();
    let ctx = base.timeout(config.request_timeout);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match command {
        Commands::List => {
            let machines = usecase
                .get_all_machines(&ctx)
                .await
                .context("failed to list machines")?;
            print_json(&machines)
        }
        Commands::Get { name } => {
            let machine = usecase
                .get_machine_by_name(&ctx, &name)
                .await
                .with_context(|| format!("failed to look up machine {name}"))?;
            match machine {
                Some(machine) => print_json(&machine),
                None => bail!("no machine named {name}"),
            }
        }
        Commands::Query {
            mac,
            name,
            ipv4,
            any,
        } => {
            let mut query = MachineQuery::new();
            for (field, value) in [
                (QueryField::Mac, mac),
                (QueryField::Name, name),
                (QueryField::Ipv4, ipv4),
            ] {
                if let Some(value) = value {
                    query = query.with(field, value);
                }
            }
            if any {
                query = query.any();
            }
            let machines = usecase
                .get_machine_by_query(&ctx, &query)
                .await
                .context("failed to query machines")?;
            print_json(&machines)
        }
        Commands::Register(args) => {
            let machine = args.into_machine();
            usecase
                .register_or_update_machine(&ctx, &machine)
                .await
                .with_context(|| format!("failed to register machine {}", machine.mac))?;
            info!(mac = %machine.mac, "Machine saved");
            print_json(&machine)
        }
        Commands::Delete { mac } => {
            let machine = Machine::new(mac.as_str(), "", "");
            usecase
                .delete_machine(&ctx, &machine)
                .await
                .with_context(|| format!("failed to delete machine {mac}"))?;
            print_json(&serde_json::json!({ "deleted": mac }))
        }
        Commands::Version => {
            println!("{}", version::build_info());
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn dump_metrics(metrics: &MetricsState) {
    eprintln!("{}", metrics.render());
}
