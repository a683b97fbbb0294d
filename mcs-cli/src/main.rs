use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcs_reconcile::clients::{BlockStorageClient, ContainerInfraClient, DatabaseClient};
use mcs_reconcile::reconciler::{
    ComputeClusterReconciler, DatabaseReconciler, DbClusterReconciler, InstanceReconciler,
    NodeGroupReconciler, Reconciler, SnapshotReconciler, UserReconciler, VolumeReconciler,
};
use mcs_reconcile::resolver::resolve_dbms;
use mcs_reconcile::{
    BlockStorageApi, CanonicalStatus, ClientError, ClientFactory, ContainerInfraApi, DatabaseApi,
    Direction, KindTable, ManagedResource, Observation, PollSpec, ProviderConfig, RawState,
    ReconcileError, Resolution, Resolver, ResourceKind, ServiceCategory, SubResourceId, Timeouts,
    wait_for,
};

#[derive(Parser)]
#[command(name = "mcs")]
#[command(about = "Inspect and wait on asynchronously provisioned MCS resources", long_about = None)]
struct Cli {
    /// Region the resources live in
    #[arg(long, env = "OS_REGION_NAME", default_value = "RegionOne")]
    region: String,

    /// Keystone token sent as X-Auth-Token
    #[arg(long, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    token: String,

    /// Project the resources belong to
    #[arg(long, env = "OS_PROJECT_ID")]
    project_id: String,

    /// Override the container-infra endpoint template
    #[arg(long, env = "MCS_CONTAINER_INFRA_ENDPOINT")]
    container_infra_endpoint: Option<String>,

    /// Override the database endpoint template
    #[arg(long, env = "MCS_DATABASE_ENDPOINT")]
    database_endpoint: Option<String>,

    /// Override the block-storage endpoint template
    #[arg(long, env = "MCS_BLOCK_STORAGE_ENDPOINT")]
    block_storage_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work out whether a DBMS id names an instance or a cluster
    Resolve {
        /// DBMS id
        id: String,

        /// Fail if more than one kind answers
        #[arg(long)]
        exclusive: bool,
    },

    /// Show the canonical status of a resource
    Status {
        #[arg(value_enum)]
        kind: KindArg,

        /// Resource id; `<dbms_id>/<name>` for databases and users
        id: String,

        /// Read the raw payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Block until a resource reaches one of the target statuses
    Wait {
        #[arg(value_enum)]
        kind: KindArg,

        id: String,

        /// Statuses that keep the wait going (BUILD, ACTIVE, RESIZE, ...)
        #[arg(long, value_delimiter = ',', value_parser = parse_status)]
        pending: Vec<CanonicalStatus>,

        /// Statuses that end the wait successfully
        #[arg(long, value_delimiter = ',', value_parser = parse_status, required = true)]
        target: Vec<CanonicalStatus>,

        /// Give up after this many seconds
        #[arg(long, default_value = "600")]
        timeout: u64,

        /// Seconds between probes
        #[arg(long, default_value = "3")]
        interval: u64,

        /// Treat an empty listing as deleted rather than still building
        #[arg(long)]
        shrink: bool,
    },

    /// Delete a resource and wait until it is gone
    Delete {
        #[arg(value_enum)]
        kind: KindArg,

        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    KubernetesCluster,
    KubernetesNodeGroup,
    DbInstance,
    DbCluster,
    DbClusterWithShards,
    BlockstorageVolume,
    BlockstorageSnapshot,
    DbDatabase,
    DbUser,
}

impl From<KindArg> for ResourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::KubernetesCluster => ResourceKind::ComputeCluster,
            KindArg::KubernetesNodeGroup => ResourceKind::NodeGroup,
            KindArg::DbInstance => ResourceKind::Instance,
            KindArg::DbCluster => ResourceKind::Cluster,
            KindArg::DbClusterWithShards => ResourceKind::ShardedCluster,
            KindArg::BlockstorageVolume => ResourceKind::Volume,
            KindArg::BlockstorageSnapshot => ResourceKind::Snapshot,
            KindArg::DbDatabase => ResourceKind::Database,
            KindArg::DbUser => ResourceKind::User,
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

impl StatusRow {
    fn new(kind: ResourceKind, id: &str, observation: &Observation, direction: Direction) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
            status: observation.status(direction).to_string(),
        }
    }
}

fn parse_status(s: &str) -> Result<CanonicalStatus, String> {
    let status = match s.to_ascii_uppercase().as_str() {
        "BUILD" | "BUILDING" => CanonicalStatus::Building,
        "ACTIVE" => CanonicalStatus::Active,
        "RESIZE" | "RESIZING" => CanonicalStatus::Resizing,
        "UPDATING" => CanonicalStatus::Updating,
        "DETACH" | "DETACHING" => CanonicalStatus::Detaching,
        "SHUTDOWN" => CanonicalStatus::ShuttingDown,
        "SHUTOFF" => CanonicalStatus::ShutOff,
        "DELETED" => CanonicalStatus::Deleted,
        "ERROR" => CanonicalStatus::Error,
        other => return Err(format!("unknown status {other}")),
    };
    Ok(status)
}

fn provider_config(cli: &Cli) -> ProviderConfig {
    let mut config = ProviderConfig::new(&cli.region, &cli.token, &cli.project_id);
    let overrides = [
        (ServiceCategory::ContainerInfra, &cli.container_infra_endpoint),
        (ServiceCategory::Database, &cli.database_endpoint),
        (ServiceCategory::BlockStorage, &cli.block_storage_endpoint),
    ];
    for (category, endpoint) in overrides {
        if let Some(template) = endpoint {
            config = config.with_endpoint(category, template.as_str());
        }
    }
    config
}

/// One read of a resource, mapped onto an observation.
fn probe(
    factory: &ClientFactory,
    kind: ResourceKind,
    id: &str,
) -> anyhow::Result<Observation> {
    let raw = match kind {
        ResourceKind::ComputeCluster => {
            read(factory.container_infra()?.get_cluster(id), RawState::ComputeCluster)
        }
        ResourceKind::NodeGroup => {
            read(factory.container_infra()?.get_node_group(id), RawState::NodeGroup)
        }
        ResourceKind::Instance => read(factory.database()?.get_instance(id), RawState::Instance),
        ResourceKind::Cluster | ResourceKind::ShardedCluster => {
            read(DatabaseApi::get_cluster(&factory.database()?, id), RawState::db_cluster)
        }
        ResourceKind::Volume => read(factory.block_storage()?.get_volume(id), RawState::Volume),
        ResourceKind::Snapshot => {
            read(factory.block_storage()?.get_snapshot(id), RawState::Snapshot)
        }
        ResourceKind::Database | ResourceKind::User => {
            return probe_sub_resource(&factory.database()?, kind, id);
        }
    }?;
    Ok(match raw {
        Some(raw) => Observation::Found(ManagedResource::new(id, raw)),
        None => Observation::NotFound,
    })
}

fn read<T>(
    result: Result<T, ClientError>,
    wrap: impl FnOnce(T) -> RawState,
) -> anyhow::Result<Option<RawState>> {
    match result {
        Ok(payload) => Ok(Some(wrap(payload))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn probe_sub_resource(
    client: &DatabaseClient,
    kind: ResourceKind,
    id: &str,
) -> anyhow::Result<Observation> {
    let sub: SubResourceId = id.parse()?;
    let dbms = match resolve_dbms(&KindTable::dbms(), client, &sub.dbms_id) {
        Ok(dbms) => dbms,
        Err(e) if e.is_not_found() => return Ok(Observation::NotFound),
        Err(e) => return Err(e.into()),
    };
    let raw = if kind == ResourceKind::Database {
        let databases = client.list_databases(dbms.dbms_type(), dbms.id())?;
        RawState::Database(databases.into_iter().find(|d| d.name == sub.name))
    } else {
        let users = client.list_users(dbms.dbms_type(), dbms.id())?;
        RawState::User(users.into_iter().find(|u| u.name == sub.name))
    };
    Ok(Observation::Found(ManagedResource::new(id, raw)))
}

fn payload_json(raw: &RawState) -> serde_json::Result<serde_json::Value> {
    match raw {
        RawState::ComputeCluster(c) => serde_json::to_value(c),
        RawState::NodeGroup(g) => serde_json::to_value(g),
        RawState::Instance(i) => serde_json::to_value(i),
        RawState::Cluster(c) | RawState::ShardedCluster(c) => serde_json::to_value(c),
        RawState::Volume(v) => serde_json::to_value(v),
        RawState::Snapshot(s) => serde_json::to_value(s),
        RawState::Database(d) => serde_json::to_value(d),
        RawState::User(u) => serde_json::to_value(u),
    }
}

fn delete(factory: &ClientFactory, kind: ResourceKind, id: &str) -> anyhow::Result<()> {
    let timeouts = Timeouts::default();
    let infra = || -> Result<ContainerInfraClient, ClientError> { factory.container_infra() };
    let db = || -> Result<DatabaseClient, ClientError> { factory.database() };
    let storage = || -> Result<BlockStorageClient, ClientError> { factory.block_storage() };
    match kind {
        ResourceKind::ComputeCluster => ComputeClusterReconciler::new(infra()?, &timeouts).delete(id),
        ResourceKind::NodeGroup => NodeGroupReconciler::new(infra()?, &timeouts).delete(id),
        ResourceKind::Instance => InstanceReconciler::new(db()?, &timeouts).delete(id),
        ResourceKind::Cluster => DbClusterReconciler::replicated(db()?, &timeouts).delete(id),
        ResourceKind::ShardedCluster => DbClusterReconciler::sharded(db()?, &timeouts).delete(id),
        ResourceKind::Volume => VolumeReconciler::new(storage()?, &timeouts).delete(id),
        ResourceKind::Snapshot => SnapshotReconciler::new(storage()?, &timeouts).delete(id),
        ResourceKind::Database => DatabaseReconciler::new(db()?, &timeouts).delete(id),
        ResourceKind::User => UserReconciler::new(db()?, &timeouts).delete(id),
    }
    .with_context(|| format!("failed to delete {kind} {id}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcs=info,mcs_reconcile=info,reqwest=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let factory = ClientFactory::new(provider_config(&cli));
    info!(region = %factory.region(), "Using provider region");

    match cli.command {
        Commands::Resolve { id, exclusive } => {
            let client = factory.database()?;
            let table = KindTable::dbms();
            let resolution = if exclusive {
                Resolution::Exclusive
            } else {
                Resolution::FirstMatch
            };
            let resource = Resolver::new(&table)
                .resolution(resolution)
                .resolve(&client, &id)
                .with_context(|| format!("failed to resolve {id}"))?;
            let kind = resource.kind();
            let row = StatusRow::new(kind, &id, &Observation::Found(resource), Direction::Grow);
            println!("{}", Table::new([row]));
        }

        Commands::Status { kind, id, json } => {
            let kind = ResourceKind::from(kind);
            let observation = probe(&factory, kind, &id)?;
            if json {
                let Some(resource) = observation.resource() else {
                    bail!("{kind} {id} not found");
                };
                let value = payload_json(&resource.raw)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let row = StatusRow::new(kind, &id, &observation, Direction::Grow);
                println!("{}", Table::new([row]));
            }
        }

        Commands::Wait {
            kind,
            id,
            pending,
            target,
            timeout,
            interval,
            shrink,
        } => {
            let kind = ResourceKind::from(kind);
            let direction = if shrink {
                Direction::Shrink
            } else {
                Direction::Grow
            };
            let spec = PollSpec::new(kind, &id)
                .pending(pending)
                .target(target)
                .timeout(Duration::from_secs(timeout))
                .initial_delay(Duration::ZERO)
                .poll_interval(Duration::from_secs(interval))
                .direction(direction);

            let mut failure: Option<anyhow::Error> = None;
            let outcome = wait_for(&spec, || match probe(&factory, kind, &id) {
                Ok(observation) => Ok(observation),
                // Keep the real cause; the poller only sees a transport error.
                Err(e) => {
                    let transport = ClientError::Endpoint(e.to_string());
                    failure = Some(e);
                    Err(transport)
                }
            });
            let observation = match outcome {
                Ok(observation) => observation,
                Err(ReconcileError::Transport(_)) if failure.is_some() => {
                    let cause = failure.take().unwrap_or_else(|| anyhow::anyhow!("probe failed"));
                    return Err(cause.context(format!("failed to probe {kind} {id}")));
                }
                Err(e) => return Err(e).with_context(|| format!("wait on {kind} {id} failed")),
            };
            let row = StatusRow::new(kind, &id, &observation, direction);
            println!("{}", Table::new([row]));
        }

        Commands::Delete { kind, id } => {
            let kind = ResourceKind::from(kind);
            delete(&factory, kind, &id)?;
            println!("Deleted {kind} {id}");
        }
    }

    Ok(())
}
