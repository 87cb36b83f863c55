mod classifier;
mod cli;
mod container_migrator;
mod directory;
mod error;
mod gateway;
mod migrator;
mod model;
mod reconcile;
mod scheduler;
mod skip;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;

use cli::{Cli, Command, DeletedActionArg, DuplicateActionArg, MigrateAction};
use directory::{authenticate, authenticate_scoped, catalog_endpoint, KeystoneDirectory};
use gateway::http::HttpObjectStore;
use gateway::ObjectStoreClient;
use model::Tenant;
use reconcile::{DeletedAction, DuplicateAction};
use scheduler::{Action, ClientFactory};

const OBJECT_STORE_SERVICE_TYPE: &str = "object-store";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Migrate(args) => run_migrate(args).await,
        Command::ReconcileDeleted(args) => run_reconcile_deleted(args).await,
        Command::ReconcileDuplicate(args) => run_reconcile_duplicate(args).await,
    }
}

/// Builds source and target HTTP object-store clients for a tenant, given
/// one auth token good for both sides.
struct HttpClientFactory {
    token: String,
    source_host: String,
    source_port: u16,
    target_host: String,
    target_port: u16,
    scheme_path: &'static str,
}

impl HttpClientFactory {
    fn storage_url(&self, host: &str, port: u16, tenant: &Tenant) -> String {
        format!("https://{host}:{port}{}{}", self.scheme_path, tenant.id)
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn source_client(&self, tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>> {
        let url = self.storage_url(&self.source_host, self.source_port, tenant);
        Ok(Box::new(HttpObjectStore::new(url, self.token.clone())))
    }

    async fn target_client(&self, tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>> {
        let url = self.storage_url(&self.target_host, self.target_port, tenant);
        Ok(Box::new(HttpObjectStore::new(url, self.token.clone())))
    }
}

async fn run_migrate(args: cli::MigrateArgs) -> anyhow::Result<()> {
    let (_tenant, user) = args
        .user
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("--user must be TENANT:USER"))?;
    let password = cli::resolve_password(args.password.clone())?;
    let token = authenticate(&args.authurl, user, &password).await?;

    let identity = KeystoneDirectory::new(&args.authurl, &token);
    let filter = args.filter.into_filter();
    let concurrency = args.concurrency();
    let buckets = directory::plan(&identity, &args.role, filter, concurrency).await?;

    tracing::info!(
        buckets = buckets.len(),
        tenants = buckets.iter().map(|b| b.len()).sum::<usize>(),
        "tenant plan ready"
    );

    let scheme_path = match args.default_storage {
        cli::DefaultStorage::Rgw => "/v1/AUTH_",
        cli::DefaultStorage::Swift => "/swift/v1/AUTH_",
    };
    let factory: Arc<dyn ClientFactory> = Arc::new(HttpClientFactory {
        token,
        source_host: args.host.clone(),
        source_port: args.port,
        target_host: args.host,
        target_port: args.port,
        scheme_path,
    });

    let act = match args.act {
        MigrateAction::Stat => Action::Stat,
        MigrateAction::Copy => Action::Copy,
    };

    let audit_dir = std::env::current_dir()?;
    scheduler::run(buckets, act, factory, audit_dir).await;
    Ok(())
}

/// Resolves each region's real object-store endpoint from the tenant-scoped
/// token's service catalog, dropping (and warning about) any region the
/// catalog doesn't carry for this tenant rather than guessing a URL.
async fn resolve_region_clients(
    authurl: &str,
    tenant_token: &str,
    regions: &[&str],
) -> Vec<(String, HttpObjectStore)> {
    let mut clients = Vec::new();
    for region in regions {
        match catalog_endpoint(authurl, tenant_token, OBJECT_STORE_SERVICE_TYPE, *region).await {
            Ok(url) => clients.push((region.to_string(), HttpObjectStore::new(url, tenant_token.to_string()))),
            Err(e) => tracing::warn!(region = %region, "failed to resolve object-store endpoint: {e}"),
        }
    }
    clients
}

async fn run_reconcile_deleted(args: cli::ReconcileDeletedArgs) -> anyhow::Result<()> {
    let (_tenant, user) = args
        .user
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("user must be TENANT:USER"))?;
    let password = cli::resolve_password(args.password.clone())?;
    let admin_token = authenticate(&args.authurl, user, &password).await?;

    let identity = KeystoneDirectory::new(&args.authurl, &admin_token);
    let filter = args.filter.into_filter();
    let buckets = directory::plan(&identity, &args.role, filter, 1).await?;
    let tenants: Vec<Tenant> = buckets.into_iter().flat_map(|b| b.0).collect();

    let regions = cli::env_regions(args.env.as_str());
    let action = match args.action {
        DeletedActionArg::Report => DeletedAction::Report,
        DeletedActionArg::Delete => DeletedAction::Delete,
    };

    for tenant in &tenants {
        let tenant_token = match authenticate_scoped(&args.authurl, user, &password, &tenant.id).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(tenant = %tenant.name, "failed to acquire scoped token: {e}");
                continue;
            }
        };

        let migration_side = HttpObjectStore::new(
            format!("https://{}:{}/v1/AUTH_{}", args.host, args.port, tenant.id),
            tenant_token.clone(),
        );
        let region_clients = resolve_region_clients(&args.authurl, &tenant_token, regions).await;
        let region_refs: Vec<(&str, &dyn ObjectStoreClient)> = region_clients
            .iter()
            .map(|(name, client)| (name.as_str(), client as &dyn ObjectStoreClient))
            .collect();

        let report = reconcile::deleted_sweep(&migration_side, &region_refs, action).await;
        println!("tenant {}: nonexistent containers: {:?}", tenant.name, report.nonexistent_containers);
        println!("tenant {}: nonexistent objects: {:?}", tenant.name, report.nonexistent_objects);
        if action == DeletedAction::Delete {
            println!("tenant {}: deleted containers: {:?}", tenant.name, report.deleted_containers);
            println!("tenant {}: deleted objects: {:?}", tenant.name, report.deleted_objects);
        }
        for error in &report.errors {
            tracing::warn!(tenant = %tenant.name, "{error}");
        }
    }
    Ok(())
}

async fn run_reconcile_duplicate(args: cli::ReconcileDuplicateArgs) -> anyhow::Result<()> {
    let (_tenant, user) = args
        .user
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("user must be TENANT:USER"))?;
    let password = cli::resolve_password(args.password.clone())?;
    let admin_token = authenticate(&args.authurl, user, &password).await?;

    let identity = KeystoneDirectory::new(&args.authurl, &admin_token);
    let filter = args.filter.into_filter();
    let buckets = directory::plan(&identity, &args.role, filter, 1).await?;
    let tenants: Vec<Tenant> = buckets.into_iter().flat_map(|b| b.0).collect();

    let regions = ["nz-por-1", "nz_wlg_2"];
    let action = match args.action {
        DuplicateActionArg::Report => DuplicateAction::Report,
        DuplicateActionArg::Rename => DuplicateAction::Rename,
    };

    for tenant in &tenants {
        let tenant_token = match authenticate_scoped(&args.authurl, user, &password, &tenant.id).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(tenant = %tenant.name, "failed to acquire scoped token: {e}");
                continue;
            }
        };

        let region_clients = resolve_region_clients(&args.authurl, &tenant_token, &regions).await;
        if region_clients.len() < 2 {
            tracing::warn!(tenant = %tenant.name, "fewer than two source regions resolved; skipping");
            continue;
        }
        let (name_a, client_a) = &region_clients[0];
        let (name_b, client_b) = &region_clients[1];
        let suffix_a: &str = match cli::region_suffix(name_a) {
            Some(s) => s,
            None => name_a.as_str(),
        };
        let suffix_b: &str = match cli::region_suffix(name_b) {
            Some(s) => s,
            None => name_b.as_str(),
        };

        let report = reconcile::duplicate_collision(
            (suffix_a, client_a as &dyn ObjectStoreClient),
            (suffix_b, client_b as &dyn ObjectStoreClient),
            action,
        )
        .await;
        println!("tenant {}: duplicate containers: {:?}", tenant.name, report.duplicates);
        if action == DuplicateAction::Rename {
            println!("tenant {}: renamed: {:?}", tenant.name, report.renamed);
        }
        for error in &report.errors {
            tracing::warn!(tenant = %tenant.name, "{error}");
        }
    }
    Ok(())
}
