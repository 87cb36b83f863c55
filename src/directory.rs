//! Tenant Planner (C2): fetches the enabled tenants from the identity
//! directory, applies an include/exclude filter, ensures the running user
//! holds the required role in each, and partitions the result into worker
//! buckets.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::MigrateError;
use crate::model::{Tenant, WorkerBucket};

/// The four mutually-exclusive tenant selection modes, enforced by the CLI
/// layer (only one of include/exclude/include-file/exclude-file may be
/// given at a time).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    None,
    Include(BTreeSet<String>),
    Exclude(BTreeSet<String>),
    IncludeFile(PathBuf),
    ExcludeFile(PathBuf),
}

impl Filter {
    /// Resolves file-backed variants into their in-memory `Include`/
    /// `Exclude` equivalent, so the rest of the planner only ever has to
    /// handle three cases.
    pub fn resolve(self) -> Result<Filter, MigrateError> {
        match self {
            Filter::IncludeFile(path) => Ok(Filter::Include(read_name_list(&path)?)),
            Filter::ExcludeFile(path) => Ok(Filter::Exclude(read_name_list(&path)?)),
            other => Ok(other),
        }
    }
}

fn read_name_list(path: &Path) -> Result<BTreeSet<String>, MigrateError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Fatal(format!("failed to read tenant list file {}: {e}", path.display()))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Capability trait over the shared identity/token directory. Token
/// acquisition itself is out of scope for this crate's core — callers
/// supply a directory handle that already carries credentials.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>>;

    /// Grants `role` to the running user in `tenant` if neither `role` nor
    /// `admin` is already held. Must succeed — failing here is fatal,
    /// since every worker assumes it can act in its assigned tenancies.
    async fn ensure_role(&self, tenant: &Tenant, role: &str) -> anyhow::Result<()>;
}

pub fn apply_filter(tenants: Vec<Tenant>, filter: &Filter) -> Result<Vec<Tenant>, MigrateError> {
    match filter {
        Filter::None => Ok(tenants),
        Filter::Include(names) => {
            let known: BTreeSet<&str> = tenants.iter().map(|t| t.name.as_str()).collect();
            let missing: Vec<&String> = names.iter().filter(|n| !known.contains(n.as_str())).collect();
            if !missing.is_empty() {
                return Err(MigrateError::Fatal(format!(
                    "include list names unknown tenants: {missing:?}"
                )));
            }
            Ok(tenants.into_iter().filter(|t| names.contains(&t.name)).collect())
        }
        Filter::Exclude(names) => Ok(tenants.into_iter().filter(|t| !names.contains(&t.name)).collect()),
        Filter::IncludeFile(_) | Filter::ExcludeFile(_) => {
            unreachable!("Filter::resolve must be called before apply_filter")
        }
    }
}

/// Partition `tenants` into at most `concurrency` contiguous buckets of
/// `ceil(n / concurrency)`, preserving input order. The last bucket may be
/// smaller; no empty trailing buckets are produced.
pub fn partition(tenants: Vec<Tenant>, concurrency: usize) -> Vec<WorkerBucket> {
    if tenants.is_empty() {
        return Vec::new();
    }
    let concurrency = concurrency.max(1);
    let chunk_size = tenants.len().div_ceil(concurrency);
    tenants
        .chunks(chunk_size)
        .map(|chunk| WorkerBucket(chunk.to_vec()))
        .collect()
}

/// Runs the full C2 pipeline: fetch, filter, grant role, partition.
pub async fn plan(
    directory: &dyn IdentityDirectory,
    role: &str,
    filter: Filter,
    concurrency: usize,
) -> Result<Vec<WorkerBucket>, MigrateError> {
    let filter = filter.resolve()?;

    let all = directory
        .list_tenants()
        .await
        .map_err(|e| MigrateError::Fatal(format!("failed to list tenants: {e}")))?;
    let enabled: Vec<Tenant> = all.into_iter().filter(|t| t.enabled).collect();

    let filtered = apply_filter(enabled, &filter)?;

    for tenant in &filtered {
        directory.ensure_role(tenant, role).await.map_err(|e| {
            MigrateError::Fatal(format!("failed to grant role {role} in tenant {}: {e}", tenant.name))
        })?;
    }

    Ok(partition(filtered, concurrency))
}

async fn post_for_token(authurl: &str, body: &serde_json::Value) -> anyhow::Result<String> {
    let resp = Client::new()
        .post(format!("{}/v3/auth/tokens", authurl.trim_end_matches('/')))
        .json(body)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("authentication failed with status {}", resp.status());
    }
    resp.headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("auth response missing X-Subject-Token"))
}

/// Exchanges a username/password for an unscoped Keystone v3 auth token
/// (`X-Subject-Token` response header), the prerequisite for building a
/// [`KeystoneDirectory`].
pub async fn authenticate(authurl: &str, user: &str, password: &str) -> anyhow::Result<String> {
    let body = serde_json::json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": user,
                        "domain": { "id": "default" },
                        "password": password,
                    }
                }
            }
        }
    });
    post_for_token(authurl, &body).await
}

/// Same as [`authenticate`] but scopes the token to `project_id`, the form a
/// per-tenant client needs to actually act against that tenant's storage
/// (an unscoped token only authenticates, it doesn't authorize). Mirrors
/// how each region connection in the source tooling is established
/// separately per tenant rather than reusing one blanket token.
pub async fn authenticate_scoped(
    authurl: &str,
    user: &str,
    password: &str,
    project_id: &str,
) -> anyhow::Result<String> {
    let body = serde_json::json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": user,
                        "domain": { "id": "default" },
                        "password": password,
                    }
                }
            },
            "scope": {
                "project": { "id": project_id }
            }
        }
    });
    post_for_token(authurl, &body).await
}

#[derive(Deserialize)]
struct CatalogResponse {
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    type_: String,
    endpoints: Vec<CatalogEndpointEntry>,
}

#[derive(Deserialize)]
struct CatalogEndpointEntry {
    region: String,
    url: String,
    interface: String,
}

/// Resolves the public endpoint URL for `service_type` in `region` from the
/// scoped token's service catalog. A region name is a catalog selector, not
/// a hostname — this is how a real client turns one into the other, rather
/// than guessing `https://<region>/...`.
pub async fn catalog_endpoint(authurl: &str, token: &str, service_type: &str, region: &str) -> anyhow::Result<String> {
    let resp = Client::new()
        .get(format!("{}/v3/auth/catalog", authurl.trim_end_matches('/')))
        .header("X-Auth-Token", token)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("fetching service catalog failed with status {}", resp.status());
    }
    let body: CatalogResponse = resp.json().await?;
    body.catalog
        .into_iter()
        .find(|e| e.type_ == service_type)
        .and_then(|e| e.endpoints.into_iter().find(|ep| ep.interface == "public" && ep.region == region))
        .map(|ep| ep.url)
        .ok_or_else(|| anyhow::anyhow!("no public {service_type} endpoint for region {region} in service catalog"))
}

/// Identity directory over an OpenStack Keystone v3-style API, reached with
/// a pre-acquired auth token — the same opaque-REST-adapter posture as the
/// object-store gateway.
pub struct KeystoneDirectory {
    client: Client,
    authurl: String,
    token: String,
}

#[derive(Deserialize)]
struct ProjectEntry {
    id: String,
    name: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct ProjectsResponse {
    projects: Vec<ProjectEntry>,
}

#[derive(Deserialize)]
struct NamedEntry {
    id: String,
}

#[derive(Deserialize)]
struct RolesResponse {
    roles: Vec<NamedEntry>,
}

#[derive(Deserialize)]
struct UsersResponse {
    users: Vec<NamedEntry>,
}

impl KeystoneDirectory {
    pub fn new(authurl: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            authurl: authurl.into(),
            token: token.into(),
        }
    }

    async fn resolve_id(&self, path: &str, name_field: &str, name: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(format!("{}/{path}", self.authurl.trim_end_matches('/')))
            .header("X-Auth-Token", &self.token)
            .query(&[(name_field, name)])
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("keystone lookup of {path}?{name_field}={name} failed with status {}", resp.status());
        }
        match path {
            "v3/roles" => {
                let body: RolesResponse = resp.json().await?;
                body.roles
                    .into_iter()
                    .next()
                    .map(|r| r.id)
                    .ok_or_else(|| anyhow::anyhow!("role {name} not found"))
            }
            "v3/users" => {
                let body: UsersResponse = resp.json().await?;
                body.users
                    .into_iter()
                    .next()
                    .map(|u| u.id)
                    .ok_or_else(|| anyhow::anyhow!("user {name} not found"))
            }
            other => anyhow::bail!("unsupported lookup path {other}"),
        }
    }
}

#[async_trait]
impl IdentityDirectory for KeystoneDirectory {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>> {
        let resp = self
            .client
            .get(format!("{}/v3/projects", self.authurl.trim_end_matches('/')))
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("listing projects failed with status {}", resp.status());
        }
        let body: ProjectsResponse = resp.json().await?;
        Ok(body
            .projects
            .into_iter()
            .map(|p| Tenant {
                id: p.id,
                name: p.name,
                enabled: p.enabled,
            })
            .collect())
    }

    async fn ensure_role(&self, tenant: &Tenant, role: &str) -> anyhow::Result<()> {
        let role_id = self.resolve_id("v3/roles", "name", role).await?;
        let user_id = self.resolve_id("v3/users", "name", &tenant.name).await?;
        let resp = self
            .client
            .put(format!(
                "{}/v3/projects/{}/users/{user_id}/roles/{role_id}",
                self.authurl.trim_end_matches('/'),
                tenant.id
            ))
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!(
                "granting role {role} to {user_id} in project {} failed with status {}",
                tenant.id,
                resp.status()
            );
        }
        Ok(())
    }
}
