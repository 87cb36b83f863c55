//! CLI & Config (C9, ambient): argument parsing for the three subcommands
//! and the shared tenant-filter group, using `clap`'s derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::directory::Filter;

/// Region set selected for reconcile-deleted's `--env` flag, matching the
/// original tool's deployment topology.
pub fn env_regions(env: &str) -> &'static [&'static str] {
    match env {
        "preprod" => &["test-1"],
        "prod" => &["nz-por-1", "nz_wlg_2"],
        _ => &[],
    }
}

/// Region name to duplicate-collision suffix, as used by the original
/// tool's rename convention.
pub fn region_suffix(region: &str) -> Option<&'static str> {
    match region {
        "nz-por-1" => Some("por"),
        "nz_wlg_2" => Some("wlg"),
        _ => None,
    }
}

#[derive(Parser, Debug)]
#[command(name = "swift-tenant-migrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy (or audit) every enabled tenant's object storage to the target store
    Migrate(MigrateArgs),
    /// Sweep the migration-tracking side for containers/objects no longer present upstream
    ReconcileDeleted(ReconcileDeletedArgs),
    /// Find and optionally rename container-name collisions between two source regions
    ReconcileDuplicate(ReconcileDuplicateArgs),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrateAction {
    Stat,
    Copy,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultStorage {
    Rgw,
    Swift,
}

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
    /// Identity as TENANT:USER
    #[arg(long)]
    pub user: String,

    /// Source region name
    #[arg(long)]
    pub region: String,

    /// Target store host
    #[arg(long)]
    pub host: String,

    /// Target store port
    #[arg(long, default_value_t = 8843)]
    pub port: u16,

    /// Identity auth URL
    #[arg(long)]
    pub authurl: String,

    /// Password; falls back to SWIFT_MIGRATE_PASSWORD then an interactive prompt
    #[arg(long)]
    pub password: Option<String>,

    /// Role granted to the running user in every selected tenant
    #[arg(long, default_value = "admin")]
    pub role: String,

    /// Whether to only audit (stat) or actually transfer (copy)
    #[arg(long, value_enum, default_value_t = MigrateAction::Stat)]
    pub act: MigrateAction,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Worker count; defaults to the number of logical CPUs
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long, value_enum, default_value_t = DefaultStorage::Rgw)]
    pub default_storage: DefaultStorage,

    #[command(flatten)]
    pub filter: FilterArgs,
}

impl MigrateArgs {
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(num_cpus::get)
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Preprod,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Preprod => "preprod",
            Environment::Prod => "prod",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletedActionArg {
    Report,
    Delete,
}

#[derive(clap::Args, Debug)]
pub struct ReconcileDeletedArgs {
    pub user: String,
    pub authurl: String,
    pub host: String,

    #[arg(long, value_enum, default_value_t = Environment::Preprod)]
    pub env: Environment,

    #[arg(long, default_value_t = 8843)]
    pub port: u16,

    /// Password; falls back to SWIFT_MIGRATE_PASSWORD then an interactive prompt
    #[arg(long)]
    pub password: Option<String>,

    #[arg(long, default_value = "admin")]
    pub role: String,

    #[arg(long, value_enum, default_value_t = DeletedActionArg::Report)]
    pub action: DeletedActionArg,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateActionArg {
    Report,
    Rename,
}

#[derive(clap::Args, Debug)]
pub struct ReconcileDuplicateArgs {
    pub user: String,
    pub authurl: String,

    /// Password; falls back to SWIFT_MIGRATE_PASSWORD then an interactive prompt
    #[arg(long)]
    pub password: Option<String>,

    #[arg(long, default_value = "admin")]
    pub role: String,

    #[arg(long, value_enum, default_value_t = DuplicateActionArg::Report)]
    pub action: DuplicateActionArg,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// The four mutually-exclusive tenant-selection flags, shared by all three
/// subcommands.
#[derive(clap::Args, Debug, Default)]
#[group(multiple = false)]
pub struct FilterArgs {
    #[arg(long, value_delimiter = ',')]
    pub include_tenants: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub exclude_tenants: Vec<String>,

    #[arg(long)]
    pub include_file: Option<PathBuf>,

    #[arg(long)]
    pub exclude_file: Option<PathBuf>,
}

impl FilterArgs {
    pub fn into_filter(self) -> Filter {
        if let Some(path) = self.include_file {
            Filter::IncludeFile(path)
        } else if let Some(path) = self.exclude_file {
            Filter::ExcludeFile(path)
        } else if !self.include_tenants.is_empty() {
            Filter::Include(self.include_tenants.into_iter().collect())
        } else if !self.exclude_tenants.is_empty() {
            Filter::Exclude(self.exclude_tenants.into_iter().collect())
        } else {
            Filter::None
        }
    }
}

/// Resolves the password from `--password`, `SWIFT_MIGRATE_PASSWORD`, or an
/// interactive prompt, in that order. Not a spec feature in its own right —
/// just how the CLI obtains the secret the identity directory needs.
pub fn resolve_password(explicit: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = explicit {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("SWIFT_MIGRATE_PASSWORD") {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").map_err(|e| anyhow::anyhow!("failed to read password: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_regions_match_the_known_deployment_topology() {
        assert_eq!(env_regions("preprod"), &["test-1"]);
        assert_eq!(env_regions("prod"), &["nz-por-1", "nz_wlg_2"]);
        assert!(env_regions("unknown").is_empty());
    }

    #[test]
    fn region_suffix_map_matches_known_regions() {
        assert_eq!(region_suffix("nz-por-1"), Some("por"));
        assert_eq!(region_suffix("nz_wlg_2"), Some("wlg"));
        assert_eq!(region_suffix("eu-west-1"), None);
    }

    #[test]
    fn filter_args_prefers_file_variants_over_inline_lists() {
        let args = FilterArgs {
            include_tenants: vec!["a".to_string()],
            include_file: Some(PathBuf::from("/tmp/list.txt")),
            ..Default::default()
        };
        assert_eq!(args.into_filter(), Filter::IncludeFile(PathBuf::from("/tmp/list.txt")));
    }

    #[test]
    fn filter_args_with_nothing_set_resolves_to_none() {
        assert_eq!(FilterArgs::default().into_filter(), Filter::None);
    }
}
