//! Error Model (C10): distinguishes fatal/tenant/container/object-scope
//! errors per the propagation policy — only `Fatal` ever aborts the process;
//! the rest are caught at their own loop level and folded into audit output.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{0}")]
    Fatal(String),

    #[error("tenant {tenant}: {source}")]
    TenantScope {
        tenant: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("container {container}: {source}")]
    ContainerScope {
        container: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("object {object}: {source}")]
    ObjectScope {
        object: String,
        #[source]
        source: anyhow::Error,
    },
}
