//! Fatal errors for a migration run.

use imgapi_store::StoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Why a migration run stopped. Every variant is fatal; nothing is retried.
#[derive(Debug, Error, Diagnostic)]
pub enum MigrateError {
    /// Missing or invalid configuration. Raised before any store I/O.
    #[error("configuration error: {0}")]
    #[diagnostic(code(imgapi_migrate::config))]
    Config(String),

    /// Could not connect or bind to UFDS.
    #[error("could not connect to UFDS at {url}")]
    #[diagnostic(code(imgapi_migrate::connect))]
    Connect {
        url: String,
        #[source]
        source: StoreError,
    },

    /// Enumerating records failed; nothing was migrated.
    #[error("could not list {backend} images")]
    #[diagnostic(code(imgapi_migrate::list))]
    List {
        backend: &'static str,
        #[source]
        source: StoreError,
    },

    /// A record could not be migrated. Earlier records stay migrated.
    #[error("could not migrate {id}")]
    #[diagnostic(
        code(imgapi_migrate::transform),
        help("records before this one were already migrated; inspect {id} before re-running")
    )]
    Transform {
        id: String,
        #[source]
        source: StoreError,
    },
}
