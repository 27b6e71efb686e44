pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::EngineConfig;
pub use crate::core::context::{OsFamily, RuntimeContext};
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::launch::LaunchSpec;
pub use crate::core::orchestrator::{Orchestrator, PreparationState, Prepared};

/// Initialize structured logging. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,interface_engine=debug")),
        )
        .try_init();
}
