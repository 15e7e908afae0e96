//! Detect command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::{BackendChoice, Config};
use crate::enforcer::{create_backend, BackendKind};
use crate::error::SyncError;
use crate::probe::{HostProbe, RealHostProbe};

/// Run the detect command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = super::load_config_or_default(config_path)?;
    let probe = RealHostProbe;

    println!("OS: {:?}", probe.os_family());
    let kind = detect(&config, &probe)?;
    match config.backend {
        BackendChoice::Auto => println!("Backend: {} (auto)", kind),
        _ => println!("Backend: {} (configured)", kind),
    }
    println!(
        "IPv6: {}",
        if config.dual_stack { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Backend the selector picks for `config` on the probed host.
pub fn detect(config: &Config, probe: &dyn HostProbe) -> Result<BackendKind, SyncError> {
    // Selection only probes; the executor is never invoked.
    let backend = create_backend(
        config.backend,
        super::executor(config),
        config.dual_stack,
        probe,
    )?;
    Ok(backend.kind())
}
