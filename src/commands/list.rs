//! List command implementation.

use anyhow::Result;
use std::path::Path;

use crate::enforcer::{create_backend, Listing};
use crate::probe::RealHostProbe;
use crate::reconciler::families;

/// Run the list command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let backend = create_backend(
        config.backend,
        super::executor(&config),
        config.dual_stack,
        &RealHostProbe,
    )?;

    let listing = backend.list_blocked().await?;
    println!("Backend: {}", backend.kind());
    print!("{}", render_listing(&listing, config.dual_stack));
    Ok(())
}

/// Per-family listing, one address per line.
fn render_listing(listing: &Listing, dual_stack: bool) -> String {
    let mut out = String::new();
    for &family in families(dual_stack) {
        if let Some((_, message)) = listing.failed.iter().find(|(f, _)| *f == family) {
            out.push_str(&format!("\n{} (listing failed): {}\n", family, message));
            continue;
        }
        let set = listing.rule_set(family);
        out.push_str(&format!("\n{} ({} blocked):\n", family, set.len()));
        for address in set.iter() {
            out.push_str(&format!("  {}\n", address));
        }
    }
    if !listing.skipped.is_empty() {
        out.push_str(&format!(
            "\n{} unrecognized listing lines (run with --verbose to see them)\n",
            listing.skipped.len()
        ));
    }
    out
}
