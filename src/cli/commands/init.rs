//! Configuration file command.

use super::Context;
use crate::config;

/// Write the collection roots and policies to the configuration file
pub fn cmd_init(
    ctx: &Context,
    roots: &[String],
    ignore_symlinks: bool,
    auto_update: bool,
) -> anyhow::Result<()> {
    let Some(path) = ctx.config_path.as_deref() else {
        anyhow::bail!("Could not determine the config directory, pass --config");
    };

    let mut config = ctx.config.clone();
    config.collection.uris = config::validate_roots(roots)?;
    config.collection.ignore_symlinks = ignore_symlinks;
    config.collection.auto_update = auto_update;
    config::save(&config, path)?;

    println!("Wrote {}", path.display());
    for uri in &config.collection.uris {
        println!("  collection root: {uri}");
    }
    Ok(())
}
