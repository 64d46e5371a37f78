use anyhow::Context;
use std::path::Path;
use waybill_core::config::{Config, UploadMode, WarnLevel};
use waybill_core::{io, paths};

pub fn run(root: &Path, url: Option<String>, signed_urls: bool, retry_cap: Option<u32>) -> anyhow::Result<()> {
    println!("Initializing waybill in: {}", root.display());

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root)?
    } else {
        let mut cfg = Config::default();
        cfg.backend.url = url;
        if signed_urls {
            cfg.backend.upload_mode = UploadMode::SignedUrl;
        }
        if let Some(cap) = retry_cap {
            cfg.sync.retry_cap = cap;
        }
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let db_path = paths::database_path(root);
    let existed = db_path.exists();
    super::open_store(root, &config)?;
    println!(
        "  {} {}",
        if existed { "exists: " } else { "created:" },
        paths::DATABASE_FILE
    );

    for w in config.validate() {
        let tag = match w.level {
            WarnLevel::Error => "error",
            WarnLevel::Warning => "warning",
        };
        println!("  {tag}: {}", w.message);
    }

    // Keep the store out of version control.
    let ignore = paths::waybill_dir(root).join(".gitignore");
    if !ignore.exists() {
        io::atomic_write(&ignore, b"actions.redb\n").context("failed to write .gitignore")?;
    }
    Ok(())
}
