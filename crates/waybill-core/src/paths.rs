use std::path::{Path, PathBuf};

pub const WAYBILL_DIR: &str = ".waybill";
pub const CONFIG_FILE: &str = ".waybill/config.yaml";
pub const DATABASE_FILE: &str = ".waybill/actions.redb";

pub fn waybill_dir(root: &Path) -> PathBuf {
    root.join(WAYBILL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}
