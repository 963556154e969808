#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::Command;

pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Write a config file under `dir` pointing every endpoint at `base`.
pub fn write_config(dir: &Path, base: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        "[endpoints]\n\
         archive_base = \"https://web.archive.org\"\n\
         cdx = \"{base}/cdx/search/cdx\"\n\
         save = \"{base}/save\"\n\
         \n\
         [transport]\n\
         retries = 1\n\
         backoff_base_ms = 1\n\
         \n\
         [capture]\n\
         max_tries = 1\n"
    );
    std::fs::write(&path, content).expect("write test config");
    path
}

/// A `wayback` command isolated from the user's environment.
pub fn wayback_cmd(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wayback"));
    cmd.timeout(CMD_TIMEOUT);
    for var in [
        "WAYBACK_USER_AGENT",
        "WAYBACK_ARCHIVE_BASE",
        "WAYBACK_CDX_ENDPOINT",
        "WAYBACK_SAVE_ENDPOINT",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("WAYBACK_CONFIG", config);
    cmd
}
