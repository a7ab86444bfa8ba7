//! Configuration surface consumed by the kernel core (spec.md §6), loaded
//! from an optional TOML file. Falls back silently to defaults on a missing
//! or unparsable file, logging a warning rather than failing — matching the
//! teacher's `Config::load` idiom.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filter::{ConntrackMonitor, MonitorFunctionResult};
use crate::process::{MonitorMode, MAX_ID_LIST};

fn default_monitor_function_result() -> String {
    "all".to_string()
}

fn default_pid_monitor_mode() -> String {
    "ignore".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetfilterConfig {
    #[serde(default)]
    pub hooks: bool,
    #[serde(default)]
    pub use_user: bool,
    #[serde(default = "default_monitor_ct")]
    pub monitor_ct: String,
}

fn default_monitor_ct() -> String {
    "all".to_string()
}

impl Default for NetfilterConfig {
    fn default() -> Self {
        Self {
            hooks: false,
            use_user: false,
            monitor_ct: default_monitor_ct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HardenConfig {
    #[serde(default)]
    pub tgids: Vec<i64>,
    #[serde(default)]
    pub authorized_uids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelConfig {
    #[serde(default)]
    pub network_io: bool,
    #[serde(default)]
    pub include_ns_info: bool,
    #[serde(default = "default_monitor_function_result")]
    pub monitor_function_result: String,
    #[serde(default = "default_pid_monitor_mode")]
    pub pid_monitor_mode: String,
    #[serde(default)]
    pub pids: Vec<i64>,
    #[serde(default = "default_pid_monitor_mode")]
    pub ppid_monitor_mode: String,
    #[serde(default)]
    pub ppids: Vec<i64>,
    #[serde(default = "default_pid_monitor_mode")]
    pub uid_monitor_mode: String,
    #[serde(default)]
    pub uids: Vec<i64>,
    #[serde(default)]
    pub netfilter: NetfilterConfig,
    #[serde(default)]
    pub harden: HardenConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            network_io: false,
            include_ns_info: false,
            monitor_function_result: default_monitor_function_result(),
            pid_monitor_mode: default_pid_monitor_mode(),
            pids: Vec::new(),
            ppid_monitor_mode: default_pid_monitor_mode(),
            ppids: Vec::new(),
            uid_monitor_mode: default_pid_monitor_mode(),
            uids: Vec::new(),
            netfilter: NetfilterConfig::default(),
            harden: HardenConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Loads from `path` if given; falls back silently to [`Self::default`]
    /// on a missing file, an I/O error, or a parse error (each logged as a
    /// warning, never a hard failure).
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                log::warn!("could not read kernel config {}: {err}", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => Self::truncate_lists(config),
            Err(err) => {
                log::warn!("could not parse kernel config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    fn truncate_lists(mut config: Self) -> Self {
        for (name, list) in [
            ("pids", &mut config.pids),
            ("ppids", &mut config.ppids),
            ("uids", &mut config.uids),
        ] {
            if list.len() > MAX_ID_LIST {
                log::warn!(
                    "{name} list truncated from {} to {MAX_ID_LIST} entries",
                    list.len()
                );
                list.truncate(MAX_ID_LIST);
            }
        }
        if config.harden.tgids.len() > MAX_ID_LIST {
            config.harden.tgids.truncate(MAX_ID_LIST);
        }
        if config.harden.authorized_uids.len() > MAX_ID_LIST {
            config.harden.authorized_uids.truncate(MAX_ID_LIST);
        }
        config
    }

    pub fn monitor_function_result(&self) -> MonitorFunctionResult {
        match self.monitor_function_result.as_str() {
            "only_failed" => MonitorFunctionResult::OnlyFailed,
            "only_successful" => MonitorFunctionResult::OnlySuccessful,
            _ => MonitorFunctionResult::All,
        }
    }

    pub fn monitor_ct(&self) -> ConntrackMonitor {
        match self.netfilter.monitor_ct.as_str() {
            "only_new" => ConntrackMonitor::OnlyNew,
            _ => ConntrackMonitor::All,
        }
    }
}

pub fn parse_monitor_mode(s: &str) -> MonitorMode {
    match s {
        "capture" => MonitorMode::Capture,
        _ => MonitorMode::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_falls_back_to_default() {
        let config = KernelConfig::load(None);
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn unreadable_path_falls_back_to_default() {
        let config = KernelConfig::load(Some(Path::new("/nonexistent/kernel.toml")));
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn malformed_toml_falls_back_to_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not = [valid toml").unwrap();
        let config = KernelConfig::load(Some(file.path()));
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn valid_toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            network_io = true
            include_ns_info = true
            monitor_function_result = "only_failed"

            [harden]
            tgids = [500]
            authorized_uids = [1000]
            "#
        )
        .unwrap();
        let config = KernelConfig::load(Some(file.path()));
        assert!(config.network_io);
        assert_eq!(
            config.monitor_function_result(),
            MonitorFunctionResult::OnlyFailed
        );
        assert_eq!(config.harden.tgids, vec![500]);
    }

    #[test]
    fn oversized_lists_are_truncated_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let pids: Vec<String> = (0..100).map(|n| n.to_string()).collect();
        write!(file, "pids = [{}]", pids.join(",")).unwrap();
        let config = KernelConfig::load(Some(file.path()));
        assert_eq!(config.pids.len(), MAX_ID_LIST);
    }
}
