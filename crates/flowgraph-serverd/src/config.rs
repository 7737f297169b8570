use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    graph: GraphConfig,
    #[serde(default)]
    log: LogConfig,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    permission_policy: Option<String>,
    socket_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct GraphConfig {
    quantum: Option<u32>,
    sample_rate: Option<u32>,
    cycle_interval_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct LogConfig {
    level: Option<String>,
}

/// Which permission policy (spec §4.3) the process should install on its `Core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    DefaultAllow,
    SameUid,
    ReadOnly,
}

pub struct Config {
    server: ServerConfig,
    graph: GraphConfig,
    log: LogConfig,
}

impl Config {
    /// Parse the embedded default config, then overlay a user config from
    /// `runtime_dir`/`--config` if one is present. Never hard-fails: a
    /// missing or malformed user config just falls back to the embedded
    /// defaults with a logged warning, matching the rest of the workspace's
    /// config handling.
    pub fn load(user_path: Option<&PathBuf>) -> Self {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).expect("failed to parse embedded config.toml");

        let path = user_path.cloned().or_else(user_config_path);
        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            merge_server(&mut base.server, user.server);
                            merge_graph(&mut base.graph, user.graph);
                            merge_log(&mut base.log, user.log);
                        }
                        Err(e) => log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e),
                    },
                    Err(e) => log::warn!(target: "config", "could not read config {}: {}", path.display(), e),
                }
            }
        }

        Config {
            server: base.server,
            graph: base.graph,
            log: base.log,
        }
    }

    pub fn permission_policy(&self) -> PermissionPolicy {
        match self.server.permission_policy.as_deref() {
            Some("same-uid") => PermissionPolicy::SameUid,
            Some("read-only") => PermissionPolicy::ReadOnly,
            _ => PermissionPolicy::DefaultAllow,
        }
    }

    pub fn socket_name(&self) -> &str {
        self.server.socket_name.as_deref().unwrap_or("flowgraph-0")
    }

    pub fn quantum(&self) -> u32 {
        self.graph.quantum.unwrap_or(1024)
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate.unwrap_or(48_000)
    }

    pub fn cycle_interval_ms(&self) -> u64 {
        self.graph.cycle_interval_ms.unwrap_or(20).max(1)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.log.level.as_deref() {
            Some("trace") => log::LevelFilter::Trace,
            Some("debug") => log::LevelFilter::Debug,
            Some("warn") => log::LevelFilter::Warn,
            Some("error") => log::LevelFilter::Error,
            Some("off") => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }
}

/// Where the socket and any server-created files live: `$FLOWGRAPH_RUNTIME_DIR`,
/// falling back to `$XDG_RUNTIME_DIR`, falling back to `/tmp`.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLOWGRAPH_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/tmp")
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("flowgraph").join("config.toml"))
}

fn merge_server(base: &mut ServerConfig, user: ServerConfig) {
    if user.permission_policy.is_some() {
        base.permission_policy = user.permission_policy;
    }
    if user.socket_name.is_some() {
        base.socket_name = user.socket_name;
    }
}

fn merge_graph(base: &mut GraphConfig, user: GraphConfig) {
    if user.quantum.is_some() {
        base.quantum = user.quantum;
    }
    if user.sample_rate.is_some() {
        base.sample_rate = user.sample_rate;
    }
    if user.cycle_interval_ms.is_some() {
        base.cycle_interval_ms = user.cycle_interval_ms;
    }
}

fn merge_log(base: &mut LogConfig, user: LogConfig) {
    if user.level.is_some() {
        base.level = user.level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_parses_and_has_sane_values() {
        let config = Config::load(None);
        assert_eq!(config.permission_policy(), PermissionPolicy::DefaultAllow);
        assert_eq!(config.quantum(), 1024);
        assert_eq!(config.sample_rate(), 48_000);
        assert!(config.cycle_interval_ms() > 0);
    }

    #[test]
    fn missing_user_path_falls_back_to_defaults_without_panic() {
        let config = Config::load(Some(&PathBuf::from("/nonexistent/flowgraph/config.toml")));
        assert_eq!(config.socket_name(), "flowgraph-0");
    }
}
