use std::env;
use std::time::Duration;

pub const DEFAULT_APPIUM_SERVER: &str = "http://localhost:4723";

/// Runtime knobs for graphs and the Appium backend.
///
/// Values come from the process environment (and `.env` in the working
/// directory, if present). Anything missing or unparsable keeps its default.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub appium_server: String,
    /// How long clicks and element lookups wait for their target.
    pub implicit_wait: Duration,
    /// Pause after a recovery restart, before navigation resumes.
    pub restart_pause: Duration,
    /// Upper bound on popup sweep passes in one recovery episode.
    pub max_popup_passes: usize,
    pub builtin_popups: bool,
    pub http_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            appium_server: DEFAULT_APPIUM_SERVER.to_string(),
            implicit_wait: Duration::from_millis(1000),
            restart_pause: Duration::from_millis(3000),
            max_popup_passes: 10,
            builtin_popups: true,
            http_timeout_secs: 60,
        }
    }
}

impl GraphConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            appium_server: lookup("UI_GRAPH_APPIUM_SERVER")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.appium_server),
            implicit_wait: millis("UI_GRAPH_IMPLICIT_WAIT_MS", defaults.implicit_wait),
            restart_pause: millis("UI_GRAPH_RESTART_PAUSE_MS", defaults.restart_pause),
            max_popup_passes: lookup("UI_GRAPH_MAX_POPUP_PASSES")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_popup_passes),
            builtin_popups: lookup("UI_GRAPH_BUILTIN_POPUPS")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.builtin_popups),
            http_timeout_secs: lookup("UI_GRAPH_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    let v = raw.trim().to_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "on")
}
