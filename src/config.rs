use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::classify::{Classifier, Verdict};
use crate::cli::Cli;
use crate::output::ResetStyle;
use crate::runner::DEFAULT_COMMAND;
use crate::watcher::{DEFAULT_DEBOUNCE, WatchRule};

pub const CONFIG_FILE: &str = "autotest.toml";

/// Configuration loaded from `autotest.toml` at the project root.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AutotestConfig {
    /// Test command run through the shell (default `lein test`).
    pub command: Option<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Drop changes to files ignored by the root `.gitignore` (default true).
    pub respect_gitignore: Option<bool>,
    /// Escape sequence appended after each colored line.
    pub reset: Option<ResetStyle>,
    /// Replaces the default `src/` and `test/` rules when present.
    pub watch: Option<Vec<WatchRuleConfig>>,
    /// Extra line rules, checked before the built-in ones.
    #[serde(default)]
    pub classify: Vec<ClassifyRuleConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchRuleConfig {
    pub dir: PathBuf,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifyRuleConfig {
    pub pattern: String,
    pub verdict: Verdict,
}

impl AutotestConfig {
    /// Load configuration from `autotest.toml` in the given root directory.
    ///
    /// Returns a default (empty) configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }
}

/// Everything a session needs, with CLI flags applied over the config file
/// and the config file over built-in defaults.
#[derive(Debug)]
pub struct Settings {
    pub root: PathBuf,
    pub command: String,
    pub debounce: Duration,
    pub respect_gitignore: bool,
    pub reset: ResetStyle,
    pub rules: Vec<WatchRule>,
    pub classifier: Classifier,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: AutotestConfig) -> anyhow::Result<Self> {
        let rules = match config.watch {
            Some(rules) => rules
                .into_iter()
                .map(|r| WatchRule::new(r.dir, &r.pattern))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("invalid [[watch]] rule in {CONFIG_FILE}"))?,
            None => WatchRule::defaults()?,
        };

        let classifier = Classifier::with_rules(
            config
                .classify
                .iter()
                .map(|r| (r.pattern.as_str(), r.verdict)),
        )
        .with_context(|| format!("invalid [[classify]] pattern in {CONFIG_FILE}"))?;

        let debounce = cli
            .debounce_ms
            .or(config.debounce_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);

        Ok(Self {
            root: cli.path.clone(),
            command: cli
                .command
                .clone()
                .or(config.command)
                .unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
            debounce,
            respect_gitignore: config.respect_gitignore.unwrap_or(true),
            reset: config.reset.unwrap_or_default(),
            rules,
            classifier,
        })
    }
}
