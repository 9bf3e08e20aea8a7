use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Watch a project's source and test files and re-run its tests on every change.
///
/// Each line of test output is printed green when it looks like progress or
/// success (`Testing ...`, `0 failures`, `Ran N tests containing M assertions`)
/// and red otherwise, followed by a separator line.
#[derive(Parser, Debug)]
#[command(name = "autotest", version, about, long_about = None)]
pub struct Cli {
    /// Project root containing the watched directories and `autotest.toml`.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Test command to run, through the shell, from the project root.
    #[arg(short, long)]
    pub command: Option<String>,

    /// Run the test command once, report, and exit without watching.
    #[arg(long)]
    pub once: bool,

    /// Quiet period in milliseconds before a burst of changes triggers a run.
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// When to wrap output lines in ANSI colors.
    #[arg(long, value_enum, default_value_t = ColorChoice::Always)]
    pub color: ColorChoice,

    /// Log debug details (batches, exit status) to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum ColorChoice {
    /// Always color, even when stdout is redirected (default).
    #[default]
    Always,
    /// Color only when stdout is a terminal.
    Auto,
    /// Never color.
    Never,
}

impl ColorChoice {
    pub fn enabled(self) -> bool {
        use std::io::IsTerminal;
        match self {
            Self::Always => true,
            Self::Auto => std::io::stdout().is_terminal(),
            Self::Never => false,
        }
    }
}
