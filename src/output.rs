use std::io::{self, Write};

use serde::Deserialize;

use crate::classify::{Classifier, Verdict};

/// Printed after every run, whatever the output looked like.
pub const SEPARATOR: &str = "=======================";

const GREEN: &str = "\x1b[0;32m";
const RED: &str = "\x1b[0;31m";
const RESET: &str = "\x1b[0m";
const BRIGHT_WHITE: &str = "\x1b[1;37m";

/// Escape sequence appended after each colored line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetStyle {
    /// `ESC[0m`, back to the terminal's default attributes.
    #[default]
    Default,
    /// `ESC[1;37m`, the suffix older autotest scripts used.
    BrightWhite,
}

impl ResetStyle {
    fn sequence(self) -> &'static str {
        match self {
            Self::Default => RESET,
            Self::BrightWhite => BRIGHT_WHITE,
        }
    }
}

/// Color wrappers per verdict. A disabled palette prints lines untouched.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
    reset: ResetStyle,
}

impl Palette {
    pub fn new(enabled: bool, reset: ResetStyle) -> Self {
        Self { enabled, reset }
    }

    pub fn paint(&self, verdict: Verdict, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        let start = match verdict {
            Verdict::Pass => GREEN,
            Verdict::Fail => RED,
        };
        format!("{start}{text}{}", self.reset.sequence())
    }
}

/// Classifies output lines and writes them, colored, to `out`.
///
/// Every line handed to [`Reporter::line`] is written immediately and exactly
/// once; [`Reporter::finish`] writes the separator.
pub struct Reporter<'a, W: Write> {
    out: W,
    classifier: &'a Classifier,
    palette: Palette,
}

impl<'a, W: Write> Reporter<'a, W> {
    pub fn new(out: W, classifier: &'a Classifier, palette: Palette) -> Self {
        Self {
            out,
            classifier,
            palette,
        }
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        let verdict = self.classifier.classify(text);
        writeln!(self.out, "{}", self.palette.paint(verdict, text))?;
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out, "{SEPARATOR}")?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
