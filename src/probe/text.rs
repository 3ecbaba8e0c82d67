//! Output expectations shared by the HTTP and shell probers.

use super::ProbeError;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Checks that probe output contains (or lacks) some text.
///
/// With `regex` set, both patterns are compiled as regular expressions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextChecker {
    pub contain: String,
    pub not_contain: String,
    pub regex: bool,
    #[serde(skip)]
    contain_re: Option<Regex>,
    #[serde(skip)]
    not_contain_re: Option<Regex>,
}

impl TextChecker {
    /// Compile patterns. Must run before [`TextChecker::check`] when `regex` is set.
    pub fn config(&mut self) -> Result<(), ProbeError> {
        if !self.regex {
            return Ok(());
        }
        self.contain_re = compile(&self.contain)?;
        self.not_contain_re = compile(&self.not_contain)?;
        Ok(())
    }

    pub fn check(&self, text: &str) -> Result<(), ProbeError> {
        if self.regex {
            if let Some(re) = &self.contain_re {
                if !re.is_match(text) {
                    return Err(ProbeError::Check(format!(
                        "output does not match pattern [{}]",
                        self.contain
                    )));
                }
            }
            if let Some(re) = &self.not_contain_re {
                if re.is_match(text) {
                    return Err(ProbeError::Check(format!(
                        "output matches forbidden pattern [{}]",
                        self.not_contain
                    )));
                }
            }
            return Ok(());
        }

        if !self.contain.is_empty() && !text.contains(&self.contain) {
            return Err(ProbeError::Check(format!(
                "output does not contain [{}]",
                self.contain
            )));
        }
        if !self.not_contain.is_empty() && text.contains(&self.not_contain) {
            return Err(ProbeError::Check(format!(
                "output contains [{}]",
                self.not_contain
            )));
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>, ProbeError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| ProbeError::Config(format!("invalid regex [{}]: {}", pattern, e)))
}
