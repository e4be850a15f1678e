//! Generic error phrase matching for the backend-broken detector

use regex::{Regex, RegexBuilder};

use crate::{FlowError, Result};

/// Case-insensitive scanner for generic backend error phrases
///
/// Patterns are tried in order; the first hit wins and the matched page text
/// becomes the error label.
#[derive(Debug, Clone)]
pub struct BackendErrorMatcher {
    patterns: Vec<Regex>,
}

impl BackendErrorMatcher {
    /// Compile the given patterns (regex syntax, matched case-insensitively)
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        FlowError::Config(format!("Invalid error pattern '{}': {}", p.as_ref(), e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Return the first matching phrase as it appears in `text`
    pub fn find(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str().to_string())
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
