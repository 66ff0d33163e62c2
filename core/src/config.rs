//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! { "pagerank": { "damping": 0.9 }, "engine": "pregel" }
//! ```

use crate::error::{Error, Result};
use crate::pagerank::EngineKind;
use crate::tokenizer::{default_stop_words, StopWords};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping: f64,
    /// Hard cap on iterations/supersteps, honoured even without convergence.
    pub max_iterations: u32,
    /// RMS threshold for the map/reduce engine.
    pub tolerance: f64,
    /// Per-vertex change below which a superstep vertex goes inactive.
    pub activity_threshold: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping: 0.85, max_iterations: 100, tolerance: 1e-6, activity_threshold: 1e-10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub results_per_page: usize,
    pub snippet_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { results_per_page: 10, snippet_length: 150 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pagerank: PageRankConfig,
    pub search: SearchConfig,
    pub engine: EngineKind,
    /// Replaces the built-in stop-word list when present.
    pub stop_words: Option<Vec<String>>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let pr = &self.pagerank;
        if !(pr.damping > 0.0 && pr.damping < 1.0) {
            return Err(Error::invalid_config(format!("damping must be in (0, 1), got {}", pr.damping)));
        }
        if pr.max_iterations == 0 {
            return Err(Error::invalid_config("max_iterations must be at least 1"));
        }
        if !(pr.tolerance > 0.0) || !(pr.activity_threshold > 0.0) {
            return Err(Error::invalid_config("tolerance and activity_threshold must be positive"));
        }
        if self.search.results_per_page == 0 || self.search.snippet_length == 0 {
            return Err(Error::invalid_config("results_per_page and snippet_length must be positive"));
        }
        Ok(())
    }

    pub fn stop_words(&self) -> StopWords {
        match &self.stop_words {
            Some(words) => words.iter().map(|w| w.to_lowercase()).collect(),
            None => default_stop_words(),
        }
    }
}
