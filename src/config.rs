//! Engine configuration
//!
//! Resource limits that bound the cost of a single automation run, loaded
//! from `grimoire.toml` with `GRIMOIRE_`-prefixed environment overrides.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Cap on the `rr` repeat count of a Target node.
    pub max_iterations: u32,
    /// Cap on dice rolled across one run.
    pub max_rolls: u32,
    /// Truncation length for applied-effect descriptions.
    pub effect_desc_len: usize,
    /// Truncation length for Text node output.
    pub text_len: usize,
    /// TTL of the combat read-through cache, in milliseconds.
    pub cache_ttl_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_rolls: 1000,
            effect_desc_len: 500,
            text_len: 1020,
            cache_ttl_ms: 5000,
        }
    }
}

impl Limits {
    /// Loads limits from `grimoire.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("grimoire.toml"))
            .merge(Env::prefixed("GRIMOIRE_"))
            .extract()
    }
}
