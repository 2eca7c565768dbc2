//! Parsed argument bag
//!
//! Tokenizing user input into arguments happens outside this crate; the
//! interpreter consumes the resulting bag through these typed accessors.
//! Malformed numeric values are ignored (the caller falls back to its
//! default) rather than aborting the run.

use std::collections::BTreeMap;

use tracing::warn;

use crate::sheet::AdvantageType;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: BTreeMap<String, Vec<String>>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for an argument.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_default().push(value.into());
    }

    /// Builder form of [`Args::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Builder form for boolean flags.
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.with(name, "true")
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Every value supplied for an argument, oldest first.
    pub fn get(&self, name: &str) -> &[String] {
        self.values.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The last value supplied for an argument.
    pub fn last(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|v| v.last())
            .map(String::as_str)
    }

    /// The last value as a flag: present and not literally "false".
    pub fn last_bool(&self, name: &str) -> bool {
        match self.last(name) {
            Some(v) => !v.eq_ignore_ascii_case("false"),
            None => false,
        }
    }

    /// The last value as an integer; malformed values are ignored.
    pub fn last_i64(&self, name: &str) -> Option<i64> {
        let raw = self.last(name)?;
        match raw.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!(arg = name, value = raw, "ignoring malformed integer argument");
                None
            }
        }
    }

    /// The last value as a non-negative integer; malformed values are ignored.
    pub fn last_u32(&self, name: &str) -> Option<u32> {
        self.last_i64(name).and_then(|n| u32::try_from(n).ok())
    }

    /// Joins every value for an argument with a separator.
    pub fn join(&self, name: &str, sep: &str) -> Option<String> {
        let values = self.get(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(sep))
        }
    }

    /// Net advantage from the `adv`/`dis` flags (and `ea` when allowed).
    pub fn adv(&self, allow_elven: bool) -> AdvantageType {
        let adv = self.last_bool("adv");
        let dis = self.last_bool("dis");
        let elven = allow_elven && self.last_bool("ea");
        if dis {
            if adv || elven {
                AdvantageType::None
            } else {
                AdvantageType::Dis
            }
        } else if elven {
            AdvantageType::Elven
        } else if adv {
            AdvantageType::Adv
        } else {
            AdvantageType::None
        }
    }

    /// Net advantage for saving throws, from the `sadv`/`sdis` flags.
    pub fn save_adv(&self) -> AdvantageType {
        match (self.last_bool("sadv"), self.last_bool("sdis")) {
            (true, true) | (false, false) => AdvantageType::None,
            (true, false) => AdvantageType::Adv,
            (false, true) => AdvantageType::Dis,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Args::new();
        for (k, v) in iter {
            args.push(k, v);
        }
        args
    }
}

/// Applies an argument that is either an absolute value or a `+N`/`-N`
/// adjustment of `base`. Malformed input leaves `base` unchanged.
pub fn maybe_mod(arg: &str, base: Option<i64>) -> Option<i64> {
    let trimmed = arg.trim();
    let relative = trimmed.starts_with('+') || trimmed.starts_with('-');
    match trimmed.parse::<i64>() {
        Ok(n) if relative => Some(base.unwrap_or(0) + n),
        Ok(n) => Some(n),
        Err(_) => {
            warn!(value = arg, "ignoring malformed numeric argument");
            base
        }
    }
}
