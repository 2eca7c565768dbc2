//! Conditional damage resistance
//!
//! A rule is `(type, unless, only)` and matches a damage annotation's token
//! set T iff `type ∈ T ∧ unless ∩ T = ∅ ∧ only ⊆ T`. Matching rules rewrite
//! the rolled damage tree: vulnerability doubles, resistance halves,
//! immunity zeroes, and a matching neutral rule pins the multiplier at ×1.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::args::Args;
use crate::dice::{BinOp, Rolled};

/// A conditional rule against one damage type.
///
/// All damage-type words are lowercased on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResistanceRepr", into = "ResistanceRepr")]
pub struct Resistance {
    dtype: String,
    unless: BTreeSet<String>,
    only: BTreeSet<String>,
}

impl Resistance {
    pub fn new(dtype: impl Into<String>) -> Self {
        Self {
            dtype: dtype.into().to_lowercase(),
            unless: BTreeSet::new(),
            only: BTreeSet::new(),
        }
    }

    pub fn unless(mut self, words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.unless
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    pub fn only(mut self, words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.only
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    /// Parses "nonmagical cold fire" into `(fire, unless {magical},
    /// only {cold})`: the last word is the type, `non`-prefixed words are
    /// `unless` conditions, and the rest are `only` conditions.
    pub fn from_str(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut out = match words.last() {
            Some(last) => Resistance::new(*last),
            None => Resistance::new(""),
        };
        for word in &words[..words.len().saturating_sub(1)] {
            let lower = word.to_lowercase();
            if let Some(stripped) = lower.strip_prefix("non") {
                out.unless.insert(stripped.to_string());
            } else {
                out.only.insert(lower);
            }
        }
        out
    }

    /// Whether this rule applies to a lowercase token set.
    pub fn applies_to(&self, tokens: &BTreeSet<String>) -> bool {
        tokens.contains(&self.dtype)
            && self.unless.intersection(tokens).next().is_none()
            && self.only.is_subset(tokens)
    }

    pub fn applies_to_str(&self, annotation: &str) -> bool {
        self.applies_to(&tokenize(annotation))
    }
}

impl std::fmt::Display for Resistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut words: Vec<String> = self.unless.iter().map(|u| format!("non{}", u)).collect();
        words.extend(self.only.iter().cloned());
        words.push(self.dtype.clone());
        write!(f, "{}", words.join(" "))
    }
}

/// Serialized form: a bare string for unconditional rules, a map otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ResistanceRepr {
    Simple(String),
    Full {
        dtype: String,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        unless: BTreeSet<String>,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        only: BTreeSet<String>,
    },
}

impl From<ResistanceRepr> for Resistance {
    fn from(repr: ResistanceRepr) -> Self {
        match repr {
            ResistanceRepr::Simple(dtype) => Resistance::new(dtype),
            ResistanceRepr::Full {
                dtype,
                unless,
                only,
            } => Resistance::new(dtype).unless(unless).only(only),
        }
    }
}

impl From<Resistance> for ResistanceRepr {
    fn from(r: Resistance) -> Self {
        if r.unless.is_empty() && r.only.is_empty() {
            ResistanceRepr::Simple(r.dtype)
        } else {
            ResistanceRepr::Full {
                dtype: r.dtype,
                unless: r.unless,
                only: r.only,
            }
        }
    }
}

/// A creature's full rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resistances {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resist: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub immune: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vuln: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub neutral: Vec<Resistance>,
}

impl Resistances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every rule from `other`.
    pub fn update(&mut self, other: Resistances) {
        self.resist.extend(other.resist);
        self.immune.extend(other.immune);
        self.vuln.extend(other.vuln);
        self.neutral.extend(other.neutral);
    }

    /// Ephemeral rules passed as `resist`/`immune`/`vuln`/`neutral` args.
    pub fn from_args(args: &Args) -> Self {
        let rules = |name: &str| -> Vec<Resistance> {
            args.get(name).iter().map(|v| Resistance::from_str(v)).collect()
        };
        Self {
            resist: rules("resist"),
            immune: rules("immune"),
            vuln: rules("vuln"),
            neutral: rules("neutral"),
        }
    }

    pub fn is_resistant(&self, annotation: &str) -> bool {
        let tokens = tokenize(annotation);
        !self.neutral.iter().any(|r| r.applies_to(&tokens))
            && self.resist.iter().any(|r| r.applies_to(&tokens))
    }

    pub fn is_immune(&self, annotation: &str) -> bool {
        let tokens = tokenize(annotation);
        !self.neutral.iter().any(|r| r.applies_to(&tokens))
            && self.immune.iter().any(|r| r.applies_to(&tokens))
    }

    pub fn is_vulnerable(&self, annotation: &str) -> bool {
        let tokens = tokenize(annotation);
        !self.neutral.iter().any(|r| r.applies_to(&tokens))
            && self.vuln.iter().any(|r| r.applies_to(&tokens))
    }

    pub fn is_neutral(&self, annotation: &str) -> bool {
        let tokens = tokenize(annotation);
        self.neutral.iter().any(|r| r.applies_to(&tokens))
    }
}

impl std::fmt::Display for Resistances {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut lines = Vec::new();
        let join = |rules: &[Resistance]| {
            rules
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !self.resist.is_empty() {
            lines.push(format!("**Resistances**: {}", join(&self.resist)));
        }
        if !self.immune.is_empty() {
            lines.push(format!("**Immunities**: {}", join(&self.immune)));
        }
        if !self.vuln.is_empty() {
            lines.push(format!("**Vulnerabilities**: {}", join(&self.vuln)));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Lowercase word set of a damage annotation.
pub fn tokenize(annotation: &str) -> BTreeSet<String> {
    annotation
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Rewrites every annotated subtree of a rolled damage expression per the
/// rule set. A trailing `^` on the annotation opts the subtree out entirely;
/// a matching neutral rule leaves it untouched. Otherwise vulnerability
/// wraps ×2, then resistance ÷2, then immunity ×0 (outermost, checked after
/// resistance so the halved-then-zeroed arithmetic stays visible).
pub fn apply_resistances(node: &mut Rolled, rules: &Resistances, always: &BTreeSet<String>) {
    match node {
        Rolled::Annotated { inner, annotation } => {
            if annotation.trim_end().ends_with('^') {
                return;
            }
            let mut tokens = tokenize(annotation);
            tokens.extend(always.iter().cloned());
            if rules.neutral.iter().any(|r| r.applies_to(&tokens)) {
                return;
            }
            if rules.vuln.iter().any(|r| r.applies_to(&tokens)) {
                wrap(inner, BinOp::Mul, 2);
            }
            if rules.resist.iter().any(|r| r.applies_to(&tokens)) {
                wrap(inner, BinOp::Div, 2);
            }
            if rules.immune.iter().any(|r| r.applies_to(&tokens)) {
                wrap(inner, BinOp::Mul, 0);
            }
        }
        Rolled::Binary { lhs, rhs, .. } => {
            apply_resistances(lhs, rules, always);
            apply_resistances(rhs, rules, always);
        }
        Rolled::Paren(inner) => apply_resistances(inner, rules, always),
        Rolled::Set(items) => {
            for item in items {
                apply_resistances(item, rules, always);
            }
        }
        Rolled::Literal(_) | Rolled::Dice { .. } => {}
    }
}

fn wrap(inner: &mut Box<Rolled>, op: BinOp, factor: i64) {
    let old = std::mem::replace(&mut **inner, Rolled::Literal(0));
    **inner = Rolled::Binary {
        op,
        lhs: Box::new(Rolled::Paren(Box::new(old))),
        rhs: Box::new(Rolled::Literal(factor)),
    };
}
