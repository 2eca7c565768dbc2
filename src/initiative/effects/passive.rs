//! Passive modifiers granted by an applied effect
//!
//! Only non-default fields serialize, so a stored effect carries just the
//! modifiers it actually grants.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sheet::{Ability, AdvantageType, Resistance};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveEffects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_advantage: Option<AdvantageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_hit_bonus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_bonus: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub magical_damage: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub silvered_damage: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resistances: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub immunities: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Resistance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_resistances: Vec<Resistance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac_bonus: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp_bonus: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_bonus: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub save_adv: BTreeSet<Ability>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub save_dis: BTreeSet<Ability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_bonus: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl PassiveEffects {
    pub fn is_empty(&self) -> bool {
        *self == PassiveEffects::default()
    }
}

impl std::fmt::Display for PassiveEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        match self.attack_advantage {
            Some(AdvantageType::Adv) => parts.push("Attack Advantage".to_string()),
            Some(AdvantageType::Dis) => parts.push("Attack Disadvantage".to_string()),
            Some(AdvantageType::Elven) => {
                parts.push("Attack Advantage: Elven Accuracy".to_string())
            }
            _ => {}
        }
        if let Some(v) = &self.to_hit_bonus {
            parts.push(format!("Attack Bonus: {}", v));
        }
        if let Some(v) = &self.damage_bonus {
            parts.push(format!("Damage Bonus: {}", v));
        }
        if self.magical_damage {
            parts.push("Magical Damage".to_string());
        }
        if self.silvered_damage {
            parts.push("Silvered Damage".to_string());
        }
        let list = |title: &str, rules: &[Resistance]| {
            format!(
                "{}: {}",
                title,
                rules
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        if !self.resistances.is_empty() {
            parts.push(list("Resistance", &self.resistances));
        }
        if !self.immunities.is_empty() {
            parts.push(list("Immunity", &self.immunities));
        }
        if !self.vulnerabilities.is_empty() {
            parts.push(list("Vulnerability", &self.vulnerabilities));
        }
        if !self.ignored_resistances.is_empty() {
            parts.push(list("Neutral", &self.ignored_resistances));
        }
        if let Some(v) = self.ac_value {
            parts.push(format!("AC: {}", v));
        }
        if let Some(v) = self.ac_bonus {
            parts.push(format!("AC Bonus: {}", v));
        }
        if let Some(v) = self.max_hp_value {
            parts.push(format!("Max HP: {}", v));
        }
        if let Some(v) = self.max_hp_bonus {
            parts.push(format!("Max HP Bonus: {}", v));
        }
        if let Some(v) = &self.save_bonus {
            parts.push(format!("Save Bonus: {}", v));
        }
        if !self.save_adv.is_empty() {
            parts.push(save_set("Save Advantage", &self.save_adv));
        }
        if !self.save_dis.is_empty() {
            parts.push(save_set("Save Disadvantage", &self.save_dis));
        }
        if let Some(v) = &self.check_bonus {
            parts.push(format!("Check Bonus: {}", v));
        }
        write!(f, "{}", parts.join("; "))
    }
}

fn save_set(title: &str, abilities: &BTreeSet<Ability>) -> String {
    if abilities.len() == Ability::ALL.len() {
        return format!("{}: All", title);
    }
    let names: Vec<&str> = abilities.iter().map(|a| a.name()).collect();
    format!("{}: {}", title, names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(PassiveEffects::default().is_empty());
        let effects = PassiveEffects {
            ac_bonus: Some(2),
            ..Default::default()
        };
        assert!(!effects.is_empty());
    }

    #[test]
    fn test_only_non_default_fields_serialize() {
        let effects = PassiveEffects {
            attack_advantage: Some(AdvantageType::Adv),
            ac_bonus: Some(2),
            resistances: vec![Resistance::new("fire")],
            ..Default::default()
        };
        let json = serde_json::to_value(&effects).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("attack_advantage"));
        assert!(obj.contains_key("ac_bonus"));
        assert!(obj.contains_key("resistances"));
    }

    #[test]
    fn test_round_trip() {
        let effects = PassiveEffects {
            save_adv: [Ability::Wisdom, Ability::Charisma].into(),
            save_bonus: Some("1d4".to_string()),
            magical_damage: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&effects).unwrap();
        let back: PassiveEffects = serde_json::from_str(&json).unwrap();
        assert_eq!(back, effects);
    }

    #[test]
    fn test_display() {
        let effects = PassiveEffects {
            attack_advantage: Some(AdvantageType::Adv),
            ac_bonus: Some(2),
            resistances: vec![Resistance::new("fire")],
            ..Default::default()
        };
        assert_eq!(
            effects.to_string(),
            "Attack Advantage; Resistance: fire; AC Bonus: 2"
        );
    }

    #[test]
    fn test_display_all_saves() {
        let effects = PassiveEffects {
            save_adv: Ability::ALL.into(),
            ..Default::default()
        };
        assert_eq!(effects.to_string(), "Save Advantage: All");
    }
}
