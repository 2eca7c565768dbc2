//! Interactions granted by an applied effect
//!
//! An effect can grant its owner extra attacks and interactive buttons for
//! its lifetime; each wraps its own nested automation tree.

use serde::{Deserialize, Serialize};

use crate::automation::Automation;

/// An additional attack the owner can take while the effect is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantedAttack {
    pub name: String,
    pub automation: Automation,
}

impl std::fmt::Display for GrantedAttack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Attack: {}", self.name)
    }
}

/// A button attached to the owner's turn message that runs some automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantedButton {
    pub label: String,
    pub automation: Automation,
}

impl std::fmt::Display for GrantedButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip() {
        let attack = GrantedAttack {
            name: "Summoned Blade".to_string(),
            automation: Automation::default(),
        };
        let json = serde_json::to_string(&attack).unwrap();
        let back: GrantedAttack = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attack);
    }
}
