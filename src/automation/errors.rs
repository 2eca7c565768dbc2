//! Automation error taxonomy
//!
//! Every variant is terminal for the current run and user-facing; nothing
//! retries and prior mutations are not rolled back.

use thiserror::Error;

use crate::dice::DiceError;
use crate::initiative::CombatError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomationError {
    #[error("No attack bonus found. Use the `b` argument to specify one.")]
    NoAttackBonus,
    #[error("No saving throw DC found. Use the `dc` argument to specify one.")]
    NoSaveDc,
    #[error("{0:?} is not a valid save type.")]
    InvalidSaveType(String),
    #[error("{0:?} cannot be interpreted as an integer expression.")]
    InvalidIntExpression(String),
    #[error("{0:?} is not a valid effect duration.")]
    InvalidDuration(String),
    #[error("Concentration effects cannot be attached to the caster's own concentration.")]
    SelfConcentration,
    #[error("No combatant with id {0:?} in this combat.")]
    UnknownCombatant(String),
    #[error("This requires a target with a stat block.")]
    TargetIsSimple,
    #[error(transparent)]
    Dice(#[from] DiceError),
}

impl From<CombatError> for AutomationError {
    fn from(err: CombatError) -> Self {
        match err {
            CombatError::UnknownCombatant(id) => AutomationError::UnknownCombatant(id),
        }
    }
}
