//! Dice expression system
//!
//! Parses and rolls annotated dice notation like "2d6+3", "2d20ro1kh1+5",
//! "4d6[fire] + 2d8[cold]". Rolling produces a result tree that downstream
//! code (resistance handling, damage output) can rewrite and re-total.

mod ast;
mod roller;

pub use ast::{parse, BinOp, DiceOp, Expr};
pub use roller::{
    roll, CritKind, Die, DieRoller, RandRoller, RollContext, RollResult, Rolled, ScriptedRoller,
    SeededRoller,
};

use thiserror::Error;

/// Errors produced while parsing or rolling dice expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    /// The expression could not be parsed.
    #[error("invalid dice expression: {0}")]
    Parse(String),
    /// The roll-count cap was hit; bounds the cost of adversarial expressions.
    #[error("too many dice rolled (limit {0})")]
    TooManyRolls(u32),
}
