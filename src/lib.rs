//! grimoire - effect-resolution and duration-tracking core for a tabletop
//! combat assistant
//!
//! Given a declarative automation tree describing an attack or spell, a
//! caster, a target list, and optional combat context, this crate resolves
//! dice rolls, saving throws, and damage (with resistance handling), and
//! tracks time-limited combatant modifiers whose expiry is measured in
//! game rounds and turns, never wall-clock time.

pub mod args;
pub mod automation;
pub mod config;
pub mod dice;
pub mod initiative;
pub mod sheet;
pub mod store;

pub use args::Args;
pub use automation::{
    Automation, AutomationError, Caster, Report, RunOptions, RunResult, TargetInput,
};
pub use config::Limits;
pub use initiative::{AppliedEffect, Combat, Combatant};
pub use sheet::{Ability, Resistance, Resistances};
