//! End-to-end interpreter tests with scripted dice

mod common;

use common::{automation, combat_with_pair, fighter, goblin, wizard};
use grimoire::automation::{AutomationError, Caster, Report, RunOptions, SpellRef, TargetInput};
use grimoire::dice::{DiceError, ScriptedRoller};
use grimoire::sheet::{Resistance, Resistances};
use grimoire::Args;
use serde_json::json;

fn field_body<'r>(report: &'r Report, title: &str) -> &'r str {
    report
        .fields
        .iter()
        .find(|f| f.title == title)
        .map(|f| f.body.as_str())
        .unwrap_or_else(|| panic!("no field titled {:?} in {:#?}", title, report.fields))
}

fn basic_attack() -> serde_json::Value {
    json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {
                    "type": "attack",
                    "attackBonus": "5",
                    "hit": [{"type": "damage", "damage": "1d6[slashing]"}],
                    "miss": []
                }
            ]
        }
    ])
}

#[test]
fn test_attack_crit_doubles_damage_dice() {
    let tree = automation(basic_attack());
    let mut caster = fighter();
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([20, 4, 3, 4]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new().flag("adv"),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    // kept natural 20 with advantage is always a crit
    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("**To Hit**: 2d20kh1 (20, ~~4~~) + 5 = `25`"));
    assert!(body.contains("**Damage (CRIT!)**: 2d6 (3, 4) [slashing] = `7`"));
    assert_eq!(target.hp, Some(13));
    assert_eq!(result.damage(), 7);
}

#[test]
fn test_attack_total_below_ac_misses() {
    let tree = automation(basic_attack());
    let mut caster = fighter();
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([5]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("= `10`"));
    assert!(body.contains("**Miss!**"));
    assert_eq!(target.hp, Some(20));
    assert_eq!(result.damage(), 0);
}

#[test]
fn test_attack_forced_outcomes_skip_rolling() {
    let tree = automation(basic_attack());
    let mut caster = fighter();
    let mut target = goblin();
    // no faces scripted: a roll attempt would come up all ones
    let mut roller = ScriptedRoller::default();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new().flag("hit"),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("Automatic hit!"));
    assert_eq!(target.hp, Some(19)); // 1d6 rolled as 1

    let mut target2 = goblin();
    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target2)],
            Args::new().flag("miss"),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();
    assert!(field_body(&result.report, "Goblin").contains("Automatic miss!"));
    assert_eq!(target2.hp, Some(20));
}

#[test]
fn test_attack_bonus_precedence_node_wins() {
    let tree = automation(basic_attack());
    let mut caster = wizard(); // sab +7
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([10, 2]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions {
                ab_override: Some(9),
                ..Default::default()
            },
        )
        .unwrap();

    // the node's explicit +5 beats both the override and the spellbook
    assert!(field_body(&result.report, "Goblin").contains("= `15`"));
}

#[test]
fn test_attack_without_any_bonus_is_a_hard_failure() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "attack", "hit": [], "miss": []}]
        }
    ]));
    let mut caster = grimoire::Combatant::new("Commoner");
    let mut target = goblin();

    let err = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err, AutomationError::NoAttackBonus);
}

#[test]
fn test_hidden_attack_sends_roll_privately() {
    let tree = automation(basic_attack());
    let mut caster = fighter();
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([10]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new().flag("h"),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    // AC known: only the classification is public
    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("**To Hit**: 1d20... = `HIT`"));
    assert!(!body.contains("= `15`"));
    let private = &result.report.private["Fighter"];
    assert!(private[0].contains("= `15`"));
}

#[test]
fn test_save_auto_fail_skips_dice_and_runs_fail_branch() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {
                    "type": "save",
                    "stat": "wisdom",
                    "dc": "14",
                    "fail": [{"type": "damage", "damage": "10[fire]"}],
                    "success": []
                }
            ]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();
    // no dice faces scripted: the save must not roll
    let mut roller = ScriptedRoller::default();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new().flag("fail"),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    assert!(field_body(&result.report, "Meta").contains("**DC**: 14"));
    assert!(field_body(&result.report, "Goblin").contains("**WIS Save:** Automatic failure!"));
    assert_eq!(target.hp, Some(10));
}

#[test]
fn test_save_rolls_with_target_modifier() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {
                    "type": "save",
                    "stat": "wis",
                    "fail": [{"type": "damage", "damage": "4[psychic]"}],
                    "success": [{"type": "text", "text": "No effect."}]
                }
            ]
        }
    ]));
    let mut caster = wizard(); // spell DC 15
    let mut target = goblin(); // WIS save +1
    let mut roller = ScriptedRoller::new([14]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    // 14 + 1 = 15 meets DC 15
    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("Success!"));
    assert_eq!(target.hp, Some(20));
    assert!(result
        .report
        .fields
        .iter()
        .any(|f| f.title == "Effect" && f.body == "No effect."));
}

#[test]
fn test_unknown_save_keyword_is_a_hard_failure() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {"type": "save", "stat": "luck", "dc": "10", "fail": [], "success": []}
            ]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();

    let err = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err, AutomationError::InvalidSaveType("luck".to_string()));
}

#[test]
fn test_damage_halved_by_resistance() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "2d6[fire]"}]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin().with_resistances(Resistances {
        resist: vec![Resistance::new("fire")],
        ..Default::default()
    });
    let mut roller = ScriptedRoller::new([3, 5]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("**Damage**: (2d6 (3, 5)) / 2 [fire] = `4`"));
    assert_eq!(target.hp, Some(16));
}

#[test]
fn test_damage_zeroed_by_immunity() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "2d6[fire]"}]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin().with_resistances(Resistances {
        immune: vec![Resistance::new("fire")],
        ..Default::default()
    });
    let mut roller = ScriptedRoller::new([3, 5]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(result.damage(), 0);
    assert_eq!(target.hp, Some(20));
}

#[test]
fn test_zero_targets_still_produces_output() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "text", "text": "A glittering light fills the room."}]
        }
    ]));
    let mut caster = wizard();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            Vec::new(),
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(
        field_body(&result.report, "Effect"),
        "A glittering light fills the room."
    );
}

#[test]
fn test_out_of_range_target_index_is_silent() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": 3,
            "effects": [{"type": "damage", "damage": "5[force]"}]
        }
    ]));
    let mut caster = wizard();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Simple("Bandit".to_string())],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();

    assert!(result.report.fields.is_empty());
    assert_eq!(result.damage(), 0);
}

#[test]
fn test_repeat_sums_damage_per_target() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "1d4[fire]"}]
        }
    ]));
    let mut caster = wizard();
    let mut roller = ScriptedRoller::new([2, 3]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Simple("Bandit".to_string())],
            Args::new().with("rr", "2"),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    let body = field_body(&result.report, "Bandit");
    assert!(body.contains("**__Damage 1__**"));
    assert!(body.contains("**__Damage 2__**"));
    assert!(body.contains("**__Total Damage__**: 5"));
    assert_eq!(result.damage(), 5);
}

#[test]
fn test_repeat_count_is_clamped() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "1[force]"}]
        }
    ]));
    let mut caster = wizard();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Simple("Bandit".to_string())],
            Args::new().with("rr", "100"),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(result.damage(), 25);
}

#[test]
fn test_named_roll_feeds_later_damage() {
    let tree = automation(json!([
        {"type": "roll", "dice": "2d6", "name": "flame"},
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "{flame} [fire]"}]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([3, 5]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    assert!(field_body(&result.report, "Meta").contains("**Flame**: 2d6 (3, 5) = `8`"));
    assert_eq!(target.hp, Some(12));
}

#[test]
fn test_temp_hp_sets_not_adds() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "temphp", "amount": "5"}]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();

    tree.run(
        Caster::Loose(&mut caster),
        vec![TargetInput::Loose(&mut target)],
        Args::new(),
        None,
        &mut ScriptedRoller::default(),
        RunOptions::default(),
    )
    .unwrap();
    assert_eq!(target.temp_hp, 5);

    let lower = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "temphp", "amount": "3"}]
        }
    ]));
    lower
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();
    assert_eq!(target.temp_hp, 3);
}

#[test]
fn test_cantrip_scaling_by_caster_level() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {"type": "damage", "damage": "1d10[fire]", "cantripScale": true}
            ]
        }
    ]));
    let mut caster = wizard(); // caster level 5: two dice
    let mut target = goblin();
    let mut roller = ScriptedRoller::new([4, 6]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions {
                spell: Some(SpellRef {
                    name: "Fire Bolt".to_string(),
                    level: 0,
                }),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(result.damage(), 10);
    assert_eq!(target.hp, Some(10));
}

#[test]
fn test_higher_level_cast_adds_dice() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {
                    "type": "damage",
                    "damage": "8d6[fire]",
                    "higher": {"4": "1d6", "5": "2d6"}
                }
            ]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();
    // 8d6 base + 1d6 from the 4th-level cast
    let mut roller = ScriptedRoller::new([1, 1, 1, 1, 1, 1, 1, 1, 6]);

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut roller,
            RunOptions {
                spell: Some(SpellRef {
                    name: "Fireball".to_string(),
                    level: 3,
                }),
                cast_level: Some(4),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(result.damage(), 14);
}

#[test]
fn test_roll_cap_aborts_run() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [{"type": "damage", "damage": "2000d6[fire]"}]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();

    let err = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err, AutomationError::Dice(DiceError::TooManyRolls(1000)));
}

#[test]
fn test_effect_grant_in_combat() {
    let (mut combat, wizard_id, goblin_id) = combat_with_pair();
    combat.advance_turn(); // round 1, wizard's turn

    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {
                    "type": "ieffect",
                    "name": "Slowed",
                    "duration": 2,
                    "effects": {"ac_bonus": -2}
                }
            ]
        }
    ]));

    let result = tree
        .run(
            Caster::InCombat(wizard_id),
            vec![TargetInput::InCombat(goblin_id.clone())],
            Args::new(),
            Some(&mut combat),
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();

    let goblin = combat.combatant_by_id(&goblin_id).unwrap();
    let effect = goblin.get_effect("Slowed", true).unwrap();
    assert_eq!(effect.end_round, Some(2));
    assert_eq!(goblin.ac(), Some(13));
    assert!(field_body(&result.report, "Goblin")
        .contains("**Effect**: Slowed [2 rounds] (AC Bonus: -2)"));
}

#[test]
fn test_effect_grant_parented_to_concentration() {
    let (mut combat, wizard_id, goblin_id) = combat_with_pair();
    combat.advance_turn();

    // the casting layer creates the concentration effect on the caster
    let conc = combat
        .add_effect(
            &wizard_id,
            grimoire::AppliedEffect::new("Hold Person")
                .with_duration(Some(10))
                .concentration(true),
            None,
        )
        .unwrap();

    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {"type": "ieffect", "name": "Paralyzed", "duration": 10}
            ]
        }
    ]));
    tree.run(
        Caster::InCombat(wizard_id.clone()),
        vec![TargetInput::InCombat(goblin_id.clone())],
        Args::new(),
        Some(&mut combat),
        &mut ScriptedRoller::default(),
        RunOptions {
            conc_effect: Some(conc.effect.clone()),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(combat
        .combatant_by_id(&goblin_id)
        .unwrap()
        .get_effect("Paralyzed", true)
        .is_some());

    // losing concentration cascades removal to the target's effect
    combat.remove_effect(&conc.effect);
    assert!(combat
        .combatant_by_id(&goblin_id)
        .unwrap()
        .get_effect("Paralyzed", true)
        .is_none());
}

#[test]
fn test_concentration_effect_cannot_parent_onto_caster() {
    let (mut combat, wizard_id, _) = combat_with_pair();
    combat.advance_turn();

    let conc = combat
        .add_effect(
            &wizard_id,
            grimoire::AppliedEffect::new("Bless").concentration(true),
            None,
        )
        .unwrap();

    let tree = automation(json!([
        {
            "type": "target",
            "target": "self",
            "effects": [
                {"type": "ieffect", "name": "Blessed Again", "conc": true}
            ]
        }
    ]));
    let err = tree
        .run(
            Caster::InCombat(wizard_id),
            Vec::new(),
            Args::new(),
            Some(&mut combat),
            &mut ScriptedRoller::default(),
            RunOptions {
                conc_effect: Some(conc.effect),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err, AutomationError::SelfConcentration);
}

#[test]
fn test_effect_grant_outside_combat_is_untethered() {
    let tree = automation(json!([
        {
            "type": "target",
            "target": "each",
            "effects": [
                {"type": "ieffect", "name": "Shield of Faith", "duration": 100}
            ]
        }
    ]));
    let mut caster = wizard();
    let mut target = goblin();

    let result = tree
        .run(
            Caster::Loose(&mut caster),
            vec![TargetInput::Loose(&mut target)],
            Args::new(),
            None,
            &mut ScriptedRoller::default(),
            RunOptions::default(),
        )
        .unwrap();

    // reported but not attached: there is no live combat to tether to
    assert!(field_body(&result.report, "Goblin").contains("**Effect**: Shield of Faith"));
    assert!(target.get_effects().is_empty());
}

#[test]
fn test_caster_effect_bonuses_join_the_attack() {
    let (mut combat, wizard_id, goblin_id) = combat_with_pair();
    combat.advance_turn();
    combat
        .add_effect(
            &wizard_id,
            grimoire::AppliedEffect::new("Blessed").with_effects(
                serde_json::from_value(json!({"to_hit_bonus": "2"})).unwrap(),
            ),
            None,
        )
        .unwrap();

    let tree = automation(basic_attack());
    let mut roller = ScriptedRoller::new([10]);
    let result = tree
        .run(
            Caster::InCombat(wizard_id),
            vec![TargetInput::InCombat(goblin_id)],
            Args::new(),
            Some(&mut combat),
            &mut roller,
            RunOptions::default(),
        )
        .unwrap();

    // 10 + 5 (node) + 2 (effect) = 17 vs AC 15
    let body = field_body(&result.report, "Goblin");
    assert!(body.contains("= `17`"));
    assert!(!body.contains("**Miss!**"));
}
