//! Dice rolling
//!
//! Evaluates a parsed expression into a result tree with per-die values and
//! kept flags. The tree survives rewriting (resistance handling wraps
//! subtrees in arithmetic) and can re-total itself afterwards.

use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ast::{BinOp, DiceOp, Expr};
use super::DiceError;

/// Source of individual die faces.
pub trait DieRoller {
    /// Rolls one die, returning a value in `1..=size`.
    fn die(&mut self, size: u32) -> u32;
}

/// Default roller backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandRoller;

impl DieRoller for RandRoller {
    fn die(&mut self, size: u32) -> u32 {
        rand::rng().random_range(1..=size)
    }
}

/// Deterministic roller; the same seed produces the same sequence.
#[derive(Debug, Clone)]
pub struct SeededRoller(StdRng);

impl SeededRoller {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl DieRoller for SeededRoller {
    fn die(&mut self, size: u32) -> u32 {
        self.0.random_range(1..=size)
    }
}

/// Roller that replays a fixed sequence of faces; values are clamped to the
/// die size and the sequence falls back to 1 when exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRoller {
    values: VecDeque<u32>,
}

impl ScriptedRoller {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl DieRoller for ScriptedRoller {
    fn die(&mut self, size: u32) -> u32 {
        self.values.pop_front().unwrap_or(1).clamp(1, size)
    }
}

/// Tracks how many dice a single run has rolled, across every roll in the
/// run, and aborts past the cap.
#[derive(Debug, Clone)]
pub struct RollContext {
    rolled: u32,
    max_rolls: u32,
}

impl RollContext {
    pub fn new(max_rolls: u32) -> Self {
        Self {
            rolled: 0,
            max_rolls,
        }
    }

    fn count(&mut self, n: u32) -> Result<(), DiceError> {
        self.rolled = self.rolled.saturating_add(n);
        if self.rolled > self.max_rolls {
            return Err(DiceError::TooManyRolls(self.max_rolls));
        }
        Ok(())
    }
}

impl Default for RollContext {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// One rolled die.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Die {
    pub value: u32,
    pub kept: bool,
}

/// A rolled expression tree; mirrors [`Expr`] with die values filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rolled {
    Literal(i64),
    Dice {
        num: u32,
        size: u32,
        ops: Vec<DiceOp>,
        rolls: Vec<Die>,
    },
    Paren(Box<Rolled>),
    Set(Vec<Rolled>),
    Binary {
        op: BinOp,
        lhs: Box<Rolled>,
        rhs: Box<Rolled>,
    },
    Annotated {
        inner: Box<Rolled>,
        annotation: String,
    },
}

impl Rolled {
    /// Recomputes the total of the tree. Division truncates toward zero.
    pub fn total(&self) -> i64 {
        match self {
            Rolled::Literal(n) => *n,
            Rolled::Dice { rolls, .. } => {
                rolls.iter().filter(|d| d.kept).map(|d| d.value as i64).sum()
            }
            Rolled::Paren(inner) => inner.total(),
            Rolled::Set(items) => items.iter().map(Rolled::total).sum(),
            Rolled::Binary { op, lhs, rhs } => {
                let (l, r) = (lhs.total(), rhs.total());
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => {
                        if r == 0 {
                            0
                        } else {
                            l / r
                        }
                    }
                }
            }
            Rolled::Annotated { inner, .. } => inner.total(),
        }
    }

    /// Value of the leftmost kept die, if the leftmost leaf is a dice group
    /// with exactly one kept die. This is the d20 an attack roll keeps.
    pub fn leftmost_die_value(&self) -> Option<i64> {
        match self {
            Rolled::Dice { rolls, .. } => {
                let mut kept = rolls.iter().filter(|d| d.kept);
                let first = kept.next()?;
                if kept.next().is_some() {
                    None
                } else {
                    Some(first.value as i64)
                }
            }
            Rolled::Paren(inner) | Rolled::Annotated { inner, .. } => inner.leftmost_die_value(),
            Rolled::Binary { lhs, .. } => lhs.leftmost_die_value(),
            Rolled::Set(items) => items.first()?.leftmost_die_value(),
            Rolled::Literal(_) => None,
        }
    }

    /// Renders the kept dice of the tree as an expression string that
    /// re-parses (and re-totals) identically, e.g. `(3, 5) [fire] + 2`.
    pub fn rerollable(&self) -> String {
        match self {
            Rolled::Literal(n) => n.to_string(),
            Rolled::Dice { rolls, .. } => {
                let kept: Vec<String> = rolls
                    .iter()
                    .filter(|d| d.kept)
                    .map(|d| d.value.to_string())
                    .collect();
                if kept.len() == 1 {
                    format!("({},)", kept[0])
                } else {
                    format!("({})", kept.join(", "))
                }
            }
            Rolled::Paren(inner) => format!("({})", inner.rerollable()),
            Rolled::Set(items) => {
                let parts: Vec<String> = items.iter().map(Rolled::rerollable).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Rolled::Binary { op, lhs, rhs } => {
                format!("{} {} {}", lhs.rerollable(), op_symbol(*op), rhs.rerollable())
            }
            Rolled::Annotated { inner, annotation } => {
                format!("{} [{}]", inner.rerollable(), annotation)
            }
        }
    }
}

fn op_symbol(op: BinOp) -> char {
    match op {
        BinOp::Add => '+',
        BinOp::Sub => '-',
        BinOp::Mul => '*',
        BinOp::Div => '/',
    }
}

impl fmt::Display for Rolled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rolled::Literal(n) => write!(f, "{}", n),
            Rolled::Dice {
                num,
                size,
                ops,
                rolls,
            } => {
                write!(f, "{}d{}", num, size)?;
                for op in ops {
                    write!(f, "{}", op)?;
                }
                let faces: Vec<String> = rolls
                    .iter()
                    .map(|d| {
                        if d.kept {
                            d.value.to_string()
                        } else {
                            format!("~~{}~~", d.value)
                        }
                    })
                    .collect();
                write!(f, " ({})", faces.join(", "))
            }
            Rolled::Paren(inner) => write!(f, "({})", inner),
            Rolled::Set(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
            Rolled::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op_symbol(*op), rhs),
            Rolled::Annotated { inner, annotation } => write!(f, "{} [{}]", inner, annotation),
        }
    }
}

/// Whether the leftmost d20 landed a natural 20 or natural 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CritKind {
    None,
    Crit,
    Fail,
}

/// The outcome of rolling an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollResult {
    pub expr: Rolled,
    pub total: i64,
    pub crit: CritKind,
}

impl RollResult {
    /// Re-totals after the tree has been rewritten in place.
    pub fn retotal(&mut self) {
        self.total = self.expr.total();
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = `{}`", self.expr, self.total)
    }
}

/// Rolls an expression tree.
pub fn roll(
    ast: &Expr,
    roller: &mut dyn DieRoller,
    cx: &mut RollContext,
) -> Result<RollResult, DiceError> {
    let expr = roll_node(ast, roller, cx)?;
    let total = expr.total();
    let crit = detect_crit(&expr);
    Ok(RollResult { expr, total, crit })
}

fn roll_node(
    ast: &Expr,
    roller: &mut dyn DieRoller,
    cx: &mut RollContext,
) -> Result<Rolled, DiceError> {
    match ast {
        Expr::Literal(n) => Ok(Rolled::Literal(*n)),
        Expr::Dice { num, size, ops } => {
            cx.count(*num)?;
            let mut rolls: Vec<Die> = (0..*num)
                .map(|_| Die {
                    value: roller.die(*size),
                    kept: true,
                })
                .collect();
            for op in ops {
                apply_op(*op, *size, &mut rolls, roller, cx)?;
            }
            Ok(Rolled::Dice {
                num: *num,
                size: *size,
                ops: ops.clone(),
                rolls,
            })
        }
        Expr::Paren(inner) => Ok(Rolled::Paren(Box::new(roll_node(inner, roller, cx)?))),
        Expr::Set(items) => {
            let rolled: Result<Vec<_>, _> =
                items.iter().map(|i| roll_node(i, roller, cx)).collect();
            Ok(Rolled::Set(rolled?))
        }
        Expr::Binary { op, lhs, rhs } => Ok(Rolled::Binary {
            op: *op,
            lhs: Box::new(roll_node(lhs, roller, cx)?),
            rhs: Box::new(roll_node(rhs, roller, cx)?),
        }),
        Expr::Annotated { inner, annotation } => Ok(Rolled::Annotated {
            inner: Box::new(roll_node(inner, roller, cx)?),
            annotation: annotation.clone(),
        }),
    }
}

fn apply_op(
    op: DiceOp,
    size: u32,
    rolls: &mut Vec<Die>,
    roller: &mut dyn DieRoller,
    cx: &mut RollContext,
) -> Result<(), DiceError> {
    match op {
        DiceOp::RerollOnce(n) => {
            let to_reroll: Vec<usize> = rolls
                .iter()
                .enumerate()
                .filter(|(_, d)| d.kept && d.value == n)
                .map(|(i, _)| i)
                .collect();
            cx.count(to_reroll.len() as u32)?;
            for i in to_reroll {
                rolls[i].kept = false;
                rolls.push(Die {
                    value: roller.die(size),
                    kept: true,
                });
            }
        }
        DiceOp::Minimum(n) => {
            for die in rolls.iter_mut().filter(|d| d.kept) {
                die.value = die.value.max(n);
            }
        }
        DiceOp::KeepHighest(k) => keep(rolls, k as usize, true),
        DiceOp::KeepLowest(k) => keep(rolls, k as usize, false),
    }
    Ok(())
}

fn keep(rolls: &mut [Die], k: usize, highest: bool) {
    let mut kept: Vec<usize> = rolls
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kept)
        .map(|(i, _)| i)
        .collect();
    kept.sort_by_key(|&i| rolls[i].value);
    if highest {
        kept.reverse();
    }
    for &i in kept.iter().skip(k) {
        rolls[i].kept = false;
    }
}

fn detect_crit(expr: &Rolled) -> CritKind {
    let mut node = expr;
    loop {
        node = match node {
            Rolled::Paren(inner) | Rolled::Annotated { inner, .. } => inner,
            Rolled::Binary { lhs, .. } => lhs,
            Rolled::Set(items) => match items.first() {
                Some(first) => first,
                None => return CritKind::None,
            },
            Rolled::Dice { size, rolls, .. } => {
                if *size != 20 {
                    return CritKind::None;
                }
                let kept: Vec<&Die> = rolls.iter().filter(|d| d.kept).collect();
                return match kept.as_slice() {
                    [d] if d.value == 20 => CritKind::Crit,
                    [d] if d.value == 1 => CritKind::Fail,
                    _ => CritKind::None,
                };
            }
            Rolled::Literal(_) => return CritKind::None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::parse;

    fn roll_str(src: &str, faces: &[u32]) -> RollResult {
        let ast = parse(src).unwrap();
        let mut roller = ScriptedRoller::new(faces.iter().copied());
        roll(&ast, &mut roller, &mut RollContext::default()).unwrap()
    }

    #[test]
    fn test_simple_roll() {
        let result = roll_str("2d6+3", &[4, 5]);
        assert_eq!(result.total, 12);
        assert_eq!(result.crit, CritKind::None);
    }

    #[test]
    fn test_keep_highest() {
        let result = roll_str("2d20kh1+5", &[15, 4]);
        assert_eq!(result.total, 20);
        assert_eq!(result.expr.leftmost_die_value(), Some(15));
    }

    #[test]
    fn test_keep_lowest() {
        let result = roll_str("2d20kl1", &[15, 4]);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn test_natural_twenty_is_crit() {
        let result = roll_str("2d20kh1+5", &[20, 3]);
        assert_eq!(result.crit, CritKind::Crit);
        assert_eq!(result.total, 25);
    }

    #[test]
    fn test_natural_one_is_fail() {
        let result = roll_str("1d20+5", &[1]);
        assert_eq!(result.crit, CritKind::Fail);
    }

    #[test]
    fn test_no_crit_on_non_d20() {
        let result = roll_str("1d6", &[6]);
        assert_eq!(result.crit, CritKind::None);
    }

    #[test]
    fn test_reroll_once() {
        // both dice show 1, both reroll exactly once
        let result = roll_str("2d6ro1", &[1, 1, 3, 1]);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn test_reroll_before_keep() {
        // 1 rerolls into a 20 before kh1 picks the highest
        let result = roll_str("2d20ro1kh1", &[1, 5, 20]);
        assert_eq!(result.total, 20);
        assert_eq!(result.crit, CritKind::Crit);
    }

    #[test]
    fn test_minimum() {
        let result = roll_str("2d6mi3", &[1, 5]);
        assert_eq!(result.total, 8);
    }

    #[test]
    fn test_maximize_via_minimum() {
        let mut ast = parse("2d6").unwrap();
        ast.maximize();
        let mut roller = ScriptedRoller::new([1, 2]);
        let result = roll(&ast, &mut roller, &mut RollContext::default()).unwrap();
        assert_eq!(result.total, 12);
    }

    #[test]
    fn test_roll_cap() {
        let ast = parse("2000d6").unwrap();
        let mut roller = RandRoller;
        let err = roll(&ast, &mut roller, &mut RollContext::new(1000)).unwrap_err();
        assert_eq!(err, DiceError::TooManyRolls(1000));
    }

    #[test]
    fn test_roll_cap_accumulates_across_rolls() {
        let ast = parse("600d6").unwrap();
        let mut roller = RandRoller;
        let mut cx = RollContext::new(1000);
        assert!(roll(&ast, &mut roller, &mut cx).is_ok());
        assert!(roll(&ast, &mut roller, &mut cx).is_err());
    }

    #[test]
    fn test_rerollable_round_trip() {
        let result = roll_str("2d6 [fire] + 2", &[3, 5]);
        let simplified = result.expr.rerollable();
        assert_eq!(simplified, "(3, 5) [fire] + 2");
        let reparsed = parse(&simplified).unwrap();
        let rerolled = roll(
            &reparsed,
            &mut RandRoller,
            &mut RollContext::default(),
        )
        .unwrap();
        assert_eq!(rerolled.total, result.total);
    }

    #[test]
    fn test_display_strikes_dropped_dice() {
        let result = roll_str("2d20kh1", &[15, 4]);
        assert_eq!(result.expr.to_string(), "2d20kh1 (15, ~~4~~)");
    }

    #[test]
    fn test_seeded_roller_deterministic() {
        let ast = parse("10d20").unwrap();
        let mut a = SeededRoller::new(7);
        let mut b = SeededRoller::new(7);
        let ra = roll(&ast, &mut a, &mut RollContext::default()).unwrap();
        let rb = roll(&ast, &mut b, &mut RollContext::default()).unwrap();
        assert_eq!(ra, rb);
    }
}
