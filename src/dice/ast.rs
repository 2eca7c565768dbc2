//! Dice notation parsing
//!
//! Grammar, loosely: `expr := term ((+|-) term)*`, `term := factor ((*|/)
//! factor)*`, `factor := primary annotation?`, `primary := dice | int |
//! "(" expr ("," expr)* ")"`. Dice accept `kh`/`kl`/`ro`/`mi` operators.
//! A bracket annotation (`[fire]`) binds to the preceding operand.

use std::fmt;
use std::str::FromStr;

use super::DiceError;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

/// Operators that modify how a dice group rolls or which dice it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiceOp {
    /// Keep the highest N dice, drop the rest.
    KeepHighest(u32),
    /// Keep the lowest N dice, drop the rest.
    KeepLowest(u32),
    /// Reroll dice showing exactly N, once each.
    RerollOnce(u32),
    /// Raise any die below N to N.
    Minimum(u32),
}

impl fmt::Display for DiceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceOp::KeepHighest(n) => write!(f, "kh{}", n),
            DiceOp::KeepLowest(n) => write!(f, "kl{}", n),
            DiceOp::RerollOnce(n) => write!(f, "ro{}", n),
            DiceOp::Minimum(n) => write!(f, "mi{}", n),
        }
    }
}

/// A parsed dice expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(i64),
    Dice {
        num: u32,
        size: u32,
        ops: Vec<DiceOp>,
    },
    Paren(Box<Expr>),
    /// Comma set; totals as the sum of its members. Produced by simplified
    /// roll strings like `(3, 5)` so they re-parse to the same total.
    Set(Vec<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Annotated {
        inner: Box<Expr>,
        annotation: String,
    },
}

impl Expr {
    /// Joins two expressions with `+`.
    pub fn plus(self, rhs: Expr) -> Expr {
        Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    /// Visits every dice group in the tree.
    pub fn for_each_dice(&mut self, f: &mut impl FnMut(&mut u32, &mut u32, &mut Vec<DiceOp>)) {
        match self {
            Expr::Dice { num, size, ops } => f(num, size, ops),
            Expr::Paren(inner) | Expr::Annotated { inner, .. } => inner.for_each_dice(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_dice(f);
                rhs.for_each_dice(f);
            }
            Expr::Set(items) => {
                for item in items {
                    item.for_each_dice(f);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    /// Doubles the dice count of every group (critical hits).
    pub fn double_dice(&mut self) {
        self.for_each_dice(&mut |num, _, _| *num *= 2);
    }

    /// Forces every die to its maximum face.
    pub fn maximize(&mut self) {
        self.for_each_dice(&mut |_, size, ops| ops.push(DiceOp::Minimum(*size)));
    }

    /// Applies a minimum face value to every die.
    pub fn set_minimum(&mut self, min: u32) {
        self.for_each_dice(&mut |_, _, ops| ops.push(DiceOp::Minimum(min)));
    }

    /// Rewrites every dice group to roll exactly `num` dice (cantrip scaling).
    pub fn set_dice_count(&mut self, num: u32) {
        self.for_each_dice(&mut |n, _, _| *n = num);
    }

    /// Adds `extra` dice to the leftmost dice group, branching through sets.
    pub fn add_leftmost_dice(&mut self, extra: u32) {
        match self {
            Expr::Dice { num, .. } => *num += extra,
            Expr::Paren(inner) | Expr::Annotated { inner, .. } => inner.add_leftmost_dice(extra),
            Expr::Binary { lhs, .. } => lhs.add_leftmost_dice(extra),
            Expr::Set(items) => {
                for item in items {
                    item.add_leftmost_dice(extra);
                }
            }
            Expr::Literal(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(n) => write!(f, "{}", n),
            Expr::Dice { num, size, ops } => {
                write!(f, "{}d{}", num, size)?;
                for op in ops {
                    write!(f, "{}", op)?;
                }
                Ok(())
            }
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Set(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                if parts.len() == 1 {
                    write!(f, "({},)", parts[0])
                } else {
                    write!(f, "({})", parts.join(", "))
                }
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Annotated { inner, annotation } => write!(f, "{} [{}]", inner, annotation),
        }
    }
}

impl FromStr for Expr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a dice notation string into an expression tree.
pub fn parse(notation: &str) -> Result<Expr, DiceError> {
    let mut parser = Parser {
        chars: notation.chars().collect(),
        pos: 0,
        src: notation,
    };
    let expr = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> DiceError {
        DiceError::Parse(format!("{} at position {} in {:?}", msg, self.pos, self.src))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek().map(|p| p.to_ascii_lowercase()) == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<u64, DiceError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a number"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().map_err(|_| self.error("number out of range"))
    }

    fn expr(&mut self) -> Result<Expr, DiceError> {
        let mut lhs = self.term()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, DiceError> {
        let mut lhs = self.factor()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, DiceError> {
        let mut expr = self.primary()?;
        self.skip_ws();
        if self.peek() == Some('[') {
            self.pos += 1;
            let start = self.pos;
            while self.peek().is_some() && self.peek() != Some(']') {
                self.pos += 1;
            }
            if self.bump() != Some(']') {
                return Err(self.error("unterminated annotation"));
            }
            let annotation: String = self.chars[start..self.pos - 1].iter().collect();
            expr = Expr::Annotated {
                inner: Box::new(expr),
                annotation: annotation.trim().to_string(),
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, DiceError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let first = self.expr()?;
                self.skip_ws();
                if self.peek() == Some(',') {
                    let mut items = vec![first];
                    while self.eat(',') {
                        self.skip_ws();
                        // tolerate a trailing comma, as in "(3,)"
                        if self.peek() == Some(')') {
                            break;
                        }
                        items.push(self.expr()?);
                        self.skip_ws();
                    }
                    if self.bump() != Some(')') {
                        return Err(self.error("expected ')'"));
                    }
                    Ok(Expr::Set(items))
                } else if self.bump() == Some(')') {
                    Ok(Expr::Paren(Box::new(first)))
                } else {
                    Err(self.error("expected ')'"))
                }
            }
            Some('-') => {
                self.pos += 1;
                self.skip_ws();
                let n = self.number()?;
                Ok(Expr::Literal(-(n as i64)))
            }
            Some(c) if c.is_ascii_digit() || c.to_ascii_lowercase() == 'd' => self.dice_or_number(),
            _ => Err(self.error("expected a dice expression")),
        }
    }

    fn small_number(&mut self) -> Result<u32, DiceError> {
        let n = self.number()?;
        u32::try_from(n).map_err(|_| self.error("number out of range"))
    }

    fn dice_or_number(&mut self) -> Result<Expr, DiceError> {
        let num = if self.peek().map(|c| c.to_ascii_lowercase()) == Some('d') {
            1 // "d20" means "1d20"
        } else {
            self.number()?
        };

        if !self.eat('d') {
            let n = i64::try_from(num).map_err(|_| self.error("number out of range"))?;
            return Ok(Expr::Literal(n));
        }

        let num = u32::try_from(num).map_err(|_| self.error("number out of range"))?;
        let size = self.small_number()?;
        if num == 0 {
            return Err(self.error("dice count must be at least 1"));
        }
        if size == 0 {
            return Err(self.error("die size must be at least 1"));
        }

        let mut ops = Vec::new();
        loop {
            let save = self.pos;
            let op = if self.eat('k') {
                if self.eat('h') {
                    DiceOp::KeepHighest(self.small_number()?)
                } else if self.eat('l') {
                    DiceOp::KeepLowest(self.small_number()?)
                } else {
                    self.pos = save;
                    break;
                }
            } else if self.eat('r') {
                if self.eat('o') {
                    DiceOp::RerollOnce(self.small_number()?)
                } else {
                    self.pos = save;
                    break;
                }
            } else if self.eat('m') {
                if self.eat('i') {
                    DiceOp::Minimum(self.small_number()?)
                } else {
                    self.pos = save;
                    break;
                }
            } else {
                break;
            };
            ops.push(op);
        }

        Ok(Expr::Dice { num, size, ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let expr = parse("2d6").unwrap();
        assert_eq!(
            expr,
            Expr::Dice {
                num: 2,
                size: 6,
                ops: vec![]
            }
        );
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = parse("1d20+5").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Dice {
                    num: 1,
                    size: 20,
                    ops: vec![]
                }),
                rhs: Box::new(Expr::Literal(5)),
            }
        );
    }

    #[test]
    fn test_parse_implicit_one() {
        let expr = parse("d20").unwrap();
        assert_eq!(
            expr,
            Expr::Dice {
                num: 1,
                size: 20,
                ops: vec![]
            }
        );
    }

    #[test]
    fn test_parse_keep_and_reroll() {
        let expr = parse("2d20ro1kh1").unwrap();
        assert_eq!(
            expr,
            Expr::Dice {
                num: 2,
                size: 20,
                ops: vec![DiceOp::RerollOnce(1), DiceOp::KeepHighest(1)]
            }
        );
    }

    #[test]
    fn test_parse_annotation() {
        let expr = parse("2d6 [fire] + 3").unwrap();
        match expr {
            Expr::Binary { lhs, rhs, .. } => {
                assert_eq!(
                    *lhs,
                    Expr::Annotated {
                        inner: Box::new(Expr::Dice {
                            num: 2,
                            size: 6,
                            ops: vec![]
                        }),
                        annotation: "fire".to_string(),
                    }
                );
                assert_eq!(*rhs, Expr::Literal(3));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set() {
        let expr = parse("(3, 5) + 2").unwrap();
        match expr {
            Expr::Binary { lhs, .. } => {
                assert_eq!(*lhs, Expr::Set(vec![Expr::Literal(3), Expr::Literal(5)]));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_element_set() {
        let expr = parse("(3,)").unwrap();
        assert_eq!(expr, Expr::Set(vec![Expr::Literal(3)]));
    }

    #[test]
    fn test_parse_negative_literal() {
        let expr = parse("1d8-2").unwrap();
        match expr {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(op, BinOp::Sub);
                assert_eq!(*rhs, Expr::Literal(2));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("").is_err());
        assert!(parse("0d6").is_err());
        assert!(parse("2d0").is_err());
        assert!(parse("2d6 extra").is_err());
        assert!(parse("2d6[unclosed").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for src in ["2d6", "1d20+5", "2d20ro1kh1", "2d6 [fire] + 3", "(3, 5)"] {
            let expr = parse(src).unwrap();
            let rendered = expr.to_string();
            assert_eq!(parse(&rendered).unwrap(), expr, "round trip of {:?}", src);
        }
    }

    #[test]
    fn test_double_dice() {
        let mut expr = parse("2d6+1d4+3").unwrap();
        expr.double_dice();
        assert_eq!(expr, parse("4d6+2d4+3").unwrap());
    }

    #[test]
    fn test_maximize() {
        let mut expr = parse("2d6").unwrap();
        expr.maximize();
        assert_eq!(
            expr,
            Expr::Dice {
                num: 2,
                size: 6,
                ops: vec![DiceOp::Minimum(6)]
            }
        );
    }

    #[test]
    fn test_add_leftmost_dice() {
        let mut expr = parse("2d6+1d4").unwrap();
        expr.add_leftmost_dice(2);
        assert_eq!(expr, parse("4d6+1d4").unwrap());
    }
}
