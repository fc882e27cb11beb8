//! Persisted transition-system format.
//!
//! One record per line. Every token starts with a reserved tag character,
//! so expressions are written in prefix form and need no closing markers:
//!
//! ```text
//! D:v:x:sint32;v:b:bool;
//! I:v:x:sint32;r:o:EQ;v:x:sint32;c:4:sint32;
//! L:inc:ok;P:;G:r:o:LT;v:x:sint32;c:5:sint32;;F:e:v:x:sint32;r:o:EQ;v:x':sint32;a:o:ADD;v:x:sint32;c:1:sint32;;;
//! ```
//!
//! | tag | node                      | layout                          |
//! |-----|---------------------------|---------------------------------|
//! | `v` | variable                  | `v:<name>:<type>;`              |
//! | `c` | constant                  | `c:<value>:<type>;`             |
//! | `n` | negation                  | `n:<expr>`                      |
//! | `m` | unary minus               | `m:<expr>`                      |
//! | `~` | bit-vector negation       | `~:<expr>`                      |
//! | `k` | cast                      | `k:<type>;<expr>`               |
//! | `p` | propositional compound    | `p:o:<OP>;<lhs><rhs>`           |
//! | `r` | numeric comparison        | `r:o:<OP>;<lhs><rhs>`           |
//! | `a` | numeric compound          | `a:o:<OP>;<lhs><rhs>`           |
//! | `w` | bit-vector compound       | `w:o:<OP>;<lhs><rhs>`           |
//! | `q` | quantifier                | `q:o:<OP>;<n>;<var>...<body>`   |

use std::fmt::Write;
use std::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::expr::{BitvectorOp, Comparator, Expr, LogicalOp, NumericOp, Operator, Quantifier};
use crate::label::TransitionLabel;
use crate::system::TransitionSystem;
use crate::types::{BuiltinType, Value, Variable};

const KIND_OK: &str = "ok";
const KIND_ERROR: &str = "error";
const KIND_CONSTRUCTOR: &str = "constructor";
const KIND_CONSTRUCTOR_ERROR: &str = "constructor_error";

/// Renders `system` (variables, init overrides and labels) in the persisted format.
pub fn write_system(system: &TransitionSystem) -> String {
    let mut out = String::from("D:");
    for var in system.state_variables() {
        write_variable(&mut out, var);
    }
    out.push('\n');
    for (var, value) in system.init_values() {
        out.push_str("I:");
        write_variable(&mut out, var);
        write_expr(&mut out, value);
        out.push('\n');
    }
    for label in system.labels() {
        write_label(&mut out, label);
        out.push('\n');
    }
    out
}

fn write_label(out: &mut String, label: &TransitionLabel) {
    let kind = match (label.is_constructor(), label.is_error()) {
        (false, false) => KIND_OK,
        (false, true) => KIND_ERROR,
        (true, false) => KIND_CONSTRUCTOR,
        (true, true) => KIND_CONSTRUCTOR_ERROR,
    };
    let _ = write!(out, "L:{}:{};P:", label.name(), kind);
    for param in label.parameters() {
        write_variable(out, param);
    }
    out.push_str(";G:");
    for conjunct in label.preconditions() {
        write_expr(out, conjunct);
    }
    out.push_str(";F:");
    for (var, effect) in label.effects() {
        out.push_str("e:");
        write_variable(out, var);
        write_expr(out, effect);
        out.push(';');
    }
    out.push(';');
}

fn write_variable(out: &mut String, var: &Variable) {
    let _ = write!(out, "v:{}:{};", var.name, var.ty);
}

fn write_binary(out: &mut String, tag: char, op: impl Operator, lhs: &Expr, rhs: &Expr) {
    let _ = write!(out, "{}:o:{};", tag, op.name());
    write_expr(out, lhs);
    write_expr(out, rhs);
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Var(var) => write_variable(out, var),
        Expr::Constant(value) => {
            let _ = write!(out, "c:{}:{};", value, value.ty());
        }
        Expr::Not(inner) => {
            out.push_str("n:");
            write_expr(out, inner);
        }
        Expr::UnaryMinus(inner) => {
            out.push_str("m:");
            write_expr(out, inner);
        }
        Expr::BitNot(inner) => {
            out.push_str("~:");
            write_expr(out, inner);
        }
        Expr::Cast(inner, ty) => {
            let _ = write!(out, "k:{};", ty);
            write_expr(out, inner);
        }
        Expr::Logical(lhs, op, rhs) => write_binary(out, 'p', *op, lhs, rhs),
        Expr::Compare(lhs, op, rhs) => write_binary(out, 'r', *op, lhs, rhs),
        Expr::Numeric(lhs, op, rhs) => write_binary(out, 'a', *op, lhs, rhs),
        Expr::Bitvector(lhs, op, rhs) => write_binary(out, 'w', *op, lhs, rhs),
        Expr::Quantified(q, vars, body) => {
            let _ = write!(out, "q:o:{};{};", q.name(), vars.len());
            for var in vars {
                write_variable(out, var);
            }
            write_expr(out, body);
        }
    }
}

/// Reads a system written by [`write_system`]. The result is not initialized.
pub fn load_system(input: &str) -> Result<TransitionSystem> {
    let mut system = TransitionSystem::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut record = Record::new(index + 1, line);
        match record.tag()? {
            'D' => {
                let mut vars = Vec::new();
                while !record.at_end() {
                    vars.push(record.variable()?);
                }
                system.add_variables(vars);
            }
            'I' => {
                let var = record.variable()?;
                let value = record.expr()?;
                record.finish()?;
                system.add_init_value(&var.name, value)?;
            }
            'L' => {
                let label = record.label(&system)?;
                record.finish()?;
                system.add_label(label);
            }
            other => return Err(record.malformed(format!("unknown record tag '{}'", other))),
        }
    }
    debug!(
        "load_system(variables = {}, labels = {})",
        system.state_variables().len(),
        system.labels().len()
    );
    Ok(system)
}

/// Cursor over one encoded line.
struct Record<'a> {
    line: usize,
    rest: &'a str,
}

impl<'a> Record<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self { line, rest: text }
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::Encoding {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.rest.is_empty()
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.malformed(format!("trailing input: {}", self.rest)))
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    /// Consumes `<tag>:` and returns the tag.
    fn tag(&mut self) -> Result<char> {
        let mut chars = self.rest.chars();
        match (chars.next(), chars.next()) {
            (Some(tag), Some(':')) => {
                self.rest = &self.rest[tag.len_utf8() + 1..];
                Ok(tag)
            }
            _ => Err(self.malformed(format!("expected a tagged token at: {}", self.rest))),
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        match self.rest.strip_prefix(token) {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(self.malformed(format!("expected '{}' at: {}", token, self.rest))),
        }
    }

    /// Consumes text up to (and including) `end`.
    fn until(&mut self, end: char) -> Result<&'a str> {
        let Some(index) = self.rest.find(end) else {
            return Err(self.malformed(format!("missing '{}' after: {}", end, self.rest)));
        };
        let text = &self.rest[..index];
        self.rest = &self.rest[index + 1..];
        Ok(text)
    }

    fn ty(&mut self) -> Result<BuiltinType> {
        let token = self.until(';')?;
        BuiltinType::from_str(token)
    }

    fn operator<O: Operator>(&mut self) -> Result<O> {
        self.expect("o:")?;
        let name = self.until(';')?;
        O::from_name(name).ok_or_else(|| self.malformed(format!("unknown operator {}", name)))
    }

    fn variable(&mut self) -> Result<Variable> {
        let tag = self.tag()?;
        if tag != 'v' {
            return Err(self.malformed(format!("expected a variable, found tag '{}'", tag)));
        }
        self.variable_body()
    }

    fn variable_body(&mut self) -> Result<Variable> {
        let name = self.until(':')?;
        let ty = self.ty()?;
        Ok(Variable::new(name, ty))
    }

    fn expr(&mut self) -> Result<Expr> {
        let tag = self.tag()?;
        let expr = match tag {
            'v' => Expr::Var(self.variable_body()?),
            'c' => {
                let text = self.until(':')?;
                let ty = self.ty()?;
                let value = Value::parse(text, ty)
                    .ok_or_else(|| self.malformed(format!("invalid {} constant {}", ty, text)))?;
                Expr::Constant(value)
            }
            'n' => Expr::not(self.expr()?),
            'm' => Expr::UnaryMinus(Box::new(self.expr()?)),
            '~' => Expr::BitNot(Box::new(self.expr()?)),
            'k' => {
                let ty = self.ty()?;
                Expr::cast(self.expr()?, ty)
            }
            'p' => {
                let op = self.operator::<LogicalOp>()?;
                Expr::logical(self.expr()?, op, self.expr()?)
            }
            'r' => {
                let op = self.operator::<Comparator>()?;
                Expr::compare(self.expr()?, op, self.expr()?)
            }
            'a' => {
                let op = self.operator::<NumericOp>()?;
                Expr::numeric(self.expr()?, op, self.expr()?)
            }
            'w' => {
                let op = self.operator::<BitvectorOp>()?;
                Expr::bitvector(self.expr()?, op, self.expr()?)
            }
            'q' => {
                let q = self.operator::<Quantifier>()?;
                let count = self.until(';')?;
                let count = count
                    .parse::<usize>()
                    .map_err(|_| self.malformed(format!("invalid variable count {}", count)))?;
                let vars = (0..count).map(|_| self.variable()).collect::<Result<Vec<_>>>()?;
                Expr::Quantified(q, vars, Box::new(self.expr()?))
            }
            other => return Err(self.malformed(format!("unknown expression tag '{}'", other))),
        };
        Ok(expr)
    }

    fn label(&mut self, system: &TransitionSystem) -> Result<TransitionLabel> {
        let name = self.until(':')?;
        let kind = self.until(';')?;
        let (is_constructor, is_error) = match kind {
            KIND_OK => (false, false),
            KIND_ERROR => (false, true),
            KIND_CONSTRUCTOR => (true, false),
            KIND_CONSTRUCTOR_ERROR => (true, true),
            other => return Err(self.malformed(format!("unknown label kind {}", other))),
        };
        let mut label = system.new_label(name);
        label.set_constructor(is_constructor);
        label.set_error(is_error);

        self.expect("P:")?;
        while self.peek() != Some(';') {
            label.add_parameter(self.variable()?);
        }
        self.expect(";G:")?;
        while self.peek() != Some(';') {
            label.add_precondition(self.expr()?);
        }
        self.expect(";F:")?;
        while self.peek() != Some(';') {
            self.expect("e:")?;
            let var = self.variable()?;
            let effect = self.expr()?;
            self.expect(";")?;
            label.add_effect(var, effect)?;
        }
        self.expect(";")?;
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::parser::parse_system;

    const COUNTER: &str = "\
VARIABLES:
declare x:sint32, done:bool, u:uint8

TRANSITION inc:
PRECONDITION:
x < 5
!done
EFFECT:
x: x' == x + 1
u: u' == (uint8) (~x & 255)

TRANSITION finish:
PARAMETER: declare p:sint32
PRECONDITION:
x == 5 || p >> 2 == -1
EFFECT:
done: done' == true
ERROR

INIT:
x: x == 1
";

    #[test]
    fn test_write_then_load_renders_identically() {
        let system = parse_system(COUNTER).unwrap();
        let encoded = write_system(&system);
        assert_eq!(encoded.lines().count(), 4);
        let loaded = load_system(&encoded).unwrap();
        assert_eq!(loaded.complete_to_string(), system.complete_to_string());
        assert_eq!(write_system(&loaded), encoded);
    }

    #[test]
    fn test_encoded_layout() {
        let system = parse_system("VARIABLES:\ndeclare x:sint32\nTRANSITION inc:\nPRECONDITION:\nx < 5\n").unwrap();
        assert_eq!(
            write_system(&system),
            "D:v:x:sint32;\nL:inc:ok;P:;G:r:o:LT;v:x:sint32;c:5:sint32;;F:;\n"
        );
    }

    #[test]
    fn test_quantifier_round_trip() {
        let x = Variable::new("x", BuiltinType::SInt8);
        let y = Variable::new("y", BuiltinType::SInt8);
        let body = Expr::compare(Expr::var(&x), Comparator::Gt, Expr::var(&y));
        let expr = Expr::Quantified(Quantifier::Forall, vec![y.clone()], Box::new(body));
        let mut out = String::new();
        write_expr(&mut out, &expr);
        assert_eq!(out, "q:o:FORALL;1;v:y:sint8;r:o:GT;v:x:sint8;v:y:sint8;");
        let mut record = Record::new(1, &out);
        assert_eq!(record.expr().unwrap(), expr);
        assert!(record.at_end());
    }

    #[test]
    fn test_unknown_type() {
        match load_system("D:v:x:sint7;\n") {
            Err(Error::UnknownType(token)) => assert_eq!(token, "sint7"),
            other => panic!("expected an unknown type, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            load_system("D:v:x:sint32;\nX:foo\n"),
            Err(Error::Encoding { line: 2, .. })
        ));
        assert!(matches!(
            load_system("D:v:x:sint32;\nL:t:ok;P:;G:r:o:LIKE;v:x:sint32;c:5:sint32;;F:;\n"),
            Err(Error::Encoding { line: 2, .. })
        ));
        assert!(matches!(
            load_system("D:v:x:sint32;\nL:t:sometimes;P:;G:;F:;\n"),
            Err(Error::Encoding { line: 2, .. })
        ));
        assert!(matches!(
            load_system("D:v:x:sint32;\nI:v:y:sint32;c:1:sint32;\n"),
            Err(Error::UndeclaredVariable(_))
        ));
    }
}
