//! Line-oriented transition-system DSL.
//!
//! ```text
//! VARIABLES:
//! declare x:sint32, done:bool
//!
//! TRANSITION inc:
//! increments x until it reaches five
//! PRECONDITION:
//! x < 5
//! EFFECT:
//! x: x' == x + 1
//!
//! INIT:
//! x: x == 0
//! ```
//!
//! `CONSTRUCTOR` declares a label fired once to build the initial states,
//! `PARAMETER` declares label-local inputs and an `ERROR` effect line marks an
//! error label. Keywords are case-insensitive; blank lines and `//` comments
//! are skipped.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::expr::{BitvectorOp, Comparator, Expr, LogicalOp, NumericOp, Operator};
use crate::label::TransitionLabel;
use crate::system::TransitionSystem;
use crate::types::{BuiltinType, Value, Variable};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Section {
    None,
    Variables,
    Description,
    Parameter,
    Precondition,
    Effect,
    Init,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Keyword {
    Variables,
    Transition,
    Constructor,
    Parameter,
    Precondition,
    Effect,
    Init,
}

impl Keyword {
    const ALL: [(&'static str, Keyword); 8] = [
        ("VARIABLES", Keyword::Variables),
        ("TRANSITION", Keyword::Transition),
        ("CONSTRUCTOR", Keyword::Constructor),
        ("PARAMETER", Keyword::Parameter),
        ("PRECONDITION", Keyword::Precondition),
        ("EFFECTS", Keyword::Effect),
        ("EFFECT", Keyword::Effect),
        ("INIT", Keyword::Init),
    ];

    /// Splits a section header into its keyword and the rest of the line.
    ///
    /// A header is a keyword on its own, a keyword followed by `:`, or a label
    /// keyword followed by the label name. Other lines starting with a
    /// keyword, like `init < 5`, are content.
    fn split(line: &str) -> Option<(Keyword, &str)> {
        let upper = line.to_ascii_uppercase();
        Keyword::ALL.iter().find_map(|&(word, keyword)| {
            if !upper.starts_with(word) {
                return None;
            }
            let after = &line[word.len()..];
            let rest = after.trim_start();
            if rest.is_empty() {
                return Some((keyword, ""));
            }
            if let Some(tail) = rest.strip_prefix(':') {
                return Some((keyword, tail.trim()));
            }
            let named = matches!(keyword, Keyword::Transition | Keyword::Constructor)
                && after.starts_with(char::is_whitespace)
                && rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_');
            named.then_some((keyword, rest))
        })
    }
}

/// Parses DSL source text into a transition system (not yet initialized).
pub fn parse_system(input: &str) -> Result<TransitionSystem> {
    let mut parser = SystemParser::new();
    for (index, line) in input.lines().enumerate() {
        parser.parse_line(index + 1, line)?;
    }
    Ok(parser.finish())
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<TransitionSystem> {
    let input = fs::read_to_string(path)?;
    parse_system(&input)
}

struct SystemParser {
    system: TransitionSystem,
    current: Option<TransitionLabel>,
    section: Section,
    anonymous: usize,
}

impl SystemParser {
    fn new() -> Self {
        Self {
            system: TransitionSystem::new(),
            current: None,
            section: Section::None,
            anonymous: 0,
        }
    }

    fn finish(mut self) -> TransitionSystem {
        if let Some(label) = self.current.take() {
            self.system.add_label(label);
        }
        self.system
    }

    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(());
        }

        if !self.is_assignment(line) {
            if let Some((keyword, rest)) = Keyword::split(line) {
                return self.parse_header(line_no, keyword, rest);
            }
        }

        match self.section {
            Section::None => Err(Error::parse(line_no, format!("line outside of any section: {}", line))),
            Section::Description => Ok(()),
            Section::Variables => {
                let vars = parse_declaration(line).map_err(|reason| Error::parse(line_no, reason))?;
                self.system.add_variables(vars);
                Ok(())
            }
            Section::Parameter => {
                let params = parse_declaration(line).map_err(|reason| Error::parse(line_no, reason))?;
                let label = self.current_label(line_no)?;
                for param in params {
                    label.add_parameter(param);
                }
                Ok(())
            }
            Section::Precondition => self.parse_precondition(line_no, line),
            Section::Effect => self.parse_effect(line_no, line),
            Section::Init => self.parse_init(line_no, line),
        }
    }

    fn parse_header(&mut self, line_no: usize, keyword: Keyword, rest: &str) -> Result<()> {
        match keyword {
            Keyword::Transition | Keyword::Constructor => {
                if let Some(label) = self.current.take() {
                    self.system.add_label(label);
                }
                let name = match rest.split_whitespace().next() {
                    Some(token) => {
                        let name = token.trim_end_matches(':');
                        if name.is_empty() || !name.chars().all(is_ident_char) {
                            return Err(Error::parse(line_no, format!("invalid label name: {}", token)));
                        }
                        name.to_string()
                    }
                    None => {
                        let name = format!("t_{}", self.anonymous);
                        self.anonymous += 1;
                        name
                    }
                };
                debug!("parse_header(line = {}) -> label {}", line_no, name);
                let mut label = self.system.new_label(name);
                label.set_constructor(keyword == Keyword::Constructor);
                self.current = Some(label);
                self.section = Section::Description;
                return Ok(());
            }
            Keyword::Variables => self.section = Section::Variables,
            Keyword::Init => self.section = Section::Init,
            Keyword::Parameter => {
                self.current_label(line_no)?;
                self.section = Section::Parameter;
            }
            Keyword::Precondition => {
                self.current_label(line_no)?;
                self.section = Section::Precondition;
            }
            Keyword::Effect => {
                self.current_label(line_no)?;
                self.section = Section::Effect;
            }
        }
        if rest.is_empty() {
            Ok(())
        } else {
            self.parse_line(line_no, rest)
        }
    }

    /// Whether `line` assigns a state variable inside an effect or init section,
    /// even if that variable is named like a keyword.
    fn is_assignment(&self, line: &str) -> bool {
        if !matches!(self.section, Section::Effect | Section::Init) {
            return false;
        }
        match line.split_once(':') {
            Some((name, text)) => {
                !text.trim().is_empty() && self.system.state_variable_by_name(name.trim()).is_some()
            }
            None => false,
        }
    }

    fn current_label(&mut self, line_no: usize) -> Result<&mut TransitionLabel> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::parse(line_no, "section outside of a transition"))
    }

    fn scope(&self) -> Vec<Variable> {
        let mut scope = self.system.state_variables().to_vec();
        if let Some(label) = &self.current {
            scope.extend(label.parameters().iter().cloned());
        }
        scope
    }

    fn parse_precondition(&mut self, line_no: usize, line: &str) -> Result<()> {
        let conjunct = parse_formula(line, &self.scope()).map_err(|reason| Error::parse(line_no, reason))?;
        self.current_label(line_no)?.add_precondition(conjunct);
        Ok(())
    }

    fn parse_effect(&mut self, line_no: usize, line: &str) -> Result<()> {
        let Some((name, text)) = line.split_once(':') else {
            if line.to_ascii_uppercase().starts_with("ERROR") {
                self.current_label(line_no)?.set_error(true);
                return Ok(());
            }
            return Err(Error::parse(
                line_no,
                format!("expected an effect of the form `var: expression`: {}", line),
            ));
        };
        let name = name.replace(' ', "");
        let Some(var) = self.system.state_variable_by_name(&name).cloned() else {
            return Err(Error::parse(
                line_no,
                format!("modified variable {} is not a state variable", name),
            ));
        };
        let mut scope = self.scope();
        scope.push(var.primed());
        let effect = parse_formula(text, &scope).map_err(|reason| Error::parse(line_no, reason))?;
        self.current_label(line_no)?.add_effect(var, effect)
    }

    fn parse_init(&mut self, line_no: usize, line: &str) -> Result<()> {
        let Some((name, text)) = line.split_once(':') else {
            return Err(Error::parse(
                line_no,
                format!("expected an initial value of the form `var: expression`: {}", line),
            ));
        };
        let name = name.replace(' ', "");
        if self.system.state_variable_by_name(&name).is_none() {
            return Err(Error::parse(line_no, format!("{} is not a state variable", name)));
        }
        let value = parse_formula(text, self.system.state_variables()).map_err(|reason| Error::parse(line_no, reason))?;
        self.system.add_init_value(&name, value)
    }
}

/// Parses `declare a:sint32, b:bool` (the `declare` keyword is optional).
pub fn parse_declaration(line: &str) -> std::result::Result<Vec<Variable>, String> {
    let line = line.trim();
    let body = match line.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("declare") => &line[7..],
        _ => line,
    };
    body.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, ty) = item
                .split_once(':')
                .ok_or_else(|| format!("expected `name:type` in declaration: {}", item))?;
            let name = name.trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return Err(format!("invalid variable name: {}", name));
            }
            let ty = BuiltinType::from_str(ty.trim()).map_err(|e| e.to_string())?;
            Ok(Variable::new(name, ty))
        })
        .collect()
}

/// Parses a boolean expression over the variables of `scope`.
pub fn parse_formula(text: &str, scope: &[Variable]) -> std::result::Result<Expr, String> {
    let expr = parse_expression(text, scope)?;
    if expr.ty() != BuiltinType::Bool {
        return Err(format!("expected a boolean expression: {}", text.trim()));
    }
    Ok(expr)
}

/// Parses an expression over the variables of `scope`.
pub fn parse_expression(text: &str, scope: &[Variable]) -> std::result::Result<Expr, String> {
    let tokens = tokenize(text)?;
    let mut parser = ExprParser { tokens, pos: 0, scope };
    let term = parser.equivalence()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected {} in {}", token, text.trim()));
    }
    term.into_expr(None)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i128),
    Real(String),
    Op(&'static str),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "`{}`", name),
            Token::Int(v) => write!(f, "`{}`", v),
            Token::Real(text) => write!(f, "`{}`", text),
            Token::Op(op) => write!(f, "`{}`", op),
        }
    }
}

// Longest operators first.
const OPERATORS: [&str; 28] = [
    "<=>", ">>>", "->", "&&", "||", "^^", "==", "!=", "<=", ">=", "<<", ">>", "<", ">", "+", "-", "*", "/", "%",
    "&", "|", "^", "!", "~", "(", ")", ",", ":",
];

fn tokenize(text: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();
    while let Some(c) = rest.chars().next() {
        if c.is_ascii_digit() {
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let literal = &rest[..end];
            if literal.contains('.') {
                literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number: {}", literal))?;
                tokens.push(Token::Real(literal.to_string()));
            } else {
                let value = literal
                    .parse::<i128>()
                    .map_err(|_| format!("invalid number: {}", literal))?;
                tokens.push(Token::Int(value));
            }
            rest = &rest[end..];
        } else if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let mut end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            if rest[end..].starts_with('\'') {
                end += 1;
            }
            tokens.push(Token::Ident(rest[..end].to_string()));
            rest = &rest[end..];
        } else if let Some(&op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(Token::Op(op));
            rest = &rest[op.len()..];
        } else {
            return Err(format!("unexpected character '{}'", c));
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

/// A parsed operand. Literals stay untyped until they meet another operand.
#[derive(Debug)]
enum Term {
    Expr(Expr),
    Int(i128),
    Real(String),
}

impl Term {
    fn ty(&self) -> Option<BuiltinType> {
        match self {
            Term::Expr(expr) => Some(expr.ty()),
            _ => None,
        }
    }

    fn into_expr(self, hint: Option<BuiltinType>) -> std::result::Result<Expr, String> {
        match self {
            Term::Expr(expr) => Ok(expr),
            Term::Int(value) => match hint {
                Some(ty) if ty.is_integer() => Ok(Expr::Constant(Value::Int {
                    bits: ty.wrap(value),
                    ty,
                })),
                Some(BuiltinType::Bool) => Err(format!("integer {} used as a boolean", value)),
                Some(ty) => Ok(Expr::Constant(Value::Real {
                    text: value.to_string(),
                    ty,
                })),
                None => Ok(Expr::Constant(Value::Int {
                    bits: BuiltinType::SInt32.wrap(value),
                    ty: BuiltinType::SInt32,
                })),
            },
            Term::Real(text) => match hint {
                Some(ty @ (BuiltinType::Float | BuiltinType::Double | BuiltinType::Decimal)) => {
                    Ok(Expr::Constant(Value::Real { text, ty }))
                }
                None => Ok(Expr::Constant(Value::Real {
                    text,
                    ty: BuiltinType::Double,
                })),
                Some(ty) => Err(format!("real {} used as {}", text, ty)),
            },
        }
    }

    fn into_bool(self) -> std::result::Result<Expr, String> {
        let expr = self.into_expr(Some(BuiltinType::Bool))?;
        if expr.ty() != BuiltinType::Bool {
            return Err(format!("expected a boolean operand, found {}", expr));
        }
        Ok(expr)
    }
}

/// Types both operands, giving untyped literals the type of the other side.
fn unify(lhs: Term, rhs: Term) -> std::result::Result<(Expr, Expr), String> {
    let (lhs_ty, rhs_ty) = (lhs.ty(), rhs.ty());
    let lhs = lhs.into_expr(rhs_ty)?;
    let rhs = rhs.into_expr(lhs_ty.or(Some(lhs.ty())))?;
    Ok((lhs, rhs))
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a [Variable],
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> std::result::Result<(), String> {
        if self.eat(op) {
            Ok(())
        } else {
            match self.peek() {
                Some(token) => Err(format!("expected `{}`, found {}", op, token)),
                None => Err(format!("expected `{}` at end of input", op)),
            }
        }
    }

    fn logical_level(
        &mut self,
        ops: &[(&str, LogicalOp)],
        next: fn(&mut Self) -> std::result::Result<Term, String>,
    ) -> std::result::Result<Term, String> {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(symbol, op) in ops {
                if self.eat(symbol) {
                    let rhs = next(self)?;
                    lhs = Term::Expr(Expr::logical(lhs.into_bool()?, op, rhs.into_bool()?));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn equivalence(&mut self) -> std::result::Result<Term, String> {
        self.logical_level(&[("<=>", LogicalOp::Equiv), ("->", LogicalOp::Implies)], Self::disjunction)
    }

    fn disjunction(&mut self) -> std::result::Result<Term, String> {
        self.logical_level(&[("||", LogicalOp::Or)], Self::exclusive)
    }

    fn exclusive(&mut self) -> std::result::Result<Term, String> {
        self.logical_level(&[("^^", LogicalOp::Xor)], Self::conjunction)
    }

    fn conjunction(&mut self) -> std::result::Result<Term, String> {
        self.logical_level(&[("&&", LogicalOp::And)], Self::comparison)
    }

    fn comparison(&mut self) -> std::result::Result<Term, String> {
        let lhs = self.bit_or()?;
        let op = match self.peek_op() {
            Some("==") => Comparator::Eq,
            Some("!=") => Comparator::Ne,
            Some("<") => Comparator::Lt,
            Some("<=") => Comparator::Le,
            Some(">") => Comparator::Gt,
            Some(">=") => Comparator::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.bit_or()?;
        let (lhs, rhs) = unify(lhs, rhs)?;
        let expr = match (lhs.ty(), op) {
            (BuiltinType::Bool, Comparator::Eq) => Expr::logical(lhs, LogicalOp::Equiv, rhs),
            (BuiltinType::Bool, Comparator::Ne) => Expr::logical(lhs, LogicalOp::Xor, rhs),
            (BuiltinType::Bool, _) => return Err(format!("cannot order booleans with {}", op.symbol())),
            _ => Expr::compare(lhs, op, rhs),
        };
        Ok(Term::Expr(expr))
    }

    fn bitvector_level(
        &mut self,
        ops: &[(&str, BitvectorOp)],
        next: fn(&mut Self) -> std::result::Result<Term, String>,
    ) -> std::result::Result<Term, String> {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(symbol, op) in ops {
                if self.eat(symbol) {
                    let rhs = next(self)?;
                    let (l, r) = unify(lhs, rhs)?;
                    lhs = Term::Expr(Expr::bitvector(l, op, r));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn bit_or(&mut self) -> std::result::Result<Term, String> {
        self.bitvector_level(&[("|", BitvectorOp::Or)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> std::result::Result<Term, String> {
        self.bitvector_level(&[("^", BitvectorOp::Xor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> std::result::Result<Term, String> {
        self.bitvector_level(&[("&", BitvectorOp::And)], Self::shift)
    }

    fn shift(&mut self) -> std::result::Result<Term, String> {
        self.bitvector_level(
            &[
                (">>>", BitvectorOp::UShr),
                ("<<", BitvectorOp::Shl),
                (">>", BitvectorOp::Shr),
            ],
            Self::additive,
        )
    }

    fn numeric_level(
        &mut self,
        ops: &[(&str, NumericOp)],
        next: fn(&mut Self) -> std::result::Result<Term, String>,
    ) -> std::result::Result<Term, String> {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(symbol, op) in ops {
                if self.eat(symbol) {
                    let rhs = next(self)?;
                    lhs = match (lhs, rhs) {
                        (Term::Int(a), Term::Int(b)) => fold_literals(a, op, b)?,
                        (l, r) => {
                            let (l, r) = unify(l, r)?;
                            Term::Expr(Expr::numeric(l, op, r))
                        }
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn additive(&mut self) -> std::result::Result<Term, String> {
        self.numeric_level(&[("+", NumericOp::Add), ("-", NumericOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> std::result::Result<Term, String> {
        self.numeric_level(
            &[("*", NumericOp::Mul), ("/", NumericOp::Div), ("%", NumericOp::Rem)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> std::result::Result<Term, String> {
        if self.eat("!") {
            return Ok(Term::Expr(Expr::not(self.unary()?.into_bool()?)));
        }
        if self.eat("~") {
            return Ok(Term::Expr(Expr::BitNot(Box::new(self.unary()?.into_expr(None)?))));
        }
        if self.eat("-") {
            return Ok(match self.unary()? {
                Term::Int(v) => Term::Int(-v),
                Term::Real(text) => Term::Real(format!("-{}", text)),
                Term::Expr(e) => Term::Expr(Expr::UnaryMinus(Box::new(e))),
            });
        }
        if let (Some(Token::Op("(")), Some(Token::Ident(name)), Some(Token::Op(")"))) = (
            self.tokens.get(self.pos),
            self.tokens.get(self.pos + 1),
            self.tokens.get(self.pos + 2),
        ) {
            if let Ok(ty) = BuiltinType::from_str(name) {
                self.pos += 3;
                let inner = self.unary()?;
                return Ok(Term::Expr(match inner {
                    Term::Expr(e) => Expr::cast(e, ty),
                    literal => literal.into_expr(Some(ty))?,
                }));
            }
        }
        self.primary()
    }

    fn primary(&mut self) -> std::result::Result<Term, String> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err("unexpected end of expression".to_string());
        };
        self.pos += 1;
        match token {
            Token::Int(v) => Ok(Term::Int(v)),
            Token::Real(text) => Ok(Term::Real(text)),
            Token::Op("(") => {
                let inner = self.equivalence()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Ident(name) if name.eq_ignore_ascii_case("true") => Ok(Term::Expr(Expr::bool(true))),
            Token::Ident(name) if name.eq_ignore_ascii_case("false") => Ok(Term::Expr(Expr::bool(false))),
            Token::Ident(name) => self
                .scope
                .iter()
                .find(|v| v.name == name)
                .map(|v| Term::Expr(Expr::var(v)))
                .ok_or_else(|| format!("undeclared variable {}", name)),
            Token::Op(op) => Err(format!("unexpected `{}`", op)),
        }
    }
}

fn fold_literals(a: i128, op: NumericOp, b: i128) -> std::result::Result<Term, String> {
    let value = match op {
        NumericOp::Add => a.checked_add(b),
        NumericOp::Sub => a.checked_sub(b),
        NumericOp::Mul => a.checked_mul(b),
        NumericOp::Div => a.checked_div(b),
        NumericOp::Rem => a.checked_rem(b),
    };
    value
        .map(Term::Int)
        .ok_or_else(|| format!("cannot evaluate {} {} {}", a, op.symbol(), b))
}
