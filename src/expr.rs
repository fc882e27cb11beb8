//! Immutable expression trees over typed variables and constants.
//!
//! Every transformation (renaming, conjunction, quantification) returns a new
//! tree; an [`Expr`] is never modified in place once built.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::types::{BuiltinType, Value, Variable};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LogicalOp {
    And,
    Or,
    Equiv,
    Implies,
    Xor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NumericOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BitvectorOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Quantifier {
    Exists,
    Forall,
}

/// Operator naming shared by the printers and the persisted format.
pub trait Operator: Sized + Copy + 'static {
    const ALL: &'static [Self];

    /// Infix symbol used when rendering.
    fn symbol(self) -> &'static str;
    /// Upper-case name used by the persisted format.
    fn name(self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl Operator for LogicalOp {
    const ALL: &'static [Self] = &[
        LogicalOp::And,
        LogicalOp::Or,
        LogicalOp::Equiv,
        LogicalOp::Implies,
        LogicalOp::Xor,
    ];

    fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Equiv => "<=>",
            LogicalOp::Implies => "->",
            LogicalOp::Xor => "^^",
        }
    }

    fn name(self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Equiv => "EQUIV",
            LogicalOp::Implies => "IMPLY",
            LogicalOp::Xor => "XOR",
        }
    }
}

impl Operator for Comparator {
    const ALL: &'static [Self] = &[
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Lt,
        Comparator::Le,
        Comparator::Gt,
        Comparator::Ge,
    ];

    fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Comparator::Eq => "EQ",
            Comparator::Ne => "NE",
            Comparator::Lt => "LT",
            Comparator::Le => "LE",
            Comparator::Gt => "GT",
            Comparator::Ge => "GE",
        }
    }
}

impl Operator for NumericOp {
    const ALL: &'static [Self] = &[
        NumericOp::Add,
        NumericOp::Sub,
        NumericOp::Mul,
        NumericOp::Div,
        NumericOp::Rem,
    ];

    fn symbol(self) -> &'static str {
        match self {
            NumericOp::Add => "+",
            NumericOp::Sub => "-",
            NumericOp::Mul => "*",
            NumericOp::Div => "/",
            NumericOp::Rem => "%",
        }
    }

    fn name(self) -> &'static str {
        match self {
            NumericOp::Add => "PLUS",
            NumericOp::Sub => "MINUS",
            NumericOp::Mul => "MUL",
            NumericOp::Div => "DIV",
            NumericOp::Rem => "REM",
        }
    }
}

impl Operator for BitvectorOp {
    const ALL: &'static [Self] = &[
        BitvectorOp::And,
        BitvectorOp::Or,
        BitvectorOp::Xor,
        BitvectorOp::Shl,
        BitvectorOp::Shr,
        BitvectorOp::UShr,
    ];

    fn symbol(self) -> &'static str {
        match self {
            BitvectorOp::And => "&",
            BitvectorOp::Or => "|",
            BitvectorOp::Xor => "^",
            BitvectorOp::Shl => "<<",
            BitvectorOp::Shr => ">>",
            BitvectorOp::UShr => ">>>",
        }
    }

    fn name(self) -> &'static str {
        match self {
            BitvectorOp::And => "AND",
            BitvectorOp::Or => "OR",
            BitvectorOp::Xor => "XOR",
            BitvectorOp::Shl => "SHIFTL",
            BitvectorOp::Shr => "SHIFTR",
            BitvectorOp::UShr => "SHIFTUR",
        }
    }
}

impl Operator for Quantifier {
    const ALL: &'static [Self] = &[Quantifier::Exists, Quantifier::Forall];

    fn symbol(self) -> &'static str {
        match self {
            Quantifier::Exists => "exists",
            Quantifier::Forall => "forall",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Quantifier::Exists => "EXISTS",
            Quantifier::Forall => "FORALL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Var(Variable),
    Not(Box<Expr>),
    Logical(Box<Expr>, LogicalOp, Box<Expr>),
    Compare(Box<Expr>, Comparator, Box<Expr>),
    Numeric(Box<Expr>, NumericOp, Box<Expr>),
    Bitvector(Box<Expr>, BitvectorOp, Box<Expr>),
    UnaryMinus(Box<Expr>),
    BitNot(Box<Expr>),
    Cast(Box<Expr>, BuiltinType),
    Quantified(Quantifier, Vec<Variable>, Box<Expr>),
}

impl Expr {
    pub fn bool(value: bool) -> Self {
        Expr::Constant(Value::Bool(value))
    }

    pub fn int(value: i64, ty: BuiltinType) -> Self {
        Expr::Constant(Value::int(value, ty))
    }

    pub fn var(var: &Variable) -> Self {
        Expr::Var(var.clone())
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn logical(lhs: Expr, op: LogicalOp, rhs: Expr) -> Self {
        Expr::Logical(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::logical(lhs, LogicalOp::And, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::logical(lhs, LogicalOp::Or, rhs)
    }

    pub fn compare(lhs: Expr, op: Comparator, rhs: Expr) -> Self {
        Expr::Compare(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn numeric(lhs: Expr, op: NumericOp, rhs: Expr) -> Self {
        Expr::Numeric(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn bitvector(lhs: Expr, op: BitvectorOp, rhs: Expr) -> Self {
        Expr::Bitvector(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn cast(inner: Expr, ty: BuiltinType) -> Self {
        Expr::Cast(Box::new(inner), ty)
    }

    /// Equality of two terms: logical equivalence for booleans, `==` otherwise.
    pub fn equal(lhs: Expr, rhs: Expr) -> Self {
        if lhs.ty() == BuiltinType::Bool {
            Expr::logical(lhs, LogicalOp::Equiv, rhs)
        } else {
            Expr::compare(lhs, Comparator::Eq, rhs)
        }
    }

    /// Left fold with AND. Yields `true` for an empty sequence.
    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or_else(|| Expr::bool(true))
    }

    /// Left fold with OR. Yields `false` for an empty sequence.
    pub fn or_all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or_else(|| Expr::bool(false))
    }

    /// Existential closure over `vars`; no quantifier is built for an empty list.
    pub fn exists(vars: Vec<Variable>, body: Expr) -> Self {
        if vars.is_empty() {
            body
        } else {
            Expr::Quantified(Quantifier::Exists, vars, Box::new(body))
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Constant(Value::Bool(true)))
    }

    /// Static type of the expression.
    pub fn ty(&self) -> BuiltinType {
        match self {
            Expr::Constant(value) => value.ty(),
            Expr::Var(var) => var.ty,
            Expr::Not(_) | Expr::Logical(..) | Expr::Compare(..) | Expr::Quantified(..) => {
                BuiltinType::Bool
            }
            Expr::Numeric(lhs, _, _) | Expr::Bitvector(lhs, _, _) => lhs.ty(),
            Expr::UnaryMinus(inner) | Expr::BitNot(inner) => inner.ty(),
            Expr::Cast(_, ty) => *ty,
        }
    }

    /// Variables occurring free in the expression.
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        self.collect_free(&mut vars, &[]);
        vars
    }

    fn collect_free(&self, vars: &mut BTreeSet<Variable>, bound: &[&[Variable]]) {
        match self {
            Expr::Constant(_) => {}
            Expr::Var(var) => {
                if !bound.iter().any(|scope| scope.contains(var)) {
                    vars.insert(var.clone());
                }
            }
            Expr::Not(inner) | Expr::UnaryMinus(inner) | Expr::BitNot(inner) | Expr::Cast(inner, _) => {
                inner.collect_free(vars, bound)
            }
            Expr::Logical(lhs, _, rhs)
            | Expr::Compare(lhs, _, rhs)
            | Expr::Numeric(lhs, _, rhs)
            | Expr::Bitvector(lhs, _, rhs) => {
                lhs.collect_free(vars, bound);
                rhs.collect_free(vars, bound);
            }
            Expr::Quantified(_, scope, body) => {
                let mut inner = bound.to_vec();
                inner.push(scope);
                body.collect_free(vars, &inner);
            }
        }
    }

    /// Whether any of `vars` occurs free in the expression.
    pub fn mentions_any<'a>(&self, vars: impl IntoIterator<Item = &'a Variable>) -> bool {
        let free = self.free_variables();
        vars.into_iter().any(|v| free.contains(v))
    }

    /// Renames free variables according to `names`. Bound variables shadow the map.
    pub fn rename(&self, names: &NameMap) -> Expr {
        match self {
            Expr::Constant(_) => self.clone(),
            Expr::Var(var) => match names.get(&var.name) {
                Some(new_name) => Expr::Var(Variable::new(new_name, var.ty)),
                None => self.clone(),
            },
            Expr::Not(inner) => Expr::not(inner.rename(names)),
            Expr::UnaryMinus(inner) => Expr::UnaryMinus(Box::new(inner.rename(names))),
            Expr::BitNot(inner) => Expr::BitNot(Box::new(inner.rename(names))),
            Expr::Cast(inner, ty) => Expr::cast(inner.rename(names), *ty),
            Expr::Logical(lhs, op, rhs) => Expr::logical(lhs.rename(names), *op, rhs.rename(names)),
            Expr::Compare(lhs, op, rhs) => Expr::compare(lhs.rename(names), *op, rhs.rename(names)),
            Expr::Numeric(lhs, op, rhs) => Expr::numeric(lhs.rename(names), *op, rhs.rename(names)),
            Expr::Bitvector(lhs, op, rhs) => {
                Expr::bitvector(lhs.rename(names), *op, rhs.rename(names))
            }
            Expr::Quantified(q, scope, body) => {
                let mut shadowed = names.clone();
                for var in scope {
                    shadowed.remove(&var.name);
                }
                Expr::Quantified(*q, scope.clone(), Box::new(body.rename(&shadowed)))
            }
        }
    }
}

impl From<&Variable> for Expr {
    fn from(var: &Variable) -> Self {
        Expr::var(var)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Var(var) => write!(f, "{}", var),
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::UnaryMinus(inner) => write!(f, "-{}", inner),
            Expr::BitNot(inner) => write!(f, "~{}", inner),
            Expr::Cast(inner, ty) => write!(f, "(({}) {})", ty, inner),
            Expr::Logical(lhs, op, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Compare(lhs, op, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Numeric(lhs, op, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Bitvector(lhs, op, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Quantified(q, vars, body) => {
                let names = vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
                write!(f, "({} {}: {})", q.symbol(), names.join(", "), body)
            }
        }
    }
}

/// Variable renaming table, keyed by the old name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameMap(HashMap<String, String>);

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_names(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.0.insert(from.into(), to.into());
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
