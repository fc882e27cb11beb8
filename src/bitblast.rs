//! Translation of expressions into BDDs over bit-vector encodings.
//!
//! Every integer variable of width `w` becomes `w` BDD variables, least
//! significant bit first. BDD variable indices interleave the bits of all
//! variables (`bit << SLOT_BITS | slot + 1`), which keeps equalities, adders
//! and comparisons between variables linear in size.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::bdd::Bdd;
use crate::expr::{BitvectorOp, Comparator, Expr, LogicalOp, NumericOp, Operator, Quantifier};
use crate::reference::Ref;
use crate::types::{BuiltinType, Value, Variable};

const SLOT_BITS: u32 = 20;

/// A construct the bit-blaster cannot encode; the solver answers `DontKnow`.
#[derive(Debug, Clone, PartialEq)]
pub struct Unsupported(pub String);

type Bits = Vec<Ref>;

pub struct BitBlaster<'a> {
    bdd: &'a Bdd,
    slots: HashMap<Variable, u32>,
}

impl<'a> BitBlaster<'a> {
    pub fn new(bdd: &'a Bdd) -> Self {
        Self {
            bdd,
            slots: HashMap::new(),
        }
    }

    fn slot(&mut self, var: &Variable) -> u32 {
        let next = self.slots.len() as u32;
        *self.slots.entry(var.clone()).or_insert(next)
    }

    /// BDD variable indices encoding `var`, least significant bit first.
    pub fn var_indices(&mut self, var: &Variable) -> Result<Vec<u32>, Unsupported> {
        let width = width_of(var.ty)?;
        let slot = self.slot(var);
        Ok((0..width).map(|bit| (bit << SLOT_BITS) + slot + 1).collect())
    }

    fn var_bits(&mut self, var: &Variable) -> Result<Bits, Unsupported> {
        let indices = self.var_indices(var)?;
        Ok(indices.into_iter().map(|v| self.bdd.mk_var(v)).collect())
    }

    fn const_bits(&self, bits: u64, width: u32) -> Bits {
        (0..width)
            .map(|i| self.bdd.constant((bits >> i) & 1 == 1))
            .collect()
    }

    /// Encodes a boolean-typed expression.
    pub fn formula(&mut self, expr: &Expr) -> Result<Ref, Unsupported> {
        let bdd = self.bdd;
        match expr {
            Expr::Constant(Value::Bool(b)) => Ok(bdd.constant(*b)),
            Expr::Var(var) if var.ty.is_bool() => Ok(self.var_bits(var)?[0]),
            Expr::Not(inner) => Ok(-self.formula(inner)?),
            Expr::Logical(lhs, op, rhs) => {
                let f = self.formula(lhs)?;
                let g = self.formula(rhs)?;
                Ok(match op {
                    LogicalOp::And => bdd.apply_and(f, g),
                    LogicalOp::Or => bdd.apply_or(f, g),
                    LogicalOp::Equiv => bdd.apply_eq(f, g),
                    LogicalOp::Implies => bdd.apply_imply(f, g),
                    LogicalOp::Xor => bdd.apply_xor(f, g),
                })
            }
            Expr::Compare(lhs, op, rhs) => self.compare(lhs, *op, rhs),
            Expr::Cast(inner, BuiltinType::Bool) => {
                let bits = self.term(inner)?;
                Ok(-self.equal_bits(&bits, &self.const_bits(0, bits.len() as u32)))
            }
            Expr::Quantified(q, vars, body) => {
                let mut indices = HashSet::new();
                for var in vars {
                    indices.extend(self.var_indices(var)?);
                }
                let f = self.formula(body)?;
                debug!("quantify(q = {:?}, vars = {})", q, vars.len());
                Ok(match q {
                    Quantifier::Exists => bdd.exists(f, &indices),
                    Quantifier::Forall => bdd.forall(f, &indices),
                })
            }
            other if other.ty().is_bool() => {
                let bits = self.term(other)?;
                Ok(bits[0])
            }
            other => Err(Unsupported(format!("not a boolean formula: {}", other))),
        }
    }

    fn compare(&mut self, lhs: &Expr, op: Comparator, rhs: &Expr) -> Result<Ref, Unsupported> {
        let bdd = self.bdd;
        let signed = lhs.ty().is_signed();
        let a = self.term(lhs)?;
        let b = self.term(rhs)?;
        if a.len() != b.len() {
            return Err(Unsupported(format!(
                "width mismatch in comparison: {} {} {}",
                lhs,
                op.symbol(),
                rhs
            )));
        }
        if a.len() == 1 && !matches!(op, Comparator::Eq | Comparator::Ne) && lhs.ty().is_bool() {
            return Err(Unsupported(format!("ordering on booleans: {} {} {}", lhs, op.symbol(), rhs)));
        }
        let res = match op {
            Comparator::Eq => self.equal_bits(&a, &b),
            Comparator::Ne => -self.equal_bits(&a, &b),
            Comparator::Lt => self.less_than(&a, &b, signed),
            Comparator::Gt => self.less_than(&b, &a, signed),
            Comparator::Le => -self.less_than(&b, &a, signed),
            Comparator::Ge => -self.less_than(&a, &b, signed),
        };
        debug!("compare(op = {}) -> {}, bdd size = {}", op.symbol(), res, bdd.size());
        Ok(res)
    }

    fn equal_bits(&self, a: &[Ref], b: &[Ref]) -> Ref {
        let bdd = self.bdd;
        a.iter()
            .zip(b)
            .fold(bdd.one, |acc, (&x, &y)| bdd.apply_and(acc, bdd.apply_eq(x, y)))
    }

    fn less_than(&self, a: &[Ref], b: &[Ref], signed: bool) -> Ref {
        let bdd = self.bdd;
        let n = a.len();
        let mut lt = bdd.zero;
        for i in 0..n {
            let (x, y) = if signed && i == n - 1 {
                // Flipping the sign bits turns signed order into unsigned order.
                (-a[i], -b[i])
            } else {
                (a[i], b[i])
            };
            let strictly = bdd.apply_and(-x, y);
            let same = bdd.apply_eq(x, y);
            lt = bdd.apply_or(strictly, bdd.apply_and(same, lt));
        }
        lt
    }

    /// Encodes an expression as a bit-vector, least significant bit first.
    pub fn term(&mut self, expr: &Expr) -> Result<Bits, Unsupported> {
        let bdd = self.bdd;
        match expr {
            Expr::Constant(Value::Bool(b)) => Ok(vec![bdd.constant(*b)]),
            Expr::Constant(Value::Int { bits, ty }) => Ok(self.const_bits(*bits as u64, width_of(*ty)?)),
            Expr::Constant(value @ Value::Real { .. }) => {
                Err(Unsupported(format!("real constant {}", value)))
            }
            Expr::Var(var) => self.var_bits(var),
            Expr::Numeric(lhs, op, rhs) => {
                let signed = lhs.ty().is_signed();
                let a = self.term(lhs)?;
                let b = self.term(rhs)?;
                if a.len() != b.len() {
                    return Err(Unsupported(format!("width mismatch in {}", expr)));
                }
                Ok(match op {
                    NumericOp::Add => self.add(&a, &b, bdd.zero),
                    NumericOp::Sub => self.sub(&a, &b),
                    NumericOp::Mul => self.mul(&a, &b),
                    NumericOp::Div => self.div_rem(&a, &b, signed).0,
                    NumericOp::Rem => self.div_rem(&a, &b, signed).1,
                })
            }
            Expr::UnaryMinus(inner) => {
                let a = self.term(inner)?;
                let zero = self.const_bits(0, a.len() as u32);
                Ok(self.sub(&zero, &a))
            }
            Expr::BitNot(inner) => Ok(self.term(inner)?.into_iter().map(|r| -r).collect()),
            Expr::Bitvector(lhs, op, rhs) => {
                let a = self.term(lhs)?;
                let b = self.term(rhs)?;
                match op {
                    BitvectorOp::And | BitvectorOp::Or | BitvectorOp::Xor => {
                        if a.len() != b.len() {
                            return Err(Unsupported(format!("width mismatch in {}", expr)));
                        }
                        Ok(a.iter()
                            .zip(&b)
                            .map(|(&x, &y)| match op {
                                BitvectorOp::And => bdd.apply_and(x, y),
                                BitvectorOp::Or => bdd.apply_or(x, y),
                                _ => bdd.apply_xor(x, y),
                            })
                            .collect())
                    }
                    BitvectorOp::Shl => Ok(self.shift(&a, &b, Shift::Left)),
                    BitvectorOp::Shr => {
                        let fill = if lhs.ty().is_signed() {
                            Shift::Arithmetic
                        } else {
                            Shift::Logical
                        };
                        Ok(self.shift(&a, &b, fill))
                    }
                    BitvectorOp::UShr => Ok(self.shift(&a, &b, Shift::Logical)),
                }
            }
            Expr::Cast(_, BuiltinType::Bool) => Ok(vec![self.formula(expr)?]),
            Expr::Cast(inner, ty) => {
                let target = width_of(*ty)? as usize;
                let source_signed = inner.ty().is_signed();
                let mut bits = self.term(inner)?;
                let fill = if source_signed {
                    *bits.last().unwrap_or(&bdd.zero)
                } else {
                    bdd.zero
                };
                bits.resize(target, fill);
                Ok(bits)
            }
            other if other.ty().is_bool() => Ok(vec![self.formula(other)?]),
            other => Err(Unsupported(format!("cannot encode {}", other))),
        }
    }

    fn full_adder(&self, a: Ref, b: Ref, c: Ref) -> (Ref, Ref) {
        let bdd = self.bdd;
        let sum = bdd.apply_xor(bdd.apply_xor(a, b), c);
        let carry = bdd.apply_or(bdd.apply_and(a, b), bdd.apply_and(c, bdd.apply_xor(a, b)));
        (sum, carry)
    }

    fn add(&self, a: &[Ref], b: &[Ref], carry_in: Ref) -> Bits {
        let mut carry = carry_in;
        let mut out = Vec::with_capacity(a.len());
        for (&x, &y) in a.iter().zip(b) {
            let (s, c) = self.full_adder(x, y, carry);
            out.push(s);
            carry = c;
        }
        out
    }

    fn sub(&self, a: &[Ref], b: &[Ref]) -> Bits {
        let negated: Bits = b.iter().map(|&r| -r).collect();
        self.add(a, &negated, self.bdd.one)
    }

    fn mul(&self, a: &[Ref], b: &[Ref]) -> Bits {
        let bdd = self.bdd;
        let n = a.len();
        let mut acc = self.const_bits(0, n as u32);
        for (i, &bi) in b.iter().enumerate() {
            if bdd.is_zero(bi) {
                continue;
            }
            let partial: Bits = (0..n)
                .map(|k| if k < i { bdd.zero } else { bdd.apply_and(a[k - i], bi) })
                .collect();
            acc = self.add(&acc, &partial, bdd.zero);
        }
        acc
    }

    fn mux(&self, cond: Ref, then: &[Ref], otherwise: &[Ref]) -> Bits {
        then.iter()
            .zip(otherwise)
            .map(|(&t, &e)| self.bdd.apply_ite(cond, t, e))
            .collect()
    }

    fn negate(&self, a: &[Ref]) -> Bits {
        let zero = self.const_bits(0, a.len() as u32);
        self.sub(&zero, a)
    }

    /// Restoring division. Quotient rounds toward zero, the remainder takes the
    /// sign of the dividend; division by zero yields an all-ones quotient.
    fn div_rem(&self, a: &[Ref], b: &[Ref], signed: bool) -> (Bits, Bits) {
        let bdd = self.bdd;
        let n = a.len();
        if signed {
            let sa = a[n - 1];
            let sb = b[n - 1];
            let abs_a = self.mux(sa, &self.negate(a), a);
            let abs_b = self.mux(sb, &self.negate(b), b);
            let (q, r) = self.div_rem(&abs_a, &abs_b, false);
            let q = self.mux(bdd.apply_xor(sa, sb), &self.negate(&q), &q);
            let r = self.mux(sa, &self.negate(&r), &r);
            return (q, r);
        }

        // One extra bit keeps `rem << 1` from overflowing.
        let mut divisor = b.to_vec();
        divisor.push(bdd.zero);
        let mut rem = self.const_bits(0, n as u32 + 1);
        let mut quot = vec![bdd.zero; n];
        for i in (0..n).rev() {
            // rem = (rem << 1) | a[i]
            rem.pop();
            rem.insert(0, a[i]);
            let fits = -self.less_than(&rem, &divisor, false);
            let diff = self.sub(&rem, &divisor);
            rem = self.mux(fits, &diff, &rem);
            quot[i] = fits;
        }
        rem.truncate(n);
        (quot, rem)
    }

    fn shift(&self, a: &[Ref], amount: &[Ref], kind: Shift) -> Bits {
        let bdd = self.bdd;
        let n = a.len();
        let fill = match kind {
            Shift::Arithmetic => a[n - 1],
            _ => bdd.zero,
        };
        let stages = (usize::BITS - (n.max(2) - 1).leading_zeros()) as usize;
        let mut current = a.to_vec();
        for (k, &bit) in amount.iter().enumerate().take(stages) {
            let step = 1usize << k;
            let shifted: Bits = (0..n)
                .map(|i| match kind {
                    Shift::Left => {
                        if i >= step {
                            current[i - step]
                        } else {
                            bdd.zero
                        }
                    }
                    _ => {
                        if i + step < n {
                            current[i + step]
                        } else {
                            fill
                        }
                    }
                })
                .collect();
            current = self.mux(bit, &shifted, &current);
        }
        current
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Shift {
    Left,
    Logical,
    Arithmetic,
}

fn width_of(ty: BuiltinType) -> Result<u32, Unsupported> {
    ty.width()
        .ok_or_else(|| Unsupported(format!("type {} has no bit-vector encoding", ty)))
}
