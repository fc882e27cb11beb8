//! Reduced ordered BDD manager with complement edges.
//!
//! All operations go through [`Bdd`], which owns the node table, the unique
//! table (hash consing) and the ITE computed table. Variables are 1-indexed;
//! a smaller variable index sits closer to the root.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::utils::{pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct OpKey(Ref, Ref, Ref);

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        pairing3(self.0.as_lit(), self.1.as_lit(), self.2.as_lit())
    }
}

pub struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(cache_bits: usize) -> Self {
        let sentinel = Node {
            variable: 0,
            low: Ref::new(0),
            high: Ref::new(0),
        };
        // Index 0 is unused (it has no negation), index 1 is the terminal.
        let nodes = vec![sentinel, sentinel];
        let one = Ref::positive(1);

        Self {
            nodes: RefCell::new(nodes),
            unique: RefCell::new(HashMap::new()),
            cache: RefCell::new(Cache::new(cache_bits)),
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("size", &self.size())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of allocated decision nodes, terminal excluded.
    pub fn size(&self) -> usize {
        self.nodes.borrow().len() - 2
    }

    pub fn variable(&self, index: usize) -> u32 {
        self.nodes.borrow()[index].variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.nodes.borrow()[index].low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.nodes.borrow()[index].high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    pub fn constant(&self, value: bool) -> Ref {
        if value {
            self.one
        } else {
            self.zero
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Canonicity: the high edge is never complemented.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        if low == high {
            return low;
        }

        let node = Node {
            variable: v,
            low,
            high,
        };
        if let Some(&i) = self.unique.borrow().get(&node) {
            return Ref::positive(i);
        }
        let mut nodes = self.nodes.borrow_mut();
        let i = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, i);
        Ref::positive(i)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        debug_assert_eq!(v, self.variable(i));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, mut g, mut h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return if n { -res } else { res };
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    /// Existential quantification of `f` over the given set of variables.
    pub fn exists(&self, f: Ref, vars: &HashSet<u32>) -> Ref {
        debug!("exists(f = {}, vars = {})", f, vars.len());
        if vars.is_empty() {
            return f;
        }
        let mut cache = HashMap::new();
        self.exists_rec(f, vars, &mut cache)
    }

    fn exists_rec(&self, f: Ref, vars: &HashSet<u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }
        let v = self.variable(f.index());
        let low = self.exists_rec(self.low_node(f), vars, cache);
        let high = self.exists_rec(self.high_node(f), vars, cache);
        let res = if vars.contains(&v) {
            self.apply_or(low, high)
        } else {
            self.mk_node(v, low, high)
        };
        cache.insert(f, res);
        res
    }

    /// Universal quantification, as `¬∃vars.¬f`.
    pub fn forall(&self, f: Ref, vars: &HashSet<u32>) -> Ref {
        -self.exists(-f, vars)
    }

    /// Variables the function actually depends on.
    pub fn support(&self, f: Ref) -> HashSet<u32> {
        let mut seen = HashSet::new();
        let mut vars = HashSet::new();
        let mut stack = vec![f.index()];
        while let Some(i) = stack.pop() {
            if i <= 1 || !seen.insert(i) {
                continue;
            }
            vars.insert(self.variable(i));
            stack.push(self.low(i).index());
            stack.push(self.high(i).index());
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();
        assert!(bdd.is_one(bdd.one));
        assert!(bdd.is_zero(bdd.zero));
        assert_eq!(-bdd.one, bdd.zero);
        assert_eq!(bdd.size(), 0);
    }

    #[test]
    fn test_hash_consing() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(1);
        assert_eq!(x, y);
        assert_eq!(bdd.size(), 1);
        assert_eq!(bdd.mk_node(2, x, x), x);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let lhs = -bdd.apply_and(x, y);
        let rhs = bdd.apply_or(-x, -y);
        println!("bdd = {:?}", bdd);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_xor_eq() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        assert_eq!(bdd.apply_xor(x, y), -bdd.apply_eq(x, y));
        assert_eq!(bdd.apply_xor(x, x), bdd.zero);
        assert_eq!(bdd.apply_imply(x, x), bdd.one);
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_and(x, bdd.apply_or(y, z));
        let g = bdd.exists(f, &HashSet::from([1]));
        assert_eq!(g, bdd.apply_or(y, z));
        let h = bdd.exists(f, &HashSet::from([2, 3]));
        assert_eq!(h, x);
        assert_eq!(bdd.forall(bdd.apply_or(x, -x), &HashSet::from([1])), bdd.one);
    }

    #[test]
    fn test_support() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let z = bdd.mk_var(3);
        let f = bdd.apply_xor(x, z);
        assert_eq!(bdd.support(f), HashSet::from([1, 3]));
    }
}
