use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying path of the BDD as `(variable, polarity)` pairs,
    /// or `None` for the constant false function.
    ///
    /// Variables absent from the path are unconstrained.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<(u32, bool)>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        while !self.is_one(current) {
            let var = self.variable(current.index());
            let high = self.high_node(current);
            let low = self.low_node(current);

            // Prefer the low branch, so free bits of a model default to zero.
            if !self.is_zero(low) {
                path.push((var, false));
                current = low;
            } else {
                path.push((var, true));
                current = high;
            }
        }

        Some(path)
    }

    /// Number of satisfying assignments over `num_vars` variables.
    ///
    /// The support of `node` must be a subset of those variables.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let max = BigUint::from(1u32) << num_vars;
        let mut cache = HashMap::new();
        self.sat_count_rec(node, &max, &mut cache)
    }

    fn sat_count_rec(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_rec(low, max, cache);
        let count_high = self.sat_count_rec(high, max, cache);

        // Counts are kept as a fraction of `max`, which makes complement edges cheap.
        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_one_sat() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, -y);
        let path = bdd.one_sat(f).unwrap();
        assert_eq!(path, vec![(1, true), (2, false)]);
        assert_eq!(bdd.one_sat(bdd.zero), None);
        assert_eq!(bdd.one_sat(bdd.one), Some(vec![]));
    }

    #[test]
    fn test_sat_count() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_or(x, bdd.apply_and(y, z));
        assert_eq!(bdd.sat_count(f, 3), BigUint::from(5u32));
        assert_eq!(bdd.sat_count(-f, 3), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(bdd.one, 4), BigUint::from(16u32));
    }
}
