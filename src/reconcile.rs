use std::collections::BTreeSet;

/// PR numbers harvested but not yet analyzed.
pub fn remaining(harvested: &BTreeSet<u64>, analyzed: &BTreeSet<u64>) -> BTreeSet<u64> {
    harvested.difference(analyzed).copied().collect()
}
