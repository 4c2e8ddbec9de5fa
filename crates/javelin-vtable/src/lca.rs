/// Lowest-common-ancestor index over the class-table tree.
///
/// Node 0 is a synthetic root standing for "no common ancestor", so real
/// tables occupy indices `1..`. Parents must be added before their children,
/// which the declaration-order numbering of class tables guarantees. Queries
/// use binary lifting and cost O(log depth); the tree itself never changes
/// once a node is in, so appending stays valid while queries are running.
#[derive(Debug)]
pub(crate) struct LcaTree {
    depths: Vec<u32>,
    /// `up[node][k]` is the 2^k-th ancestor; the jump list stops once it
    /// reaches the root, so `up[node].len()` is `floor(log2(depth)) + 1`.
    up: Vec<Vec<u32>>,
}

impl LcaTree {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut depths = Vec::with_capacity(capacity);
        let mut up = Vec::with_capacity(capacity);
        depths.push(0);
        up.push(Vec::new());
        Self { depths, up }
    }

    /// Appends a node under `parent` and returns its index.
    pub(crate) fn add_node(&mut self, parent: usize) -> usize {
        debug_assert!(parent < self.depths.len());
        let index = self.depths.len();
        self.depths.push(self.depths[parent] + 1);
        let mut jumps = vec![parent as u32];
        let mut level = 0;
        while let Some(&next) = self.up[jumps[level] as usize].get(level) {
            jumps.push(next);
            level += 1;
        }
        self.up.push(jumps);
        index
    }

    /// Nearest node that is an ancestor of (or equal to) both `a` and `b`;
    /// 0 means they share nothing but the synthetic root.
    pub(crate) fn lca_of(&self, a: usize, b: usize) -> usize {
        let (mut a, mut b) = (a, b);
        if self.depths[a] < self.depths[b] {
            std::mem::swap(&mut a, &mut b);
        }
        a = self.ancestor_at(a, self.depths[a] - self.depths[b]);
        if a == b {
            return a;
        }
        let mut level = self.up[a].len();
        while level > 0 {
            level -= 1;
            if let (Some(&ja), Some(&jb)) = (self.up[a].get(level), self.up[b].get(level)) {
                if ja != jb {
                    a = ja as usize;
                    b = jb as usize;
                }
            }
        }
        self.up[a][0] as usize
    }

    fn ancestor_at(&self, mut node: usize, mut delta: u32) -> usize {
        let mut level = 0;
        while delta > 0 {
            if delta & 1 != 0 {
                node = self.up[node][level] as usize;
            }
            delta >>= 1;
            level += 1;
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //        0 (synthetic root)
    //       / \
    //      1   6
    //     /|
    //    2 5
    //   /|
    //  3 4
    fn sample_tree() -> LcaTree {
        let mut tree = LcaTree::new(8);
        assert_eq!(tree.add_node(0), 1);
        assert_eq!(tree.add_node(1), 2);
        assert_eq!(tree.add_node(2), 3);
        assert_eq!(tree.add_node(2), 4);
        assert_eq!(tree.add_node(1), 5);
        assert_eq!(tree.add_node(0), 6);
        tree
    }

    #[test]
    fn lca_of_siblings_is_their_parent() {
        let tree = sample_tree();
        assert_eq!(tree.lca_of(3, 4), 2);
        assert_eq!(tree.lca_of(2, 5), 1);
    }

    #[test]
    fn lca_with_ancestor_is_the_ancestor() {
        let tree = sample_tree();
        assert_eq!(tree.lca_of(3, 1), 1);
        assert_eq!(tree.lca_of(1, 3), 1);
        assert_eq!(tree.lca_of(4, 4), 4);
    }

    #[test]
    fn lca_across_roots_is_synthetic_root() {
        let tree = sample_tree();
        assert_eq!(tree.lca_of(3, 6), 0);
        assert_eq!(tree.lca_of(6, 5), 0);
    }

    #[test]
    fn deep_chain() {
        let mut tree = LcaTree::new(70);
        let mut last = 0;
        for _ in 0..64 {
            last = tree.add_node(last);
        }
        let side = tree.add_node(10);
        assert_eq!(tree.lca_of(last, side), 10);
        assert_eq!(tree.lca_of(side, 63), 10);
    }
}
