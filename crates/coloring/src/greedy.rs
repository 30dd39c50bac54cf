use std::collections::BTreeSet;

/// Conflict graph over vertices `0..n`.
#[derive(Debug)]
pub(crate) struct Conflicts {
    adjacency: Vec<BTreeSet<usize>>,
}

impl Conflicts {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
        }
    }

    /// Makes every pair of vertices in `clique` adjacent.
    pub(crate) fn add_clique(&mut self, clique: &[usize]) {
        for (k, &a) in clique.iter().enumerate() {
            for &b in &clique[k + 1..] {
                if a != b {
                    self.adjacency[a].insert(b);
                    self.adjacency[b].insert(a);
                }
            }
        }
    }

    /// Colors the `active` vertices greedily, smallest available color first.
    ///
    /// Vertices are visited in incidence degree order: next is the uncolored
    /// vertex with the most already-colored neighbors, ties going to the
    /// higher degree and then the lower index. Returns the vertices of each
    /// color.
    pub(crate) fn color(&self, active: &[usize]) -> Vec<Vec<usize>> {
        let n = self.adjacency.len();
        let mut colors: Vec<Option<usize>> = vec![None; n];
        let mut incidence = vec![0_usize; n];
        let mut pending: Vec<usize> = active.to_vec();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        loop {
            let Some(pos) = (0..pending.len()).max_by(|&i, &j| {
                let (a, b) = (pending[i], pending[j]);
                incidence[a]
                    .cmp(&incidence[b])
                    .then(self.adjacency[a].len().cmp(&self.adjacency[b].len()))
                    .then(b.cmp(&a))
            }) else {
                break;
            };
            let v = pending[pos];
            pending.swap_remove(pos);

            let used: BTreeSet<usize> = self.adjacency[v].iter().filter_map(|&u| colors[u]).collect();
            let color = (0..).find(|c| !used.contains(c)).unwrap_or(groups.len());
            colors[v] = Some(color);
            if color == groups.len() {
                groups.push(Vec::new());
            }
            groups[color].push(v);

            for &u in &self.adjacency[v] {
                incidence[u] += 1;
            }
        }

        for group in &mut groups {
            group.sort_unstable();
        }
        groups
    }
}
