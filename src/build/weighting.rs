//! Relative sequence weighting for alignment rows.

use crate::msa::DigitalMsa;

/// Position-based (Henikoff) weights, rescaled to sum to the row count.
pub fn position_based(msa: &DigitalMsa) -> Vec<f32> {
    let nseq = msa.nseq();
    let k = msa.alphabet.k();
    let mut weights = vec![0.0f32; nseq];
    for col in 0..msa.alen() {
        let mut counts = vec![0usize; k];
        let mut distinct = 0usize;
        for row in 0..nseq {
            let code = msa.rows[row][col];
            if msa.alphabet.is_canonical(code) {
                if counts[code as usize] == 0 {
                    distinct += 1;
                }
                counts[code as usize] += 1;
            }
        }
        if distinct == 0 {
            continue;
        }
        for (row, w) in weights.iter_mut().enumerate() {
            let code = msa.rows[row][col];
            if msa.alphabet.is_canonical(code) {
                *w += 1.0 / (distinct as f32 * counts[code as usize] as f32);
            }
        }
    }
    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        let scale = nseq as f32 / total;
        weights.iter_mut().for_each(|w| *w *= scale);
    } else {
        weights.iter_mut().for_each(|w| *w = 1.0);
    }
    weights
}

/// Single-linkage clusters at fractional identity `threshold`; returns the
/// cluster assignment per row and the cluster count.
pub fn single_linkage_clusters(msa: &DigitalMsa, threshold: f32) -> (Vec<usize>, usize) {
    let nseq = msa.nseq();
    let mut parent: Vec<usize> = (0..nseq).collect();
    fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for a in 0..nseq {
        for b in (a + 1)..nseq {
            if msa.pairwise_identity(a, b) >= threshold {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[ra] = rb;
                }
            }
        }
    }
    let mut label = vec![usize::MAX; nseq];
    let mut next = 0usize;
    let mut assign = vec![0usize; nseq];
    for i in 0..nseq {
        let root = find(&mut parent, i);
        if label[root] == usize::MAX {
            label[root] = next;
            next += 1;
        }
        assign[i] = label[root];
    }
    (assign, next)
}

/// BLOSUM-style weights: rows in the same single-linkage cluster at
/// identity `wid` share one unit of weight.
pub fn blosum(msa: &DigitalMsa, wid: f32) -> Vec<f32> {
    let (assign, nclust) = single_linkage_clusters(msa, wid);
    let mut sizes = vec![0usize; nclust];
    for &c in &assign {
        sizes[c] += 1;
    }
    assign.iter().map(|&c| 1.0 / sizes[c] as f32).collect()
}

/// Gerstein-Sonnhammer-Chothia tree weights: a UPGMA tree over pairwise
/// distances, with each branch length divided among the leaves below it.
pub fn gsc(msa: &DigitalMsa) -> Vec<f32> {
    let nseq = msa.nseq();
    if nseq == 1 {
        return vec![1.0];
    }
    // Pairwise distances.
    let mut dist = vec![vec![0.0f32; nseq]; nseq];
    for a in 0..nseq {
        for b in (a + 1)..nseq {
            let d = 1.0 - msa.pairwise_identity(a, b);
            dist[a][b] = d;
            dist[b][a] = d;
        }
    }

    // UPGMA merge loop over active clusters.
    struct Cluster {
        members: Vec<usize>,
        height: f32,
    }
    let mut clusters: Vec<Cluster> = (0..nseq)
        .map(|i| Cluster { members: vec![i], height: 0.0 })
        .collect();
    let mut active: Vec<usize> = (0..nseq).collect();
    let mut cdist = dist.clone();
    let mut weights = vec![0.0f32; nseq];

    while active.len() > 1 {
        // closest active pair
        let (mut bi, mut bj, mut best) = (0usize, 1usize, f32::INFINITY);
        for (ii, &a) in active.iter().enumerate() {
            for &b in &active[ii + 1..] {
                if cdist[a][b] < best {
                    best = cdist[a][b];
                    bi = a;
                    bj = b;
                }
            }
        }
        let height = best / 2.0;
        // Each side's branch length is shared equally below it.
        for &side in &[bi, bj] {
            let branch = (height - clusters[side].height).max(0.0);
            let share = branch / clusters[side].members.len() as f32;
            for &leaf in &clusters[side].members {
                weights[leaf] += share;
            }
        }
        // Merge bj into bi.
        let merged_members: Vec<usize> = clusters[bi]
            .members
            .iter()
            .chain(clusters[bj].members.iter())
            .copied()
            .collect();
        let (ni, nj) = (clusters[bi].members.len() as f32, clusters[bj].members.len() as f32);
        for &other in &active {
            if other != bi && other != bj {
                let d = (cdist[bi][other] * ni + cdist[bj][other] * nj) / (ni + nj);
                cdist[bi][other] = d;
                cdist[other][bi] = d;
            }
        }
        clusters[bi] = Cluster { members: merged_members, height };
        active.retain(|&c| c != bj);
    }

    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        let scale = nseq as f32 / total;
        weights.iter_mut().for_each(|w| *w *= scale);
    } else {
        // All rows identical: the tree is flat and carries no length.
        weights.iter_mut().for_each(|w| *w = 1.0);
    }
    weights
}
