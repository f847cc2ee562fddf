//! Proximity clustering of target positions.
//!
//! Two points belong to the same cluster when a chain of points, each
//! within the threshold distance of the next, connects them. The groups are
//! found with a union-find over every pair closer than the threshold.

use traderun_types::{BlockPos, ClusterAnchor, Vec3, floor_to_i32};

/// Union-find over point indices with union by size and path halving.
#[derive(Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while let Some(&parent) = self.parent.get(node) {
            if parent == node {
                break;
            }
            let grandparent = self.parent.get(parent).copied().unwrap_or(parent);
            if let Some(slot) = self.parent.get_mut(node) {
                *slot = grandparent;
            }
            node = grandparent;
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let size_a = self.size.get(root_a).copied().unwrap_or(1);
        let size_b = self.size.get(root_b).copied().unwrap_or(1);
        let (big, small) = if size_a >= size_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        if let Some(slot) = self.parent.get_mut(small) {
            *slot = big;
        }
        if let Some(slot) = self.size.get_mut(big) {
            *slot = size_a.saturating_add(size_b);
        }
    }
}

/// Group point indices into clusters, largest first.
///
/// Ties in size are broken by the smallest member index, so the result is
/// deterministic for a given input order.
pub fn clusters(points: &[Vec3], threshold: f64) -> Vec<Vec<usize>> {
    let threshold_sq = threshold * threshold;
    let mut set = DisjointSet::new(points.len());
    for (i, a) in points.iter().enumerate() {
        for (j, b) in points.iter().enumerate().skip(i.saturating_add(1)) {
            if a.distance_sq(*b) <= threshold_sq {
                set.union(i, j);
            }
        }
    }

    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for index in 0..points.len() {
        let root = set.find(index);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(index),
            None => groups.push((root, vec![index])),
        }
    }

    let mut result: Vec<Vec<usize>> = groups.into_iter().map(|(_, members)| members).collect();
    result.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.first().cmp(&b.first()))
    });
    result
}

/// Centroid and size of the largest cluster, placed on `level`.
///
/// Returns `None` when there are no points.
pub fn dominant_cluster(points: &[Vec3], threshold: f64, level: i32) -> Option<ClusterAnchor> {
    let groups = clusters(points, threshold);
    let largest = groups.first()?;
    let members = u32::try_from(largest.len()).unwrap_or(u32::MAX);
    if members == 0 {
        return None;
    }

    let (sum_x, sum_z) = largest
        .iter()
        .filter_map(|&i| points.get(i))
        .fold((0.0_f64, 0.0_f64), |(x, z), p| (x + p.x, z + p.z));
    let n = f64::from(members);
    Some(ClusterAnchor {
        centroid: BlockPos::new(floor_to_i32(sum_x / n), level, floor_to_i32(sum_z / n)),
        members,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn near_points_join_and_far_point_stands_alone() {
        let points = [
            Vec3::new(0.0, 64.0, 0.0),
            Vec3::new(4.0, 64.0, 0.0),
            Vec3::new(14.0, 64.0, 0.0),
        ];
        let groups = clusters(&points, 5.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.first().unwrap(), &vec![0, 1]);
        assert_eq!(groups.get(1).unwrap(), &vec![2]);
    }

    #[test]
    fn chains_connect_transitively() {
        let points = [
            Vec3::new(0.0, 64.0, 0.0),
            Vec3::new(4.0, 64.0, 0.0),
            Vec3::new(8.0, 64.0, 0.0),
        ];
        assert_eq!(clusters(&points, 5.0).len(), 1);
    }

    #[test]
    fn dominant_cluster_reports_centroid() {
        let points = [
            Vec3::new(0.5, 64.0, 0.5),
            Vec3::new(4.5, 64.0, 0.5),
            Vec3::new(2.5, 64.0, 2.5),
            Vec3::new(40.5, 64.0, 40.5),
        ];
        let anchor = dominant_cluster(&points, 5.0, 64).unwrap();
        assert_eq!(anchor.members, 3);
        assert_eq!(anchor.centroid, BlockPos::new(2, 64, 1));
    }

    #[test]
    fn empty_input_has_no_cluster() {
        assert!(dominant_cluster(&[], 5.0, 64).is_none());
    }
}
