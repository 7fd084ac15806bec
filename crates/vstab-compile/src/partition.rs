//! Bus index partitions for the power-flow unknowns.
//!
//! The Newton-family solvers order their unknowns as
//! `[θ at PV∪PQ buses, |V| at PQ buses]`. This module owns that ordering:
//! a [`BusPartition`] is rebuilt wholesale whenever bus types change (e.g.,
//! PV→PQ reclassification on a reactive-power limit), so the lookup arrays
//! can never drift out of sync with the type vector.

use crate::BusKind;

/// Partition of bus indices into slack / PV / PQ plus the column lookups
/// mapping a bus index to its position in the unknown vector.
#[derive(Debug, Clone)]
pub struct BusPartition {
    /// Slack bus indices
    pub vd: Vec<usize>,
    /// PV bus indices
    pub pv: Vec<usize>,
    /// PQ bus indices
    pub pq: Vec<usize>,
    /// PV followed by PQ, the angle-unknown ordering
    pub pvpq: Vec<usize>,
    /// bus index -> angle column (position in pvpq), None for slack
    theta_of: Vec<Option<usize>>,
    /// bus index -> magnitude column (npvpq + position in pq), None otherwise
    vm_of: Vec<Option<usize>>,
}

impl BusPartition {
    /// Build the partition from a bus-type vector.
    pub fn from_types(types: &[BusKind]) -> Self {
        let n = types.len();
        let mut vd = Vec::new();
        let mut pv = Vec::new();
        let mut pq = Vec::new();
        for (i, t) in types.iter().enumerate() {
            match t {
                BusKind::Slack => vd.push(i),
                BusKind::Pv => pv.push(i),
                BusKind::Pq => pq.push(i),
            }
        }

        let mut pvpq = Vec::with_capacity(pv.len() + pq.len());
        pvpq.extend_from_slice(&pv);
        pvpq.extend_from_slice(&pq);

        let mut theta_of = vec![None; n];
        for (col, &bus) in pvpq.iter().enumerate() {
            theta_of[bus] = Some(col);
        }
        let npvpq = pvpq.len();
        let mut vm_of = vec![None; n];
        for (k, &bus) in pq.iter().enumerate() {
            vm_of[bus] = Some(npvpq + k);
        }

        Self {
            vd,
            pv,
            pq,
            pvpq,
            theta_of,
            vm_of,
        }
    }

    /// Number of buses covered by the partition
    pub fn n_bus(&self) -> usize {
        self.theta_of.len()
    }

    /// Size of the unknown vector: npv + 2·npq
    pub fn nj(&self) -> usize {
        self.pvpq.len() + self.pq.len()
    }

    /// Angle column of a bus, None for slack buses
    #[inline]
    pub fn theta_col(&self, bus: usize) -> Option<usize> {
        self.theta_of[bus]
    }

    /// Magnitude column of a bus, None unless PQ
    #[inline]
    pub fn vm_col(&self, bus: usize) -> Option<usize> {
        self.vm_of[bus]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_layout() {
        let types = vec![
            BusKind::Slack,
            BusKind::Pv,
            BusKind::Pq,
            BusKind::Pq,
            BusKind::Pv,
        ];
        let part = BusPartition::from_types(&types);
        assert_eq!(part.vd, vec![0]);
        assert_eq!(part.pv, vec![1, 4]);
        assert_eq!(part.pq, vec![2, 3]);
        assert_eq!(part.pvpq, vec![1, 4, 2, 3]);
        assert_eq!(part.nj(), 6);
        // angle columns follow pvpq order
        assert_eq!(part.theta_col(1), Some(0));
        assert_eq!(part.theta_col(4), Some(1));
        assert_eq!(part.theta_col(2), Some(2));
        assert_eq!(part.theta_col(0), None);
        // magnitude columns offset by npvpq
        assert_eq!(part.vm_col(2), Some(4));
        assert_eq!(part.vm_col(3), Some(5));
        assert_eq!(part.vm_col(1), None);
    }

    #[test]
    fn lookup_is_contiguous_bijection() {
        let types = vec![
            BusKind::Pq,
            BusKind::Slack,
            BusKind::Pv,
            BusKind::Pq,
            BusKind::Pq,
        ];
        let part = BusPartition::from_types(&types);
        let mut seen = vec![false; part.nj()];
        for bus in 0..types.len() {
            if let Some(c) = part.theta_col(bus) {
                assert!(!seen[c]);
                seen[c] = true;
            }
            if let Some(c) = part.vm_col(bus) {
                assert!(!seen[c]);
                seen[c] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }
}
