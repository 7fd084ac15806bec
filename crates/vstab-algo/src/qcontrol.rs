//! Reactive-power limit enforcement via PV↔PQ bus switching.
//!
//! Implements the switching logic of Zhao, "On PV-PQ bus type switching
//! logic in power flow computation": a PV bus whose reactive injection
//! leaves `[Qmin, Qmax]` becomes PQ with Q pinned at the violated limit; a
//! switched bus whose reactive injection returns strictly inside the band
//! while its voltage deviates from the setpoint switches back to PV.
//!
//! The function is pure: it never mutates the inputs. The driver owns the
//! bus-type vector and decides whether to adopt the outcome.

use num_complex::Complex64;

use vstab_compile::BusKind;

/// Result of one Q-control pass.
#[derive(Debug, Clone)]
pub struct QControlOutcome {
    /// Voltages, with setpoints restored on buses switched back to PV
    pub v: Vec<Complex64>,
    /// Reactive injections, pinned at the limit on switched buses
    pub q_new: Vec<f64>,
    /// Updated bus types
    pub types: Vec<BusKind>,
    /// True if at least one bus changed type
    pub changed: bool,
}

/// Run one PV↔PQ switching pass.
///
/// `q` are the current net reactive injections (p.u.), `vset` the voltage
/// setpoints captured at run start, `original_types` the classification
/// before any switching.
pub fn control_q(
    v: &[Complex64],
    q: &[f64],
    qmax: &[f64],
    qmin: &[f64],
    types: &[BusKind],
    original_types: &[BusKind],
    vset: &[f64],
) -> QControlOutcome {
    const V_TOL: f64 = 1e-6;

    let n = v.len();
    let mut v_new = v.to_vec();
    let mut q_new = q.to_vec();
    let mut types_new = types.to_vec();
    let mut changed = false;

    for i in 0..n {
        match (types[i], original_types[i]) {
            (BusKind::Slack, _) => {}

            // Previously switched PV bus, now PQ with Q pinned
            (BusKind::Pq, BusKind::Pv) => {
                let vm = v[i].norm();
                if (vm - vset[i]).abs() > V_TOL {
                    if q[i] >= qmax[i] {
                        q_new[i] = qmax[i];
                    } else if q[i] <= qmin[i] {
                        q_new[i] = qmin[i];
                    } else {
                        // Back inside the band: restore voltage control
                        types_new[i] = BusKind::Pv;
                        v_new[i] = Complex64::from_polar(vset[i], v[i].arg());
                        changed = true;
                    }
                }
            }

            (BusKind::Pv, _) => {
                if q[i] >= qmax[i] {
                    types_new[i] = BusKind::Pq;
                    q_new[i] = qmax[i];
                    changed = true;
                } else if q[i] <= qmin[i] {
                    types_new[i] = BusKind::Pq;
                    q_new[i] = qmin[i];
                    changed = true;
                }
            }

            _ => {}
        }
    }

    QControlOutcome {
        v: v_new,
        q_new,
        types: types_new,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize) -> Vec<Complex64> {
        vec![Complex64::new(1.0, 0.0); n]
    }

    #[test]
    fn pv_over_limit_switches_to_pq() {
        let types = vec![BusKind::Slack, BusKind::Pv, BusKind::Pq];
        let q = vec![0.0, 0.8, -0.2];
        let qmax = vec![f64::INFINITY, 0.5, 0.0];
        let qmin = vec![f64::NEG_INFINITY, -0.5, 0.0];
        let out = control_q(
            &flat(3),
            &q,
            &qmax,
            &qmin,
            &types,
            &types,
            &[1.0, 1.0, 1.0],
        );
        assert!(out.changed);
        assert_eq!(out.types[1], BusKind::Pq);
        assert!((out.q_new[1] - 0.5).abs() < 1e-12);
        // Untouched buses keep their values
        assert_eq!(out.types[2], BusKind::Pq);
        assert!((out.q_new[2] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn pv_under_limit_pins_qmin() {
        let types = vec![BusKind::Slack, BusKind::Pv];
        let out = control_q(
            &flat(2),
            &[0.0, -0.9],
            &[f64::INFINITY, 0.5],
            &[f64::NEG_INFINITY, -0.5],
            &types,
            &types,
            &[1.0, 1.0],
        );
        assert_eq!(out.types[1], BusKind::Pq);
        assert!((out.q_new[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn switched_bus_recovers_to_pv() {
        let types = vec![BusKind::Slack, BusKind::Pq];
        let original = vec![BusKind::Slack, BusKind::Pv];
        // Voltage sagged below setpoint but Q is back inside the band
        let v = vec![Complex64::new(1.0, 0.0), Complex64::from_polar(0.96, -0.1)];
        let out = control_q(
            &v,
            &[0.0, 0.1],
            &[f64::INFINITY, 0.5],
            &[f64::NEG_INFINITY, -0.5],
            &types,
            &original,
            &[1.0, 1.0],
        );
        assert!(out.changed);
        assert_eq!(out.types[1], BusKind::Pv);
        assert!((out.v[1].norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inside_band_is_stable() {
        let types = vec![BusKind::Slack, BusKind::Pv];
        let out = control_q(
            &flat(2),
            &[0.0, 0.2],
            &[f64::INFINITY, 0.5],
            &[f64::NEG_INFINITY, -0.5],
            &types,
            &types,
            &[1.0, 1.0],
        );
        assert!(!out.changed);
        assert_eq!(out.types[1], BusKind::Pv);
    }
}
