//! Amplitude (ap, nT) to Kp conversion.
//!
//! Piecewise-linear over the standard ap/Kp equivalence breakpoints.

/// `(ap, kp)` breakpoints, strictly increasing in both columns.
pub const AP_KP_TABLE: [(f64, f64); 11] = [
    (0.0, 0.0),
    (3.0, 0.33),
    (7.0, 1.0),
    (15.0, 2.0),
    (27.0, 3.0),
    (48.0, 4.0),
    (80.0, 5.0),
    (132.0, 6.0),
    (207.0, 7.0),
    (400.0, 8.0),
    (1000.0, 9.0),
];

/// Interpolated Kp for `ap`; anything above the last breakpoint is 9.
/// Negative input is clamped to 0.
pub fn ap_to_kp(ap: f64) -> f64 {
    let ap = if ap.is_nan() { 0.0 } else { ap.max(0.0) };
    for pair in AP_KP_TABLE.windows(2) {
        let ((ap0, kp0), (ap1, kp1)) = (pair[0], pair[1]);
        if ap <= ap1 {
            let ratio = (ap - ap0) / (ap1 - ap0);
            return kp0 + ratio * (kp1 - kp0);
        }
    }
    9.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoints_are_exact() {
        for (ap, kp) in AP_KP_TABLE {
            assert!((ap_to_kp(ap) - kp).abs() < 1e-9, "ap {ap}");
        }
    }

    #[test]
    fn interpolates_and_saturates() {
        // halfway between 27 → 3 and 48 → 4
        assert!((ap_to_kp(37.5) - 3.5).abs() < 1e-9);
        assert_eq!(ap_to_kp(5000.0), 9.0);
        assert_eq!(ap_to_kp(-10.0), 0.0);
    }

    #[test]
    fn monotonic() {
        let mut prev = -1.0;
        for ap in (0..1200).step_by(7) {
            let kp = ap_to_kp(ap as f64);
            assert!(kp >= prev);
            prev = kp;
        }
    }
}
