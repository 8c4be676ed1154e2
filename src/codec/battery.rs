//! Single-cell LiPo discharge curve, millivolts to percent

/// (volts, percent), highest first
const CURVE: [(f64, f64); 13] = [
    (4.20, 100.0),
    (4.10, 90.0),
    (4.00, 80.0),
    (3.92, 70.0),
    (3.85, 60.0),
    (3.79, 50.0),
    (3.74, 40.0),
    (3.70, 30.0),
    (3.65, 20.0),
    (3.55, 10.0),
    (3.40, 5.0),
    (3.30, 2.0),
    (3.20, 0.0),
];

/// Battery percentage for a cell voltage, linearly interpolated between curve points
pub fn voltage_to_percent(volts: f64) -> u8 {
    let v = volts.clamp(3.20, 4.20);

    for pair in CURVE.windows(2) {
        let (av, ap) = pair[0];
        let (bv, bp) = pair[1];
        if v <= av && v >= bv {
            let t = (av - v) / (av - bv);
            let p = ap + (bp - ap) * t;
            return (p + 0.5).clamp(0.0, 100.0) as u8;
        }
    }

    if v >= 4.20 {
        100
    } else {
        0
    }
}

pub fn mv_to_percent(mv: u16) -> u8 {
    voltage_to_percent(mv as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_points() {
        assert_eq!(mv_to_percent(4200), 100);
        assert_eq!(mv_to_percent(4000), 80);
        assert_eq!(mv_to_percent(3790), 50);
        assert_eq!(mv_to_percent(3200), 0);
    }

    #[test]
    fn test_interpolation() {
        // Halfway between 3.70 V (30 %) and 3.65 V (20 %)
        assert_eq!(voltage_to_percent(3.675), 25);
    }

    #[test]
    fn test_clamped_outside_curve() {
        assert_eq!(mv_to_percent(4500), 100);
        assert_eq!(mv_to_percent(2500), 0);
    }
}
