use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplinePoint {
    pub t: f32,
    pub value: f32,
}

/// Piecewise-linear remap over `[0, 1]`. Queries outside the covered range
/// hold the nearest end value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct SplineCurve {
    points: Vec<SplinePoint>,
}

impl SplineCurve {
    pub fn new(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut points: Vec<SplinePoint> = points
            .into_iter()
            .map(|(t, value)| SplinePoint { t, value })
            .collect();
        points.sort_by(|a, b| a.t.total_cmp(&b.t));
        Self { points }
    }

    pub fn constant(value: f32) -> Self {
        Self::new([(0.0, value)])
    }

    #[inline]
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if t <= first.t {
            return first.value;
        }
        let mut value = first.value;
        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            if t >= a.t && t <= b.t {
                let span = b.t - a.t;
                if span <= 0.0 {
                    return b.value;
                }
                let f = (t - a.t) / span;
                let lo = a.value.min(b.value);
                let hi = a.value.max(b.value);
                return (a.value + (b.value - a.value) * f).clamp(lo, hi);
            }
            value = b.value;
        }
        value
    }
}

impl From<Vec<(f32, f32)>> for SplineCurve {
    fn from(value: Vec<(f32, f32)>) -> Self {
        Self::new(value)
    }
}

impl From<SplineCurve> for Vec<(f32, f32)> {
    fn from(value: SplineCurve) -> Self {
        value.points.into_iter().map(|p| (p.t, p.value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn curve() -> SplineCurve {
        SplineCurve::new([(0.0, 0.2), (0.5, 0.8), (0.3, 0.1), (1.0, 0.4)])
    }

    #[test]
    fn points_are_sorted_on_construction() {
        let ts: Vec<f32> = curve().points().iter().map(|p| p.t).collect();
        assert_eq!(ts, vec![0.0, 0.3, 0.5, 1.0]);
    }

    #[test]
    fn interpolates_and_hits_control_points() {
        let c = curve();
        assert_eq!(c.evaluate(0.0), 0.2);
        assert_eq!(c.evaluate(0.3), 0.1);
        assert_eq!(c.evaluate(0.5), 0.8);
        assert!((c.evaluate(0.75) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn holds_end_values_outside_range() {
        let c = SplineCurve::new([(0.2, 0.5), (0.8, 0.9)]);
        assert_eq!(c.evaluate(-3.0), 0.5);
        assert_eq!(c.evaluate(0.1), 0.5);
        assert_eq!(c.evaluate(0.95), 0.9);
        assert_eq!(c.evaluate(7.0), 0.9);
        assert_eq!(SplineCurve::new([]).evaluate(0.5), 0.0);
        assert_eq!(SplineCurve::constant(0.25).evaluate(0.9), 0.25);
    }

    proptest! {
        // The output between two control points stays within their values
        #[test]
        fn evaluate_is_bracketed(
            a in 0.0f32..1.0, b in 0.0f32..1.0,
            va in -10.0f32..10.0, vb in -10.0f32..10.0,
            f in 0.0f32..=1.0,
        ) {
            prop_assume!((a - b).abs() > 1e-4);
            let (t0, t1) = if a < b { (a, b) } else { (b, a) };
            let (v0, v1) = if a < b { (va, vb) } else { (vb, va) };
            let c = SplineCurve::new([(t0, v0), (t1, v1)]);
            let t = t0 + (t1 - t0) * f;
            let out = c.evaluate(t);
            prop_assert!(out >= v0.min(v1) && out <= v0.max(v1));
        }
    }
}
