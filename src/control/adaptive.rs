use crate::models::CurvePoint;

/// Settings for the weather-compensated CH ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Sorted by `outdoor_c`, at least one point when enabled
    pub curve: Vec<CurvePoint>,
    pub min: f64,
    pub max: f64,
}

/// Piecewise-linear outdoor temperature -> CH ceiling curve
#[derive(Debug, Clone)]
pub struct AdaptiveCeiling {
    config: AdaptiveConfig,
}

impl AdaptiveCeiling {
    pub fn new(config: AdaptiveConfig) -> Self {
        AdaptiveCeiling { config }
    }

    /// Ceiling for `outdoor_c`, clamped to `[min, max]`
    ///
    /// None when disabled, without a reading, or with an empty curve.
    pub fn compute(&self, outdoor_c: Option<f64>) -> Option<f64> {
        if !self.config.enabled {
            return None;
        }
        let x = outdoor_c?;
        let curve = &self.config.curve;
        let (first, last) = (curve.first()?, curve.last()?);

        let value = if x <= first.outdoor_c {
            first.ch_max
        } else if x >= last.outdoor_c {
            last.ch_max
        } else {
            curve
                .windows(2)
                .find(|pair| pair[0].outdoor_c <= x && x <= pair[1].outdoor_c)
                .map(|pair| interpolate(x, pair[0], pair[1]))?
        };

        Some(value.max(self.config.min).min(self.config.max))
    }
}

fn interpolate(x: f64, p0: CurvePoint, p1: CurvePoint) -> f64 {
    if p1.outdoor_c == p0.outdoor_c {
        return p0.ch_max;
    }
    p0.ch_max + (x - p0.outdoor_c) * (p1.ch_max - p0.ch_max) / (p1.outdoor_c - p0.outdoor_c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(outdoor_c: f64, ch_max: f64) -> CurvePoint {
        CurvePoint { outdoor_c, ch_max }
    }

    fn ceiling(min: f64, max: f64) -> AdaptiveCeiling {
        AdaptiveCeiling::new(AdaptiveConfig {
            enabled: true,
            curve: vec![point(-5.0, 100.0), point(10.0, 60.0), point(20.0, 40.0)],
            min,
            max,
        })
    }

    #[test]
    fn holds_end_values_outside_the_curve() {
        let c = ceiling(40.0, 100.0);
        assert_eq!(c.compute(Some(-10.0)), Some(100.0));
        assert_eq!(c.compute(Some(-5.0)), Some(100.0));
        assert_eq!(c.compute(Some(25.0)), Some(40.0));
    }

    #[test]
    fn interpolates_between_points() {
        let c = ceiling(40.0, 100.0);
        assert_eq!(c.compute(Some(2.5)), Some(80.0));
        assert_eq!(c.compute(Some(10.0)), Some(60.0));
        assert_eq!(c.compute(Some(15.0)), Some(50.0));
    }

    #[test]
    fn clamps_into_configured_range() {
        let c = ceiling(45.0, 75.0);
        assert_eq!(c.compute(Some(-10.0)), Some(75.0));
        assert_eq!(c.compute(Some(2.5)), Some(75.0));
        assert_eq!(c.compute(Some(25.0)), Some(45.0));
    }

    #[test]
    fn absent_when_disabled_or_without_reading() {
        let c = ceiling(40.0, 100.0);
        assert_eq!(c.compute(None), None);

        let mut config = c.config.clone();
        config.enabled = false;
        assert_eq!(AdaptiveCeiling::new(config).compute(Some(0.0)), None);
    }

    #[test]
    fn duplicate_outdoor_points_take_left_value() {
        assert_eq!(interpolate(3.0, point(3.0, 70.0), point(3.0, 50.0)), 70.0);

        let c = AdaptiveCeiling::new(AdaptiveConfig {
            enabled: true,
            curve: vec![point(0.0, 80.0), point(5.0, 70.0), point(5.0, 50.0), point(10.0, 40.0)],
            min: 0.0,
            max: 100.0,
        });
        assert_eq!(c.compute(Some(5.0)), Some(70.0));
        assert_eq!(c.compute(Some(7.5)), Some(45.0));
    }

    #[test]
    fn single_point_curve_is_constant() {
        let c = AdaptiveCeiling::new(AdaptiveConfig {
            enabled: true,
            curve: vec![point(0.0, 65.0)],
            min: 20.0,
            max: 90.0,
        });
        assert_eq!(c.compute(Some(-20.0)), Some(65.0));
        assert_eq!(c.compute(Some(20.0)), Some(65.0));
    }
}
