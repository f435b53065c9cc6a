use crate::integrator::{
    integrate_box, splice_bidirectional, Bounds, Direction, IntegrationConfig, Point, Trajectory,
};
use crate::session::SessionState;
use crate::slope::SlopeFunction;
use crate::solvers::RK4;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of distinct curve colors the renderer cycles through.
pub const DEFAULT_PALETTE_SIZE: usize = 8;

pub type CurveId = u64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("Seed point must be finite, got ({x}, {y})")]
    NonFiniteSeed { x: f64, y: f64 },
}

/// A slope sample at one grid node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: f64,
    pub y: f64,
    pub slope: f64,
}

/// Lazy row-major walk over a `density x density` grid spanning `bounds`.
///
/// Grid nodes include the edges of the bounds. Nodes where the slope is not
/// finite are skipped rather than zeroed.
pub struct SampleField<'a> {
    function: &'a SlopeFunction,
    bounds: Bounds,
    density: usize,
    total: usize,
    next: usize,
}

/// Samples `function` on an evenly spaced grid. Density 1 samples the center;
/// density 0 yields nothing.
///
/// The node count saturates at `usize::MAX`, so absurd densities stay lazy
/// instead of overflowing.
pub fn sample_field(function: &SlopeFunction, bounds: Bounds, density: usize) -> SampleField<'_> {
    SampleField {
        function,
        bounds,
        density,
        total: density.saturating_mul(density),
        next: 0,
    }
}

fn grid_coordinate(min: f64, max: f64, index: usize, density: usize) -> f64 {
    if density <= 1 {
        0.5 * (min + max)
    } else {
        min + (max - min) * index as f64 / (density - 1) as f64
    }
}

impl Iterator for SampleField<'_> {
    type Item = FieldSample;

    fn next(&mut self) -> Option<FieldSample> {
        while self.next < self.total {
            let index = self.next;
            self.next += 1;
            let ix = index % self.density;
            let iy = index / self.density;
            let x = grid_coordinate(self.bounds.x_min, self.bounds.x_max, ix, self.density);
            let y = grid_coordinate(self.bounds.y_min, self.bounds.y_max, iy, self.density);
            if let Some(slope) = self.function.try_slope(x, y) {
                return Some(FieldSample { x, y, slope });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (0, Some(remaining))
    }
}

impl FusedIterator for SampleField<'_> {}

/// A user-seeded solution through one point, frozen at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionCurve {
    pub id: CurveId,
    pub color_index: usize,
    pub seed: Point,
    /// Position of `seed` inside `trajectory`.
    pub seed_index: usize,
    pub trajectory: Trajectory,
}

/// What a side list needs to show for a curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveSummary {
    pub id: CurveId,
    pub color_index: usize,
    pub point_count: usize,
    pub seed: Point,
}

impl From<&SolutionCurve> for CurveSummary {
    fn from(curve: &SolutionCurve) -> Self {
        Self {
            id: curve.id,
            color_index: curve.color_index,
            point_count: curve.trajectory.len(),
            seed: curve.seed,
        }
    }
}

/// Visualization-mode session: the current equation, the integration
/// settings and the collection of seeded curves.
///
/// A failed compile degrades to the zero function so the view stays live; the
/// error is kept in [`FieldSession::state`] for display.
#[derive(Debug)]
pub struct FieldSession {
    equation: String,
    function: SlopeFunction,
    state: SessionState,
    config: IntegrationConfig,
    curves: Vec<SolutionCurve>,
    next_id: CurveId,
    palette_size: usize,
}

impl Default for FieldSession {
    fn default() -> Self {
        Self::new(IntegrationConfig::default())
    }
}

impl FieldSession {
    /// An idle session with no equation yet.
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            equation: String::new(),
            function: SlopeFunction::zero(),
            state: SessionState::Idle,
            config,
            curves: Vec::new(),
            next_id: 1,
            palette_size: DEFAULT_PALETTE_SIZE,
        }
    }

    pub fn with_equation(equation: &str, config: IntegrationConfig) -> Self {
        let mut session = Self::new(config);
        session.set_equation(equation);
        session
    }

    pub fn with_palette_size(mut self, palette_size: usize) -> Self {
        self.palette_size = palette_size.max(1);
        self
    }

    /// Recompiles. Existing curves keep the trajectories they were created with.
    pub fn set_equation(&mut self, equation: &str) {
        self.equation = equation.to_string();
        let (function, error) = SlopeFunction::compile_or_zero(equation);
        self.function = function;
        self.state = match error {
            Some(err) => {
                warn!(equation, %err, "equation failed to compile; using zero slope");
                SessionState::CompileError(err)
            }
            None => SessionState::Ready,
        };
    }

    /// Validates and installs new bounds and step settings.
    /// Stored curves are not recomputed or clipped.
    pub fn set_config(&mut self, config: IntegrationConfig) -> anyhow::Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Integrates both ways from `(x0, y0)` and stores the joined curve.
    ///
    /// Coordinates are in data space. Returns the new curve's id; a non-finite
    /// seed leaves the session untouched.
    pub fn add_curve_at(&mut self, x0: f64, y0: f64) -> Result<CurveId, FieldError> {
        if !x0.is_finite() || !y0.is_finite() {
            return Err(FieldError::NonFiniteSeed { x: x0, y: y0 });
        }
        if self.state.is_idle() {
            let equation = self.equation.clone();
            self.set_equation(&equation);
        }

        let seed = Point::new(x0, y0);
        let mut stepper = RK4::new();
        let backward = integrate_box(
            &self.function,
            &mut stepper,
            seed,
            Direction::Backward,
            &self.config,
        );
        let forward = integrate_box(
            &self.function,
            &mut stepper,
            seed,
            Direction::Forward,
            &self.config,
        );
        let seed_index = backward.len() - 1;
        let trajectory = splice_bidirectional(backward, forward);

        let id = self.next_id;
        self.next_id += 1;
        let color_index = self.curves.len() % self.palette_size;
        debug!(id, points = trajectory.len(), x0, y0, "added solution curve");
        self.curves.push(SolutionCurve {
            id,
            color_index,
            seed,
            seed_index,
            trajectory,
        });
        Ok(id)
    }

    /// Removes a curve. Unknown ids are ignored; returns whether one was removed.
    pub fn remove_curve(&mut self, id: CurveId) -> bool {
        let before = self.curves.len();
        self.curves.retain(|curve| curve.id != id);
        self.curves.len() != before
    }

    pub fn clear_curves(&mut self) {
        self.curves.clear();
    }

    /// Samples the current function over the session's bounds.
    pub fn sample_field(&self, density: usize) -> SampleField<'_> {
        sample_field(&self.function, self.config.bounds, density)
    }

    pub fn curves(&self) -> &[SolutionCurve] {
        &self.curves
    }

    pub fn curve(&self, id: CurveId) -> Option<&SolutionCurve> {
        self.curves.iter().find(|curve| curve.id == id)
    }

    pub fn curve_summaries(&self) -> Vec<CurveSummary> {
        self.curves.iter().map(CurveSummary::from).collect()
    }

    pub fn equation(&self) -> &str {
        &self.equation
    }

    pub fn function(&self) -> &SlopeFunction {
        &self.function
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SlopeField;

    fn session(equation: &str) -> FieldSession {
        FieldSession::with_equation(equation, IntegrationConfig::default())
    }

    #[test]
    fn three_by_three_grid_of_sum() {
        let f = SlopeFunction::compile("dy/dx = x+y").expect("should compile");
        let bounds = Bounds::new(0.0, 2.0, 1.0, 3.0);
        let samples: Vec<FieldSample> = sample_field(&f, bounds, 3).collect();
        assert_eq!(samples.len(), 9);
        let center = samples[4];
        assert_eq!((center.x, center.y), (1.0, 2.0));
        assert_eq!(center.slope, center.x + center.y);
        for sample in &samples {
            assert_eq!(sample.slope, sample.x + sample.y);
        }
        assert_eq!(samples[0].x, 0.0);
        assert_eq!(samples[8].y, 3.0);
    }

    #[test]
    fn sampling_skips_non_finite_slopes() {
        // 1/x is infinite on the x = 0 column; the `/ x` spelling dodges the guard.
        let f = SlopeFunction::compile("1 / x").expect("should compile");
        let samples: Vec<FieldSample> = sample_field(&f, Bounds::default(), 3).collect();
        assert_eq!(samples.len(), 6);
        assert!(samples.iter().all(|s| s.x != 0.0));
    }

    #[test]
    fn sampling_edge_densities() {
        let f = SlopeFunction::compile("x - y").expect("should compile");
        assert_eq!(sample_field(&f, Bounds::default(), 0).count(), 0);
        let single: Vec<FieldSample> =
            sample_field(&f, Bounds::new(0.0, 2.0, 2.0, 6.0), 1).collect();
        assert_eq!(single.len(), 1);
        assert_eq!((single[0].x, single[0].y), (1.0, 4.0));
    }

    #[test]
    fn sampling_is_lazy_and_fused() {
        let f = SlopeFunction::compile("x").expect("should compile");
        let mut samples = sample_field(&f, Bounds::default(), 2);
        assert_eq!(samples.size_hint(), (0, Some(4)));
        assert_eq!(samples.by_ref().take(3).count(), 3);
        assert_eq!(samples.size_hint(), (0, Some(1)));
        assert!(samples.next().is_some());
        assert!(samples.next().is_none());
        assert!(samples.next().is_none());
    }

    #[test]
    fn huge_density_saturates_instead_of_overflowing() {
        let f = SlopeFunction::compile("x + y").expect("should compile");
        let density = 1usize << (usize::BITS / 2 + 1);
        let mut samples = sample_field(&f, Bounds::default(), density);
        assert_eq!(samples.size_hint(), (0, Some(usize::MAX)));

        let first = samples.next().expect("first node");
        assert_eq!((first.x, first.y), (-5.0, -5.0));
        let second = samples.next().expect("second node");
        assert!(second.x > first.x && second.x - first.x < 1e-3);
        assert_eq!(second.y, -5.0);
        assert_eq!(samples.size_hint(), (0, Some(usize::MAX - 2)));
    }

    #[test]
    fn curve_contains_seed_exactly_once_at_backward_length() {
        let mut session = session("dy/dx = x - y");
        let id = session.add_curve_at(0.5, -1.0).expect("curve");
        let curve = session.curve(id).expect("stored");
        let points = curve.trajectory.points();
        let seed = Point::new(0.5, -1.0);

        assert_eq!(points.iter().filter(|p| **p == seed).count(), 1);
        assert_eq!(points[curve.seed_index], seed);
        assert!(curve.seed_index > 0);
        for pair in points.windows(2) {
            assert!(pair[1].x > pair[0].x, "x should increase along the curve");
        }
    }

    #[test]
    fn seed_index_matches_independent_backward_run() {
        let mut session = session("sin(x) + y / 3");
        let id = session.add_curve_at(1.0, 0.5).expect("curve");
        let backward = integrate_box(
            session.function(),
            &mut RK4::new(),
            Point::new(1.0, 0.5),
            Direction::Backward,
            session.config(),
        );
        let curve = session.curve(id).expect("stored");
        assert_eq!(curve.seed_index, backward.len() - 1);
        let max_points = 2 * session.config().max_steps + 1;
        assert!(curve.trajectory.len() <= max_points);
    }

    #[test]
    fn ids_increase_and_are_never_reused() {
        let mut session = session("y");
        let a = session.add_curve_at(0.0, 1.0).expect("curve");
        let b = session.add_curve_at(0.0, -1.0).expect("curve");
        assert!(b > a);
        assert!(session.remove_curve(b));
        let c = session.add_curve_at(1.0, 1.0).expect("curve");
        assert!(c > b);
        session.clear_curves();
        let d = session.add_curve_at(1.0, 1.0).expect("curve");
        assert!(d > c);
        assert_eq!(std::mem::size_of::<CurveId>(), 8);
    }

    #[test]
    fn color_follows_live_curve_count() {
        let mut session = session("x").with_palette_size(3);
        let ids: Vec<CurveId> = (0..4)
            .map(|i| session.add_curve_at(0.0, i as f64).expect("curve"))
            .collect();
        let colors: Vec<usize> = session.curves().iter().map(|c| c.color_index).collect();
        assert_eq!(colors, vec![0, 1, 2, 0]);

        session.remove_curve(ids[0]);
        let id = session.add_curve_at(0.0, -2.0).expect("curve");
        assert_eq!(session.curve(id).expect("stored").color_index, 0);
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut session = session("x");
        session.add_curve_at(0.0, 0.0).expect("curve");
        assert!(!session.remove_curve(999));
        assert_eq!(session.curves().len(), 1);
    }

    #[test]
    fn set_equation_leaves_existing_curves_alone() {
        let mut session = session("x");
        let id = session.add_curve_at(0.0, 0.0).expect("curve");
        let before = session.curve(id).cloned().expect("stored");
        session.set_equation("dy/dx = -y");
        assert_eq!(session.curve(id), Some(&before));
        assert_eq!(session.equation(), "dy/dx = -y");
    }

    #[test]
    fn set_config_does_not_recompute_curves() {
        let mut session = session("x");
        let id = session.add_curve_at(0.0, 0.0).expect("curve");
        let before = session.curve(id).cloned().expect("stored");

        let mut config = IntegrationConfig::default();
        config.bounds = Bounds::new(-1.0, 1.0, -1.0, 1.0);
        session.set_config(config).expect("valid config");
        assert_eq!(session.curve(id), Some(&before));
        assert_eq!(session.config().bounds, config.bounds);

        config.step_size = 0.0;
        assert!(session.set_config(config).is_err());
        assert_eq!(session.config().step_size, IntegrationConfig::default().step_size);
    }

    #[test]
    fn malformed_equation_falls_back_to_zero_slopes() {
        let mut session = session("dy/dx = x +");
        assert!(session.state().error().is_some());
        assert!(session.function().is_zero_fallback());
        assert_eq!(session.function().slope(1.0, 1.0), 0.0);

        let id = session.add_curve_at(0.0, 2.0).expect("curve");
        let curve = session.curve(id).expect("stored");
        assert!(curve.trajectory.points().iter().all(|p| p.y == 2.0));
        assert!(session.sample_field(4).all(|s| s.slope == 0.0));

        session.set_equation("x");
        assert!(session.state().is_ready());
    }

    #[test]
    fn idle_session_compiles_on_first_curve() {
        let mut session = FieldSession::default();
        assert!(session.state().is_idle());
        session.add_curve_at(0.0, 0.0).expect("curve");
        // The empty equation does not compile, so the session is live on the zero function.
        assert!(session.state().error().is_some());
        assert_eq!(session.curves().len(), 1);
    }

    #[test]
    fn rejects_non_finite_seed_without_side_effects() {
        let mut session = session("x");
        let err = session
            .add_curve_at(f64::NAN, 0.0)
            .expect_err("NaN seed should be rejected");
        assert!(matches!(err, FieldError::NonFiniteSeed { y, .. } if y == 0.0));
        assert!(session.add_curve_at(0.0, f64::INFINITY).is_err());
        assert!(session.curves().is_empty());
        let id = session.add_curve_at(0.0, 0.0).expect("curve");
        assert_eq!(id, 1);
    }

    #[test]
    fn summaries_report_point_counts() {
        let mut session = session("0");
        let mut config = IntegrationConfig::default();
        config.max_steps = 10;
        config.step_size = 0.1;
        session.set_config(config).expect("valid config");
        session.add_curve_at(0.0, 0.0).expect("curve");
        let summaries = session.curve_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].point_count, 21);
        assert_eq!(summaries[0].color_index, 0);
    }
}
