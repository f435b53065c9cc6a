use crate::traits::{SlopeField, StepStatus, Steppable};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Upper bound on the number of steps a bounded-interval run may take.
pub const MAX_INTERVAL_STEPS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Ordered samples of one integration run. The first point is always the seed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trajectory {
    points: Vec<Point>,
}

impl Trajectory {
    pub fn from_seed(seed: Point) -> Self {
        Self { points: vec![seed] }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Interleaved coordinates `[x0, y0, x1, y1, ...]`.
    pub fn flatten(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// Axis-aligned region of interest. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            x_min: -5.0,
            x_max: 5.0,
            y_min: -5.0,
            y_max: 5.0,
        }
    }
}

impl Bounds {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.x_min, self.x_max, self.y_min, self.y_max];
        if values.iter().any(|v| !v.is_finite()) {
            bail!("Bounds must be finite.");
        }
        if self.x_max <= self.x_min {
            bail!("x_max ({}) must exceed x_min ({}).", self.x_max, self.x_min);
        }
        if self.y_max <= self.y_min {
            bail!("y_max ({}) must exceed y_min ({}).", self.y_max, self.y_min);
        }
        Ok(())
    }
}

/// Shared, read-only input to every bounded-box integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub bounds: Bounds,
    pub step_size: f64,
    pub max_steps: usize,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            step_size: 0.05,
            max_steps: 400,
        }
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            bail!("Step size must be positive and finite.");
        }
        if self.max_steps == 0 {
            bail!("max_steps must be greater than zero.");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("Step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),
    #[error("Non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
    #[error("Interval needs about {needed} steps; the limit is {limit}")]
    TooManySteps { needed: f64, limit: usize },
}

/// Integrates forward from `seed` while `x < x_end`.
///
/// Every step is kept; leaving any region of interest does not stop the run.
/// Abscissae are computed as `x0 + i*h` so rounding cannot sneak in an extra
/// step at the end of the interval. A non-finite stage ends the run early.
pub fn integrate_interval<S: Steppable>(
    field: &impl SlopeField,
    stepper: &mut S,
    seed: Point,
    x_end: f64,
    h: f64,
) -> Result<Trajectory, IntegrationError> {
    if !h.is_finite() || h <= 0.0 {
        return Err(IntegrationError::InvalidStepSize(h));
    }
    for (what, value) in [("x0", seed.x), ("y0", seed.y), ("x_end", x_end)] {
        if !value.is_finite() {
            return Err(IntegrationError::NonFinite { what, value });
        }
    }
    let needed = ((x_end - seed.x) / h).ceil();
    if needed > MAX_INTERVAL_STEPS as f64 {
        return Err(IntegrationError::TooManySteps {
            needed,
            limit: MAX_INTERVAL_STEPS,
        });
    }

    let mut trajectory = Trajectory::from_seed(seed);
    let tolerance = h * 1e-9;
    let mut x = seed.x;
    let mut y = seed.y;
    let mut steps = 0usize;
    while x_end - x > tolerance {
        let mut x_next = x;
        if stepper.step(field, &mut x_next, &mut y, h) == StepStatus::NonFinite {
            debug!(x, y, "non-finite step; ending interval integration early");
            break;
        }
        steps += 1;
        x = seed.x + steps as f64 * h;
        trajectory.push(Point::new(x, y));
    }
    Ok(trajectory)
}

/// Integrates from `seed` in `direction` for at most `config.max_steps` steps.
///
/// Stops, without emitting the offending point, as soon as a step leaves
/// `config.bounds` or produces a non-finite value. Never fails: an unusable
/// step size yields the seed alone.
pub fn integrate_box<S: Steppable>(
    field: &impl SlopeField,
    stepper: &mut S,
    seed: Point,
    direction: Direction,
    config: &IntegrationConfig,
) -> Trajectory {
    let mut trajectory = Trajectory::from_seed(seed);
    let h = direction.sign() * config.step_size;
    if !h.is_finite() || h == 0.0 || !seed.is_finite() {
        return trajectory;
    }

    let mut x = seed.x;
    let mut y = seed.y;
    for _ in 0..config.max_steps {
        let mut x_next = x;
        let mut y_next = y;
        if stepper.step(field, &mut x_next, &mut y_next, h) == StepStatus::NonFinite {
            break;
        }
        if !config.bounds.contains(x_next, y_next) {
            break;
        }
        x = x_next;
        y = y_next;
        trajectory.push(Point::new(x, y));
    }
    trajectory
}

/// Joins a backward and a forward run from the same seed into one path.
///
/// The backward run is reversed and loses its copy of the seed, so the seed
/// appears once, at index `backward.len() - 1`.
pub fn splice_bidirectional(backward: Trajectory, forward: Trajectory) -> Trajectory {
    let mut points = backward.into_points();
    points.reverse();
    points.pop();
    points.extend(forward.into_points());
    Trajectory { points }
}
