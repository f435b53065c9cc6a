/// A scalar slope field: the right-hand side of `dy/dx = f(x, y)`.
pub trait SlopeField {
    /// Evaluates the slope at `(x, y)`.
    fn slope(&self, x: f64, y: f64) -> f64;
}

impl<F> SlopeField for F
where
    F: Fn(f64, f64) -> f64,
{
    fn slope(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// Result of a single fixed-size step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The state was advanced.
    Accepted,
    /// A stage or the updated state was non-finite; the state is untouched.
    NonFinite,
}

/// A trait for solvers that can step a slope field forward.
pub trait Steppable {
    /// Performs one step of size `h`.
    /// x: current abscissa (updated after an accepted step)
    /// y: current ordinate (updated after an accepted step)
    /// h: step size, negative to integrate backward
    fn step(&mut self, field: &impl SlopeField, x: &mut f64, y: &mut f64, h: f64) -> StepStatus;
}
