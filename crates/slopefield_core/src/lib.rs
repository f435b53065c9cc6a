pub mod equation_engine;
pub mod field;
pub mod integrator;
pub mod session;
pub mod slope;
pub mod solvers;
pub mod trajectory;
/// The `slopefield_core` crate is the numerical engine behind slope field exploration
/// of first-order ODEs `dy/dx = f(x, y)`.
///
/// Key components:
/// - **Traits**: `SlopeField` (anything that yields a slope at `(x, y)`), `Steppable` (fixed-step solvers).
/// - **Equation Engine**: tokenizer, parser and a small bytecode VM bound to `x` and `y`.
/// - **Slope**: `SlopeFunction`, the compiled, never-failing `f(x, y)`.
/// - **Solvers**: fixed-step explicit steppers (RK4, Heun, Euler).
/// - **Integrator**: bounded-interval and bounded-box trajectory generation.
/// - **Sessions**: `TrajectorySession` (single solve with derivation steps) and
///   `FieldSession` (seeded solution curves and grid sampling).
pub mod traits;

pub use field::{sample_field, FieldError, FieldSample, FieldSession, SolutionCurve};
pub use integrator::{Bounds, Direction, IntegrationConfig, Point, Trajectory};
pub use session::SessionState;
pub use slope::SlopeFunction;
pub use solvers::Method;
pub use trajectory::{Solution, SolutionStep, SolveRequest, StepKind, TrajectorySession};
