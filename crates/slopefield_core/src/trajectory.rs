use crate::integrator::{integrate_interval, Point, Trajectory};
use crate::session::SessionState;
use crate::slope::SlopeFunction;
use crate::solvers::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Parameters for a single solver-mode run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveRequest {
    pub equation: String,
    pub x0: f64,
    pub y0: f64,
    pub x_end: f64,
    pub step_size: f64,
    pub method: Method,
}

impl Default for SolveRequest {
    fn default() -> Self {
        Self {
            equation: "dy/dx = x + y".to_string(),
            x0: 0.0,
            y0: 1.0,
            x_end: 2.0,
            step_size: 0.1,
            method: Method::Rk4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Equation,
    InitialCondition,
    Method,
    Completion,
    Error,
}

/// One line of the step-by-step explanation shown next to a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionStep {
    pub index: usize,
    pub kind: StepKind,
    pub description: String,
    pub result_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub trajectory: Trajectory,
    pub steps: Vec<SolutionStep>,
}

impl Solution {
    fn failed(message: String) -> Self {
        Self {
            trajectory: Trajectory::empty(),
            steps: vec![SolutionStep {
                index: 1,
                kind: StepKind::Error,
                description: "Error".to_string(),
                result_text: message,
            }],
        }
    }

    /// The error message when the solve failed.
    pub fn error(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|step| step.kind == StepKind::Error)
            .map(|step| step.result_text.as_str())
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// The first `count` points, for tabular display.
    pub fn preview(&self, count: usize) -> &[Point] {
        let points = self.trajectory.points();
        &points[..count.min(points.len())]
    }
}

/// Solver-mode session: one forward integration at a time plus its explanation.
#[derive(Debug, Default)]
pub struct TrajectorySession {
    state: SessionState,
    equation: String,
    function: Option<SlopeFunction>,
    solution: Option<Solution>,
}

impl TrajectorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Runs `request`, replacing the stored solution.
    ///
    /// A blank equation leaves everything untouched and returns the previous
    /// solution. Compile failures and unusable numeric parameters produce a
    /// solution holding a single error step and no points.
    pub fn solve(&mut self, request: &SolveRequest) -> Option<&Solution> {
        if request.equation.trim().is_empty() {
            debug!("blank equation; keeping previous solution");
            return self.solution.as_ref();
        }
        let solution = self.run(request);
        self.solution = Some(solution);
        self.solution.as_ref()
    }

    fn run(&mut self, request: &SolveRequest) -> Solution {
        let function = match self.compile(&request.equation) {
            Ok(function) => function,
            Err(message) => return Solution::failed(message),
        };

        let seed = Point::new(request.x0, request.y0);
        let mut stepper = request.method.stepper();
        let trajectory = match integrate_interval(
            function,
            &mut stepper,
            seed,
            request.x_end,
            request.step_size,
        ) {
            Ok(trajectory) => trajectory,
            Err(err) => {
                warn!(%err, "rejected solve parameters");
                return Solution::failed(err.to_string());
            }
        };
        debug!(points = trajectory.len(), "solve finished");

        let steps = describe(request, function.expression(), &trajectory);
        Solution { trajectory, steps }
    }

    // Recompiles only when the equation text changed since the last success.
    fn compile(&mut self, equation: &str) -> Result<&SlopeFunction, String> {
        let reusable = self.state.is_ready() && self.equation == equation;
        if !reusable {
            self.equation = equation.to_string();
            let compiled = SlopeFunction::compile(equation);
            self.state = SessionState::from_compile(&compiled);
            match compiled {
                Ok(function) => self.function = Some(function),
                Err(err) => {
                    warn!(equation, %err, "equation failed to compile");
                    self.function = None;
                    return Err(err.to_string());
                }
            }
        }
        self.function
            .as_ref()
            .ok_or_else(|| "Equation has not been compiled".to_string())
    }
}

fn describe(
    request: &SolveRequest,
    expression: &str,
    trajectory: &Trajectory,
) -> Vec<SolutionStep> {
    let mut steps = Vec::with_capacity(4);
    let mut push = |kind, description: String, result_text: String| {
        let index = steps.len() + 1;
        steps.push(SolutionStep {
            index,
            kind,
            description,
            result_text,
        });
    };

    push(
        StepKind::Equation,
        "Parse the differential equation".to_string(),
        format!("dy/dx = {expression}"),
    );
    push(
        StepKind::InitialCondition,
        "Apply the initial condition".to_string(),
        format!(
            "y({}) = {}",
            format_number(request.x0),
            format_number(request.y0)
        ),
    );
    push(
        StepKind::Method,
        format!(
            "Integrate with the {} method (order {})",
            request.method.label(),
            request.method.order()
        ),
        format!(
            "h = {}, x from {} to {}",
            format_number(request.step_size),
            format_number(request.x0),
            format_number(request.x_end)
        ),
    );
    let completion = match trajectory.last() {
        Some(last) => format!(
            "{} points computed, y({}) ≈ {}",
            trajectory.len(),
            format_number(last.x),
            format_number(last.y)
        ),
        None => "0 points computed".to_string(),
    };
    push(
        StepKind::Completion,
        "Integration complete".to_string(),
        completion,
    );
    steps
}

/// Fixed six-decimal rendering with trailing zeros removed.
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.6}");
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
