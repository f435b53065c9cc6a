use crate::traits::{SlopeField, StepStatus, Steppable};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Clone, Default)]
pub struct RK4 {
    stages: [f64; 4],
}

impl RK4 {
    pub fn new() -> Self {
        Self::default()
    }

    /// The increments `k1..k4` (already scaled by `h`) of the most recent step.
    pub fn stages(&self) -> [f64; 4] {
        self.stages
    }
}

impl Steppable for RK4 {
    fn step(&mut self, field: &impl SlopeField, x: &mut f64, y: &mut f64, h: f64) -> StepStatus {
        let x0 = *x;
        let y0 = *y;

        // k1 = h f(x, y)
        let k1 = h * field.slope(x0, y0);
        // k2 = h f(x + h/2, y + k1/2)
        let k2 = h * field.slope(x0 + 0.5 * h, y0 + 0.5 * k1);
        // k3 = h f(x + h/2, y + k2/2)
        let k3 = h * field.slope(x0 + 0.5 * h, y0 + 0.5 * k2);
        // k4 = h f(x + h, y + k3)
        let k4 = h * field.slope(x0 + h, y0 + k3);
        self.stages = [k1, k2, k3, k4];

        if !self.stages.iter().all(|k| k.is_finite()) {
            return StepStatus::NonFinite;
        }

        // y_next = y + (k1 + 2k2 + 2k3 + k4) / 6
        let y_next = y0 + (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0;
        let x_next = x0 + h;
        commit(x, y, x_next, y_next)
    }
}

/// Heun's method (improved Euler), second order.
#[derive(Debug, Clone, Default)]
pub struct Heun;

impl Steppable for Heun {
    fn step(&mut self, field: &impl SlopeField, x: &mut f64, y: &mut f64, h: f64) -> StepStatus {
        let k1 = h * field.slope(*x, *y);
        let k2 = h * field.slope(*x + h, *y + k1);
        if !k1.is_finite() || !k2.is_finite() {
            return StepStatus::NonFinite;
        }
        let y_next = *y + 0.5 * (k1 + k2);
        commit(x, y, *x + h, y_next)
    }
}

/// Forward Euler, first order.
#[derive(Debug, Clone, Default)]
pub struct Euler;

impl Steppable for Euler {
    fn step(&mut self, field: &impl SlopeField, x: &mut f64, y: &mut f64, h: f64) -> StepStatus {
        let k1 = h * field.slope(*x, *y);
        if !k1.is_finite() {
            return StepStatus::NonFinite;
        }
        commit(x, y, *x + h, *y + k1)
    }
}

fn commit(x: &mut f64, y: &mut f64, x_next: f64, y_next: f64) -> StepStatus {
    if !x_next.is_finite() || !y_next.is_finite() {
        return StepStatus::NonFinite;
    }
    *x = x_next;
    *y = y_next;
    StepStatus::Accepted
}

/// Fixed-step method selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    Rk4,
    Heun,
    Euler,
}

impl Method {
    pub fn stepper(self) -> Stepper {
        match self {
            Method::Rk4 => Stepper::Rk4(RK4::new()),
            Method::Heun => Stepper::Heun(Heun),
            Method::Euler => Stepper::Euler(Euler),
        }
    }

    /// Human-readable method name.
    pub fn label(self) -> &'static str {
        match self {
            Method::Rk4 => "classical Runge-Kutta (RK4)",
            Method::Heun => "Heun (improved Euler)",
            Method::Euler => "forward Euler",
        }
    }

    pub fn order(self) -> u32 {
        match self {
            Method::Rk4 => 4,
            Method::Heun => 2,
            Method::Euler => 1,
        }
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rk4" => Ok(Method::Rk4),
            "heun" => Ok(Method::Heun),
            "euler" => Ok(Method::Euler),
            other => bail!("Unknown method: {other}"),
        }
    }
}

/// Runtime-selected stepper.
pub enum Stepper {
    Rk4(RK4),
    Heun(Heun),
    Euler(Euler),
}

impl Steppable for Stepper {
    fn step(&mut self, field: &impl SlopeField, x: &mut f64, y: &mut f64, h: f64) -> StepStatus {
        match self {
            Stepper::Rk4(s) => s.step(field, x, y, h),
            Stepper::Heun(s) => s.step(field, x, y, h),
            Stepper::Euler(s) => s.step(field, x, y, h),
        }
    }
}
