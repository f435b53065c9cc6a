//! Solver-mode bindings: one trajectory plus its derivation steps.

use crate::to_js_error;
use js_sys::Float64Array;
use serde_wasm_bindgen::{from_value, to_value};
use slopefield_core::solvers::Method;
use slopefield_core::trajectory::{SolveRequest, TrajectorySession};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmTrajectorySession {
    session: TrajectorySession,
}

impl Default for WasmTrajectorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmTrajectorySession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmTrajectorySession {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();
        WasmTrajectorySession {
            session: TrajectorySession::new(),
        }
    }

    /// Solves a `{ equation, x0, y0, x_end, step_size, method }` request and
    /// returns the full solution, or `null` for a blank equation with no prior result.
    pub fn solve(&mut self, request: JsValue) -> Result<JsValue, JsValue> {
        let request: SolveRequest = from_value(request)
            .map_err(|e| JsValue::from_str(&format!("Invalid solve request: {e}")))?;
        match self.session.solve(&request) {
            Some(solution) => to_value(solution)
                .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}"))),
            None => Ok(JsValue::NULL),
        }
    }

    /// Positional variant of `solve`. Returns whether a solution is available.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_equation(
        &mut self,
        equation: &str,
        x0: f64,
        y0: f64,
        x_end: f64,
        step_size: f64,
        method: &str,
    ) -> Result<bool, JsValue> {
        let method: Method = method.parse().map_err(to_js_error)?;
        let request = SolveRequest {
            equation: equation.to_string(),
            x0,
            y0,
            x_end,
            step_size,
            method,
        };
        Ok(self.session.solve(&request).is_some())
    }

    /// Message of the terminal error step, if the last solve failed.
    pub fn error(&self) -> Option<String> {
        self.session
            .solution()
            .and_then(|solution| solution.error())
            .map(str::to_string)
    }

    pub fn point_count(&self) -> usize {
        self.session
            .solution()
            .map_or(0, |solution| solution.trajectory.len())
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` of the whole trajectory.
    pub fn points(&self) -> Float64Array {
        Float64Array::from(self.coordinates(usize::MAX).as_slice())
    }

    /// Interleaved coordinates of the first `count` points.
    pub fn preview_points(&self, count: u32) -> Float64Array {
        Float64Array::from(self.coordinates(count as usize).as_slice())
    }

    pub fn steps(&self) -> Result<JsValue, JsValue> {
        let steps = self
            .session
            .solution()
            .map(|solution| solution.steps.as_slice())
            .unwrap_or_default();
        to_value(steps).map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }
}

impl WasmTrajectorySession {
    pub(crate) fn coordinates(&self, count: usize) -> Vec<f64> {
        self.session
            .solution()
            .map(|solution| {
                solution
                    .preview(count)
                    .iter()
                    .flat_map(|p| [p.x, p.y])
                    .collect()
            })
            .unwrap_or_default()
    }
}
