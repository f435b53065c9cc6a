//! Visualization-mode bindings: seeded curves and slope sampling.

use crate::to_js_error;
use js_sys::Float64Array;
use serde_wasm_bindgen::{from_value, to_value};
use slopefield_core::field::{CurveId, FieldSession};
use slopefield_core::integrator::{Bounds, IntegrationConfig};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmFieldSession {
    session: FieldSession,
}

#[wasm_bindgen]
impl WasmFieldSession {
    #[wasm_bindgen(constructor)]
    pub fn new(equation: &str) -> WasmFieldSession {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();
        WasmFieldSession {
            session: FieldSession::with_equation(equation, IntegrationConfig::default()),
        }
    }

    pub fn set_equation(&mut self, equation: &str) {
        self.session.set_equation(equation);
    }

    pub fn equation(&self) -> String {
        self.session.equation().to_string()
    }

    /// Message of the last failed compile; `undefined` while the equation is valid.
    pub fn compile_error(&self) -> Option<String> {
        self.session.state().error().map(|err| err.to_string())
    }

    pub fn set_bounds(
        &mut self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    ) -> Result<(), JsValue> {
        let mut config = *self.session.config();
        config.bounds = Bounds::new(x_min, x_max, y_min, y_max);
        self.session.set_config(config).map_err(to_js_error)
    }

    pub fn set_step(&mut self, step_size: f64, max_steps: u32) -> Result<(), JsValue> {
        let mut config = *self.session.config();
        config.step_size = step_size;
        config.max_steps = max_steps as usize;
        self.session.set_config(config).map_err(to_js_error)
    }

    /// Replaces the whole integration config from a `{ bounds, step_size, max_steps }` object.
    /// Missing fields take their defaults.
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: IntegrationConfig = from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid integration config: {e}")))?;
        self.session.set_config(config).map_err(to_js_error)
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(self.session.config())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }

    pub fn add_curve_at(&mut self, x: f64, y: f64) -> Result<CurveId, JsValue> {
        self.session.add_curve_at(x, y).map_err(to_js_error)
    }

    pub fn remove_curve(&mut self, id: CurveId) -> bool {
        self.session.remove_curve(id)
    }

    pub fn clear_curves(&mut self) {
        self.session.clear_curves();
    }

    pub fn curve_count(&self) -> usize {
        self.session.curves().len()
    }

    /// Summaries (`id`, `color_index`, `point_count`, `seed`) for the side list.
    pub fn curves(&self) -> Result<JsValue, JsValue> {
        to_value(&self.session.curve_summaries())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` for one curve.
    pub fn curve_points(&self, id: CurveId) -> Option<Float64Array> {
        self.curve_coordinates(id)
            .map(|coords| Float64Array::from(coords.as_slice()))
    }

    /// Interleaved `[x, y, slope, ...]` triples over the current bounds.
    pub fn sample_field(&self, density: u32) -> Float64Array {
        Float64Array::from(self.field_triples(density as usize).as_slice())
    }
}

impl WasmFieldSession {
    pub(crate) fn curve_coordinates(&self, id: CurveId) -> Option<Vec<f64>> {
        self.session
            .curve(id)
            .map(|curve| curve.trajectory.flatten())
    }

    pub(crate) fn field_triples(&self, density: usize) -> Vec<f64> {
        self.session
            .sample_field(density)
            .flat_map(|sample| [sample.x, sample.y, sample.slope])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_session_adds_and_removes_curves() {
        let mut session = WasmFieldSession::new("dy/dx = x - y");
        assert!(session.compile_error().is_none());

        let first = session.add_curve_at(0.0, 1.0).expect("curve");
        let second = session.add_curve_at(1.0, -1.0).expect("curve");
        assert!(second > first);
        assert_eq!(session.curve_count(), 2);

        let coords = session.curve_coordinates(first).expect("stored curve");
        assert_eq!(coords.len() % 2, 0);
        assert!(coords.len() >= 2);

        assert!(session.remove_curve(first));
        assert!(!session.remove_curve(first));
        assert!(session.curve_coordinates(first).is_none());
        session.clear_curves();
        assert_eq!(session.curve_count(), 0);
    }

    #[test]
    fn field_session_reports_compile_error_and_stays_usable() {
        let mut session = WasmFieldSession::new("dy/dx = x");
        session.set_equation("dy/dx = x +");
        assert_eq!(
            session.compile_error().as_deref(),
            Some("Unexpected end of expression")
        );
        assert_eq!(session.equation(), "dy/dx = x +");
        session.add_curve_at(0.0, 0.0).expect("zero-slope curve");
        let coords = session.curve_coordinates(1).expect("stored curve");
        assert!(coords.chunks(2).all(|p| p[1] == 0.0));
    }

    #[test]
    fn field_session_samples_current_bounds() {
        let mut session = WasmFieldSession::new("x + y");
        session
            .set_bounds(0.0, 2.0, 1.0, 3.0)
            .expect("bounds should be valid");
        let triples = session.field_triples(3);
        assert_eq!(triples.len(), 27);
        // Center node.
        assert_eq!(&triples[12..15], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn field_session_step_settings_limit_curve_length() {
        let mut session = WasmFieldSession::new("0");
        session.set_step(0.1, 5).expect("step should be valid");
        let id = session.add_curve_at(0.0, 0.0).expect("curve");
        let coords = session.curve_coordinates(id).expect("stored curve");
        assert_eq!(coords.len(), 2 * 11);
    }
}
