//! WASM bridge exposing the slopefield sessions to a JavaScript renderer.

mod field;
mod solver;

pub use field::WasmFieldSession;
pub use solver::WasmTrajectorySession;

use std::fmt::Display;
use wasm_bindgen::prelude::*;

pub(crate) fn to_js_error(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
