use crate::equation_engine::{compile_expression, Bytecode, CompileError, VM};
use crate::traits::SlopeField;
use std::cell::RefCell;
use std::fmt;
use tracing::debug;

/// Distance from zero under which a textual `/x` or `/y` divisor counts as singular.
pub const SINGULARITY_EPSILON: f64 = 1e-10;

/// Removes an optional leading `dy/dx =` marker.
///
/// Whitespace between the marker's pieces is free; the letters themselves are
/// matched case-sensitively. Input without the marker is returned trimmed.
pub fn strip_equation_marker(raw: &str) -> &str {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix("dy")
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('/'))
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix("dx"))
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('='));
    match rest {
        Some(body) => body.trim(),
        None => trimmed,
    }
}

/// Maps the alternative `**` power spelling onto the evaluator's `^`.
pub fn normalize_power_operator(expression: &str) -> String {
    expression.replace("**", "^")
}

/// Textual pole detection: `/x` or `/y` appearing verbatim in the expression.
///
/// This does not look at the parsed tree. `x^-1` is not caught, and `/xy`
/// (or `/ x` with a space) is treated literally. Kept deliberately simple so
/// slopes near the poles it does catch stay flat and predictable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingularityGuard {
    pub divides_by_x: bool,
    pub divides_by_y: bool,
}

impl SingularityGuard {
    pub fn scan(expression: &str) -> Self {
        Self {
            divides_by_x: expression.contains("/x"),
            divides_by_y: expression.contains("/y"),
        }
    }

    pub fn trips(&self, x: f64, y: f64) -> bool {
        (self.divides_by_x && x.abs() < SINGULARITY_EPSILON)
            || (self.divides_by_y && y.abs() < SINGULARITY_EPSILON)
    }
}

/// A compiled `f(x, y)`.
///
/// Evaluation never fails: singular points, evaluator faults and non-finite
/// results all come back as slope `0`. Use [`SlopeFunction::try_slope`] to see
/// non-finite values instead.
pub struct SlopeFunction {
    expression: String,
    // None is the zero function used as a compile-failure fallback.
    bytecode: Option<Bytecode>,
    guard: SingularityGuard,
    // Interior mutability for the VM stack to avoid allocation per evaluation.
    // This makes the function !Sync.
    stack: RefCell<Vec<f64>>,
}

impl SlopeFunction {
    /// Compiles a raw equation such as `dy/dx = x - y` (the marker is optional).
    pub fn compile(raw: &str) -> Result<Self, CompileError> {
        let expression = strip_equation_marker(raw);
        let guard = SingularityGuard::scan(expression);
        let bytecode = compile_expression(&normalize_power_operator(expression))?;
        debug!(expression, ops = bytecode.ops.len(), "compiled slope function");
        Ok(Self {
            expression: expression.to_string(),
            bytecode: Some(bytecode),
            guard,
            stack: RefCell::new(Vec::with_capacity(32)),
        })
    }

    /// The function `f(x, y) = 0`.
    pub fn zero() -> Self {
        Self {
            expression: "0".to_string(),
            bytecode: None,
            guard: SingularityGuard::default(),
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Compiles `raw`, falling back to [`SlopeFunction::zero`] on failure.
    /// The error, if any, is handed back so callers can report it.
    pub fn compile_or_zero(raw: &str) -> (Self, Option<CompileError>) {
        match Self::compile(raw) {
            Ok(function) => (function, None),
            Err(err) => (Self::zero(), Some(err)),
        }
    }

    /// The expression body, without the `dy/dx =` marker.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_zero_fallback(&self) -> bool {
        self.bytecode.is_none()
    }

    pub fn guard(&self) -> SingularityGuard {
        self.guard
    }

    /// Evaluates without mapping non-finite results, returning `None` for them.
    /// The singularity guard still applies and yields `Some(0.0)`.
    pub fn try_slope(&self, x: f64, y: f64) -> Option<f64> {
        if self.guard.trips(x, y) {
            return Some(0.0);
        }
        let value = match &self.bytecode {
            Some(code) => VM::execute(code, x, y, &mut self.stack.borrow_mut()),
            None => 0.0,
        };
        value.is_finite().then_some(value)
    }
}

impl SlopeField for SlopeFunction {
    fn slope(&self, x: f64, y: f64) -> f64 {
        self.try_slope(x, y).unwrap_or(0.0)
    }
}

impl Clone for SlopeFunction {
    fn clone(&self) -> Self {
        Self {
            expression: self.expression.clone(),
            bytecode: self.bytecode.clone(),
            guard: self.guard,
            stack: RefCell::new(Vec::with_capacity(32)),
        }
    }
}

impl fmt::Debug for SlopeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlopeFunction")
            .field("expression", &self.expression)
            .field("zero_fallback", &self.is_zero_fallback())
            .field("guard", &self.guard)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_marker_with_flexible_whitespace() {
        assert_eq!(strip_equation_marker("dy/dx = x + y"), "x + y");
        assert_eq!(strip_equation_marker("  dy / dx=x*y "), "x*y");
        assert_eq!(strip_equation_marker("dy/dx   =   -x"), "-x");
        assert_eq!(strip_equation_marker("x - y"), "x - y");
    }

    #[test]
    fn marker_is_case_sensitive() {
        // Not stripped, so the body fails to compile as an expression.
        assert_eq!(strip_equation_marker("DY/DX = x"), "DY/DX = x");
        assert!(SlopeFunction::compile("DY/DX = x").is_err());
    }

    #[test]
    fn accepts_double_star_power() {
        let f = SlopeFunction::compile("dy/dx = x**2").expect("should compile");
        assert_eq!(f.slope(3.0, 0.0), 9.0);
        let g = SlopeFunction::compile("dy/dx = x^2").expect("should compile");
        assert_eq!(g.slope(3.0, 0.0), 9.0);
    }

    #[test]
    fn singular_divisor_returns_zero_slope() {
        let f = SlopeFunction::compile("dy/dx = y/x").expect("should compile");
        assert_eq!(f.slope(0.0, 1.0), 0.0);
        assert_eq!(f.slope(5e-11, 1.0), 0.0);
        assert_eq!(f.try_slope(0.0, 1.0), Some(0.0));
        assert_eq!(f.slope(2.0, 1.0), 0.5);
    }

    #[test]
    fn guard_is_textual_only() {
        let spaced = SlopeFunction::compile("dy/dx = 1 / x").expect("should compile");
        assert!(!spaced.guard().divides_by_x);
        // Not guarded, so the infinite result is zeroed by the finite check instead.
        assert_eq!(spaced.slope(0.0, 0.0), 0.0);
        assert_eq!(spaced.try_slope(0.0, 0.0), None);
    }

    #[test]
    fn non_finite_results_map_to_zero() {
        let f = SlopeFunction::compile("sqrt(x)").expect("should compile");
        assert_eq!(f.slope(-4.0, 0.0), 0.0);
        assert_eq!(f.try_slope(-4.0, 0.0), None);
        assert_eq!(f.slope(4.0, 0.0), 2.0);
    }

    #[test]
    fn compile_or_zero_falls_back_on_error() {
        let (f, err) = SlopeFunction::compile_or_zero("dy/dx = x +");
        assert_eq!(err, Some(CompileError::UnexpectedEnd));
        assert!(f.is_zero_fallback());
        assert_eq!(f.slope(1.0, 2.0), 0.0);
        assert_eq!(f.try_slope(1.0, 2.0), Some(0.0));
    }

    #[test]
    fn deeply_nested_equation_degrades_to_zero() {
        let (f, err) = SlopeFunction::compile_or_zero(&format!("{}x", "-".repeat(200_000)));
        assert!(matches!(err, Some(CompileError::TooDeep(_))));
        assert!(f.is_zero_fallback());
        assert_eq!(f.slope(1.0, 1.0), 0.0);
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let a = SlopeFunction::compile("dy/dx = sin(x) * y - x^2").expect("should compile");
        let b = SlopeFunction::compile("dy/dx = sin(x) * y - x^2").expect("should compile");
        for i in -10..=10 {
            let x = i as f64 * 0.37;
            let y = 1.0 - i as f64 * 0.21;
            assert_eq!(a.slope(x, y).to_bits(), b.slope(x, y).to_bits());
        }
    }

    #[test]
    fn clone_evaluates_independently() {
        let f = SlopeFunction::compile("x + y").expect("should compile");
        let g = f.clone();
        assert_eq!(f.slope(1.0, 2.0), g.slope(1.0, 2.0));
        assert_eq!(g.expression(), "x + y");
    }
}
