//! Compiler configuration.

use serde::{Deserialize, Serialize};

/// Default threshold below which PTM entries and basis overlaps are treated
/// as zero when narrowing bases.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Options controlling [`Compiler`](crate::compiler::Compiler).
///
/// Can be loaded from any serde format; missing fields take their defaults.
///
/// ```rust
/// use ptmflow_ops::CompileOptions;
///
/// let opts: CompileOptions = serde_json::from_str(r#"{"optimize": false}"#).unwrap();
/// assert_eq!(opts, CompileOptions::reexpress());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Narrow intermediate bases and absorb blocks into later operations
    /// that cover them. When disabled the compiler only re-expresses and
    /// folds operations into the blocks that already contain them.
    pub optimize: bool,
    /// Magnitude below which a PTM row, column or basis overlap is zero.
    pub tolerance: f64,
}

impl CompileOptions {
    /// Options for pure basis re-expression, with optimization disabled.
    pub fn reexpress() -> Self {
        Self {
            optimize: false,
            ..Self::default()
        }
    }

    /// Enable or disable optimization.
    #[must_use]
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Set the zero threshold used when narrowing bases.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}
