//! Error types for every stage of the post-processing pipeline.
//!
//! Each stage owns a narrow `thiserror` enum; [`PsppError`] aggregates them
//! at the driver boundary so `main` has a single type to match on and map to
//! an exit code.

/// Errors raised while tokenising the input stream.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: unrecognised marker label {label:?}")]
    UnknownLabel { line: usize, label: String },

    #[error("line {line}: marker {label:?} expects {expected} parameter(s), got {got}")]
    WrongArity {
        line: usize,
        label: String,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: could not parse parameter {value:?} for marker {label:?}")]
    BadParamValue {
        line: usize,
        label: String,
        value: String,
    },

    #[error("line {line}: malformed tool change {text:?}")]
    BadToolChange { line: usize, text: String },
}

/// Errors raised while assembling or validating the configuration record.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    MissingVar { name: String },

    #[error("could not parse environment variable {name}={value:?}: {reason}")]
    BadValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("firmware retraction is disabled and relative E distances are disabled; at least one must hold")]
    RetractionAndEDistancesBothDisabled,

    #[error("wipe tower is enabled in the slicer; this post-processor supplies its own prime tower")]
    WipeTowerEnabled,

    #[error("tool {tool} has non-zero per-tool-change retraction ({length}mm); this is not supported alongside the post-processed prime tower")]
    NonZeroToolChangeRetraction { tool: i32, length: f64 },
}

/// Errors raised while walking the shadow machine state, or by other passes
/// that observe the invariants it tracks.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("token #{seq}: firmware unretract (G11) while tool {tool} was not retracted")]
    UnretractWhileNotRetracted { seq: usize, tool: i32 },

    #[error("token #{seq}: firmware retract (G10) while tool {tool} was already retracted")]
    RetractWhileRetracted { seq: usize, tool: i32 },

    #[error("token #{seq}: TOOL_BLOCK_{which} references tool {marker_tool}, but the active tool is {active_tool:?}")]
    ToolBlockMismatch {
        seq: usize,
        which: &'static str,
        marker_tool: i32,
        active_tool: Option<i32>,
    },

    #[error("layer_num regressed at token #{seq}: saw {seen} after {previous}")]
    LayerNotMonotonic {
        seq: usize,
        seen: i64,
        previous: i64,
    },
}

/// Errors raised by the prime-tower, thermal, or fan planners.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("layer {layer_num} has height {height}, outside the printable range [{min},{max}] of its active toolset")]
    LayerHeightOutOfRange {
        layer_num: i64,
        height: f64,
        min: f64,
        max: f64,
    },

    #[error("required marker {marker} not found in the input")]
    MissingMarker { marker: &'static str },
}

/// Top-level error returned by the driver.
///
/// Each stage's error type converts into this one via `#[from]`, mirroring
/// how the teacher's `AppError` aggregates its own collaborators' errors.
#[derive(Debug, thiserror::Error)]
pub enum PsppError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for PsppError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_from_conversion() {
        let err: PsppError = ParseError::UnknownLabel {
            line: 4,
            label: "BOGUS".to_string(),
        }
        .into();
        assert!(matches!(err, PsppError::Parse(_)));
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingVar {
            name: "SLIC3R_layer0_temp".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing required environment variable SLIC3R_layer0_temp"
        );
    }

    #[test]
    fn io_error_wraps_as_string() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = PsppError::from(io_err);
        assert!(matches!(err, PsppError::Io(_)));
    }
}
