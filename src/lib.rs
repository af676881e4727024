//! A post-processing filter for multi-tool 3D-printer G-code: it erects a
//! prime tower, schedules heater temperatures around tool changes, and
//! manages the part-cooling fan.
//!
//! The pipeline runs parser → validator → state analyser → prime-tower
//! planner → state analyser (re-run) → thermal planner → fan planner →
//! statistics rewrite → serializer, each stage owning one file in this
//! crate.

pub mod config;
pub mod error;
pub mod fan;
pub mod parser;
pub mod planner;
pub mod serializer;
pub mod state;
pub mod stats;
pub mod thermal;
pub mod token;
pub mod validator;

pub use error::PsppError;

/// The serialized G-code plus the totals that drove the output filename.
#[derive(Debug)]
pub struct ProcessOutput {
    pub text: String,
    pub total_runtime: f64,
}

/// Run the full pipeline over already-parsed input text. This is the single
/// entry point `main` drives; tests exercising end-to-end behavior call it
/// directly.
pub fn process(text: &str, config: &config::Config) -> Result<ProcessOutput, PsppError> {
    let mut seq = parser::parse(text)?;
    validator::validate_and_fix(&mut seq);
    state::analyze(&mut seq, config)?;
    planner::plan_prime_tower(&mut seq, config)?;
    let totals = state::analyze(&mut seq, config)?;
    thermal::plan_thermal(&mut seq, config)?;
    fan::plan_fan(&mut seq, config);
    stats::rewrite_statistics(&mut seq, config, &totals);
    Ok(ProcessOutput {
        text: serializer::serialize(&seq),
        total_runtime: totals.total_runtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn process_runs_end_to_end_on_a_minimal_print() {
        let text = ";;TC_TEMP_INITIALIZE\n;;AFTER_LAYER_CHANGE:0,0.2\nT0\n;;TOOL_BLOCK_START:0\n\
                    G1 X1 Y1 E1\n;;TOOL_BLOCK_END:0\n;;BEFORE_LAYER_CHANGE:0,0.2\n;;TC_TEMP_SHUTDOWN\n";
        let config = test_config();
        let out = process(text, &config).unwrap();
        assert!(out.text.contains("T0"));
        assert!(!out.text.is_empty());
    }

    #[test]
    fn process_surfaces_parse_errors() {
        let config = test_config();
        let err = process(";;NOT_A_REAL_MARKER\n", &config).unwrap_err();
        assert!(matches!(err, PsppError::Parse(_)));
    }
}
