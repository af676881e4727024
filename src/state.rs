//! The shadow machine state and the state analyser's forward pass, grounded
//! in the original's `GCodeAnalyzer.State` and `analyze_state`.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::StateError;
use crate::token::{ParamsLabel, TokenKind, TokenSequence};

const RUNTIME_DEFAULT: f64 = 0.0;
const RUNTIME_RETRACT: f64 = 0.1;

/// A snapshot of the machine's interpreted state at a point in the token
/// stream. Cloned per token: every planner gets O(1) access to a pre/post
/// pair without re-walking the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineState {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub layer_num: Option<i64>,
    pub feed_rate: Option<f64>,
    pub tool_selected: Option<i32>,
    pub tool_extrusion: HashMap<i32, f64>,
    pub tool_retraction: HashMap<i32, f64>,
    pub e_relative: bool,
}

impl MachineState {
    pub fn new(e_relative: bool) -> Self {
        Self {
            e_relative,
            ..Default::default()
        }
    }

    /// Axis move speed for `axis`, clamped to the configured motor limit.
    /// `feed_rate` is in mm/min; the original compares against the same
    /// unit, so no conversion happens here.
    fn axis_speed(&self, axis_limit: f64) -> f64 {
        self.feed_rate.unwrap_or(0.0).min(axis_limit)
    }

    pub fn move_speed_x(&self, config: &Config) -> f64 {
        self.axis_speed(config.xy_speed_limit())
    }

    pub fn move_speed_y(&self, config: &Config) -> f64 {
        self.axis_speed(config.xy_speed_limit())
    }

    pub fn move_speed_z(&self, config: &Config) -> f64 {
        self.axis_speed(config.motor_speed_z)
    }

    pub fn extrude_speed(&self, config: &Config) -> f64 {
        let tool = self.tool_selected.unwrap_or(0);
        self.axis_speed(config.extruder_speed(tool))
    }

    pub fn is_retracted(&self, tool: i32) -> bool {
        self.tool_retraction.get(&tool).copied().unwrap_or(0.0) < 0.0
    }

    pub fn retraction(&self, tool: i32) -> f64 {
        self.tool_retraction.get(&tool).copied().unwrap_or(0.0)
    }

    /// Mark `tool` firmware-retracted. `distance` defaults to a negative
    /// sentinel when absent: any negative value signals retracted.
    pub fn mark_retracted(&mut self, tool: i32, distance: Option<f64>) {
        let d = distance.unwrap_or(-1.0);
        self.tool_retraction.insert(tool, -d.abs().max(1e-9));
    }

    pub fn mark_unretracted(&mut self, tool: i32) {
        self.tool_retraction.insert(tool, 0.0);
    }

    pub fn extrusion(&self, tool: i32) -> f64 {
        self.tool_extrusion.get(&tool).copied().unwrap_or(0.0)
    }
}

/// Side-channel totals published by a full analyser pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub total_runtime: f64,
    pub total_filament_usage: HashMap<i32, f64>,
}

/// Run the forward shadow-interpreter pass over every token, populating
/// `pre_state`/`post_state`/`runtime`/`seq`. Re-running this is the only way
/// to refresh these after a planner splices new tokens in.
pub fn analyze(seq: &mut TokenSequence, config: &Config) -> Result<AnalysisResult, StateError> {
    let mut state = MachineState::new(config.relative_e_distances);
    let mut state_stack: Vec<MachineState> = Vec::new();
    let mut result = AnalysisResult::default();
    let mut seq_no = 0usize;
    let mut last_layer_num: Option<i64> = None;

    let ids: Vec<_> = seq.iter_ids().collect();
    for id in ids {
        let pre = state.clone();
        let token = seq.get_mut(id);
        token.seq = Some(seq_no);
        token.pre_state = Some(pre.clone());

        let mut next_state = pre.clone();
        let runtime = step(&mut next_state, &mut state_stack, &token.kind, config, seq_no)?;

        if let TokenKind::Params(p) = &token.kind {
            if p.label == crate::token::ParamsLabel::AfterLayerChange {
                let layer_num = p.layer_num().unwrap();
                if let Some(prev) = last_layer_num {
                    if layer_num <= prev {
                        return Err(StateError::LayerNotMonotonic {
                            seq: seq_no,
                            seen: layer_num,
                            previous: prev,
                        });
                    }
                }
                last_layer_num = Some(layer_num);
            }
        }

        token.runtime = runtime;
        token.post_state = Some(next_state.clone());

        for (tool, extrusion) in &next_state.tool_extrusion {
            let prev = pre.tool_extrusion.get(tool).copied().unwrap_or(0.0);
            let delta = extrusion - prev;
            if delta != 0.0 {
                *result.total_filament_usage.entry(*tool).or_insert(0.0) += delta;
            }
        }

        result.total_runtime += runtime;
        state = next_state;
        seq_no += 1;
    }

    Ok(result)
}

fn step(
    state: &mut MachineState,
    state_stack: &mut Vec<MachineState>,
    kind: &TokenKind,
    config: &Config,
    seq_no: usize,
) -> Result<f64, StateError> {
    match kind {
        TokenKind::ToolChange(tc) => {
            if tc.next_tool >= 0 {
                state.tool_selected = Some(tc.next_tool);
                state.tool_extrusion.entry(tc.next_tool).or_insert(0.0);
            } else {
                state.tool_selected = None;
            }
            Ok(config.tool_change_runtime)
        }
        TokenKind::GCode(g) => step_gcode(state, state_stack, g, config, seq_no),
        TokenKind::Params(p) => {
            match p.label {
                ParamsLabel::AfterLayerChange => {
                    state.layer_num = p.layer_num();
                }
                ParamsLabel::ToolBlockStart | ParamsLabel::ToolBlockEnd => {
                    let marker_tool = p.tool_id().unwrap_or(-1);
                    if state.tool_selected != Some(marker_tool) {
                        return Err(StateError::ToolBlockMismatch {
                            seq: seq_no,
                            which: if p.label == ParamsLabel::ToolBlockStart {
                                "START"
                            } else {
                                "END"
                            },
                            marker_tool,
                            active_tool: state.tool_selected,
                        });
                    }
                }
                _ => {}
            }
            Ok(RUNTIME_DEFAULT)
        }
        TokenKind::Comment(_) => Ok(RUNTIME_DEFAULT),
    }
}

fn step_gcode(
    state: &mut MachineState,
    state_stack: &mut Vec<MachineState>,
    g: &crate::token::GCode,
    config: &Config,
    seq_no: usize,
) -> Result<f64, StateError> {
    match g.mnemonic.as_str() {
        "G10" if g.params.is_empty() => {
            let tool = state.tool_selected.unwrap_or(0);
            if state.is_retracted(tool) {
                return Err(StateError::RetractWhileRetracted { seq: seq_no, tool });
            }
            state.mark_retracted(tool, None);
            Ok(RUNTIME_RETRACT)
        }
        "G11" => {
            let tool = state.tool_selected.unwrap_or(0);
            if !state.is_retracted(tool) {
                return Err(StateError::UnretractWhileNotRetracted { seq: seq_no, tool });
            }
            state.mark_unretracted(tool);
            Ok(RUNTIME_RETRACT)
        }
        "M120" => {
            state_stack.push(state.clone());
            Ok(0.0)
        }
        "M121" => {
            if let Some(popped) = state_stack.pop() {
                *state = popped;
            }
            Ok(0.0)
        }
        "G1" | "G0" => Ok(step_move(state, g, config)),
        _ => Ok(RUNTIME_DEFAULT),
    }
}

fn step_move(state: &mut MachineState, g: &crate::token::GCode, config: &Config) -> f64 {
    let pre_feed = state.feed_rate.unwrap_or(0.0);
    if let Some(f) = g.get_f64('F') {
        state.feed_rate = Some(f);
    }
    let post_feed = state.feed_rate.unwrap_or(0.0);

    let mut times: Vec<f64> = Vec::new();

    let axes: [(char, fn(&MachineState) -> Option<f64>, fn(&mut MachineState, f64), f64); 3] = [
        ('X', |s| s.x, |s, v| s.x = Some(v), config.xy_speed_limit()),
        ('Y', |s| s.y, |s, v| s.y = Some(v), config.xy_speed_limit()),
        ('Z', |s| s.z, |s, v| s.z = Some(v), config.motor_speed_z),
    ];

    for (letter, get, set, limit) in axes {
        if let Some(value) = g.get_f64(letter) {
            let pre = get(state).unwrap_or(value);
            let delta = (value - pre).abs();
            set(state, value);
            let v_pre = pre_feed.min(limit);
            let v_post = post_feed.min(limit);
            if delta > 0.0 && v_pre + v_post > 0.0 {
                times.push(delta * 120.0 / (v_pre + v_post));
            }
        }
    }

    if let Some(e) = g.get_f64('E') {
        let tool = state.tool_selected.unwrap_or(0);
        let extr_limit = config.extruder_speed(tool);
        let v_pre = pre_feed.min(extr_limit);
        let v_post = post_feed.min(extr_limit);
        let prev = state.extrusion(tool);
        let new_value = if state.e_relative { prev + e } else { e };
        let delta = (new_value - prev).abs();
        state.tool_extrusion.insert(tool, new_value);
        if delta > 0.0 && v_pre + v_post > 0.0 {
            times.push(delta * 120.0 / (v_pre + v_post));
        }
    }

    times.into_iter().fold(0.0, f64::max)
}
