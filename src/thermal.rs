//! The thermal planner: per-tool heating/cooling schedule built from the
//! activation sequence and the analyser's runtime estimates. Grounded in
//! the original's `TemperatureController`.

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::PlannerError;
use crate::token::{format_number, GCode, ParamsLabel, TokenId, TokenSequence};

/// One tool selection in stream order, with its print-block bounds if the
/// corresponding `TOOL_BLOCK_START`/`END` markers were found, and the layer
/// it falls on (needed to pick between `layer0_temp` and `layer_n_temp`).
struct Activation {
    tool: i32,
    tool_change: TokenId,
    block_start: Option<TokenId>,
    block_end: Option<TokenId>,
    layer_num: i64,
}

/// The target temperature for `tool` on `layer_num`: the layer-0 profile
/// only for the literal first layer, the steady-state profile everywhere
/// else.
fn target_temp(config: &Config, tool: i32, layer_num: i64) -> f64 {
    if layer_num == 0 {
        config.layer0_temp[tool as usize]
    } else {
        config.layer_n_temp[tool as usize]
    }
}

pub fn plan_thermal(seq: &mut TokenSequence, config: &Config) -> Result<(), PlannerError> {
    let init = find_params(seq, ParamsLabel::TcTempInitialize)
        .ok_or(PlannerError::MissingMarker { marker: "TC_TEMP_INITIALIZE" })?;
    let shutdown = find_params(seq, ParamsLabel::TcTempShutdown)
        .ok_or(PlannerError::MissingMarker { marker: "TC_TEMP_SHUTDOWN" })?;

    let activations = build_activation_sequence(seq);

    prologue(seq, config, init, &activations);
    between_activations(seq, config, &activations);
    epilogue(seq, config, shutdown, &activations);
    bed_temps(seq, config, init, &activations);

    Ok(())
}

fn find_params(seq: &TokenSequence, label: ParamsLabel) -> Option<TokenId> {
    seq.iter_ids().find(|&id| {
        matches!(seq.get(id).kind.as_params(), Some(p) if p.label == label)
    })
}

fn find_before_layer_change(seq: &TokenSequence, layer_num: i64) -> Option<TokenId> {
    seq.iter_ids().find(|&id| {
        matches!(
            seq.get(id).kind.as_params(),
            Some(p) if p.label == ParamsLabel::BeforeLayerChange && p.layer_num() == Some(layer_num)
        )
    })
}

fn build_activation_sequence(seq: &TokenSequence) -> Vec<Activation> {
    let mut activations: Vec<Activation> = Vec::new();
    let mut current: Option<usize> = None;
    let mut layer_num = 0i64;

    for id in seq.iter_ids() {
        let token = seq.get(id);
        match &token.kind {
            crate::token::TokenKind::Params(p) if p.label == ParamsLabel::AfterLayerChange => {
                layer_num = p.layer_num().unwrap_or(layer_num);
            }
            crate::token::TokenKind::ToolChange(tc) if tc.next_tool >= 0 => {
                activations.push(Activation {
                    tool: tc.next_tool,
                    tool_change: id,
                    block_start: None,
                    block_end: None,
                    layer_num,
                });
                current = Some(activations.len() - 1);
            }
            crate::token::TokenKind::Params(p) if p.label == ParamsLabel::ToolBlockStart => {
                if let Some(idx) = current {
                    if Some(activations[idx].tool) == p.tool_id() {
                        activations[idx].block_start = Some(id);
                    }
                }
            }
            crate::token::TokenKind::Params(p) if p.label == ParamsLabel::ToolBlockEnd => {
                if let Some(idx) = current {
                    if Some(activations[idx].tool) == p.tool_id() {
                        activations[idx].block_end = Some(id);
                    }
                }
            }
            _ => {}
        }
    }

    activations
}

/// Sum of token runtimes strictly between `from` and `to` (exclusive of
/// both endpoints).
fn runtime_between(seq: &TokenSequence, from: TokenId, to: TokenId) -> f64 {
    let mut total = 0.0;
    let mut cur = seq.next_of(from);
    while let Some(id) = cur {
        if id == to {
            break;
        }
        total += seq.get(id).runtime;
        cur = seq.next_of(id);
    }
    total
}

/// Walk backwards from `end`, accumulating runtime, until at least
/// `seconds` has been covered; return the token reached (insert *after* it).
fn walk_back_by(seq: &TokenSequence, end: TokenId, seconds: f64) -> TokenId {
    let mut acc = 0.0;
    let mut cur = end;
    while let Some(prev) = seq.prev_of(cur) {
        acc += seq.get(prev).runtime;
        cur = prev;
        if acc >= seconds {
            break;
        }
    }
    cur
}

fn set_temp_token(tool: i32, temp: f64) -> crate::token::Token {
    GCode::new("M104")
        .with_param('T', tool.to_string())
        .with_param('S', format_number(temp))
        .into()
}

fn wait_temp_token(tool: i32, temp: f64) -> crate::token::Token {
    GCode::new("M109")
        .with_param('T', tool.to_string())
        .with_param('S', format_number(temp))
        .into()
}

fn set_bed_token(temp: f64) -> crate::token::Token {
    GCode::new("M140").with_param('S', format_number(temp)).into()
}

fn wait_bed_token(temp: f64) -> crate::token::Token {
    GCode::new("M190").with_param('S', format_number(temp)).into()
}

/// Prologue: for each tool's *first* activation, decide between an
/// idle-then-ramp schedule and an immediate full-temperature schedule.
fn prologue(seq: &mut TokenSequence, config: &Config, init: TokenId, activations: &[Activation]) {
    let mut seen = HashSet::new();
    let mut at_init = Vec::new();

    for act in activations {
        if !seen.insert(act.tool) {
            continue;
        }
        let activation_anchor = act.block_start.unwrap_or(act.tool_change);
        let runtime_to_activation = runtime_between(seq, init, activation_anchor);
        let ta = target_temp(config, act.tool, act.layer_num);
        let standby_time = config.idle_delta / config.heating_rate;

        if standby_time < runtime_to_activation {
            at_init.push(set_temp_token(act.tool, ta - config.idle_delta));
            let ramp_point = walk_back_by(seq, activation_anchor, standby_time);
            seq.insert_after(ramp_point, set_temp_token(act.tool, ta));
            seq.insert_before(activation_anchor, wait_temp_token(act.tool, ta));
        } else {
            at_init.push(set_temp_token(act.tool, ta));
            seq.insert_before(activation_anchor, wait_temp_token(act.tool, ta));
        }
    }

    seq.insert_many_after(init, at_init);
}

/// Between activations: for every consecutive pair of the *same* tool's
/// activations, schedule a cool-then-reheat or an immediate collapse.
fn between_activations(seq: &mut TokenSequence, config: &Config, activations: &[Activation]) {
    let mut last_by_tool: HashMap<i32, (TokenId, i64)> = HashMap::new();

    for act in activations {
        let next_start = act.block_start.unwrap_or(act.tool_change);
        if let Some(&(prev_end, prev_layer_num)) = last_by_tool.get(&act.tool) {
            schedule_between(seq, config, act.tool, prev_end, prev_layer_num, next_start, act.layer_num);
        }
        let end = act.block_end.unwrap_or(act.tool_change);
        last_by_tool.insert(act.tool, (end, act.layer_num));
    }
}

fn schedule_between(
    seq: &mut TokenSequence,
    config: &Config,
    tool: i32,
    prev_end: TokenId,
    prev_layer_num: i64,
    next_start: TokenId,
    next_layer_num: i64,
) {
    let gap = runtime_between(seq, prev_end, next_start);
    let tp = target_temp(config, tool, prev_layer_num);
    let tn = target_temp(config, tool, next_layer_num);
    let delta = config.idle_delta;
    let ti = (tp + tn) / 2.0 - delta;
    let tc = (tp - ti) / config.cooling_rate;
    let th = (tn - ti) / config.heating_rate;

    if tc + th <= gap {
        seq.insert_after(prev_end, set_temp_token(tool, ti));
        let ramp_point = walk_back_by(seq, next_start, th);
        seq.insert_after(ramp_point, set_temp_token(tool, tn));
        seq.insert_before(next_start, wait_temp_token(tool, tn));
    } else {
        if tp != tn {
            seq.insert_after(prev_end, set_temp_token(tool, tn));
        }
        seq.insert_before(next_start, wait_temp_token(tool, tn));
    }
}

/// Epilogue: standby 0 at each tool's last `block_end`; standby 0 for
/// every used tool plus bed 0 at `TC_TEMP_SHUTDOWN`.
fn epilogue(seq: &mut TokenSequence, _config: &Config, shutdown: TokenId, activations: &[Activation]) {
    let mut last_block_end: HashMap<i32, TokenId> = HashMap::new();
    for act in activations {
        if let Some(be) = act.block_end {
            last_block_end.insert(act.tool, be);
        }
    }

    for (&tool, &be) in &last_block_end {
        seq.insert_after(be, set_temp_token(tool, 0.0));
    }

    let mut tools: Vec<i32> = last_block_end.keys().copied().collect();
    tools.sort_unstable();
    let mut at_shutdown: Vec<crate::token::Token> =
        tools.into_iter().map(|t| set_temp_token(t, 0.0)).collect();
    at_shutdown.push(set_bed_token(0.0));
    seq.insert_many_after(shutdown, at_shutdown);
}

/// Bed: layer-0 bed temp alongside the prologue; layer-1 bed temp at
/// the first `BEFORE_LAYER_CHANGE` with `layer_num == 1`.
fn bed_temps(seq: &mut TokenSequence, config: &Config, init: TokenId, activations: &[Activation]) {
    let first_tool = activations.first().map(|a| a.tool).unwrap_or(0) as usize;
    let bed0 = config.bed_temp_layer0[first_tool];
    seq.insert_after(init, set_bed_token(bed0));

    if let Some(anchor) = find_before_layer_change(seq, 1) {
        let bed1 = config.bed_temp_layern[first_tool];
        seq.insert_many_after(anchor, vec![set_bed_token(bed1), wait_bed_token(bed1)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::parser::parse;
    use crate::state::analyze;
    use crate::token::TokenKind;

    fn count_mnemonic(seq: &TokenSequence, mnemonic: &str) -> usize {
        seq.iter_ids()
            .filter(|&id| matches!(&seq.get(id).kind, TokenKind::GCode(g) if g.mnemonic == mnemonic))
            .count()
    }

    #[test]
    fn missing_initialize_marker_is_fatal() {
        let mut seq = parse(";;TC_TEMP_SHUTDOWN\n").unwrap();
        let config = test_config();
        analyze(&mut seq, &config).unwrap();
        let err = plan_thermal(&mut seq, &config).unwrap_err();
        assert!(matches!(err, PlannerError::MissingMarker { marker: "TC_TEMP_INITIALIZE" }));
    }

    #[test]
    fn single_tool_schedule_emits_wait_before_activation() {
        let mut seq = parse(
            ";;TC_TEMP_INITIALIZE\nT0\n;;TOOL_BLOCK_START:0\nG1 X1 E1\n;;TOOL_BLOCK_END:0\n;;TC_TEMP_SHUTDOWN\n",
        )
        .unwrap();
        let config = test_config();
        analyze(&mut seq, &config).unwrap();
        plan_thermal(&mut seq, &config).unwrap();
        assert!(count_mnemonic(&seq, "M109") >= 1);
        assert!(count_mnemonic(&seq, "M104") >= 1);
    }

    #[test]
    fn shutdown_sets_bed_to_zero() {
        let mut seq = parse(
            ";;TC_TEMP_INITIALIZE\nT0\n;;TOOL_BLOCK_START:0\nG1 X1 E1\n;;TOOL_BLOCK_END:0\n;;TC_TEMP_SHUTDOWN\n",
        )
        .unwrap();
        let config = test_config();
        analyze(&mut seq, &config).unwrap();
        plan_thermal(&mut seq, &config).unwrap();
        let shutdown = find_params(&seq, ParamsLabel::TcTempShutdown).unwrap();
        let next = seq.next_of(shutdown).unwrap();
        let mut found_bed_zero = false;
        let mut cur = Some(next);
        while let Some(id) = cur {
            if let TokenKind::GCode(g) = &seq.get(id).kind {
                if g.mnemonic == "M140" && g.get_f64('S') == Some(0.0) {
                    found_bed_zero = true;
                }
            }
            cur = seq.next_of(id);
        }
        assert!(found_bed_zero);
    }
}
