//! The prime-tower planner: layer pass, tool-status classification, optional
//! layer merging, band/brim geometry, and move-in/move-out splice injection.
//! Grounded in the original's `PrimeTower` class.

pub mod geometry;
pub mod layer;

use std::collections::HashSet;

use crate::config::Config;
use crate::error::PlannerError;
use crate::token::{TokenId, TokenSequence};
use layer::{build_layers, classify_tool_status, LayerInfo, ToolChangeInfo};

/// Run the full prime-tower pass: build layers, classify tool status,
/// optionally merge compatible layers, then splice band/brim geometry at
/// the computed injection points.
pub fn plan_prime_tower(seq: &mut TokenSequence, config: &Config) -> Result<(), PlannerError> {
    let mut layers = build_layers(seq, config)?;
    classify_tool_status(&mut layers);
    if config.optimize_layers {
        merge_layers(&mut layers, config);
    }
    inject_bands(seq, &layers, config);
    Ok(())
}

/// Consecutive-layer merging. Iterates forward; a successful merge
/// does not advance the cursor (the merged layer may absorb its new
/// neighbour too). A layer with only one active tool is where merging stops
/// altogether — "only one tower column is growing" from that point on.
fn merge_layers(layers: &mut Vec<LayerInfo>, config: &Config) {
    let mut i = 0;
    while i + 1 < layers.len() {
        if layers[i].tools_active.len() <= 1 {
            break;
        }
        if can_merge(&layers[i], &layers[i + 1], config) {
            let next = layers.remove(i + 1);
            absorb(&mut layers[i], next);
        } else {
            i += 1;
        }
    }
    classify_tool_status(layers);
}

fn can_merge(p: &LayerInfo, n: &LayerInfo, config: &Config) -> bool {
    let p_last = p.tools_sequence.last().map(|t| t.tool_id);
    let n_first = n.tools_sequence.first().map(|t| t.tool_id);
    if p_last.is_none() || p_last != n_first {
        return false;
    }

    let p_others: HashSet<i32> = p
        .tools_active
        .iter()
        .copied()
        .filter(|t| Some(*t) != p_last)
        .collect();
    let n_others: HashSet<i32> = n
        .tools_active
        .iter()
        .copied()
        .filter(|t| Some(*t) != n_first)
        .collect();
    if !p_others.is_disjoint(&n_others) {
        return false;
    }

    let combined_height = p.layer_height + n.layer_height;
    let active_union: HashSet<i32> = p.tools_active.union(&n.tools_active).copied().collect();
    match config.intersected_layer_height_range(active_union) {
        Some((min, max)) => combined_height >= min - 1e-9 && combined_height <= max + 1e-9,
        None => false,
    }
}

fn absorb(p: &mut LayerInfo, mut n: LayerInfo) {
    if !n.tool_change_seq.is_empty() {
        n.tool_change_seq.remove(0);
    }
    p.tool_change_seq.extend(n.tool_change_seq);

    if !n.tools_sequence.is_empty() {
        n.tools_sequence.remove(0);
    }
    p.tools_sequence.extend(n.tools_sequence);

    p.layer_z = n.layer_z;
    p.layer_height += n.layer_height;
    p.layer_end = n.layer_end;
}

/// One tool's band/brim splice: where (`anchor`), which tool, and whether
/// it also carries the layer's idle-tool infill.
struct Injection {
    anchor: TokenId,
    tool: i32,
    carries_idle: bool,
}

/// Injection-point selection.
fn injection_plan(layer: &LayerInfo) -> Vec<Injection> {
    if layer.tools_active.len() == 1 && layer.tools_idle.is_empty() {
        return Vec::new();
    }

    let is_layer0 = layer.layer_num == 0;
    let mut injections = Vec::new();

    if is_layer0 {
        let reals: Vec<&ToolChangeInfo> = layer
            .tools_sequence
            .iter()
            .filter(|t| t.tool_id >= 0)
            .collect();
        if let Some((first, rest)) = reals.split_first() {
            injections.push(Injection {
                anchor: layer.layer_start,
                tool: first.tool_id,
                carries_idle: true,
            });
            for t in rest {
                if let Some(bs) = t.block_start {
                    injections.push(Injection {
                        anchor: bs,
                        tool: t.tool_id,
                        carries_idle: false,
                    });
                }
            }
        }
    } else if layer.tool_change_seq.is_empty() {
        if let Some(end) = layer.layer_end {
            let tool = layer
                .tools_sequence
                .last()
                .map(|t| t.tool_id)
                .unwrap_or(-1);
            if tool >= 0 {
                injections.push(Injection {
                    anchor: end,
                    tool,
                    carries_idle: true,
                });
            }
        }
    } else {
        for (idx, t) in layer.tool_change_seq.iter().enumerate() {
            let anchor = if idx == 0 { t.block_end } else { t.block_start };
            if let Some(a) = anchor {
                injections.push(Injection {
                    anchor: a,
                    tool: t.tool_id,
                    carries_idle: idx == 0,
                });
            }
        }
    }

    injections
}

fn inject_bands(seq: &mut TokenSequence, layers: &[LayerInfo], config: &Config) {
    for layer in layers {
        for injection in injection_plan(layer) {
            splice_injection(seq, layer, config, &injection);
        }
    }
}

/// Concentric base radius for `tool`'s own rings, offset outward from the
/// tower's configured base radius so distinct tools' bands do not overlap.
fn tool_base_radius(config: &Config, tool: i32) -> f64 {
    let i = tool as usize;
    config.prime_tower_r + tool as f64 * (config.band_width + 2.0 * config.nozzle_diameter[i])
}

fn radii_for(layer: &LayerInfo, config: &Config, tool: i32) -> Vec<f64> {
    let i = tool as usize;
    let base = tool_base_radius(config, tool);
    if layer.layer_num == 0 {
        let mut radii = geometry::brim_radii(base, config.nozzle_diameter[i], config.band_brim_width);
        radii.extend(geometry::band_radii(base, config.nozzle_diameter[i], config.band_width));
        radii
    } else {
        geometry::band_radii(base, config.nozzle_diameter[i], config.band_width)
    }
}

/// Splice one injection: a single move-in performed by the injection's own
/// tool, one or more rings (the tool's own band, plus any idle tools' bands
/// the chosen tool prints on their behalf), then one move-out.
fn splice_injection(seq: &mut TokenSequence, layer: &LayerInfo, config: &Config, injection: &Injection) {
    if injection.tool < 0 {
        return;
    }

    let mut tools = vec![injection.tool];
    if injection.carries_idle {
        let mut idle: Vec<i32> = layer.tools_idle.iter().copied().collect();
        idle.sort_unstable();
        tools.extend(idle);
    }

    let anchor_post = seq.get(injection.anchor).post_state.clone().unwrap_or_default();

    let mut tokens = geometry::move_in(layer.layer_z, &anchor_post, config, injection.tool);
    for &tool in &tools {
        let radii = radii_for(layer, config, tool);
        tokens.extend(geometry::band_tokens(layer, config, tool, &radii));
    }
    tokens.extend(geometry::move_out(&anchor_post, layer.layer_z, config, injection.tool));

    seq.insert_many_after(injection.anchor, tokens);
}
