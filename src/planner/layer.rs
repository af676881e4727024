//! Layer and tool-change records, and the layer-building / tool-status
//! passes, grounded in the original's `tool_change_plan.py` and
//! `PrimeTower.analyze_gcode`/`analyze_tool_status`.

use std::collections::HashSet;

use crate::error::PlannerError;
use crate::token::{ParamsLabel, TokenId, TokenKind, TokenSequence};

/// One tool's activation within a layer: where it was selected and where its
/// print block starts/ends, if bracketed by markers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolChangeInfo {
    pub tool_id: i32,
    pub tool_change: Option<TokenId>,
    pub block_start: Option<TokenId>,
    pub block_end: Option<TokenId>,
}

impl ToolChangeInfo {
    fn carried_over(tool_id: i32) -> Self {
        Self {
            tool_id,
            tool_change: None,
            block_start: None,
            block_end: None,
        }
    }
}

/// One layer's view over the token stream. Rebuilt fresh by every planner
/// pass that needs it — it is a view, not an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub layer_num: i64,
    pub layer_z: f64,
    pub layer_height: f64,
    pub tool_change_seq: Vec<ToolChangeInfo>,
    pub tools_sequence: Vec<ToolChangeInfo>,
    pub tools_active: HashSet<i32>,
    pub tools_idle: HashSet<i32>,
    pub tools_disabled: HashSet<i32>,
    pub layer_start: TokenId,
    pub layer_end: Option<TokenId>,
}

/// Walk the analysed sequence and build one [`LayerInfo`] per
/// `AFTER_LAYER_CHANGE`/`BEFORE_LAYER_CHANGE` pair.
pub fn build_layers(
    seq: &TokenSequence,
    config: &crate::config::Config,
) -> Result<Vec<LayerInfo>, PlannerError> {
    let mut layers = Vec::new();
    let mut current: Option<LayerInfo> = None;
    let mut current_tool: Option<ToolChangeInfo> = None;
    let mut last_layer_z = 0.0;

    for id in seq.iter_ids() {
        let token = seq.get(id);
        match &token.kind {
            TokenKind::Params(p) if p.label == ParamsLabel::AfterLayerChange => {
                let layer_num = p.layer_num().unwrap();
                let layer_z = p.layer_z().unwrap();
                let layer_height = layer_z - last_layer_z;
                last_layer_z = layer_z;
                let seed = current_tool
                    .clone()
                    .unwrap_or_else(|| ToolChangeInfo::carried_over(-1));
                current = Some(LayerInfo {
                    layer_num,
                    layer_z,
                    layer_height,
                    tool_change_seq: Vec::new(),
                    tools_sequence: vec![seed],
                    tools_active: HashSet::new(),
                    tools_idle: HashSet::new(),
                    tools_disabled: HashSet::new(),
                    layer_start: id,
                    layer_end: None,
                });
            }
            TokenKind::Params(p) if p.label == ParamsLabel::BeforeLayerChange => {
                if let Some(mut layer) = current.take() {
                    layer.layer_end = Some(id);
                    let active_tools: HashSet<i32> = layer
                        .tools_sequence
                        .iter()
                        .map(|t| t.tool_id)
                        .filter(|&t| t >= 0)
                        .collect();
                    if let Some((min, max)) =
                        config.intersected_layer_height_range(active_tools.iter().copied())
                    {
                        if layer.layer_height > max + 1e-9 {
                            return Err(PlannerError::LayerHeightOutOfRange {
                                layer_num: layer.layer_num,
                                height: layer.layer_height,
                                min,
                                max,
                            });
                        }
                    }
                    layers.push(layer);
                }
            }
            TokenKind::ToolChange(tc) if tc.next_tool >= 0 => {
                let info = ToolChangeInfo {
                    tool_id: tc.next_tool,
                    tool_change: Some(id),
                    block_start: None,
                    block_end: None,
                };
                if let Some(layer) = current.as_mut() {
                    layer.tool_change_seq.push(info.clone());
                    layer.tools_sequence.push(info.clone());
                }
                current_tool = Some(info);
            }
            TokenKind::Params(p) if p.label == ParamsLabel::ToolBlockStart => {
                let marker_tool = p.tool_id().unwrap();
                bind_block(&mut current_tool, &mut current, marker_tool, id, true);
            }
            TokenKind::Params(p) if p.label == ParamsLabel::ToolBlockEnd => {
                let marker_tool = p.tool_id().unwrap();
                bind_block(&mut current_tool, &mut current, marker_tool, id, false);
            }
            _ => {}
        }
    }

    Ok(layers)
}

/// Binds a `TOOL_BLOCK_START`/`TOOL_BLOCK_END` marker to the tool currently
/// selected. The state analyser already rejects a mismatched marker tool
/// before this pass ever runs, so `tool.tool_id != marker_tool` can't happen
/// here; this only records the binding.
fn bind_block(
    current_tool: &mut Option<ToolChangeInfo>,
    current_layer: &mut Option<LayerInfo>,
    marker_tool: i32,
    id: TokenId,
    is_start: bool,
) {
    let Some(tool) = current_tool.as_mut() else {
        return;
    };
    if is_start {
        tool.block_start = Some(id);
    } else {
        tool.block_end = Some(id);
    }
    if let Some(layer) = current_layer.as_mut() {
        if let Some(found) = layer
            .tool_change_seq
            .iter_mut()
            .rev()
            .find(|t| t.tool_id == marker_tool)
        {
            if is_start {
                found.block_start = Some(id);
            } else {
                found.block_end = Some(id);
            }
        }
        if let Some(found) = layer
            .tools_sequence
            .iter_mut()
            .rev()
            .find(|t| t.tool_id == marker_tool)
        {
            if is_start {
                found.block_start = Some(id);
            } else {
                found.block_end = Some(id);
            }
        }
    }
}

/// Forward pass fills `tools_active`; backward pass fills
/// `tools_idle`/`tools_disabled`.
pub fn classify_tool_status(layers: &mut [LayerInfo]) {
    // `tools_sequence` already starts with the tool carried in from the
    // previous layer (seeded in `build_layers`), so a layer's active set is
    // simply every distinct tool named in its own sequence — not a running
    // union across all layers seen so far.
    for layer in layers.iter_mut() {
        layer.tools_active = layer
            .tools_sequence
            .iter()
            .map(|t| t.tool_id)
            .filter(|&t| t >= 0)
            .collect();
    }

    let mut next_idle: HashSet<i32> = HashSet::new();
    let mut next_active: HashSet<i32> = HashSet::new();
    let mut next_disabled: HashSet<i32> = HashSet::new();
    for layer in layers.iter_mut().rev() {
        let idle: HashSet<i32> = next_idle
            .union(&next_active)
            .copied()
            .collect::<HashSet<_>>()
            .difference(&layer.tools_active)
            .copied()
            .collect();
        let disabled: HashSet<i32> = next_disabled
            .difference(&layer.tools_active)
            .copied()
            .collect();
        layer.tools_idle = idle.clone();
        layer.tools_disabled = disabled.clone();
        next_idle = idle;
        next_active = layer.tools_active.clone();
        next_disabled = disabled;
    }

    // Last layer (processed first in the reverse walk): anything previously
    // enabled that isn't active there is disabled. Since the reverse walk
    // seeds `next_*` as empty, the last layer's own disabled set is empty by
    // construction; that matches "no layer after the last" to disable
    // anything into.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::parser::parse;
    use crate::state::analyze;

    fn build(text: &str) -> Vec<LayerInfo> {
        let mut seq = parse(text).unwrap();
        let config = test_config();
        analyze(&mut seq, &config).unwrap();
        build_layers(&seq, &config).unwrap()
    }

    #[test]
    fn single_layer_single_tool_is_active_only() {
        let mut layers = build(
            ";;AFTER_LAYER_CHANGE:0,0.2\nT0\nG1 X1 E1\n;;BEFORE_LAYER_CHANGE:0,0.2\n",
        );
        classify_tool_status(&mut layers);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].tools_active, [0].into_iter().collect());
        assert!(layers[0].tools_idle.is_empty());
    }

    #[test]
    fn tool_carries_across_layer_boundary() {
        let mut layers = build(
            ";;AFTER_LAYER_CHANGE:0,0.2\nT0\nG1 X1 E1\n;;BEFORE_LAYER_CHANGE:0,0.2\n\
             ;;AFTER_LAYER_CHANGE:1,0.4\nG1 X2 E1\n;;BEFORE_LAYER_CHANGE:1,0.4\n",
        );
        classify_tool_status(&mut layers);
        assert_eq!(layers[1].tools_sequence[0].tool_id, 0);
        assert_eq!(layers[1].tools_active, [0].into_iter().collect());
    }

    #[test]
    fn middle_tool_marked_idle_when_used_again_later() {
        // Layer 0 ends on T0 (T1 then T0); layer 1 makes no tool changes, so
        // it is printed entirely by the carried-in T0; layer 2 switches to
        // T1 again. T1 should be idle (not active) throughout layer 1.
        let mut layers = build(
            ";;AFTER_LAYER_CHANGE:0,0.2\nT1\nT0\n;;BEFORE_LAYER_CHANGE:0,0.2\n\
             ;;AFTER_LAYER_CHANGE:1,0.4\nG1 X1 E1\n;;BEFORE_LAYER_CHANGE:1,0.4\n\
             ;;AFTER_LAYER_CHANGE:2,0.6\nT1\n;;BEFORE_LAYER_CHANGE:2,0.6\n",
        );
        classify_tool_status(&mut layers);
        assert_eq!(layers[1].tools_active, [0].into_iter().collect());
        assert!(layers[1].tools_idle.contains(&1));
    }

    #[test]
    fn tool_block_mismatch_is_an_error() {
        let mut seq = parse("T0\n;;TOOL_BLOCK_START:1\n").unwrap();
        let config = test_config();
        let err = analyze(&mut seq, &config).unwrap_err();
        assert!(matches!(err, crate::error::StateError::ToolBlockMismatch { .. }));
    }
}
