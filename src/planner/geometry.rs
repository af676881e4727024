//! Band/brim polygon geometry and move-in/move-out splicing, grounded in
//! the original's `PrimeTower.generate_pillar_bands` and
//! `PrimeTowerLayerInfo.inject_prime_tower_move_in/_out`.

use std::f64::consts::TAU;

use crate::config::Config;
use crate::state::MachineState;
use crate::token::{format_number, GCode, Token};

/// A single XY point of a band/brim polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// A closed regular polygon of `num_faces` edges at `radius` around
/// `(cx, cy)`. The starting vertex rotates by `layer_num mod num_faces`
/// face-widths so the seam travels between layers rather than stacking.
/// Returns `num_faces + 1` points, first == last.
pub fn polygon_vertices(cx: f64, cy: f64, radius: f64, num_faces: u32, layer_num: i64) -> Vec<Vertex> {
    let n = num_faces.max(3) as i64;
    let rotation = layer_num.rem_euclid(n);
    let start_angle = (rotation as f64 / n as f64) * TAU;
    (0..=n)
        .map(|i| {
            let angle = start_angle + (i as f64 / n as f64) * TAU;
            Vertex {
                x: cx + radius * angle.cos(),
                y: cy + radius * angle.sin(),
            }
        })
        .collect()
}

/// Radii of a tool's band, walking outward from the tower's base radius by
/// one nozzle radius per vertex: two steps per ring.
pub fn band_radii(base_r: f64, nozzle_diameter: f64, band_width: f64) -> Vec<f64> {
    let step = nozzle_diameter / 2.0;
    let steps = (band_width / step).round().max(1.0) as usize;
    (0..=steps).map(|i| base_r + i as f64 * step).collect()
}

/// Layer-0 brim radii: extends outward beyond the band's outer radius, then
/// tapers back inward toward a floor of `1.5 * nozzle_diameter` so the brim
/// does not collide with the tower's own base ring.
pub fn brim_radii(base_r: f64, nozzle_diameter: f64, brim_width: f64) -> Vec<f64> {
    let step = nozzle_diameter / 2.0;
    let outward_steps = (brim_width / step).round().max(1.0) as usize;
    let mut radii: Vec<f64> = (0..=outward_steps).map(|i| base_r + i as f64 * step).collect();

    let floor = 1.5 * nozzle_diameter;
    let mut r = base_r - step;
    while r > floor {
        radii.push(r);
        r -= step;
    }
    radii.push(floor);
    radii
}

/// Filament advance for one segment of length `length_mm`:
/// `A = (d-h)*h + pi*(h/2)^2`, advance `= A * L * 4 / (pi * D^2) * k`,
/// rounded to 5 decimal places.
pub fn extrusion_advance(
    nozzle_diameter: f64,
    layer_height: f64,
    filament_diameter: f64,
    extrusion_multiplier: f64,
    length_mm: f64,
) -> f64 {
    let area = (nozzle_diameter - layer_height) * layer_height
        + std::f64::consts::PI * (layer_height / 2.0).powi(2);
    let advance =
        area * length_mm * 4.0 / (std::f64::consts::PI * filament_diameter.powi(2)) * extrusion_multiplier;
    (advance * 1e5).round() / 1e5
}

fn segment_length(a: Vertex, b: Vertex) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Build the G-code for tracing one closed ring at `radius`, as a sequence
/// of `G1` moves accumulating extrusion. The first point is a travel move
/// (no `E`); every subsequent edge carries the computed advance.
fn ring_tokens(
    center: (f64, f64),
    radius: f64,
    layer: &crate::planner::layer::LayerInfo,
    config: &Config,
    tool: i32,
    travel_first: bool,
) -> Vec<Token> {
    let vertices = polygon_vertices(
        center.0,
        center.1,
        radius,
        config.band_num_faces,
        layer.layer_num,
    );
    let i = tool as usize;
    let mut tokens = Vec::new();

    for (idx, v) in vertices.iter().enumerate() {
        let mut g = GCode::new("G1");
        g.set_f64('X', v.x);
        g.set_f64('Y', v.y);
        if idx > 0 {
            let len = segment_length(vertices[idx - 1], *v);
            let advance = extrusion_advance(
                config.nozzle_diameter[i],
                layer.layer_height,
                config.filament_diameter[i],
                config.extrusion_multiplier[i],
                len,
            );
            g.set('E', format_number(advance));
        } else if !travel_first {
            continue;
        }
        tokens.push(g.into());
    }
    tokens
}

/// Build the full token run for one tool's band (or brim) at this layer:
/// one ring per radius in `radii`, innermost to outermost.
pub fn band_tokens(
    layer: &crate::planner::layer::LayerInfo,
    config: &Config,
    tool: i32,
    radii: &[f64],
) -> Vec<Token> {
    let center = (config.prime_tower_x, config.prime_tower_y);
    let mut tokens = Vec::new();
    for &r in radii {
        tokens.extend(ring_tokens(center, r, layer, config, tool, true));
    }
    tokens
}

/// Move-in: raise/lower Z to the target, unretract around the first XY
/// travel if not already retracted, set feed rate to the tower move speed.
pub fn move_in(target_z: f64, from: &MachineState, config: &Config, tool: i32) -> Vec<Token> {
    let mut tokens = Vec::new();
    let cur_z = from.z.unwrap_or(target_z);
    let moving_up = target_z > cur_z;

    if moving_up {
        tokens.push(
            GCode::new("G1")
                .with_param('Z', format_number(target_z))
                .with_param('F', format_number(config.motor_speed_z))
                .into(),
        );
    }

    let was_retracted = from.is_retracted(tool);
    if !was_retracted {
        tokens.push(retract_token(config, tool));
    }

    tokens.push(
        GCode::new("G1")
            .with_param('X', format_number(config.prime_tower_x))
            .with_param('Y', format_number(config.prime_tower_y))
            .with_param('F', format_number(config.prime_tower_move_speed))
            .into(),
    );

    if !was_retracted {
        tokens.push(unretract_token(config, tool));
    }

    if !moving_up {
        tokens.push(
            GCode::new("G1")
                .with_param('Z', format_number(target_z))
                .with_param('F', format_number(config.motor_speed_z))
                .into(),
        );
    }

    tokens
}

/// Move-out: retract, then restore X/Y/Z/feed-rate to the state the
/// injection point had before the splice. `current_z` is the Z the
/// machine is actually at (the band's layer Z, set by the matching
/// [`move_in`]), which need not equal `to.z` — the two Z moves mirror each
/// other's ordering.
pub fn move_out(to: &MachineState, current_z: f64, config: &Config, tool: i32) -> Vec<Token> {
    let mut tokens = Vec::new();
    let was_retracted = to.is_retracted(tool);
    if !was_retracted {
        tokens.push(retract_token(config, tool));
    }

    let target_z = to.z.unwrap_or(current_z);
    let moving_up = target_z > current_z;
    if moving_up {
        tokens.push(
            GCode::new("G1")
                .with_param('Z', format_number(target_z))
                .with_param('F', format_number(config.motor_speed_z))
                .into(),
        );
    }

    let mut restore = GCode::new("G1");
    if let Some(x) = to.x {
        restore.set_f64('X', x);
    }
    if let Some(y) = to.y {
        restore.set_f64('Y', y);
    }
    restore.set_f64('F', to.feed_rate.unwrap_or(config.prime_tower_move_speed));
    tokens.push(restore.into());

    if !moving_up {
        tokens.push(
            GCode::new("G1")
                .with_param('Z', format_number(target_z))
                .with_param('F', format_number(config.motor_speed_z))
                .into(),
        );
    }

    if !was_retracted {
        tokens.push(unretract_token(config, tool));
    }

    tokens
}

fn retract_token(config: &Config, tool: i32) -> Token {
    if config.retract_firmware {
        GCode::new("G10").into()
    } else {
        let i = tool as usize;
        GCode::new("G1")
            .with_param('E', format_number(-config.retract_length[i]))
            .with_param('F', format_number(config.retract_speed[i] * 60.0))
            .into()
    }
}

fn unretract_token(config: &Config, tool: i32) -> Token {
    if config.retract_firmware {
        GCode::new("G11").into()
    } else {
        let i = tool as usize;
        GCode::new("G1")
            .with_param('E', format_number(config.retract_length[i]))
            .with_param('F', format_number(config.retract_speed[i] * 60.0))
            .into()
    }
}
