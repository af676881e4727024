//! The configuration record, assembled from `SLIC3R_*` environment
//! variables. Per-tool fields are lists indexed by tool id; global fields
//! are scalars. This is the one place in the crate that touches the
//! environment — everything downstream receives an already-validated,
//! read-only [`Config`], matching the teacher's `PostProcessorConfig`
//! pattern of a single validated record handed to every stage.

use crate::error::ConfigError;

/// Per-tool and global settings driving every planner.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub layer0_temp: Vec<f64>,
    pub layer_n_temp: Vec<f64>,
    pub disable_fan_first_layers: Vec<i64>,
    /// Rescaled to `0..1` at load time (the raw slicer value is `0..255`).
    pub max_fan_speed: Vec<f64>,
    pub nozzle_diameter: Vec<f64>,
    pub filament_diameter: Vec<f64>,
    pub extrusion_multiplier: Vec<f64>,
    pub min_layer_height: Vec<f64>,
    pub max_layer_height: Vec<f64>,
    pub filament_type: Vec<String>,
    pub filament_density: Vec<f64>,

    pub retract_firmware: bool,
    pub retract_length: Vec<f64>,
    pub retract_speed: Vec<f64>,
    pub retract_zhop: Vec<f64>,
    pub retract_length_toolchange: Vec<f64>,

    pub relative_e_distances: bool,

    pub bed_temp_layer0: Vec<f64>,
    pub bed_temp_layern: Vec<f64>,

    pub corexy: bool,
    pub motor_speed_xy: f64,
    pub motor_speed_z: f64,
    pub extruder_speed: Vec<f64>,

    pub prime_tower_x: f64,
    pub prime_tower_y: f64,
    pub prime_tower_r: f64,
    pub band_width: f64,
    pub band_num_faces: u32,
    pub band_brim_width: f64,
    pub optimize_layers: bool,

    pub tool_change_runtime: f64,
    pub idle_delta: f64,
    pub heating_rate: f64,
    pub cooling_rate: f64,

    pub wipe_tower_enabled: bool,

    /// Feed rate used for prime-tower move-in/move-out travel. Read from
    /// `SLIC3R_prime_tower_move_speed` alongside the rest of the tower
    /// geometry fields.
    pub prime_tower_move_speed: f64,
}

impl Config {
    pub fn num_tools(&self) -> usize {
        self.layer0_temp.len()
    }

    /// Per-tool printable layer-height range.
    pub fn layer_height_range(&self, tool: i32) -> (f64, f64) {
        let i = tool as usize;
        (self.min_layer_height[i], self.max_layer_height[i])
    }

    /// Intersection of the printable ranges of every tool in `tools`.
    /// Returns `None` if `tools` is empty.
    pub fn intersected_layer_height_range(
        &self,
        tools: impl IntoIterator<Item = i32>,
    ) -> Option<(f64, f64)> {
        let mut acc: Option<(f64, f64)> = None;
        for tool in tools {
            let (min, max) = self.layer_height_range(tool);
            acc = Some(match acc {
                None => (min, max),
                Some((amin, amax)) => (amin.max(min), amax.min(max)),
            });
        }
        acc
    }

    /// The XY motor speed ceiling, CoreXY-adjusted: `√2·v` when `corexy` is
    /// set, the plain single-motor speed otherwise. Always an upper bound —
    /// under-estimating would start heating too late.
    pub fn xy_speed_limit(&self) -> f64 {
        if self.corexy {
            std::f64::consts::SQRT_2 * self.motor_speed_xy
        } else {
            self.motor_speed_xy
        }
    }

    pub fn extruder_speed(&self, tool: i32) -> f64 {
        self.extruder_speed[tool as usize]
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.retract_firmware && !self.relative_e_distances {
            return Err(ConfigError::RetractionAndEDistancesBothDisabled);
        }
        if self.wipe_tower_enabled {
            return Err(ConfigError::WipeTowerEnabled);
        }
        for (tool, &length) in self.retract_length_toolchange.iter().enumerate() {
            if length != 0.0 {
                return Err(ConfigError::NonZeroToolChangeRetraction {
                    tool: tool as i32,
                    length,
                });
            }
        }
        Ok(())
    }

    /// Build a [`Config`] from `SLIC3R_*` environment variables, then
    /// validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            layer0_temp: env_f64_list("SLIC3R_layer0_temp")?,
            layer_n_temp: env_f64_list("SLIC3R_layer_n_temp")?,
            disable_fan_first_layers: env_i64_list("SLIC3R_disable_fan_first_layers")?,
            max_fan_speed: env_f64_list("SLIC3R_max_fan_speed")?
                .into_iter()
                .map(|v| v / 255.0)
                .collect(),
            nozzle_diameter: env_f64_list("SLIC3R_nozzle_diameter")?,
            filament_diameter: env_f64_list("SLIC3R_filament_diameter")?,
            extrusion_multiplier: env_f64_list("SLIC3R_extrusion_multiplier")?,
            min_layer_height: env_f64_list("SLIC3R_min_layer_height")?,
            max_layer_height: env_f64_list("SLIC3R_max_layer_height")?,
            filament_type: env_str_list("SLIC3R_filament_type")?,
            filament_density: env_f64_list("SLIC3R_filament_density")?,

            retract_firmware: env_bool("SLIC3R_retract_firmware")?,
            retract_length: env_f64_list("SLIC3R_retract_length")?,
            retract_speed: env_f64_list("SLIC3R_retract_speed")?,
            retract_zhop: env_f64_list("SLIC3R_retract_zhop")?,
            retract_length_toolchange: env_f64_list("SLIC3R_retract_length_toolchange")?,

            relative_e_distances: env_bool("SLIC3R_relative_e_distances")?,

            bed_temp_layer0: env_f64_list("SLIC3R_bed_temp_layer0")?,
            bed_temp_layern: env_f64_list("SLIC3R_bed_temp_layern")?,

            corexy: env_bool("SLIC3R_corexy")?,
            motor_speed_xy: env_f64("SLIC3R_motor_speed_xy")?,
            motor_speed_z: env_f64("SLIC3R_motor_speed_z")?,
            extruder_speed: env_f64_list("SLIC3R_extruder_speed")?,

            prime_tower_x: env_f64("SLIC3R_prime_tower_x")?,
            prime_tower_y: env_f64("SLIC3R_prime_tower_y")?,
            prime_tower_r: env_f64("SLIC3R_prime_tower_r")?,
            band_width: env_f64("SLIC3R_band_width")?,
            band_num_faces: env_f64("SLIC3R_band_num_faces")? as u32,
            band_brim_width: env_f64("SLIC3R_band_brim_width")?,
            optimize_layers: env_bool("SLIC3R_optimize_layers")?,

            tool_change_runtime: env_f64("SLIC3R_tool_change_runtime")?,
            idle_delta: env_f64("SLIC3R_idle_delta")?,
            heating_rate: env_f64("SLIC3R_heating_rate")?,
            cooling_rate: env_f64("SLIC3R_cooling_rate")?,

            wipe_tower_enabled: env_bool("SLIC3R_wipe_tower")?,
            prime_tower_move_speed: env_f64("SLIC3R_prime_tower_move_speed")?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_raw(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar {
        name: name.to_string(),
    })
}

/// Splits on comma or semicolon, transparently — the slicer is not
/// consistent about which it emits for a per-tool list.
fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_f64(name: &str) -> Result<f64, ConfigError> {
    let raw = env_raw(name)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::BadValue {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn env_bool(name: &str) -> Result<bool, ConfigError> {
    let raw = env_raw(name)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::BadValue {
            name: name.to_string(),
            value: raw,
            reason: "expected a boolean (1/0/true/false/yes/no)".to_string(),
        }),
    }
}

fn env_f64_list(name: &str) -> Result<Vec<f64>, ConfigError> {
    let raw = env_raw(name)?;
    split_list(&raw)
        .into_iter()
        .map(|item| {
            item.parse::<f64>().map_err(|e| ConfigError::BadValue {
                name: name.to_string(),
                value: item.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn env_i64_list(name: &str) -> Result<Vec<i64>, ConfigError> {
    let raw = env_raw(name)?;
    split_list(&raw)
        .into_iter()
        .map(|item| {
            item.parse::<i64>().map_err(|e| ConfigError::BadValue {
                name: name.to_string(),
                value: item.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn env_str_list(name: &str) -> Result<Vec<String>, ConfigError> {
    let raw = env_raw(name)?;
    Ok(split_list(&raw))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        layer0_temp: vec![215.0, 215.0, 215.0],
        layer_n_temp: vec![210.0, 210.0, 210.0],
        disable_fan_first_layers: vec![1, 1, 1],
        max_fan_speed: vec![1.0, 1.0, 1.0],
        nozzle_diameter: vec![0.4, 0.4, 0.4],
        filament_diameter: vec![1.75, 1.75, 1.75],
        extrusion_multiplier: vec![1.0, 1.0, 1.0],
        min_layer_height: vec![0.1, 0.1, 0.1],
        max_layer_height: vec![0.3, 0.3, 0.3],
        filament_type: vec!["PLA".to_string(), "PLA".to_string(), "PLA".to_string()],
        filament_density: vec![1.24, 1.24, 1.24],
        retract_firmware: true,
        retract_length: vec![0.8, 0.8, 0.8],
        retract_speed: vec![35.0, 35.0, 35.0],
        retract_zhop: vec![0.0, 0.0, 0.0],
        retract_length_toolchange: vec![0.0, 0.0, 0.0],
        relative_e_distances: true,
        bed_temp_layer0: vec![60.0, 60.0, 60.0],
        bed_temp_layern: vec![55.0, 55.0, 55.0],
        corexy: false,
        motor_speed_xy: 12000.0,
        motor_speed_z: 600.0,
        extruder_speed: vec![3000.0, 3000.0, 3000.0],
        prime_tower_x: 200.0,
        prime_tower_y: 200.0,
        prime_tower_r: 10.0,
        band_width: 0.6,
        band_num_faces: 12,
        band_brim_width: 4.0,
        optimize_layers: true,
        tool_change_runtime: 5.0,
        idle_delta: 20.0,
        heating_rate: 1.5,
        cooling_rate: 0.8,
        wipe_tower_enabled: false,
        prime_tower_move_speed: 6000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_accepts_comma_and_semicolon() {
        assert_eq!(split_list("1,2,3"), vec!["1", "2", "3"]);
        assert_eq!(split_list("1;2;3"), vec!["1", "2", "3"]);
        assert_eq!(split_list(" 1 , 2 "), vec!["1", "2"]);
    }

    #[test]
    fn validate_rejects_no_firmware_retract_and_no_relative_e() {
        let mut cfg = test_config();
        cfg.retract_firmware = false;
        cfg.relative_e_distances = false;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::RetractionAndEDistancesBothDisabled)
        ));
    }

    #[test]
    fn validate_accepts_firmware_retract_without_relative_e() {
        let mut cfg = test_config();
        cfg.retract_firmware = true;
        cfg.relative_e_distances = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_wipe_tower_enabled() {
        let mut cfg = test_config();
        cfg.wipe_tower_enabled = true;
        assert!(matches!(cfg.validate(), Err(ConfigError::WipeTowerEnabled)));
    }

    #[test]
    fn validate_rejects_nonzero_toolchange_retraction() {
        let mut cfg = test_config();
        cfg.retract_length_toolchange = vec![0.0, 0.2, 0.0];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonZeroToolChangeRetraction { tool: 1, .. })
        ));
    }

    #[test]
    fn xy_speed_limit_scales_by_sqrt2_for_corexy() {
        let mut cfg = test_config();
        cfg.motor_speed_xy = 100.0;
        cfg.corexy = false;
        assert_eq!(cfg.xy_speed_limit(), 100.0);
        cfg.corexy = true;
        assert!((cfg.xy_speed_limit() - 141.421_356).abs() < 1e-3);
    }

    #[test]
    fn intersected_layer_height_range_narrows_across_tools() {
        let mut cfg = test_config();
        cfg.min_layer_height = vec![0.1, 0.15, 0.05];
        cfg.max_layer_height = vec![0.3, 0.25, 0.4];
        assert_eq!(cfg.intersected_layer_height_range([0, 1]), Some((0.15, 0.25)));
        assert_eq!(cfg.intersected_layer_height_range([]), None);
    }
}
