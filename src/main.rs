//! Command-line driver: read a sliced G-code file, run it through the
//! post-processing pipeline, and write the result next to the input.
//!
//! Grounded in the original `tcpspp.py::main()`'s orchestration order and in
//! the corpus's `tracing_subscriber::fmt` + `EnvFilter` logging setup.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use toolchanger_pspp::config::Config;
use toolchanger_pspp::PsppError;

/// Post-process sliced multi-tool G-code: erect a prime tower, schedule
/// heater temperatures, and manage the part-cooling fan.
#[derive(Parser, Debug)]
#[command(name = "toolchanger-pspp", version, about)]
struct Cli {
    /// Sliced G-code file to post-process, in place.
    input: PathBuf,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(&cli.input) {
        Ok(written_to) => {
            info!(path = %written_to.display(), "wrote post-processed G-code");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(input: &PathBuf) -> Result<PathBuf, PsppError> {
    let config = Config::from_env()?;
    let text = std::fs::read_to_string(input)?;
    let output = toolchanger_pspp::process(&text, &config)?;
    let out_path = output_path(input, &config, output.total_runtime);
    std::fs::write(&out_path, output.text)?;
    Ok(out_path)
}

/// Derives the output filename by tagging the input stem with every
/// configured tool's filament type and the total print time, mirroring the
/// original's `{stem}_{tool_filament_names}_{total_runtime_str}.gcode`.
/// The original tags only a layer's active-or-idle tool set; lacking a
/// per-layer view here, every configured tool is tagged instead.
fn output_path(input: &PathBuf, config: &Config, total_runtime: f64) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let tag = tool_filament_tag(config);
    let runtime = toolchanger_pspp::stats::format_runtime(total_runtime);
    input.with_file_name(format!("{stem}_{tag}_{runtime}.gcode"))
}

fn tool_filament_tag(config: &Config) -> String {
    (0..config.num_tools())
        .map(|i| format!("T{i}-{}", config.filament_type[i]))
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_filaments(filament_type: Vec<&str>) -> Config {
        let n = filament_type.len();
        Config {
            layer0_temp: vec![215.0; n],
            layer_n_temp: vec![210.0; n],
            disable_fan_first_layers: vec![1; n],
            max_fan_speed: vec![1.0; n],
            nozzle_diameter: vec![0.4; n],
            filament_diameter: vec![1.75; n],
            extrusion_multiplier: vec![1.0; n],
            min_layer_height: vec![0.1; n],
            max_layer_height: vec![0.3; n],
            filament_type: filament_type.into_iter().map(String::from).collect(),
            filament_density: vec![1.24; n],
            retract_firmware: true,
            retract_length: vec![0.8; n],
            retract_speed: vec![35.0; n],
            retract_zhop: vec![0.0; n],
            retract_length_toolchange: vec![0.0; n],
            relative_e_distances: true,
            bed_temp_layer0: vec![60.0; n],
            bed_temp_layern: vec![55.0; n],
            corexy: false,
            motor_speed_xy: 12000.0,
            motor_speed_z: 600.0,
            extruder_speed: vec![3000.0; n],
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

    #[test]
    fn output_path_tags_stem_with_filament_types_and_runtime() {
        let config = config_with_filaments(vec!["PLA", "PLA", "PLA"]);
        let path = output_path(&PathBuf::from("/tmp/part.gcode"), &config, 65.0);
        assert_eq!(
            path,
            PathBuf::from("/tmp/part_T0-PLA_T1-PLA_T2-PLA_0h1m5s.gcode")
        );
    }
}
