pub mod config;
pub mod serve;

use tr_simulation::SimConfig;

use crate::ConfigArgs;

/// Load the file named by `--config` (or the defaults), apply the flag
/// overrides and validate the result.
fn load_config(args: &ConfigArgs) -> Result<SimConfig, String> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path).map_err(|e| e.to_string())?,
        None => SimConfig::default(),
    };
    if let Some(mode) = args.mode {
        config = config.with_mode(mode);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}
