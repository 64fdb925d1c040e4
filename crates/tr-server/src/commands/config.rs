use crate::ConfigArgs;

pub fn run(args: &ConfigArgs) -> Result<(), String> {
    let config = super::load_config(args)?;
    let json = serde_json::to_string_pretty(&config).map_err(|e| format!("JSON error: {e}"))?;
    println!("{json}");
    Ok(())
}
