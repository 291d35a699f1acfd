use anyhow::Result;
use jaby_core::config::JabyConfig;
use jaby_infrastructure::ConfigService;

pub fn show(service: &ConfigService, config: &JabyConfig) -> Result<()> {
    let path = service.config_path()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
