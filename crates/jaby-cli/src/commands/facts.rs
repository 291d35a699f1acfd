use anyhow::Result;
use jaby_core::config::JabyConfig;
use jaby_core::repository::FactRepository;
use jaby_infrastructure::{DirFactRepository, JabyPaths};

/// Prints the fact records stored for `user_id` as pretty JSON.
pub async fn show(config: &JabyConfig, user_id: &str) -> Result<()> {
    let data_dir = JabyPaths::resolve_data_dir(config.storage.data_dir.as_deref())?;
    let repository = DirFactRepository::new(&data_dir);
    let records = repository.load_facts(user_id).await?;

    if records.is_empty() {
        eprintln!("No facts stored for {}", user_id);
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
