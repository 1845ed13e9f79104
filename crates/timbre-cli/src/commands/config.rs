use anyhow::{Context, Result};
use timbre_etl::{config, Config};
use toml_edit::{value, DocumentMut};

const STRING_KEYS: &[&str] = &[
    "object_store_endpoint",
    "object_store_region",
    "access_key_id",
    "secret_access_key",
    "bucket_name",
    "music_dir",
    "catalog_key",
    "catalog_path",
    "checkpoint_path",
    "output_path",
];

const INTEGER_KEYS: &[&str] = &[
    "canonical_sample_rate",
    "embedding_width",
    "retrieval_retries",
    "shuffle_seed",
];

fn valid_keys() -> String {
    STRING_KEYS
        .iter()
        .chain(INTEGER_KEYS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn or_unset(value: Option<String>) -> String {
    value.unwrap_or_else(|| String::from("<not set>"))
}

fn masked(value: Option<&String>) -> &'static str {
    if value.is_some() { "<set>" } else { "<not set>" }
}

/// Show the current effective configuration.
pub fn show_config(config: &Config) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  object_store_endpoint: {}", or_unset(config.object_store_endpoint.clone()));
    println!("  object_store_region: {}", config.object_store_region);
    println!("  access_key_id: {}", masked(config.access_key_id.as_ref()));
    println!("  secret_access_key: {}", masked(config.secret_access_key.as_ref()));
    println!("  bucket_name: {}", or_unset(config.bucket_name.clone()));
    println!(
        "  music_dir: {}",
        or_unset(config.music_dir.as_ref().map(|p| p.display().to_string()))
    );
    println!("  catalog: {}", config.catalog_source());
    println!("  checkpoint_path: {}", config.checkpoint_path.display());
    println!("  output_path: {}", config.output_path.display());
    println!("  canonical_sample_rate: {}", config.canonical_sample_rate);
    println!("  embedding_width: {}", config.embedding_width);
    println!("  retrieval_retries: {}", config.retrieval_retries);
    println!("  shuffle_seed: {}", or_unset(config.shuffle_seed.map(|s| s.to_string())));
    println!("  logging.level: {:?}", config.logging.level());
    println!("  logging.coloured: {}", config.logging.coloured());
    println!("  logging.output: {:?}", config.logging.output());

    println!("\nPriority: CLI args > ENV vars (TIMBRE_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value, or the whole file.
pub fn get_config(config: &Config, key: Option<String>) -> Result<()> {
    let Some(key) = key else {
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            print!("{contents}");
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'timbre config init' to create it.");
        }
        return Ok(());
    };

    let shown = match key.as_str() {
        "object_store_endpoint" => or_unset(config.object_store_endpoint.clone()),
        "object_store_region" => config.object_store_region.clone(),
        "access_key_id" => masked(config.access_key_id.as_ref()).to_string(),
        "secret_access_key" => masked(config.secret_access_key.as_ref()).to_string(),
        "bucket_name" => or_unset(config.bucket_name.clone()),
        "music_dir" => or_unset(config.music_dir.as_ref().map(|p| p.display().to_string())),
        "catalog_key" => config.catalog_key.clone(),
        "catalog_path" => {
            or_unset(config.catalog_path.as_ref().map(|p| p.display().to_string()))
        }
        "checkpoint_path" => config.checkpoint_path.display().to_string(),
        "output_path" => config.output_path.display().to_string(),
        "canonical_sample_rate" => config.canonical_sample_rate.to_string(),
        "embedding_width" => config.embedding_width.to_string(),
        "retrieval_retries" => config.retrieval_retries.to_string(),
        "shuffle_seed" => or_unset(config.shuffle_seed.map(|s| s.to_string())),
        _ => anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys()),
    };
    println!("{shown}");

    Ok(())
}

/// Set a config value, keeping the rest of the file (comments included) intact.
pub fn set_config(key: &str, new_value: &str) -> Result<()> {
    let config_path = config::config_file_path();
    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path)
        .context("Failed to read config file")?;
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Config file is not valid TOML")?;

    if STRING_KEYS.contains(&key) {
        doc[key] = value(new_value);
    } else if INTEGER_KEYS.contains(&key) {
        let number: i64 = new_value
            .parse()
            .with_context(|| format!("{key} expects an integer, got {new_value:?}"))?;
        if number < 0 {
            anyhow::bail!("{key} must not be negative");
        }
        doc[key] = value(number);
    } else {
        anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys());
    }

    std::fs::write(&config_path, doc.to_string())
        .context("Failed to write config file")?;

    println!("✓ Updated {key} = {new_value}");
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to point timbre at your bucket or music directory.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_accepts_edits() {
        let mut doc = config::example_config().parse::<DocumentMut>().unwrap();
        doc["bucket_name"] = value("tracks");
        doc["retrieval_retries"] = value(3_i64);

        let text = doc.to_string();
        assert!(text.contains("bucket_name = \"tracks\""));
        assert!(text.contains("retrieval_retries = 3"));
        assert!(text.starts_with("# Timbre Configuration File"));
    }

    #[test]
    fn test_key_lists_are_disjoint() {
        for key in STRING_KEYS {
            assert!(!INTEGER_KEYS.contains(key));
        }
        assert!(valid_keys().contains("shuffle_seed"));
    }
}
