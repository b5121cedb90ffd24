//! Client configuration: the list of server replicas.

use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CONFIG";

/// Parsed config file contents.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub addresses: Vec<String>,
}

/// Load a JSON config file, e.g. `{"addresses": ["127.0.0.1:4000"]}`.
pub fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&text)?;
    if config.addresses.is_empty() {
        return Err("config lists no server addresses".into());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let path = std::env::temp_dir().join("vpir_config_test.json");
        std::fs::write(&path, r#"{"addresses": ["127.0.0.1:4000", "127.0.0.1:4001"]}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.addresses.len(), 2);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_config_rejects_empty_list() {
        let path = std::env::temp_dir().join("vpir_config_empty_test.json");
        std::fs::write(&path, r#"{"addresses": []}"#).unwrap();
        assert!(load_config(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
