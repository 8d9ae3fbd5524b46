use crate::persistence::aof::FsyncPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub loglevel: String,
    // Persistence
    pub dir: String,
    pub appendonly: bool,
    pub appendfilename: String,
    pub appendfsync: FsyncPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            loglevel: "info".to_string(),
            dir: ".".to_string(),
            appendonly: true,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: FsyncPolicy::Everysec,
        }
    }
}

impl Config {
    /// Parse `--name value` pairs. Unknown flags and bad values are skipped.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            if let Some(name) = args[i].strip_prefix("--")
                && let Some(value) = args.get(i + 1)
            {
                let _ = config.set(name, value);
                i += 1;
            }
            i += 1;
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key.to_lowercase().as_str() {
            "loglevel" => Some(self.loglevel.clone()),
            "dir" => Some(self.dir.clone()),
            "appendonly" => Some(if self.appendonly { "yes" } else { "no" }.to_string()),
            "appendfilename" => Some(self.appendfilename.clone()),
            "appendfsync" => Some(self.appendfsync.as_str().to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_lowercase().as_str() {
            "loglevel" => {
                self.loglevel = value.to_string();
                Ok(())
            }
            "dir" => {
                self.dir = value.to_string();
                Ok(())
            }
            "appendonly" => {
                self.appendonly = match value {
                    "yes" => true,
                    "no" => false,
                    _ => return Err("argument must be 'yes' or 'no'".to_string()),
                };
                Ok(())
            }
            "appendfilename" => {
                if value.is_empty() || value.contains('/') {
                    return Err("appendfilename can't be a path, just a filename".to_string());
                }
                self.appendfilename = value.to_string();
                Ok(())
            }
            "appendfsync" => {
                self.appendfsync = FsyncPolicy::from_name(value)
                    .ok_or_else(|| format!("Invalid appendfsync value '{value}'"))?;
                Ok(())
            }
            _ => Err(format!("Unknown option or number of arguments for CONFIG SET - '{key}'")),
        }
    }

    pub fn aof_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.appendfilename)
    }
}

pub type SharedConfig = Arc<RwLock<Config>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.appendonly);
        assert_eq!(config.appendfsync, FsyncPolicy::Everysec);
        assert_eq!(config.aof_path(), PathBuf::from("./appendonly.aof"));
    }

    #[test]
    fn test_from_args() {
        let config = Config::from_args(&args(&[
            "--dir",
            "/tmp/data",
            "--appendonly",
            "no",
            "--appendfsync",
            "always",
            "--bogus",
            "1",
            "--appendfilename",
            "log.aof",
        ]));
        assert!(!config.appendonly);
        assert_eq!(config.appendfsync, FsyncPolicy::Always);
        assert_eq!(config.aof_path(), PathBuf::from("/tmp/data/log.aof"));
    }

    #[test]
    fn test_get_set() {
        let mut config = Config::default();
        assert_eq!(config.get("APPENDONLY").as_deref(), Some("yes"));
        config.set("appendfsync", "no").unwrap();
        assert_eq!(config.get("appendfsync").as_deref(), Some("no"));
        assert!(config.set("appendfsync", "sometimes").is_err());
        assert!(config.set("appendonly", "maybe").is_err());
        assert!(config.set("appendfilename", "../x").is_err());
        assert!(config.set("port", "6379").is_err());
        assert_eq!(config.get("port"), None);
    }
}
