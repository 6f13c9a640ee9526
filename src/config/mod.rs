use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download engine configuration
    pub engine: EngineConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path or name of the yt-dlp executable
    pub yt_dlp_path: String,

    /// MP3 bitrate in kbps
    pub audio_quality: u32,

    /// Embed the video thumbnail as cover art
    pub embed_thumbnail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for downloaded files
    pub output_dir: PathBuf,

    /// Fallback list of URLs used when none is given on the command line
    pub batch_file: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            audio_quality: 192,
            embed_thumbnail: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("download"),
            batch_file: PathBuf::from("urls.txt"),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config = Self::from_yaml(&content)?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("ytmd").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.engine.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("engine.yt_dlp_path must not be empty");
        }

        if !(1..=320).contains(&self.engine.audio_quality) {
            anyhow::bail!(
                "engine.audio_quality must be a bitrate between 1 and 320 kbps, got {}",
                self.engine.audio_quality
            );
        }

        if self.app.output_dir.as_os_str().is_empty() {
            anyhow::bail!("app.output_dir must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.engine.yt_dlp_path);
        println!("  Audio Quality: {} kbps", self.engine.audio_quality);
        println!("  Embed Thumbnail: {}", self.engine.embed_thumbnail);
        println!("  Output Directory: {}", self.app.output_dir.display());
        println!("  Batch File: {}", self.app.batch_file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("app:\n  output_dir: music\n").unwrap();
        assert_eq!(config.app.output_dir, PathBuf::from("music"));
        assert_eq!(config.app.batch_file, PathBuf::from("urls.txt"));
        assert_eq!(config.engine.yt_dlp_path, "yt-dlp");
        assert_eq!(config.engine.audio_quality, 192);
    }

    #[test]
    fn test_rejects_bad_quality() {
        let err = Config::from_yaml("engine:\n  audio_quality: 0\n").unwrap_err();
        assert!(err.to_string().contains("audio_quality"));
        assert!(Config::from_yaml("engine:\n  audio_quality: best\n").is_err());
        assert_eq!(Config::from_yaml("engine:\n  audio_quality: 320\n").unwrap().engine.audio_quality, 320);
    }

    #[test]
    fn test_rejects_empty_engine_path() {
        assert!(Config::from_yaml("engine:\n  yt_dlp_path: \"\"\n").is_err());
    }
}
