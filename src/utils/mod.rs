use url::Url;

use crate::{Result, YtmdError};

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| YtmdError::InvalidInput(format!("Invalid URL format: {}", url)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(YtmdError::InvalidInput("URL must use HTTP or HTTPS protocol".to_string()).into());
    }

    Ok(parsed.to_string())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration as `m:ss` or `h:mm:ss`
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Drop characters that are not allowed in directory names on common filesystems
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!("{} - required for downloading", yt_dlp_path));
    }

    // yt-dlp needs ffmpeg for MP3 extraction and thumbnail embedding
    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for MP3 conversion".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    let flag = if command == "ffmpeg" { "-version" } else { "--version" };
    Command::new(command)
        .arg(flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
