//! Pre-download summary printed by the plain CLI.

use console::style;

use crate::engine::JobInfo;
use crate::utils::format_duration;

/// One table row: index, title, duration
pub fn summary_rows(info: &JobInfo) -> Vec<(usize, String, String)> {
    let row = |index: usize, title: Option<&str>, duration: Option<f64>| {
        (
            index,
            title.unwrap_or("Unknown").to_string(),
            duration.map(format_duration).unwrap_or_else(|| "N/A".to_string()),
        )
    };

    match &info.entries {
        Some(entries) => entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                entry
                    .as_ref()
                    .map(|entry| row(position + 1, entry.title.as_deref(), entry.duration))
            })
            .collect(),
        None => vec![row(1, info.title.as_deref(), info.duration)],
    }
}

/// Render the summary as fixed-width text lines
pub fn format_summary(info: &JobInfo) -> Vec<String> {
    let rows = summary_rows(info);
    if rows.is_empty() {
        return Vec::new();
    }

    let title_width = rows
        .iter()
        .map(|(_, title, _)| title.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(5, 60);

    let mut lines = vec![format!("{:>5}  {:<title_width$}  {:>8}", "Index", "Title", "Duration")];
    lines.push(format!("{}  {}  {}", "-".repeat(5), "-".repeat(title_width), "-".repeat(8)));
    for (index, title, duration) in rows {
        let title: String = title.chars().take(title_width).collect();
        lines.push(format!("{:>5}  {:<title_width$}  {:>8}", index, title, duration));
    }
    lines
}

/// Print what is about to be downloaded
pub fn print_summary(info: &JobInfo) {
    if info.is_playlist() {
        println!(
            "{} {}",
            style("Playlist Detected:").yellow().bold(),
            info.title.as_deref().unwrap_or("Unknown")
        );
    } else {
        println!("{}", style("Single Video Detected").yellow().bold());
    }

    let lines = format_summary(info);
    if lines.is_empty() {
        println!("{}", style("No downloadable content found.").red().bold());
        return;
    }

    for (position, line) in lines.iter().enumerate() {
        if position == 0 {
            println!("{}", style(line).cyan());
        } else {
            println!("{}", line);
        }
    }
    println!();
}
