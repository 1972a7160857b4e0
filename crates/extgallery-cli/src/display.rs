//! Display formatting for CLI output

use chrono::{DateTime, Utc};
use console::style;
use extgallery_client::VersionSummary;
use extgallery_core::GalleryExtension;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Compact install count: `950`, `12.3K`, `4.1M`
pub fn format_count(count: u64) -> String {
    match count {
        0..1_000 => count.to_string(),
        1_000..1_000_000 => format!("{:.1}K", count as f64 / 1_000.0),
        _ => format!("{:.1}M", count as f64 / 1_000_000.0),
    }
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One row per extension
pub fn print_extension_table(extensions: &[GalleryExtension]) {
    println!(
        "{:<40} {:<14} {:>9} {:>6}  DESCRIPTION",
        "ID", "VERSION", "INSTALLS", "RATING"
    );
    println!("{}", "-".repeat(100));

    for extension in extensions {
        let version = if extension.properties.is_pre_release_version {
            format!("{} (pre)", extension.version)
        } else {
            extension.version.clone()
        };
        println!(
            "{:<40} {:<14} {:>9} {:>6.1}  {}",
            truncate(&extension.identifier.id, 40),
            truncate(&version, 14),
            format_count(extension.install_count),
            extension.rating,
            truncate(&extension.description, 35)
        );
    }
}

/// Details of a single extension
pub fn print_extension_details(extension: &GalleryExtension) {
    println!(
        "{} {}",
        style(&extension.display_name).cyan().bold(),
        style(&extension.version).dim()
    );
    println!("  {:<14} {}", "ID:", extension.identifier.id);
    if let Some(uuid) = &extension.identifier.uuid {
        println!("  {:<14} {}", "UUID:", uuid);
    }
    let verified = if extension.publisher.domain_verified {
        format!(" {}", style("✓").green())
    } else {
        String::new()
    };
    println!(
        "  {:<14} {}{}",
        "Publisher:", extension.publisher.display_name, verified
    );
    if !extension.description.is_empty() {
        println!("  {:<14} {}", "Description:", extension.description);
    }
    println!(
        "  {:<14} {} ({:.1} from {} ratings)",
        "Installs:",
        format_count(extension.install_count),
        extension.rating,
        extension.rating_count
    );
    println!("  {:<14} {}", "Updated:", format_date(extension.last_updated));
    if let Some(engine) = &extension.properties.engine {
        println!("  {:<14} {}", "Engine:", engine);
    }
    if let Some(platform) = &extension.properties.target_platform {
        println!("  {:<14} {}", "Platform:", platform);
    }
    if !extension.all_target_platforms.is_empty() {
        let platforms: Vec<&str> = extension
            .all_target_platforms
            .iter()
            .map(|p| p.as_str())
            .collect();
        println!("  {:<14} {}", "Platforms:", platforms.join(", "));
    }
    if !extension.categories.is_empty() {
        println!("  {:<14} {}", "Categories:", extension.categories.join(", "));
    }
    if !extension.properties.dependencies.is_empty() {
        println!(
            "  {:<14} {}",
            "Depends on:",
            extension.properties.dependencies.join(", ")
        );
    }
    if extension.properties.is_pre_release_version {
        println!("  {}", style("pre-release").yellow());
    } else if extension.preview {
        println!("  {}", style("preview").yellow());
    }
}

pub fn print_versions(versions: &[VersionSummary]) {
    println!("{:<20} {:<12} CHANNEL", "VERSION", "DATE");
    for version in versions {
        let channel = if version.is_pre_release {
            style("pre-release").yellow().to_string()
        } else {
            "release".to_string()
        };
        println!(
            "{:<20} {:<12} {}",
            version.version,
            format_date(version.date),
            channel
        );
    }
}

/// Spinner on stderr, hidden when stderr is not a terminal
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
