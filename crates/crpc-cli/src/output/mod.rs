//! Output formatting utilities for the CLI
//!
//! Profile tables, profile detail views, IPC response printing and the
//! colored status messages used by every command.

use std::process::ExitCode;

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use crpc_core::{IpcResponse, Profile};

/// Format profiles as an ASCII table
///
/// `now_millis` is the reference point for the "UPDATED" column.
pub fn format_profiles(profiles: &[Profile], now_millis: u64) -> String {
    if profiles.is_empty() {
        return "No profiles".to_string();
    }

    #[derive(Tabled)]
    struct ProfileRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "APP ID")]
        app_id: String,
        #[tabled(rename = "DETAILS")]
        details: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "UPDATED")]
        updated: String,
    }

    let rows: Vec<ProfileRow> = profiles
        .iter()
        .map(|p| ProfileRow {
            name: p.name.clone(),
            app_id: or_dash(&p.app_id),
            details: truncate(&or_dash(&p.details), 32),
            state: truncate(&or_dash(&p.state), 32),
            updated: format_age(p.updated_at, now_millis),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Format a single profile as labelled lines
pub fn format_profile(profile: &Profile) -> String {
    let mut output = String::new();

    output.push_str(&format!("Profile: {}\n", profile.name));
    output.push_str(&format!("Application ID: {}\n", or_dash(&profile.app_id)));
    if !profile.activity_name.is_empty() {
        output.push_str(&format!("Activity: {}\n", profile.activity_name));
    }
    output.push_str(&format!("Details: {}\n", or_dash(&profile.details)));
    output.push_str(&format!("State: {}\n", or_dash(&profile.state)));

    if !profile.large_image_key.is_empty() {
        output.push_str(&format!(
            "Large image: {} ({})\n",
            profile.large_image_key,
            or_dash(&profile.large_image_text)
        ));
    }
    if !profile.small_image_key.is_empty() {
        output.push_str(&format!(
            "Small image: {} ({})\n",
            profile.small_image_key,
            or_dash(&profile.small_image_text)
        ));
    }
    if let (Some(size), Some(max)) = (profile.party_size, profile.party_max) {
        output.push_str(&format!("Party: {} of {}\n", size, max));
    }
    for button in &profile.buttons {
        output.push_str(&format!("Button: {} -> {}\n", button.label, button.url));
    }

    output
}

/// Print an IPC response line and map it to the process exit code
pub fn print_response(response: &IpcResponse) -> ExitCode {
    println!("{}", response);
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Format how long ago a Unix millisecond timestamp was
fn format_age(then_millis: u64, now_millis: u64) -> String {
    if then_millis == 0 {
        return "-".to_string();
    }
    let secs = now_millis.saturating_sub(then_millis) / 1000;
    format!("{} ago", format_duration(secs))
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crpc_core::Button;

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_format_age_unknown_timestamp() {
        assert_eq!(format_age(0, 10_000), "-");
        assert_eq!(format_age(4_000, 10_000), "6s ago");
        // Clock skew never underflows
        assert_eq!(format_age(20_000, 10_000), "0s ago");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_format_profiles_empty() {
        assert_eq!(format_profiles(&[], 0), "No profiles");
    }

    #[test]
    fn test_format_profiles_table() {
        let profile = Profile {
            app_id: "123456789012345678".to_string(),
            details: "Ranked".to_string(),
            updated_at: 1_000,
            ..Profile::new("Gaming")
        };
        let table = format_profiles(&[profile, Profile::new("Empty")], 61_000);

        assert!(table.contains("NAME"));
        assert!(table.contains("Gaming"));
        assert!(table.contains("123456789012345678"));
        assert!(table.contains("1m 0s ago"));
        assert!(table.contains("Empty"));
    }

    #[test]
    fn test_format_profile_details() {
        let profile = Profile {
            details: "Ranked".to_string(),
            party_size: Some(2),
            party_max: Some(5),
            buttons: vec![Button {
                label: "Join".to_string(),
                url: "https://example.com".to_string(),
            }],
            ..Profile::new("Gaming")
        };
        let text = format_profile(&profile);

        assert!(text.contains("Profile: Gaming"));
        assert!(text.contains("Details: Ranked"));
        assert!(text.contains("State: -"));
        assert!(text.contains("Party: 2 of 5"));
        assert!(text.contains("Button: Join -> https://example.com"));
        assert!(!text.contains("Large image"));
    }
}
