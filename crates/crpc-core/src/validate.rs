//! Validation of profile fields against the presence API's limits

use crate::profile::{Button, Profile};

/// Maximum length of free-text activity fields
pub const MAX_TEXT_LEN: usize = 128;
/// Maximum length of a button label
pub const MAX_BUTTON_LABEL_LEN: usize = 32;
/// Maximum length of a button URL
pub const MAX_URL_LEN: usize = 512;
/// Maximum number of buttons shown on an activity
pub const MAX_BUTTONS: usize = 2;
/// Maximum length of a profile name
pub const MAX_PROFILE_NAME_LEN: usize = 64;

/// 2000-01-01T00:00:00Z
const MIN_TIMESTAMP: i64 = 946_684_800;
/// 2100-01-01T00:00:00Z
const MAX_TIMESTAMP: i64 = 4_102_444_800;

/// Validate an application ID: 17 to 20 ASCII digits
pub fn validate_app_id(app_id: &str) -> Result<(), String> {
    if app_id.is_empty() {
        return Err("Application ID cannot be empty".to_string());
    }
    if !app_id.chars().all(|c| c.is_ascii_digit()) {
        return Err("Application ID must contain only numbers".to_string());
    }
    if !(17..=20).contains(&app_id.len()) {
        return Err("Application ID must be 17-20 digits".to_string());
    }
    Ok(())
}

/// Validate a profile name
///
/// Names travel on a line-based protocol and become file names, so control
/// characters are rejected and at least one filename-safe character is required.
pub fn validate_profile_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Profile name cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_PROFILE_NAME_LEN {
        return Err(format!(
            "Profile name exceeds maximum length of {} characters",
            MAX_PROFILE_NAME_LEN
        ));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("Profile name cannot contain control characters".to_string());
    }
    if crate::profile::sanitize_file_stem(trimmed).is_empty() {
        return Err(
            "Profile name needs at least one letter, digit, space, '-' or '_'".to_string(),
        );
    }
    Ok(())
}

/// Validate a free-text field length
pub fn validate_text_field(text: &str, field_name: &str) -> Result<(), String> {
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(format!(
            "{} exceeds maximum length of {} characters",
            field_name, MAX_TEXT_LEN
        ));
    }
    Ok(())
}

/// Validate a Unix timestamp in seconds
pub fn validate_timestamp(timestamp: Option<i64>) -> Result<(), String> {
    match timestamp {
        None => Ok(()),
        Some(ts) if ts < 0 => Err("Timestamp cannot be negative".to_string()),
        Some(ts) if !(MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&ts) => {
            Err("Timestamp appears to be invalid".to_string())
        }
        Some(_) => Ok(()),
    }
}

/// Validate party sizes
pub fn validate_party_size(current: Option<i32>, max: Option<i32>) -> Result<(), String> {
    if current.is_some_and(|c| c < 0) {
        return Err("Party size cannot be negative".to_string());
    }
    if max.is_some_and(|m| m < 0) {
        return Err("Max party size cannot be negative".to_string());
    }
    if let (Some(current), Some(max)) = (current, max) {
        if current > max {
            return Err("Current party size cannot exceed maximum".to_string());
        }
    }
    Ok(())
}

/// Validate a button URL: http(s) with a host
pub fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }
    if url.len() > MAX_URL_LEN {
        return Err(format!("URL too long (max {} characters)", MAX_URL_LEN));
    }

    let invalid = || "Invalid URL format (must start with http:// or https://)".to_string();
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .ok_or_else(invalid)?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            host
        }
        Some(_) => return Err(invalid()),
        None => authority,
    };

    let host_ok = host == "localhost"
        || (host.contains('.')
            && !host.starts_with('.')
            && !host.ends_with('.')
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-'));
    if !host_ok || url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

/// Validate a button
pub fn validate_button(button: &Button) -> Result<(), String> {
    if button.label.is_empty() {
        return Err("Button label cannot be empty".to_string());
    }
    if button.label.chars().count() > MAX_BUTTON_LABEL_LEN {
        return Err(format!(
            "Button label exceeds maximum length of {} characters",
            MAX_BUTTON_LABEL_LEN
        ));
    }
    validate_url(&button.url)
}

/// Validate every field of a profile, reporting all problems at once
pub fn validate_profile(profile: &Profile) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let mut check = |result: Result<(), String>| {
        if let Err(e) = result {
            errors.push(e);
        }
    };

    check(validate_profile_name(&profile.name));
    check(validate_app_id(&profile.app_id));
    for (value, field) in [
        (&profile.activity_name, "Activity name"),
        (&profile.details, "Details"),
        (&profile.state, "State"),
        (&profile.large_image_key, "Large image key"),
        (&profile.large_image_text, "Large image text"),
        (&profile.small_image_key, "Small image key"),
        (&profile.small_image_text, "Small image text"),
    ] {
        check(validate_text_field(value, field));
    }
    check(validate_timestamp(profile.start_timestamp));
    check(validate_timestamp(profile.end_timestamp));
    check(validate_party_size(profile.party_size, profile.party_max));
    if profile.buttons.len() > MAX_BUTTONS {
        check(Err(format!("At most {} buttons are allowed", MAX_BUTTONS)));
    }
    for button in &profile.buttons {
        check(validate_button(button));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
