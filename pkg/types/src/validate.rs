use anyhow::{Result, bail};

/// Validate a node or health check name.
/// Rules: lowercase `[a-z0-9.-]`, max 253 chars, each dot-separated label
/// non-empty with no leading/trailing hyphen.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 253 {
        bail!("name '{}' exceeds 253 characters (got {})", name, name.len());
    }
    for label in name.split('.') {
        if label.is_empty() {
            bail!("name '{}' must not contain empty dot-separated labels", name);
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("name '{}' must not start or end a label with a hyphen", name);
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!(
                "name '{}' must contain only lowercase letters, digits, hyphens and dots",
                name
            );
        }
    }
    Ok(())
}
