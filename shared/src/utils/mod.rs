//! Utility functions and helpers

pub mod time;

use anyhow::Result;

/// Convert bytes to a hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a duration string (e.g., "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();

    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.parse()?;
        Ok(std::time::Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.parse()?;
        Ok(std::time::Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.parse()?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow::anyhow!("duration {:?} is out of range", s))?;
        Ok(std::time::Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str.parse()?;
        let secs = hours
            .checked_mul(3600)
            .ok_or_else(|| anyhow::anyhow!("duration {:?} is out of range", s))?;
        Ok(std::time::Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('d') {
        let days: u64 = num_str.parse()?;
        let secs = days
            .checked_mul(86_400)
            .ok_or_else(|| anyhow::anyhow!("duration {:?} is out of range", s))?;
        Ok(std::time::Duration::from_secs(secs))
    } else {
        // Default to seconds if no suffix
        let secs: u64 = s.parse()?;
        Ok(std::time::Duration::from_secs(secs))
    }
}
