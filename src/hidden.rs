//! `ms hide`, `ms unhide`, `ms hidden`, `ms clear-hidden` and `ms reset`.
//!
//! All of these work on the local visibility set only; none of them talks
//! to AWS.

use anyhow::Result;
use metastream_core::visibility::VisibilityKey;

use crate::clients::visibility_store;
use crate::config::Config;

pub fn run_hide(config: &Config, file_name: &str, record_id: &str) -> Result<()> {
    let key = VisibilityKey::new(file_name, record_id);
    visibility_store(config).hide(&key)?;
    println!("Hidden {}", key);
    Ok(())
}

pub fn run_unhide(config: &Config, file_name: &str, record_id: &str) -> Result<()> {
    let key = VisibilityKey::new(file_name, record_id);
    visibility_store(config).unhide(&key)?;
    println!("Visible {}", key);
    Ok(())
}

pub fn run_list_hidden(config: &Config, json: bool) -> Result<()> {
    let keys = visibility_store(config).list_hidden();
    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }
    if keys.is_empty() {
        println!("No hidden records.");
        return Ok(());
    }
    for key in &keys {
        println!("{}", key);
    }
    Ok(())
}

pub fn run_clear_hidden(config: &Config) -> Result<()> {
    visibility_store(config).clear_all()?;
    println!("All records are visible again.");
    Ok(())
}

/// Hard refresh: drop every piece of client-side state. The next `ms list`
/// starts from the first page with nothing hidden.
pub fn run_reset(config: &Config) -> Result<()> {
    visibility_store(config).clear_all()?;
    println!("Local state cleared.");
    Ok(())
}
