//! Compact command implementation.

use super::{format_size, open_store};
use std::path::Path;

/// Runs the compact command, returning the journal sizes before and after.
pub fn run(path: &Path) -> Result<(u64, u64), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let before = store.journal_size()?;
    store.compact()?;
    let after = store.journal_size()?;

    println!("Compacted journal at {}", path.display());
    println!("  Size before: {}", format_size(before));
    println!("  Size after:  {}", format_size(after));
    if before > 0 {
        println!(
            "  Space saved: {:.1}%",
            (before.saturating_sub(after) as f64 / before as f64) * 100.0
        );
    }
    Ok((before, after))
}
