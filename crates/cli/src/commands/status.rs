//! `pagemind status` — memory statistics and window usage.

use std::path::Path;

use pagemind_config::AgentConfig;
use pagemind_core::error::{Error, Result};
use pagemind_memory::{EvictionPolicy, MemoryFiles, TieredMemory};

pub fn run(config_path: &Path) -> Result<()> {
    let config = AgentConfig::load(config_path).map_err(Error::from)?;

    let files = MemoryFiles::new(&config.memory_path, &config.directory_path);
    let mut memory = TieredMemory::new();
    files.load(&mut memory)?;

    let stats = memory.stats();
    let usage = EvictionPolicy::new().calculate_window(&memory, config.hard_limit_bytes);

    println!("Pagemind Status");
    println!("===============");
    println!("  Endpoint:     {}", config.endpoint);
    println!("  Model:        {}", config.model);
    println!("  Memory file:  {}", config.memory_path.display());
    println!();
    println!("  Entries:      {} working / {} persistent / {} archived",
        stats.working_entries, stats.persistent_entries, stats.archived_entries);
    println!("  Layer bytes:  {} working / {} persistent",
        stats.working_bytes, stats.persistent_bytes);
    println!("  Window:       {} / {} bytes ({:.1}%){}",
        usage.used,
        config.hard_limit_bytes,
        usage.percent,
        if usage.over_budget { "  OVER BUDGET" } else { "" });

    let report = memory.verify();
    if report.is_clean() {
        println!("  Integrity:    clean");
    } else {
        println!(
            "  Integrity:    {} entries without frames, {} frames without entries",
            report.entries_without_frames.len(),
            report.frames_without_entries.len()
        );
    }

    Ok(())
}
