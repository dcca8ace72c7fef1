//! `pagemind memory` — inspect and maintain the persisted memory files.

use std::path::Path;

use chrono::Utc;
use clap::Subcommand;

use pagemind_config::AgentConfig;
use pagemind_core::error::{Error, Result};
use pagemind_core::memory::{SortOrder, Tier};
use pagemind_memory::{MemoryFiles, TieredMemory};

#[derive(Subcommand)]
pub enum MemoryAction {
    /// List directory entries, most important first
    List {
        /// Restrict to one tier: working, persistent, or archived
        #[arg(long)]
        tier: Option<String>,
    },

    /// Print the stored value for a key
    Get { key: String },

    /// Cross-check the directory against the store frames
    Verify,

    /// Archive entries idle for more than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

fn parse_tier(name: &str) -> Result<Tier> {
    match name {
        "working" => Ok(Tier::Working),
        "persistent" => Ok(Tier::Persistent),
        "archived" => Ok(Tier::Archived),
        other => Err(Error::Config {
            message: format!("unknown tier '{other}'"),
        }),
    }
}

pub fn run(config_path: &Path, action: MemoryAction) -> Result<()> {
    let config = AgentConfig::load(config_path).map_err(Error::from)?;
    let files = MemoryFiles::new(&config.memory_path, &config.directory_path);
    let mut memory = TieredMemory::new();
    files.load(&mut memory)?;

    match action {
        MemoryAction::List { tier } => {
            let tiers = match tier.as_deref() {
                Some(name) => vec![parse_tier(name)?],
                None => vec![Tier::Working, Tier::Persistent, Tier::Archived],
            };
            for tier in tiers {
                let entries = memory.directory().list_by_tier(tier, SortOrder::ByImportanceDesc);
                println!("{tier} ({}):", entries.len());
                for entry in entries {
                    println!(
                        "  {:<24} importance={:<3} size={:<8} last_access={}",
                        entry.key, entry.importance, entry.size_bytes, entry.last_access
                    );
                }
            }
        }

        MemoryAction::Get { key } => {
            match memory.retrieve(&key, Utc::now().timestamp())? {
                Some(body) => println!("{body}"),
                None => println!("(no entry for '{key}')"),
            }
        }

        MemoryAction::Verify => {
            let report = memory.verify();
            if report.is_clean() {
                println!("directory and store are consistent");
            } else {
                for key in &report.entries_without_frames {
                    println!("entry without frame: {key}");
                }
                for key in &report.frames_without_entries {
                    println!("frame without entry: {key}");
                }
                return Err(Error::InvariantViolation(format!(
                    "{} orphaned entries, {} orphaned frames",
                    report.entries_without_frames.len(),
                    report.frames_without_entries.len()
                )));
            }
        }

        MemoryAction::Cleanup { days } => {
            let _lock = files.lock()?;
            let now = Utc::now().timestamp();
            let expired = memory.directory().collect_expired(days * 86_400, now);
            for key in &expired {
                memory.archive(key)?;
            }
            files.save(&memory)?;
            println!("archived {} entries", expired.len());
        }
    }
    Ok(())
}
