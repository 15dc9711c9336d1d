//! Host resource sampling

use anyhow::Result;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

use crate::admission::ResourceSample;

/// Source of resource samples
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> Result<ResourceSample>;
}

/// Samples load, memory and the disk holding the Argus home
pub struct SysinfoProbe {
    home: PathBuf,
}

impl SysinfoProbe {
    pub fn new(home: &Path) -> Self {
        let home = home.canonicalize().unwrap_or_else(|_| home.to_path_buf());
        Self { home }
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&self) -> Result<ResourceSample> {
        let mut system = System::new();
        system.refresh_memory();

        let memory_used_percent = percent(system.used_memory(), system.total_memory());

        // The disk mounted deepest along the home path holds the data
        let disks = Disks::new_with_refreshed_list();
        let disk_used_percent = disks
            .list()
            .iter()
            .filter(|disk| self.home.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .map(|disk| {
                percent(
                    disk.total_space().saturating_sub(disk.available_space()),
                    disk.total_space(),
                )
            })
            .unwrap_or(0.0);

        Ok(ResourceSample {
            load_one: System::load_average().one,
            cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_used_percent,
            disk_used_percent,
        })
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}
