//! Engine configuration.
//!
//! Mirrors the builder style of the original configuration object: each
//! setter consumes and returns the configuration, out-of-range values clamp
//! to their minimum with a warning on the diagnostic sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

/// Which guttering backend batches updates before they reach the sketches.
///
/// All three present the same contract: per-source destination lists are
/// delivered to the worker pool. They differ only in how updates are
/// buffered on the way there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GutterSystem {
    /// One leaf gutter per source vertex.
    StandAlone,
    /// Two-level buffer tree: root buckets spill into leaf gutters.
    Tree,
    /// Buffer tree with enlarged root buckets.
    CacheTree,
}

/// Sizing knobs for the guttering system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GutterConfiguration {
    /// Bytes of destination ids buffered per leaf gutter before it is
    /// handed to the worker queue.
    pub gutter_bytes: usize,
    /// Sources per root bucket for the tree backends.
    pub fanout: usize,
    /// Root bucket size multiplier for [`GutterSystem::CacheTree`].
    pub cache_factor: usize,
}

impl Default for GutterConfiguration {
    fn default() -> Self {
        Self {
            gutter_bytes: 1024,
            fanout: 64,
            cache_factor: 4,
        }
    }
}

/// Configuration for a [`Graph`](crate::graph::Graph) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfiguration {
    gutter_sys: GutterSystem,
    disk_dir: PathBuf,
    backup_in_mem: bool,
    num_groups: usize,
    group_size: usize,
    eager_dsu: bool,
    seed: Option<u64>,
    gutter_conf: GutterConfiguration,
}

impl Default for GraphConfiguration {
    fn default() -> Self {
        Self {
            gutter_sys: GutterSystem::StandAlone,
            disk_dir: PathBuf::from("."),
            backup_in_mem: true,
            num_groups: 1,
            group_size: 1,
            eager_dsu: true,
            seed: None,
            gutter_conf: GutterConfiguration::default(),
        }
    }
}

impl GraphConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| crate::error::GraphError::InvalidConfig(e.to_string()))
    }

    /// Select the guttering backend.
    pub fn gutter_sys(mut self, gutter_sys: GutterSystem) -> Self {
        self.gutter_sys = gutter_sys;
        self
    }

    /// Directory for on-disk scratch data (sketch backups when
    /// `backup_in_mem` is off).
    pub fn disk_dir(mut self, disk_dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = disk_dir.into();
        self
    }

    /// Keep the pre-query sketch backup in memory instead of on disk.
    pub fn backup_in_mem(mut self, backup_in_mem: bool) -> Self {
        self.backup_in_mem = backup_in_mem;
        self
    }

    /// Number of worker groups. Clamps to 1.
    pub fn num_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = if num_groups < 1 {
            warn!(num_groups, "num_groups out of bounds, defaulting to 1");
            1
        } else {
            num_groups
        };
        self
    }

    /// Threads per worker group. Clamps to 1.
    pub fn group_size(mut self, group_size: usize) -> Self {
        self.group_size = if group_size < 1 {
            warn!(group_size, "group_size out of bounds, defaulting to 1");
            1
        } else {
            group_size
        };
        self
    }

    /// Maintain a live spanning forest during ingest so point queries can
    /// short-circuit while no deletion or cycle has been seen.
    pub fn eager_dsu(mut self, eager_dsu: bool) -> Self {
        self.eager_dsu = eager_dsu;
        self
    }

    /// Fix the sketch seed. When unset, a random seed is drawn at engine
    /// construction.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adjust gutter sizing.
    pub fn gutter_conf(mut self, gutter_conf: GutterConfiguration) -> Self {
        self.gutter_conf = gutter_conf;
        self
    }

    pub fn get_gutter_sys(&self) -> GutterSystem {
        self.gutter_sys
    }

    pub fn get_disk_dir(&self) -> &Path {
        &self.disk_dir
    }

    pub fn get_backup_in_mem(&self) -> bool {
        self.backup_in_mem
    }

    pub fn get_num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn get_group_size(&self) -> usize {
        self.group_size
    }

    pub fn get_eager_dsu(&self) -> bool {
        self.eager_dsu
    }

    pub fn get_seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn get_gutter_conf(&self) -> &GutterConfiguration {
        &self.gutter_conf
    }

    /// Total worker threads backing the gutter.
    pub fn worker_threads(&self) -> usize {
        self.num_groups * self.group_size
    }
}

impl fmt::Display for GraphConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gutter = match self.gutter_sys {
            GutterSystem::StandAlone => "StandAloneGutters",
            GutterSystem::Tree => "GutterTree",
            GutterSystem::CacheTree => "CacheTree",
        };
        writeln!(f, "Graph streaming configuration:")?;
        writeln!(f, " Guttering system      = {gutter}")?;
        writeln!(f, " Number of groups      = {}", self.num_groups)?;
        writeln!(f, " Size of groups        = {}", self.group_size)?;
        writeln!(f, " On disk data location = {}", self.disk_dir.display())?;
        writeln!(
            f,
            " Backup sketch to RAM  = {}",
            if self.backup_in_mem { "ON" } else { "OFF" }
        )?;
        write!(
            f,
            " Eager DSU             = {}",
            if self.eager_dsu { "ON" } else { "OFF" }
        )
    }
}
