//! Sequential order numbers.
//!
//! The counter file holds `{"nextOrder": n}`. A missing file starts the
//! sequence at [`FIRST_ORDER_NUMBER`]. Allocation is read-increment-write
//! under a mutex so concurrent bookings never share a number.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const FIRST_ORDER_NUMBER: u64 = 1000;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterFile {
    next_order: u64,
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(u64),
}

#[derive(Debug)]
pub struct OrderCounter {
    backing: Mutex<Backing>,
}

impl OrderCounter {
    /// Counter persisted at `path`. Parent directories are created on first
    /// allocation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Mutex::new(Backing::File(path.into())),
        }
    }

    /// Counter that lives only for the process.
    pub fn in_memory() -> Self {
        Self {
            backing: Mutex::new(Backing::Memory(FIRST_ORDER_NUMBER)),
        }
    }

    /// Returns the next order number and advances the counter.
    pub fn allocate(&self) -> Result<u64, ToolError> {
        let mut backing = self
            .backing
            .lock()
            .map_err(|_| ToolError::State("order counter lock poisoned".to_string()))?;
        match &mut *backing {
            Backing::Memory(next) => {
                let current = *next;
                *next += 1;
                Ok(current)
            }
            Backing::File(path) => {
                let current = read_counter(path)?;
                write_counter(path, current + 1)?;
                Ok(current)
            }
        }
    }
}

fn read_counter(path: &Path) -> Result<u64, ToolError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str::<CounterFile>(&raw)?.next_order),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FIRST_ORDER_NUMBER),
        Err(e) => Err(e.into()),
    }
}

fn write_counter(path: &Path, next_order: u64) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let raw = serde_json::to_string(&CounterFile { next_order })?;
    std::fs::write(path, raw)?;
    Ok(())
}
