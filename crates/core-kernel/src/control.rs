//! Kernel control variables: a small typed name=value registry.
//!
//! This is the kernel's whole configuration surface. A set keeps the
//! variable's existing type; `kernel.power` dropping to zero is the
//! shutdown signal the bootstrap loop watches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use core_sys::Errno;
use tracing::info;

pub const KERNEL_POWER: &str = "kernel.power";
pub const WS_PROXY: &str = "ws.proxy";
pub const FS_ROOT: &str = "fs.root";
pub const FS_ZONE: &str = "fs.zone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtlValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for CtlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

#[derive(Debug)]
pub struct Controls {
    values: Mutex<BTreeMap<String, CtlValue>>,
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl Controls {
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        values.insert(KERNEL_POWER.to_string(), CtlValue::Int(1));
        values.insert(WS_PROXY.to_string(), CtlValue::Str("localhost:8100".into()));
        values.insert(FS_ROOT.to_string(), CtlValue::Str(String::new()));
        values.insert(FS_ZONE.to_string(), CtlValue::Str("default".into()));
        Self {
            values: Mutex::new(values),
        }
    }

    pub fn get(&self, name: &str) -> Result<CtlValue, Errno> {
        self.values
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(Errno::Enoent)
    }

    /// Set from the wire representation. The stored type is kept:
    /// writing a non-number to an int variable is EINVAL, and unknown
    /// names are ENOENT rather than created.
    pub fn set(&self, name: &str, value: &str) -> Result<CtlValue, Errno> {
        let mut values = self.values.lock().unwrap();
        let slot = values.get_mut(name).ok_or(Errno::Enoent)?;
        match slot {
            CtlValue::Int(v) => {
                *v = value.parse().map_err(|_| Errno::Einval)?;
            }
            CtlValue::Str(v) => {
                *v = value.to_string();
            }
        }
        info!(target: "kernel.control", name, value, "control_set");
        Ok(slot.clone())
    }

    pub fn set_str(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), CtlValue::Str(value.to_string()));
    }

    pub fn power(&self) -> i64 {
        match self.get(KERNEL_POWER) {
            Ok(CtlValue::Int(v)) => v,
            _ => 0,
        }
    }

    pub fn halt(&self) {
        let _ = self.set(KERNEL_POWER, "0");
    }

    pub fn ws_proxy(&self) -> String {
        match self.get(WS_PROXY) {
            Ok(CtlValue::Str(v)) => v,
            _ => String::new(),
        }
    }

    pub fn list(&self) -> Vec<(String, CtlValue)> {
        self.values
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
