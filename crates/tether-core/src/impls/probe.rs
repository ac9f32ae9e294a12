//! SwitchProbe - 手動で切り替える ConnectivityProbe

use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::ConnectivityProbe;

#[derive(Debug)]
pub struct SwitchProbe {
    available: AtomicBool,
}

impl SwitchProbe {
    pub fn online() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            available: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

impl Default for SwitchProbe {
    fn default() -> Self {
        Self::online()
    }
}

impl ConnectivityProbe for SwitchProbe {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}
