//! Group access control.
//!
//! A group may be opened by any number of shared holders or by exactly one
//! exclusive holder. Violations fail immediately instead of waiting.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

use synctool_common::{Error, Result};

const CLOSED: i32 = 0;
const EXCLUSIVE: i32 = -1;

/// Shared/exclusive open counter of a group.
///
/// The counter is `0` while the group is closed, the number of holders
/// while it is opened shared, and `-1` while it is opened exclusively.
#[derive(Debug, Clone)]
pub struct GroupLock {
    name: String,
    state: Arc<AtomicI32>,
}

/// How a group is currently opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Closed,
    Shared(u32),
    Exclusive,
}

impl GroupLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(AtomicI32::new(CLOSED)),
        }
    }

    pub fn state(&self) -> LockState {
        match self.state.load(Ordering::Acquire) {
            CLOSED => LockState::Closed,
            EXCLUSIVE => LockState::Exclusive,
            n => LockState::Shared(n.unsigned_abs()),
        }
    }

    /// Open the group for shared access.
    ///
    /// # Errors
    /// - `GroupOpened` if the group is opened exclusively
    pub fn open_shared(&self) -> Result<GroupGuard> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == EXCLUSIVE {
                return Err(Error::GroupOpened(self.name.clone()));
            }
            match self.state.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        debug!("Opened group '{}' shared", self.name);
        Ok(GroupGuard {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            exclusive: false,
        })
    }

    /// Open the group for exclusive access.
    ///
    /// # Errors
    /// - `GroupOpened` if the group is opened in any mode
    pub fn open_exclusive(&self) -> Result<GroupGuard> {
        self.state
            .compare_exchange(CLOSED, EXCLUSIVE, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::GroupOpened(self.name.clone()))?;

        debug!("Opened group '{}' exclusively", self.name);
        Ok(GroupGuard {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            exclusive: true,
        })
    }
}

/// Releases its hold on the group when dropped.
#[derive(Debug)]
pub struct GroupGuard {
    name: String,
    state: Arc<AtomicI32>,
    exclusive: bool,
}

impl GroupGuard {
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.exclusive {
            self.state.store(CLOSED, Ordering::Release);
        } else {
            self.state.fetch_sub(1, Ordering::AcqRel);
        }
        debug!("Released group '{}'", self.name);
    }
}
