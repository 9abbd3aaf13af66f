/*!
 * Process Record
 *
 * The resource-owning container for threads: an address space, a resource
 * table, a live-thread counter, and the `killed` flag that tells every
 * thread of the process to exit at its next safe point.
 *
 * Teardown is reference-counted: the address space and resource table are
 * released exactly once, when the live-thread counter returns to zero (or
 * at drop for a process that never received a thread).
 */

use crate::core::types::{AddressSpaceId, Pid, Tid};
use crate::platform::AddressSpaces;
use ahash::RandomState;
use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Named resources held by a process. Only the call sites matter to the
/// scheduling core; the backing objects belong to the VFS layer.
pub struct ResourceTable {
    entries: DashMap<u32, String, RandomState>,
    next: AtomicU32,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            next: AtomicU32::new(0),
        }
    }

    pub fn open(&self, name: impl Into<String>) -> u32 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(handle, name.into());
        handle
    }

    pub fn close(&self, handle: u32) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn get(&self, handle: u32) -> Option<String> {
        self.entries.get(&handle).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

pub struct Process {
    pid: Pid,
    space: AddressSpaceId,
    resources: ResourceTable,
    killed: AtomicBool,
    thread_count: AtomicU64,
    next_tid: Arc<AtomicU64>,
    spaces: Arc<dyn AddressSpaces>,
    torn_down: AtomicBool,
}

impl Process {
    /// Create a process with zero threads. It is not considered live until
    /// the first thread is attached.
    pub(crate) fn new(pid: Pid, next_tid: Arc<AtomicU64>, spaces: Arc<dyn AddressSpaces>) -> Arc<Self> {
        let space = spaces.create();
        debug!("process {pid} created with address space {space}");

        Arc::new(Self {
            pid,
            space,
            resources: ResourceTable::new(),
            killed: AtomicBool::new(false),
            thread_count: AtomicU64::new(0),
            next_tid,
            spaces,
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn address_space(&self) -> AddressSpaceId {
        self.space
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Signal every thread of this process to exit at its next safe point.
    /// Threads are never forcibly unwound from a preempted context.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn thread_count(&self) -> u64 {
        self.thread_count.load(Ordering::SeqCst)
    }

    /// Account a new thread and allocate its id
    pub(crate) fn attach_thread(&self) -> Tid {
        self.thread_count.fetch_add(1, Ordering::SeqCst);
        self.next_tid.fetch_add(1, Ordering::SeqCst)
    }

    /// Drop one thread from the count. Returns true when this was the last
    /// thread and the process's resources were torn down.
    pub(crate) fn detach_thread(&self) -> bool {
        let remaining = self.thread_count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.teardown();
            return true;
        }
        false
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.resources.clear();
        self.spaces.destroy(self.space);
        debug!("process {} torn down", self.pid);
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // A process that never became live still owns an address space
        self.teardown();
    }
}
