/*!
 * Core Types
 * Common identifier types used across the scheduling core
 */

/// Process ID type
pub type Pid = u32;

/// Thread ID type (kernel-wide unique)
pub type Tid = u64;

/// Physical core index into the kernel's core array
pub type CoreId = usize;

/// Priority level (0..PRIORITY_LEVELS, higher is more important)
pub type Priority = u8;

/// Monotonic timestamp in nanoseconds since boot
pub type Timestamp = u64;

/// Address space identifier handed out by the address-space manager
pub type AddressSpaceId = u64;

/// Wake-channel identifier for grouped blockers
pub type ChannelId = u64;
