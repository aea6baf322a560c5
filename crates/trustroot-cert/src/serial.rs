//! Serial number allocation

use rand::Rng;
use rcgen::SerialNumber;
use std::sync::atomic::{AtomicU64, Ordering};

/// Serial assigned to the self-signed root
pub const ROOT_SERIAL: u64 = 1;

/// How an authority assigns serial numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialPolicy {
    /// Root = 1, then 2, 3, ... for each leaf in issuance order
    #[default]
    Sequential,
    /// Random positive 63-bit serial per certificate
    Random,
}

/// Per-issuer serial allocator
///
/// The counter is atomic so an authority can be shared across threads
/// without ever handing out the same sequential serial twice.
#[derive(Debug)]
pub struct SerialAllocator {
    policy: SerialPolicy,
    next: AtomicU64,
}

impl SerialAllocator {
    /// Allocator for an authority whose own certificate used [`ROOT_SERIAL`]
    pub fn new(policy: SerialPolicy) -> Self {
        Self::starting_at(policy, ROOT_SERIAL + 1)
    }

    /// Allocator resuming a sequence; `next` is the first serial handed out
    ///
    /// Ignored under [`SerialPolicy::Random`].
    pub fn starting_at(policy: SerialPolicy, next: u64) -> Self {
        Self {
            policy,
            next: AtomicU64::new(next),
        }
    }

    pub fn policy(&self) -> SerialPolicy {
        self.policy
    }

    /// Serial the next sequential allocation will return
    pub fn next_serial(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Serial for the root certificate itself
    pub fn root_serial(policy: SerialPolicy) -> u64 {
        match policy {
            SerialPolicy::Sequential => ROOT_SERIAL,
            SerialPolicy::Random => random_serial(),
        }
    }

    /// Allocate the next leaf serial
    pub fn allocate(&self) -> u64 {
        match self.policy {
            SerialPolicy::Sequential => self.next.fetch_add(1, Ordering::SeqCst),
            SerialPolicy::Random => random_serial(),
        }
    }
}

fn random_serial() -> u64 {
    // Non-zero and below 2^63 so the DER INTEGER stays positive and short
    rand::thread_rng().gen_range(1..=i64::MAX as u64)
}

pub(crate) fn to_rcgen(serial: u64) -> SerialNumber {
    SerialNumber::from(serial)
}
