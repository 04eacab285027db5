//! Clock and identifier sources.
//!
//! Protocol logic never reads the system clock or entropy directly; a node
//! is handed a [`Clock`] and a [`UidSource`]. Tests swap in [`ManualClock`]
//! and [`SequentialUid`] to make discovery rounds deterministic.

use crate::error::MeshError;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Length of a discovery identifier in bytes
pub const UID_LEN: usize = 16;

/// Identifier carried by discovery requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub [u8; UID_LEN]);

impl Uid {
    /// Read an identifier from a message payload
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        <[u8; UID_LEN]>::try_from(payload).ok().map(Uid)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }

    /// True for the all-zero identifier
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Millisecond time source
pub trait Clock: Send {
    /// Milliseconds since an arbitrary epoch; wraps around
    fn now_ms(&self) -> u32;
}

/// Source of discovery identifiers
pub trait UidSource: Send {
    /// Produce a fresh identifier
    fn generate(&mut self) -> Result<Uid, MeshError>;
}

/// Monotonic clock counting from its creation
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start a clock at zero
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the wrap-around the protocol expects.
        self.start.elapsed().as_millis() as u32
    }
}

/// Settable clock shared between clones
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock reading `now_ms`
    pub fn new(now_ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(now_ms)),
        }
    }

    /// Set the current time
    pub fn set(&self, now_ms: u32) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move the clock forward, wrapping at `u32::MAX`
    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Identifiers drawn from a seeded or entropy-seeded RNG
#[derive(Debug, Clone)]
pub struct RandomUid {
    rng: StdRng,
}

impl RandomUid {
    /// Seed from operating system entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed deterministically
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl UidSource for RandomUid {
    fn generate(&mut self) -> Result<Uid, MeshError> {
        let mut bytes = [0u8; UID_LEN];
        self.rng.fill_bytes(&mut bytes);
        Ok(Uid(bytes))
    }
}

/// Counter-based identifiers
#[derive(Debug, Clone)]
pub struct SequentialUid {
    next: u128,
}

impl SequentialUid {
    /// Count upwards from `first`
    pub fn starting_at(first: u128) -> Self {
        Self { next: first }
    }
}

impl Default for SequentialUid {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl UidSource for SequentialUid {
    fn generate(&mut self) -> Result<Uid, MeshError> {
        let uid = Uid(self.next.to_be_bytes());
        self.next = self
            .next
            .checked_add(1)
            .ok_or(MeshError::BadSequence("uid sequence exhausted"))?;
        Ok(uid)
    }
}
