//! Certificate validity windows

use std::time::Duration;
use time::OffsetDateTime;

use crate::error::{CertError, CertResult};

/// Validity used when nothing else is configured
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Half-open validity interval `[not_before, not_after)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl ValidityWindow {
    /// Create a window from explicit bounds
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> CertResult<Self> {
        if not_after <= not_before {
            return Err(CertError::Signing(format!(
                "Validity window is empty: not_after ({}) must be after not_before ({})",
                not_after, not_before
            )));
        }

        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Window starting now and lasting `duration`
    pub fn starting_now(duration: Duration) -> CertResult<Self> {
        // X.509 times have second precision
        let now = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .map_err(|e| CertError::Signing(e.to_string()))?;

        let duration = time::Duration::try_from(duration)
            .map_err(|e| CertError::Signing(format!("Invalid validity duration: {}", e)))?;

        let not_after = now
            .checked_add(duration)
            .ok_or_else(|| CertError::Signing("Validity duration overflows".to_string()))?;

        Self::new(now, not_after)
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Check whether `instant` falls inside the window
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant < self.not_after
    }

    pub fn duration(&self) -> Duration {
        (self.not_after - self.not_before).unsigned_abs()
    }
}
