use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unit of a hold duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

/// A duration as entered by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HolderArgs {
    pub duration: f64,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl HolderArgs {
    pub fn ms(duration: f64) -> Self {
        HolderArgs {
            duration,
            unit: TimeUnit::Milliseconds,
        }
    }

    pub fn s(duration: f64) -> Self {
        HolderArgs {
            duration,
            unit: TimeUnit::Seconds,
        }
    }

    pub fn duration_in_ms(&self) -> f64 {
        match self.unit {
            TimeUnit::Milliseconds => self.duration,
            TimeUnit::Seconds => self.duration * 1000.0,
        }
    }

    /// The duration in whole milliseconds, as the firmware expects it.
    pub fn as_millis(&self) -> u32 {
        self.duration_in_ms().round().clamp(0.0, u32::MAX as f64) as u32
    }

    /// Negative and non-finite durations count as zero.
    pub fn as_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_in_ms() / 1000.0).unwrap_or(Duration::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.as_duration().is_zero()
    }

    /// The part of this duration left after `other`.
    pub fn saturating_sub(&self, other: &HolderArgs) -> HolderArgs {
        HolderArgs::ms((self.duration_in_ms() - other.duration_in_ms()).max(0.0))
    }
}

/// Waits for the duration of a [`HolderArgs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Holder;

impl Holder {
    pub async fn execute(args: HolderArgs) {
        let duration = args.as_duration();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
