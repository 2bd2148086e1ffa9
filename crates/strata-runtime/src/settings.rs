use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read scheduler settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scheduler settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("distances must satisfy draw <= load <= undraw (got {draw}, {load}, {undraw})")]
    Distances { draw: i32, load: i32, undraw: i32 },
    #[error("cooperative budget must be at least 1")]
    Budget,
}

/// Residency radii in chunks (Chebyshev distance from the nearest viewer)
/// and the unload policy knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Chunks within this radius are rendered.
    pub draw_distance: i32,
    /// Chunks within this radius are generated and kept resident.
    pub load_distance: i32,
    /// Resident chunks beyond this radius are flushed and evicted.
    pub undraw_distance: i32,
    /// Hide chunks that leave the draw radius instead of keeping them active.
    pub aggressive_unload: bool,
    /// Disables aggressive unloading regardless of viewer count.
    pub max_quality: bool,
    /// Aggressive unloading is suspended above this many viewers.
    pub viewer_threshold: usize,
    /// Run generation on the calling thread instead of a worker.
    pub cooperative: bool,
    /// Jobs processed per `update` in cooperative mode.
    pub cooperative_budget: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            draw_distance: 4,
            load_distance: 6,
            undraw_distance: 8,
            aggressive_unload: true,
            max_quality: false,
            viewer_threshold: 1,
            cooperative: false,
            cooperative_budget: 4,
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let ok = 0 <= self.draw_distance
            && self.draw_distance <= self.load_distance
            && self.load_distance <= self.undraw_distance;
        if !ok {
            return Err(SettingsError::Distances {
                draw: self.draw_distance,
                load: self.load_distance,
                undraw: self.undraw_distance,
            });
        }
        if self.cooperative_budget == 0 {
            return Err(SettingsError::Budget);
        }
        Ok(())
    }

    /// Whether chunks outside the draw radius are deactivated for `viewers` viewers.
    #[inline]
    pub fn unloads_aggressively(&self, viewers: usize) -> bool {
        self.aggressive_unload && !self.max_quality && viewers <= self.viewer_threshold
    }

    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nested() {
        SchedulerSettings::default().validate().unwrap();
    }

    #[test]
    fn inverted_radii_are_rejected() {
        let err = SchedulerSettings::from_toml_str("draw_distance = 9").unwrap_err();
        assert!(matches!(err, SettingsError::Distances { draw: 9, .. }));
    }

    #[test]
    fn aggressive_unload_yields_to_quality_and_crowds() {
        let mut s = SchedulerSettings::default();
        assert!(s.unloads_aggressively(1));
        assert!(!s.unloads_aggressively(2));
        s.max_quality = true;
        assert!(!s.unloads_aggressively(1));
    }
}
