//! Bridges detections from the audio pipeline onto the alert bus.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::BusHandle;
use crate::types::{AlertEvent, events, object_types, properties};

/// A species detection, as reported by the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Common name.
    pub species_name: String,
    /// Scientific name.
    pub scientific_name: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Where the detection happened.
    #[serde(default)]
    pub location: String,
    /// Whether this is the first detection of the species.
    #[serde(default)]
    pub is_new_species: bool,
}

impl Detection {
    /// Converts the detection into an alert event.
    ///
    /// New species publish `detection.new_species`; everything else
    /// publishes `detection.occurred`.
    #[must_use]
    pub fn to_alert_event(&self) -> AlertEvent {
        let event_name = if self.is_new_species {
            events::DETECTION_NEW_SPECIES
        } else {
            events::DETECTION_OCCURRED
        };

        AlertEvent::event(object_types::DETECTION, event_name)
            .with_property(properties::SPECIES_NAME, self.species_name.as_str())
            .with_property(properties::SCIENTIFIC_NAME, self.scientific_name.as_str())
            .with_property(properties::CONFIDENCE, self.confidence)
            .with_property(properties::LOCATION, self.location.as_str())
    }
}

/// Publishes detections onto whatever bus the handle is bound to.
#[derive(Debug, Clone)]
pub struct DetectionAlertBridge {
    bus: BusHandle,
}

impl DetectionAlertBridge {
    /// Creates a bridge publishing through `bus`.
    #[must_use]
    pub const fn new(bus: BusHandle) -> Self {
        Self { bus }
    }

    /// Returns the bridge name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        "detection-alert-bridge"
    }

    /// Publishes one detection. Returns `false` if no bus is bound yet.
    pub fn process_detection(&self, detection: &Detection) -> bool {
        let published = self.bus.try_publish(detection.to_alert_event());
        if !published {
            trace!(species = %detection.species_name, "alert bus not ready, detection skipped");
        }
        published
    }
}
