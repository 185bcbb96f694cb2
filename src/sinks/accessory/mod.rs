//! Smart-home accessory sink.
//!
//! [`AccessoryState`] is the tree of characteristics an accessory framework
//! serves to paired controllers. The framework itself (pairing, transport,
//! characteristic identifiers) lives outside this crate; it reads the slots
//! and waits on [`AccessoryState::changed`] for pushes.

mod characteristic;
mod notifier;

pub use characteristic::{BooleanCharacteristic, Characteristic, Format, NumericCharacteristic};
pub use notifier::ChangeNotifier;

use super::Sink;
use crate::config::AccessoryConfig;
use crate::derived::DerivedValues;
use crate::error::SinkError;
use crate::snapshot::{ReadingName, Snapshot};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::Notify;

const TEMPERATURE_FORMAT: Format = Format {
    min: -270.0,
    max: 100.0,
    step: 0.1,
};
const HUMIDITY_FORMAT: Format = Format {
    min: 0.0,
    max: 100.0,
    step: 1.0,
};
const AIR_QUALITY_FORMAT: Format = Format {
    min: 1.0,
    max: 5.0,
    step: 1.0,
};
const CARBON_MONOXIDE_FORMAT: Format = Format {
    min: 0.0,
    max: 1000.0,
    step: 0.1,
};
const NITROGEN_DIOXIDE_FORMAT: Format = Format {
    min: 0.0,
    max: 1000.0,
    step: 1.0,
};
const LIGHT_FORMAT: Format = Format {
    min: 0.0001,
    max: 100_000.0,
    step: 0.0001,
};

/// Identity advertised by the accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
}

impl From<&AccessoryConfig> for AccessoryInfo {
    fn from(config: &AccessoryConfig) -> Self {
        Self {
            name: config.name.clone(),
            serial_number: config.serial_number.clone(),
            manufacturer: config.manufacturer.clone(),
            model: config.model.clone(),
            firmware_revision: config.firmware_revision.clone(),
        }
    }
}

/// Characteristics of the Enviro+ accessory.
pub struct AccessoryState {
    info: AccessoryInfo,
    changed: Arc<Notify>,
    pub temperature: NumericCharacteristic,
    pub humidity: NumericCharacteristic,
    pub air_quality: NumericCharacteristic,
    pub carbon_monoxide: NumericCharacteristic,
    pub nitrogen_dioxide: NumericCharacteristic,
    pub light_level: NumericCharacteristic,
    pub motion: BooleanCharacteristic,
}

impl AccessoryState {
    pub fn new(info: AccessoryInfo) -> Self {
        let state = Self {
            info,
            changed: Arc::new(Notify::new()),
            temperature: NumericCharacteristic::new("current_temperature", TEMPERATURE_FORMAT, 0.0),
            humidity: NumericCharacteristic::new(
                "current_relative_humidity",
                HUMIDITY_FORMAT,
                0.0,
            ),
            air_quality: NumericCharacteristic::new("air_quality", AIR_QUALITY_FORMAT, 1.0),
            carbon_monoxide: NumericCharacteristic::new(
                "carbon_monoxide_level",
                CARBON_MONOXIDE_FORMAT,
                0.0,
            ),
            nitrogen_dioxide: NumericCharacteristic::new(
                "nitrogen_dioxide_density",
                NITROGEN_DIOXIDE_FORMAT,
                0.0,
            ),
            light_level: NumericCharacteristic::new(
                "current_ambient_light_level",
                LIGHT_FORMAT,
                LIGHT_FORMAT.min,
            ),
            motion: BooleanCharacteristic::new("motion_detected", false),
        };

        for characteristic in state.characteristics() {
            characteristic.set_notifier(ChangeNotifier::new(
                state.changed.clone(),
                characteristic.name(),
            ));
        }
        state
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    /// Completes after any characteristic changes.
    pub fn changed(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    pub fn characteristics(&self) -> [&dyn Characteristic; 7] {
        [
            &self.temperature,
            &self.humidity,
            &self.air_quality,
            &self.carbon_monoxide,
            &self.nitrogen_dioxide,
            &self.light_level,
            &self.motion,
        ]
    }
}

/// Writes each cycle into an [`AccessoryState`].
pub struct AccessorySink {
    state: Arc<AccessoryState>,
}

impl AccessorySink {
    pub fn new(state: Arc<AccessoryState>) -> Self {
        Self { state }
    }

    fn set(&self, slot: &NumericCharacteristic, value: f64) {
        if !slot.set(value) {
            debug!("[Accessory] {} ignored non-finite value {}", slot.name(), value);
        }
    }
}

#[async_trait]
impl Sink for AccessorySink {
    fn name(&self) -> &str {
        "accessory"
    }

    async fn publish(&self, snapshot: &Snapshot, derived: &DerivedValues) -> Result<(), SinkError> {
        let state = &self.state;
        self.set(&state.temperature, snapshot.get(ReadingName::Temperature));
        self.set(&state.humidity, snapshot.get(ReadingName::Humidity));
        self.set(&state.air_quality, f64::from(derived.air_quality.value()));
        self.set(&state.carbon_monoxide, derived.carbon_monoxide);
        self.set(&state.nitrogen_dioxide, derived.nitrogen_dioxide);
        self.set(&state.light_level, snapshot.get(ReadingName::Lux));
        state.motion.set(derived.motion_detected);
        Ok(())
    }
}
