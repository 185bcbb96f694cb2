//! Characteristic slots of the accessory state tree.
//!
//! Numeric characteristics hold stepped values within a declared range, the
//! way the accessory protocol expects them. All slots are thread-safe and can
//! be read by the accessory framework while the sink writes them.

use super::notifier::ChangeNotifier;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Common behaviour of every characteristic.
pub trait Characteristic: Send + Sync {
    fn name(&self) -> &'static str;

    /// Incremented each time the stored value changes.
    fn version(&self) -> u32;

    /// Wire the characteristic to the accessory framework's update loop.
    fn set_notifier(&self, notifier: ChangeNotifier);
}

/// Declared range and resolution of a numeric characteristic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Format {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Format {
    /// Clamp into range and round to the nearest step. `None` for NaN/inf.
    pub fn quantize(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let stepped = (value / self.step).round() * self.step;
        Some(stepped.clamp(self.min, self.max))
    }
}

/// Float characteristic with a declared [`Format`].
pub struct NumericCharacteristic {
    name: &'static str,
    format: Format,
    bits: AtomicU64,
    version: AtomicU32,
    notifier: RwLock<Option<ChangeNotifier>>,
}

impl NumericCharacteristic {
    pub fn new(name: &'static str, format: Format, initial: f64) -> Self {
        let initial = format.quantize(initial).unwrap_or(format.min);
        Self {
            name,
            format,
            bits: AtomicU64::new(initial.to_bits()),
            version: AtomicU32::new(0),
            notifier: RwLock::new(None),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Store a new value, quantized to the format.
    ///
    /// Returns `false` and leaves the slot untouched when `value` is not
    /// finite.
    pub fn set(&self, value: f64) -> bool {
        let Some(value) = self.format.quantize(value) else {
            return false;
        };
        let old = self.bits.swap(value.to_bits(), Ordering::SeqCst);
        if old != value.to_bits() {
            self.version.fetch_add(1, Ordering::SeqCst);
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.notify();
            }
        }
        true
    }
}

impl Characteristic for NumericCharacteristic {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    fn set_notifier(&self, notifier: ChangeNotifier) {
        *self.notifier.write() = Some(notifier);
    }
}

/// Boolean characteristic such as motion detected.
pub struct BooleanCharacteristic {
    name: &'static str,
    state: AtomicBool,
    version: AtomicU32,
    notifier: RwLock<Option<ChangeNotifier>>,
}

impl BooleanCharacteristic {
    pub fn new(name: &'static str, initial: bool) -> Self {
        Self {
            name,
            state: AtomicBool::new(initial),
            version: AtomicU32::new(0),
            notifier: RwLock::new(None),
        }
    }

    pub fn get(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Set the state. Increments version and notifies if value changed.
    pub fn set(&self, value: bool) {
        let old = self.state.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.notify();
            }
        }
    }
}

impl Characteristic for BooleanCharacteristic {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    fn set_notifier(&self, notifier: ChangeNotifier) {
        *self.notifier.write() = Some(notifier);
    }
}
