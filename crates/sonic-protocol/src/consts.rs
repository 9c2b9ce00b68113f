//! Numeric device limits referenced by field types.

use std::collections::BTreeMap;

wire_enum! {
    /// Keys of the device parameter constants.
    pub enum DeviceParamConstantType {
        MaxFrequency = "max_frequency",
        MinFrequency = "min_frequency",
        MaxGain = "max_gain",
        MinGain = "min_gain",
        MaxSwf = "max_swf",
        MinSwf = "min_swf",
        MaxTransducerIndex = "max_transducer_index",
        MinTransducerIndex = "min_transducer_index",
        MaxFStep = "max_f_step",
        MinFStep = "min_f_step",
        MaxTOn = "max_t_on",
        MinTOn = "min_t_on",
        MaxTOff = "max_t_off",
        MinTOff = "min_t_off",
        MaxFShift = "max_f_shift",
        MinFShift = "min_f_shift",
        MinNSteps = "min_n_steps",
        MaxNSteps = "max_n_steps",
    }
}

/// A record of numeric limits keyed by [`DeviceParamConstantType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParamConstants {
    values: BTreeMap<DeviceParamConstantType, i64>,
}

impl DeviceParamConstants {
    /// Create an empty record.
    pub fn empty() -> Self {
        DeviceParamConstants {
            values: BTreeMap::new(),
        }
    }

    /// Get a constant.
    pub fn get(&self, key: DeviceParamConstantType) -> Option<i64> {
        self.values.get(&key).copied()
    }

    /// Set a constant, returning the previous value.
    pub fn set(&mut self, key: DeviceParamConstantType, value: i64) -> Option<i64> {
        self.values.insert(key, value)
    }

    /// Builder-style setter.
    pub fn with(mut self, key: DeviceParamConstantType, value: i64) -> Self {
        self.set(key, value);
        self
    }

    /// Merge overrides into this record.
    pub fn merge<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (DeviceParamConstantType, i64)>,
    {
        self.values.extend(overrides);
    }

    /// Iterate over all constants in key order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceParamConstantType, i64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}

impl Default for DeviceParamConstants {
    fn default() -> Self {
        use DeviceParamConstantType::*;
        DeviceParamConstants::empty()
            .with(MaxFrequency, 10_000_000)
            .with(MinFrequency, 100_000)
            .with(MaxGain, 150)
            .with(MinGain, 0)
            .with(MaxSwf, 15)
            .with(MinSwf, 0)
            .with(MaxTransducerIndex, 4)
            .with(MinTransducerIndex, 1)
            .with(MaxFStep, 5_000_000)
            .with(MinFStep, 100)
            .with(MaxTOn, 3_600_000)
            .with(MinTOn, 0)
            .with(MaxTOff, 3_600_000)
            .with(MinTOff, 0)
            .with(MaxFShift, 5_000_000)
            .with(MinFShift, 0)
            .with(MinNSteps, 1)
            .with(MaxNSteps, 100)
    }
}
