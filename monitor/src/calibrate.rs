use plantmon_sensor_data::{ChannelId, ChannelValues, CHANNEL_COUNT};
use thiserror::Error;

/// Full scale of the sensor ADC. Lower raw readings mean wetter soil.
const RAW_FULL_SCALE: f64 = 1024.0;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum CalibrationError {
    #[error("Calibration range [{low}, {high}] is empty or not finite")]
    InvalidRange { low: f64, high: f64 },

    #[error("Field {field:?} for channel {channel} is not a number")]
    InvalidNumber { channel: usize, field: String },

    #[error("Received {0} fields but there are only {CHANNEL_COUNT} channels")]
    TooManyFields(usize),
}

/// Linear remap window for one channel, in percent of inverted full scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CalibrationRange {
    low: f64,
    high: f64,
}

impl CalibrationRange {
    pub(crate) fn new(low: f64, high: f64) -> Result<Self, CalibrationError> {
        if low.is_finite() && high.is_finite() && low != high {
            Ok(Self { low, high })
        } else {
            Err(CalibrationError::InvalidRange { low, high })
        }
    }

    /// Converts a raw reading into a moisture percentage clamped to [0, 100].
    pub(crate) fn apply(&self, raw: f64) -> f64 {
        let inverted = (RAW_FULL_SCALE - raw) / RAW_FULL_SCALE * 100.0;
        let scaled = (inverted - self.low) / (self.high - self.low) * 100.0;
        scaled.clamp(0.0, 100.0)
    }
}

impl Default for CalibrationRange {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 70.0,
        }
    }
}

impl core::str::FromStr for CalibrationRange {
    type Err = String;

    /// Parses `low:high`, e.g. `20:70`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (low, high) = s
            .split_once(':')
            .ok_or_else(|| format!("expected low:high, got {s:?}"))?;
        let low = low
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid low bound {low:?}: {e}"))?;
        let high = high
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid high bound {high:?}: {e}"))?;
        Self::new(low, high).map_err(|e| e.to_string())
    }
}

/// Result of calibrating one response line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Calibrated {
    pub(crate) values: ChannelValues,
    /// Number of channels present in the line. Channels past this keep their
    /// previous value.
    pub(crate) received: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Calibrator {
    ranges: [CalibrationRange; CHANNEL_COUNT],
}

impl Calibrator {
    pub(crate) fn new(ranges: [CalibrationRange; CHANNEL_COUNT]) -> Self {
        Self { ranges }
    }

    pub(crate) fn calibrate(&self, channel: ChannelId, raw: f64) -> f64 {
        self.ranges[channel.index()].apply(raw)
    }

    /// Calibrates a comma separated response line on top of `previous`.
    ///
    /// Every field is parsed before anything is returned, so a malformed line
    /// never yields a partially updated set of values.
    pub(crate) fn calibrate_line(
        &self,
        line: &str,
        previous: &ChannelValues,
    ) -> Result<Calibrated, CalibrationError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() > CHANNEL_COUNT {
            return Err(CalibrationError::TooManyFields(fields.len()));
        }

        let mut values = *previous;
        for (channel, field) in ChannelId::all().zip(fields.iter()) {
            let raw = field
                .parse::<f64>()
                .ok()
                .filter(|raw| raw.is_finite())
                .ok_or_else(|| CalibrationError::InvalidNumber {
                    channel: channel.index(),
                    field: field.to_string(),
                })?;
            values[channel.index()] = self.calibrate(channel, raw);
        }

        Ok(Calibrated {
            values,
            received: fields.len(),
        })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new([CalibrationRange::default(); CHANNEL_COUNT])
    }
}
