use plantmon_sensor_data::{AlarmVector, ChannelId, ChannelValues};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Alarm setpoint {setpoint} must be below the clearpoint {clearpoint}")]
pub(crate) struct InvalidThresholds {
    setpoint: f64,
    clearpoint: f64,
}

/// Hysteresis thresholds shared by all channels.
///
/// A channel enters alarm at or below `setpoint` and leaves it at or above
/// `clearpoint`. Between the two it keeps whatever state it was in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AlarmThresholds {
    setpoint: f64,
    clearpoint: f64,
}

impl AlarmThresholds {
    pub(crate) fn new(setpoint: f64, clearpoint: f64) -> Result<Self, InvalidThresholds> {
        if setpoint < clearpoint {
            Ok(Self {
                setpoint,
                clearpoint,
            })
        } else {
            Err(InvalidThresholds {
                setpoint,
                clearpoint,
            })
        }
    }

    fn next_state(&self, value: f64, alarming: bool) -> bool {
        if value <= self.setpoint {
            true
        } else if value >= self.clearpoint {
            false
        } else {
            alarming
        }
    }

    pub(crate) fn evaluate(&self, values: &ChannelValues, prior: &AlarmVector) -> AlarmVector {
        let mut alarms = *prior;

        for channel in ChannelId::all() {
            alarms.set(
                channel,
                self.next_state(values[channel.index()], prior.is_alarming(channel)),
            );
        }

        alarms
    }
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            setpoint: 10.0,
            clearpoint: 80.0,
        }
    }
}
