//! Response bodies of the read surface. Field names and nesting are part of the
//! external contract consumed by the web front end.

use crate::{ChannelValues, SensorSnapshot, TimeMillis, CHANNEL_COUNT};
use serde::Serialize;

/// Body of the `sensors` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorsResponse {
    /// Seconds since the Unix epoch.
    pub last_update: i64,
    pub values: ChannelValues,
}

impl From<&SensorSnapshot> for SensorsResponse {
    fn from(value: &SensorSnapshot) -> Self {
        Self {
            last_update: value.timestamp.timestamp(),
            values: value.values,
        }
    }
}

/// `[timestamp_millis, value]`
pub type HistoryPoint = (TimeMillis, f64);

/// Body of the `history` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistoryResponse {
    Channel(Vec<HistoryPoint>),
    All([Vec<HistoryPoint>; CHANNEL_COUNT]),
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    #[test]
    fn sensors_shape() {
        let snapshot = SensorSnapshot {
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_900).unwrap(),
            values: [0.0, 12.5, 100.0, 50.0, 1.0, 2.0],
        };

        let body = serde_json::to_value(SensorsResponse::from(&snapshot)).unwrap();
        assert_eq!(
            body,
            json!({
                "lastUpdate": 1_700_000_000,
                "values": [0.0, 12.5, 100.0, 50.0, 1.0, 2.0],
            })
        );
    }

    #[test]
    fn single_channel_history_shape() {
        let body =
            serde_json::to_value(HistoryResponse::Channel(vec![(1000, 3.0), (2000, 4.5)]))
                .unwrap();
        assert_eq!(body, json!([[1000, 3.0], [2000, 4.5]]));
    }

    #[test]
    fn all_channel_history_shape() {
        let series: [Vec<HistoryPoint>; CHANNEL_COUNT] =
            core::array::from_fn(|i| vec![(1000, i as f64)]);
        let body = serde_json::to_value(HistoryResponse::All(series)).unwrap();
        assert_eq!(
            body,
            json!([
                [[1000, 0.0]],
                [[1000, 1.0]],
                [[1000, 2.0]],
                [[1000, 3.0]],
                [[1000, 4.0]],
                [[1000, 5.0]],
            ])
        );
    }
}
