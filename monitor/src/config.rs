use crate::{
    alarm::{AlarmThresholds, InvalidThresholds},
    calibrate::{CalibrationRange, Calibrator},
};
use clap::{Args, Parser, Subcommand};
use plantmon_sensor_data::{ChannelLabels, LabelCount, CHANNEL_COUNT};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Soil moisture monitor for a six channel sensor array.
#[derive(Parser)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Poll the sensors, raise alarms and log snapshots
    Run(RunArgs),

    /// Print logged history as JSON
    History(HistoryArgs),
}

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Serial port
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Time to wait for the sensors to respond, in milliseconds
    #[arg(long, default_value_t = 5000)]
    serial_timeout: u64,

    /// Sensor poll period, in seconds
    #[arg(long, default_value_t = 2)]
    poll_period: u64,

    /// Snapshot logging period, in seconds
    #[arg(long, default_value_t = 300)]
    snapshot_period: u64,

    /// Moisture percentage at or below which a channel enters alarm
    #[arg(long, default_value_t = 10.0)]
    alarm_setpoint: f64,

    /// Moisture percentage at or above which a channel leaves alarm
    #[arg(long, default_value_t = 80.0)]
    alarm_clearpoint: f64,

    /// Channel names, in channel order
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "Tomatoes,Grape Vines,Petunias,Grass,Spruce,?"
    )]
    labels: Vec<String>,

    /// Calibration of each channel as low:high, in channel order
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "20:70,20:70,20:70,20:70,20:70,20:70"
    )]
    calibrations: Vec<CalibrationRange>,

    /// Snapshot log file
    #[arg(long, default_value = "plantmon.store")]
    store: PathBuf,

    /// Pushbullet access token
    #[arg(long, env = "PLANTMON_PUSHBULLET_TOKEN", hide_env_values = true)]
    pushbullet_token: Option<String>,

    /// File containing the Pushbullet access token
    #[arg(long, conflicts_with = "pushbullet_token")]
    pushbullet_token_file: Option<PathBuf>,

    /// Time allowed for delivering one notification, in seconds
    #[arg(long, default_value_t = 10)]
    notify_timeout: u64,
}

#[derive(Args)]
pub(crate) struct HistoryArgs {
    /// Snapshot log file
    #[arg(long, default_value = "plantmon.store")]
    pub(crate) store: PathBuf,

    /// Channel, or -1 for all channels
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub(crate) sensor: String,

    /// Maximum number of snapshots
    #[arg(long, default_value = "1000", allow_hyphen_values = true)]
    pub(crate) cnt: String,

    /// Only snapshots from the last this many seconds
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) dt: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("{0}")]
    Labels(#[from] LabelCount),

    #[error("Expected {CHANNEL_COUNT} calibrations, got {0}")]
    Calibrations(usize),

    #[error("{0}")]
    Thresholds(#[from] InvalidThresholds),

    #[error("{0} must not be zero")]
    Zero(&'static str),

    #[error("Failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct SerialConfig {
    pub(crate) port: String,
    pub(crate) baud: u32,
    pub(crate) timeout: Duration,
}

/// Validated configuration of the `run` command, fixed at startup.
#[derive(Debug, Clone)]
pub(crate) struct MonitorConfig {
    pub(crate) serial: SerialConfig,
    pub(crate) poll_period: Duration,
    pub(crate) snapshot_period: Duration,
    pub(crate) thresholds: AlarmThresholds,
    pub(crate) calibrator: Calibrator,
    pub(crate) labels: ChannelLabels,
    pub(crate) store: PathBuf,
    pub(crate) pushbullet_token: Option<String>,
    pub(crate) notify_timeout: Duration,
}

fn non_zero(name: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        Err(ConfigError::Zero(name))
    } else {
        Ok(value)
    }
}

impl MonitorConfig {
    pub(crate) fn from_args(args: RunArgs) -> Result<Self, ConfigError> {
        let ranges: [CalibrationRange; CHANNEL_COUNT] = args
            .calibrations
            .try_into()
            .map_err(|v: Vec<CalibrationRange>| ConfigError::Calibrations(v.len()))?;

        let pushbullet_token = match args.pushbullet_token_file {
            Some(path) => Some(
                std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::TokenFile {
                        path: path.clone(),
                        source,
                    })?
                    .trim()
                    .to_owned(),
            ),
            None => args.pushbullet_token,
        };

        Ok(Self {
            serial: SerialConfig {
                port: args.port,
                baud: args.baud,
                timeout: non_zero("serial timeout", Duration::from_millis(args.serial_timeout))?,
            },
            poll_period: non_zero("poll period", Duration::from_secs(args.poll_period))?,
            snapshot_period: non_zero(
                "snapshot period",
                Duration::from_secs(args.snapshot_period),
            )?,
            thresholds: AlarmThresholds::new(args.alarm_setpoint, args.alarm_clearpoint)?,
            calibrator: Calibrator::new(ranges),
            labels: ChannelLabels::try_from(args.labels)?,
            store: args.store,
            pushbullet_token: pushbullet_token.filter(|t| !t.is_empty()),
            notify_timeout: non_zero("notify timeout", Duration::from_secs(args.notify_timeout))?,
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::calibrate::CalibrationRange;

    pub(crate) fn run_config(extra: &[&str]) -> Result<MonitorConfig, ConfigError> {
        let mut argv = vec!["plantmon", "run"];
        argv.extend_from_slice(extra);

        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => MonitorConfig::from_args(args),
            Command::History(_) => panic!("expected run"),
        }
    }

    #[test]
    fn defaults() {
        let config = run_config(&[]).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.serial.timeout, Duration::from_secs(5));
        assert_eq!(config.poll_period, Duration::from_secs(2));
        assert_eq!(config.snapshot_period, Duration::from_secs(300));
        assert_eq!(config.thresholds, AlarmThresholds::default());
        assert_eq!(config.calibrator, Calibrator::default());
        assert_eq!(config.labels, ChannelLabels::default());
        assert_eq!(config.notify_timeout, Duration::from_secs(10));
    }

    #[test]
    fn custom_channels() {
        let config = run_config(&[
            "--labels",
            "a,b,c,d,e,f",
            "--calibrations",
            "0:100,20:70,20:70,20:70,20:70,10:90",
        ])
        .unwrap();

        let mut ranges = [CalibrationRange::default(); CHANNEL_COUNT];
        ranges[0] = CalibrationRange::new(0.0, 100.0).unwrap();
        ranges[5] = CalibrationRange::new(10.0, 90.0).unwrap();

        assert_eq!(config.calibrator, Calibrator::new(ranges));
        assert_eq!(config.labels.to_vec(), vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            run_config(&["--labels", "a,b,c"]),
            Err(ConfigError::Labels(LabelCount(3)))
        ));
        assert!(matches!(
            run_config(&["--calibrations", "20:70,20:70"]),
            Err(ConfigError::Calibrations(2))
        ));
        assert!(matches!(
            run_config(&["--alarm-setpoint", "90"]),
            Err(ConfigError::Thresholds(_))
        ));
        assert!(matches!(
            run_config(&["--poll-period", "0"]),
            Err(ConfigError::Zero("poll period"))
        ));
        assert!(matches!(
            run_config(&["--pushbullet-token-file", "/nonexistent/plantmon.token"]),
            Err(ConfigError::TokenFile { .. })
        ));
    }

    #[test]
    fn empty_calibration_range_is_a_parse_error() {
        assert!(Cli::try_parse_from(["plantmon", "run", "--calibrations", "50:50"]).is_err());
    }

    #[test]
    fn history_arguments() {
        let Command::History(args) =
            Cli::try_parse_from(["plantmon", "history", "--sensor", "-1", "--dt", "60"])
                .unwrap()
                .command
        else {
            panic!("expected history");
        };

        assert_eq!(args.sensor, "-1");
        assert_eq!(args.cnt, "1000");
        assert_eq!(args.dt.as_deref(), Some("60"));
    }
}
