//! Wire format of the `miner_getstat1` status call.
//!
//! The response `result` is an array of at least nine strings, several of
//! them semicolon-joined lists:
//!
//! | index | content |
//! |---|---|
//! | 0 | miner version |
//! | 1 | uptime in minutes |
//! | 2 | `totalKHs;accepted;rejected` |
//! | 3 | per-GPU kH/s, `;`-joined (empty when no GPUs) |
//! | 6 | alternating `temp;fan` pairs per GPU |
//! | 7 | active pool |
//! | 8 | `invalid;poolSwitches;...` |
//!
//! Numeric sub-fields are parsed leniently: an unparsable or missing number
//! reads as zero. Only structural problems are errors.

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use super::error::{TelemetryError, TelemetryResult};
use crate::types::HashRate;

/// Request line, sent followed by `\n`.
pub const GETSTAT1_REQUEST: &str = r#"{"id":1,"jsonrpc":"2.0","method":"miner_getstat1"}"#;

/// Minimum number of entries in a `miner_getstat1` result.
pub const GETSTAT1_MIN_FIELDS: usize = 9;

/// Raw JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl ApiResponse {
    /// Decode a response line into a sample.
    pub fn parse_line(line: &str) -> TelemetryResult<TelemetrySample> {
        let response: ApiResponse = serde_json::from_str(line.trim())?;
        response.into_sample()
    }

    pub fn into_sample(self) -> TelemetryResult<TelemetrySample> {
        if let Some(error) = self.error {
            return Err(TelemetryError::Api(error.to_string()));
        }
        let result = self.result.ok_or(TelemetryError::MissingResult)?;
        let fields: Vec<String> = serde_json::from_value(result)?;
        TelemetrySample::from_result(&fields)
    }
}

/// Temperature and fan reading of one GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuSensors {
    pub temp_c: u32,
    pub fan_percent: u32,
}

/// One decoded status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TelemetrySample {
    pub version: String,
    pub uptime_minutes: u64,
    /// Aggregate hash rate in kH/s, as reported.
    pub total_khs: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub invalid: u64,
    pub pool_switches: u64,
    /// Per-GPU hash rates in kH/s.
    pub per_gpu_khs: Vec<u64>,
    pub sensors: Vec<GpuSensors>,
    pub pool: String,
}

impl TelemetrySample {
    /// Decode the string array of a `miner_getstat1` result.
    pub fn from_result(fields: &[String]) -> TelemetryResult<Self> {
        if fields.len() < GETSTAT1_MIN_FIELDS {
            return Err(TelemetryError::ShortResult(fields.len()));
        }

        let mut sample = TelemetrySample {
            version: fields[0].clone(),
            uptime_minutes: lenient(&fields[1]),
            pool: fields[7].clone(),
            ..Default::default()
        };

        let totals: Vec<&str> = fields[2].split(';').collect();
        if totals.len() >= 3 {
            sample.total_khs = lenient(totals[0]);
            sample.accepted = lenient(totals[1]);
            sample.rejected = lenient(totals[2]);
        }

        if !fields[3].is_empty() {
            sample.per_gpu_khs = fields[3].split(';').map(lenient).collect();
        }

        let pairs: Vec<&str> = fields[6].split(';').collect();
        if pairs.len() >= 2 {
            sample.sensors = pairs
                .chunks_exact(2)
                .map(|pair| GpuSensors {
                    temp_c: lenient(pair[0]),
                    fan_percent: lenient(pair[1]),
                })
                .collect();
        }

        let extra: Vec<&str> = fields[8].split(';').collect();
        if extra.len() >= 2 {
            sample.invalid = lenient(extra[0]);
            sample.pool_switches = lenient(extra[1]);
        }

        Ok(sample)
    }

    pub fn hashrate(&self) -> HashRate {
        HashRate::from_kilohashes(self.total_khs)
    }

    /// Aggregate hash rate in MH/s, the unit the chart plots.
    pub fn total_mhs(&self) -> f64 {
        self.total_khs as f64 / 1_000.0
    }
}

fn lenient<T: FromStr + Default>(s: &str) -> T {
    s.trim().parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_reference_sample() {
        let result = fields(&[
            "0.19.0",
            "5",
            "15000;10;1",
            "5000;5000;5000",
            "",
            "",
            "50;70",
            "pool.example:3333",
            "0;2",
        ]);
        let sample = TelemetrySample::from_result(&result).unwrap();
        assert_eq!(sample.version, "0.19.0");
        assert_eq!(sample.uptime_minutes, 5);
        assert_eq!(sample.total_khs, 15000);
        assert_eq!(sample.accepted, 10);
        assert_eq!(sample.rejected, 1);
        assert_eq!(sample.per_gpu_khs, vec![5000, 5000, 5000]);
        assert_eq!(sample.sensors, vec![GpuSensors { temp_c: 50, fan_percent: 70 }]);
        assert_eq!(sample.pool, "pool.example:3333");
        assert_eq!(sample.invalid, 0);
        assert_eq!(sample.pool_switches, 2);
        assert_eq!(sample.total_mhs(), 15.0);
        assert_eq!(sample.hashrate().to_string(), "15.00 MH/s");
    }

    #[test]
    fn test_short_result_is_error() {
        let result = fields(&["0.19.0", "5", "15000;10;1"]);
        assert!(matches!(
            TelemetrySample::from_result(&result),
            Err(TelemetryError::ShortResult(3))
        ));
    }

    #[test]
    fn test_lenient_sub_fields() {
        let result = fields(&[
            "0.19.0", "abc", "x;1", "", "", "", "61;40;62", "", "7",
        ]);
        let sample = TelemetrySample::from_result(&result).unwrap();
        assert_eq!(sample.uptime_minutes, 0);
        // Fewer than three totals: all stay zero
        assert_eq!((sample.total_khs, sample.accepted), (0, 0));
        assert!(sample.per_gpu_khs.is_empty());
        // Odd trailing temperature is ignored
        assert_eq!(sample.sensors.len(), 1);
        assert_eq!(sample.invalid, 0);
        assert_eq!(sample.pool_switches, 0);
    }

    #[test]
    fn test_parse_line() {
        let line = r#"{"id":1,"jsonrpc":"2.0","result":["0.19.0","1","30120;4;0","30120","0;0","off;off;off;off","55;60","eu1.pool:4444","1;0;0;0"]}"#;
        let sample = ApiResponse::parse_line(line).unwrap();
        assert_eq!(sample.total_khs, 30120);
        assert_eq!(sample.invalid, 1);
        assert_eq!(sample.per_gpu_khs, vec![30120]);
    }

    #[test]
    fn test_api_error_member() {
        let line = r#"{"id":1,"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"}}"#;
        match ApiResponse::parse_line(line) {
            Err(TelemetryError::Api(msg)) => assert!(msg.contains("Method not found")),
            other => panic!("expected api error, got {:?}", other),
        }

        // A null error is not an error
        let line = r#"{"id":1,"error":null,"result":["v","0","0;0;0","","","","","p","0;0"]}"#;
        assert!(ApiResponse::parse_line(line).is_ok());
    }

    #[test]
    fn test_structural_failures() {
        assert!(matches!(
            ApiResponse::parse_line("not json"),
            Err(TelemetryError::Decode(_))
        ));
        assert!(matches!(
            ApiResponse::parse_line(r#"{"id":1,"result":[1,2,3]}"#),
            Err(TelemetryError::Decode(_))
        ));
        assert!(matches!(
            ApiResponse::parse_line(r#"{"id":1}"#),
            Err(TelemetryError::MissingResult)
        ));
    }
}
