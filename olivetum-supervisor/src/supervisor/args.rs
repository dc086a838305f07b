//! Command line for a mining run.

use crate::config::{Backend, Mode, WorkerConfig};

/// Loopback address the miner's API listens on.
pub const API_BIND_HOST: &str = "127.0.0.1";

/// Build the miner arguments.
///
/// `backend` is the resolved backend; `Auto` is treated like OpenCL. The API
/// port is passed negated, which makes the miner's API read-only.
pub fn build_args(
    config: &WorkerConfig,
    backend: Backend,
    pool_url: &str,
    api_port: u16,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        backend.flag().into(),
        "--olivetum".into(),
        "--nocolor".into(),
        "-P".into(),
        pool_url.into(),
        "--api-bind".into(),
        format!("{}:-{}", API_BIND_HOST, api_port),
        "--display-interval".into(),
        config.display_interval.to_string(),
    ];
    if config.mode == Mode::Stratum && config.report_hashrate {
        args.push("--report-hashrate".into());
    }
    if !config.selected_devices.is_empty() {
        args.push(backend.devices_flag().into());
        args.extend(config.selected_devices.iter().map(u32::to_string));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratum_opencl() {
        let config = WorkerConfig::default();
        let args = build_args(&config, Backend::OpenCl, "stratum1+tcp://w@h:1", 40123);
        assert_eq!(
            args,
            vec![
                "-G",
                "--olivetum",
                "--nocolor",
                "-P",
                "stratum1+tcp://w@h:1",
                "--api-bind",
                "127.0.0.1:-40123",
                "--display-interval",
                "10",
                "--report-hashrate",
            ]
        );
    }

    #[test]
    fn test_cuda_with_devices() {
        let config = WorkerConfig {
            selected_devices: vec![0, 2],
            report_hashrate: false,
            display_interval: 5,
            ..Default::default()
        };
        let args = build_args(&config, Backend::Cuda, "url", 1);
        assert_eq!(args[0], "-U");
        assert!(!args.contains(&"--report-hashrate".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--cu-devices", "0", "2"]);
    }

    #[test]
    fn test_report_hashrate_only_for_stratum() {
        let config = WorkerConfig {
            mode: Mode::RpcLocal,
            report_hashrate: true,
            selected_devices: vec![1],
            ..Default::default()
        };
        let args = build_args(&config, Backend::Auto, "http://127.0.0.1:18545/", 2);
        assert_eq!(args[0], "-G");
        assert!(!args.contains(&"--report-hashrate".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--cl-devices", "1"]);
    }
}
