//! GPU enumeration through the miner's `--list-devices` mode.
//!
//! The miner prints a table along the lines of
//!
//! ```text
//!  Id Pci Id    Type Name                      CUDA SM   Total Memory ...
//!  --- --------- ---- ------------------------- ---- ----- ------------
//!  0   01:00.0   Gpu  NVIDIA GeForce RTX 3070   Yes  8.6   7.79 GB ...
//! ```
//!
//! Only lines with the index / PCI id / type / name / Yes-No column layout
//! are taken; headers and banners are ignored.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::config::Backend;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Upper bound on a device listing run. Driver initialization can be slow.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);

static DEVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+(\S+)\s+\S+\s+(.+?)\s+(Yes|No)\s+").expect("device line pattern is valid")
});

/// One GPU as reported by the miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: u32,
    pub pci_id: String,
    pub name: String,
}

/// Extract the devices from `--list-devices` output.
pub fn parse_device_list(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter_map(|line| {
            let caps = DEVICE_LINE.captures(line)?;
            Some(Device {
                index: caps[1].parse().ok()?,
                pci_id: caps[2].to_string(),
                name: caps[3].trim().to_string(),
            })
        })
        .collect()
}

/// Run the miner in listing mode for `backend` and parse its table.
///
/// `Auto` lists OpenCL devices. A non-zero exit is an error carrying the
/// miner's output.
pub async fn list_devices(miner: &Path, backend: Backend) -> Result<Vec<Device>> {
    let run = Command::new(miner)
        .args([backend.flag(), "--list-devices"])
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(LIST_TIMEOUT, run)
        .await
        .map_err(|_| Error::DeviceList(format!("timed out after {:?}", LIST_TIMEOUT)))?
        .map_err(|source| Error::Spawn {
            path: miner.to_path_buf(),
            source,
        })?;

    // Combined output: the table goes to stdout on some builds, stderr on others
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(Error::DeviceList(format!(
            "{}\n{}",
            output.status,
            text.trim_end()
        )));
    }
    Ok(parse_device_list(&text))
}

/// Turn `Auto` into a concrete backend: CUDA if the miner sees any CUDA
/// device, OpenCL otherwise (including when the listing fails).
pub async fn resolve_backend(miner: &Path, backend: Backend) -> Backend {
    if backend != Backend::Auto {
        return backend;
    }
    match list_devices(miner, Backend::Cuda).await {
        Ok(devices) if !devices.is_empty() => {
            debug!(count = devices.len(), "CUDA devices found");
            Backend::Cuda
        }
        Ok(_) => Backend::OpenCl,
        Err(e) => {
            debug!(error = %e, "CUDA listing failed, using OpenCL");
            Backend::OpenCl
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
ethminer 0.19.0-olivetum
 Id Pci Id    Type Name                          CUDA SM   Total Memory
 --- --------- ---- ----------------------------- ---- ---   ------------
 0   01:00.0   Gpu  NVIDIA GeForce RTX 3070       Yes  8.6   7.79 GB
 1   02:00.0   Gpu  NVIDIA GeForce GTX 1660 SUPER Yes  7.5   5.80 GB
 2   03:00.0   Gpu  Ellesmere                     No   -     8.00 GB
";

    #[test]
    fn test_parse_device_table() {
        let devices = parse_device_list(LISTING);
        assert_eq!(devices.len(), 3);
        assert_eq!(
            devices[0],
            Device {
                index: 0,
                pci_id: "01:00.0".into(),
                name: "NVIDIA GeForce RTX 3070".into(),
            }
        );
        assert_eq!(devices[1].name, "NVIDIA GeForce GTX 1660 SUPER");
        assert_eq!(devices[2].index, 2);
        assert_eq!(devices[2].name, "Ellesmere");
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_device_list("").is_empty());
        assert!(parse_device_list("No devices found\nError: CUDA not available\n").is_empty());
        // No trailing whitespace after the flag column
        assert!(parse_device_list(" 0 01:00.0 Gpu Name Yes").is_empty());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_miner(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("fake-miner");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_list_devices_reads_stderr_and_flag() {
            let dir = tempfile::tempdir().unwrap();
            // Only answers with a device when invoked with -U
            let miner = fake_miner(
                dir.path(),
                r#"if [ "$1" = "-U" ]; then echo " 0   01:00.0   Gpu  RTX 3070   Yes  8.6  7.79 GB" >&2; fi"#,
            );

            let cuda = list_devices(&miner, Backend::Cuda).await.unwrap();
            assert_eq!(cuda.len(), 1);
            assert_eq!(cuda[0].name, "RTX 3070");

            let opencl = list_devices(&miner, Backend::OpenCl).await.unwrap();
            assert!(opencl.is_empty());

            assert_eq!(resolve_backend(&miner, Backend::Auto).await, Backend::Cuda);
        }

        #[tokio::test]
        async fn test_resolve_falls_back_to_opencl() {
            let dir = tempfile::tempdir().unwrap();
            let miner = fake_miner(dir.path(), "echo 'no CUDA runtime'; exit 1");

            assert!(matches!(
                list_devices(&miner, Backend::Cuda).await,
                Err(Error::DeviceList(_))
            ));
            assert_eq!(resolve_backend(&miner, Backend::Auto).await, Backend::OpenCl);
            assert_eq!(resolve_backend(&miner, Backend::Cuda).await, Backend::Cuda);

            let missing = dir.path().join("does-not-exist");
            assert!(matches!(
                list_devices(&missing, Backend::OpenCl).await,
                Err(Error::Spawn { .. })
            ));
            assert_eq!(resolve_backend(&missing, Backend::Auto).await, Backend::OpenCl);
        }
    }
}
