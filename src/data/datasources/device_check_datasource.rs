use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::domain::entities::device_check_outcome::DeviceCheckOutcome;

/// Checks locally that a receipt was issued to a given device.
#[async_trait]
pub trait DeviceCheckDatasource: Send + Sync {
    /// device:
    ///   Device identifier (identifierForVendor) in UUID notation.
    /// receipt:
    ///   The Base64-encoded receipt data.
    ///
    /// Returns an error string if the check itself could not run.
    async fn check_device(&self, device: &str, receipt: &str) -> Result<DeviceCheckOutcome, String>;
}

/// Runs the external `checkreceipt` tool, which verifies the receipt's
/// PKCS #7 signature and compares its device hash against the identifier.
pub struct CheckReceiptToolDatasource {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CheckReceiptToolOutput {
    status: Option<i64>,
    error: Option<String>,
}

#[async_trait]
impl DeviceCheckDatasource for CheckReceiptToolDatasource {
    async fn check_device(&self, device: &str, receipt: &str) -> Result<DeviceCheckOutcome, String> {
        let output = Command::new(&self.program)
            .arg("--json-string")
            .arg(receipt)
            .arg("--uuid")
            .arg(device)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.program.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let parsed: CheckReceiptToolOutput = serde_json::from_str(&stdout)
            .map_err(|e| format!("unexpected checkreceipt output {stdout:?}: {e}"))?;
        if let Some(error) = parsed.error {
            return Err(format!("checkreceipt rejected its input: {error}"));
        }
        Ok(DeviceCheckOutcome {
            passed: parsed.status == Some(1),
            output: stdout,
        })
    }
}

impl CheckReceiptToolDatasource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}
