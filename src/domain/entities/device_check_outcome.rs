/// Result of the local device cross-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCheckOutcome {
    /// Whether the receipt was issued to the given device.
    pub passed: bool,
    /// Raw output of the check, for diagnostics.
    pub output: String,
}
