use embassy_time::Duration;

/// High time of `PWRKEY` before the power-on pulse starts
pub fn pwr_on_lead_time() -> Duration {
    Duration::from_millis(300)
}

/// Low time of `PWRKEY` to trigger module switch on from power off mode.
///
/// The SIM7600 datasheet asks for at least 500 ms; 1.5 s is used to stay
/// clear of the minimum on slow-rising supplies.
pub fn pwr_on_time() -> Duration {
    Duration::from_millis(1500)
}

/// Time to wait for the module to boot after a `PWRKEY` pulse
pub fn boot_time() -> Duration {
    Duration::from_secs(10)
}

/// Time to wait for an already powered module before talking to it
pub fn stabilize_time() -> Duration {
    Duration::from_secs(3)
}

/// Time to wait after reopening the UART at a new baud rate
pub fn baud_switch_time() -> Duration {
    Duration::from_millis(500)
}
