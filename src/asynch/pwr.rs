use embassy_time::{Duration, Timer};
use embedded_hal::digital::{OutputPin, PinState};

use crate::config::{Config, Timing};
use crate::error::Error;
use crate::expander::{ExpanderPin, IoExpander, LINES};

/// Drives the modem `PWRKEY`.
pub struct PwrCtrl<P: OutputPin> {
    pin: P,
    lead: Duration,
    pulse: Duration,
    boot: Duration,
}

impl<P: OutputPin> PwrCtrl<P> {
    pub fn new(pin: P, timing: &Timing) -> Self {
        Self {
            pin,
            lead: timing.pwrkey_lead,
            pulse: timing.pwrkey_pulse,
            boot: timing.boot_wait,
        }
    }

    /// Power the module on by pulsing `PWRKEY` low, then wait for it to
    /// boot.
    pub async fn power_cycle(&mut self) -> Result<(), Error> {
        debug!("Executing PWRKEY power-on sequence");
        self.pin.set_high().map_err(|_| Error::IoPin)?;
        Timer::after(self.lead).await;
        self.pin.set_low().map_err(|_| Error::IoPin)?;
        Timer::after(self.pulse).await;
        self.pin.set_high().map_err(|_| Error::IoPin)?;

        debug!("PWRKEY sequence complete, waiting for module boot");
        Timer::after(self.boot).await;
        Ok(())
    }

    pub fn release(self) -> P {
        self.pin
    }
}

/// Configure every expander line as a low output, then toggle line 0 once
/// to prove the bus works.
pub async fn init_expander<E: IoExpander>(expander: &mut E) -> Result<(), Error> {
    for line in 0..LINES {
        expander.set_output(line).map_err(hardware)?;
        expander.write(line, PinState::Low).map_err(hardware)?;
    }

    Timer::after(Duration::from_millis(100)).await;
    expander.write(0, PinState::High).map_err(hardware)?;
    Timer::after(Duration::from_millis(10)).await;
    expander.write(0, PinState::Low).map_err(hardware)?;
    Timer::after(Duration::from_millis(10)).await;

    info!("All {} expander outputs configured low", LINES);
    Ok(())
}

/// Expander bring-up followed by either a `PWRKEY` pulse or, when the
/// module is expected to be running already, the stabilisation wait.
pub async fn power_on<E: IoExpander>(expander: &mut E, config: &Config<'_>) -> Result<(), Error> {
    init_expander(expander).await?;

    if config.power_cycle_on_boot {
        let pin = ExpanderPin::new(expander, config.pwrkey_line);
        PwrCtrl::new(pin, &config.timing).power_cycle().await
    } else {
        info!("Skipping PWRKEY sequence, waiting for module to stabilize");
        Timer::after(config.timing.stabilize).await;
        Ok(())
    }
}

fn hardware<E: core::fmt::Debug>(_e: E) -> Error {
    error!("Expander not responding");
    Error::HardwareInit
}
