#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    // Shared resource errors
    /// The AT engine lock could not be taken within the bounded wait.
    Busy,

    // General device errors
    /// No candidate baud rate produced an answer to `AT`.
    Unresponsive,
    HardwareInit,
    IoPin,
    Transport,

    // Network errors
    SimNotReady,
    RegistrationTimeout,

    // SMS errors
    /// Text mode or character set selection was refused.
    SmsSetup,
    /// The `>` data prompt never arrived.
    NoPrompt,
    SmsRejected,

    /// The modem answered with something that is neither a known success
    /// nor a known failure.
    Ambiguous,

    /// A command or payload did not fit its fixed-size buffer.
    Overflow,
    Config,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::Overflow
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Busy => "AT engine busy",
            Self::Unresponsive => "module not responding at any baud rate",
            Self::HardwareInit => "hardware initialisation failed",
            Self::IoPin => "I/O pin error",
            Self::Transport => "UART transport error",
            Self::SimNotReady => "SIM card not ready",
            Self::RegistrationTimeout => "network registration timed out",
            Self::SmsSetup => "SMS text mode setup refused",
            Self::NoPrompt => "no '>' prompt received",
            Self::SmsRejected => "SMS rejected by modem",
            Self::Ambiguous => "ambiguous modem response",
            Self::Overflow => "buffer overflow",
            Self::Config => "invalid configuration",
        };
        f.write_str(s)
    }
}
