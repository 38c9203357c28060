//! ### General commands
use embassy_time::Duration;

use super::Command;

/// Baud rates tried by the liveness probe, most likely first.
pub const BAUD_CANDIDATES: [u32; 4] = [115_200, 9_600, 57_600, 19_200];

/// Attention
pub const AT: Command<'static> = Command::new("AT");

/// Echo off
pub const ECHO_OFF: Command<'static> = Command::new("ATE0").timeout(Duration::from_millis(1000));

/// Product identification (manufacturer, model, revision, IMEI)
pub const IDENTIFY: Command<'static> = Command::new("ATI");
