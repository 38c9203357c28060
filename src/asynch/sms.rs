use super::{AtEngine, Sequence};
use crate::command::sms::{self, Confirmation};
use crate::command::Command;
use crate::config::{Sms, Timing};
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// Send a text message in GSM text mode.
///
/// Fails hard on setup or prompt problems. After submission the final
/// answer is one of sent, rejected ([`Error::SmsRejected`]) or neither
/// ([`Error::Ambiguous`]).
pub struct SendSms<'a> {
    recipient: &'a str,
    text: &'a str,
    timing: &'a Timing,
}

impl<'a> SendSms<'a> {
    pub fn new(recipient: &'a str, text: &'a str, timing: &'a Timing) -> Self {
        Self {
            recipient,
            text,
            timing,
        }
    }

    pub fn from_config(sms: &'a Sms<'a>, timing: &'a Timing) -> Self {
        Self::new(sms.recipient, sms.text, timing)
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for SendSms<'_> {
    type Output = ();

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<(), Error> {
        if !at.execute(&sms::TEXT_MODE).await?.is_ok() {
            error!("Failed to set SMS text mode");
            return Err(Error::SmsSetup);
        }
        at.settle(self.timing.sms_settle).await?;

        if !at.execute(&sms::CHARSET_GSM).await?.is_ok() {
            error!("Failed to set character set");
            return Err(Error::SmsSetup);
        }
        at.settle(self.timing.sms_settle).await?;

        debug!("Setting recipient {}", self.recipient);
        let send = sms::send(self.recipient)?;
        let command = Command::new(&send)
            .timeout(self.timing.sms_prompt_timeout)
            .until(sms::PROMPT_UNTIL)
            .expect(sms::PROMPT_OK);
        if !at.execute(&command).await?.is_ok() {
            error!("Did not receive '>' prompt");
            return Err(Error::NoPrompt);
        }
        at.settle(self.timing.sms_settle).await?;

        at.transmit(self.text.as_bytes()).await?;
        at.settle(self.timing.sms_body_settle).await?;
        at.transmit(&[sms::CTRL_Z]).await?;
        debug!("Message submitted, waiting for confirmation");

        let (response, _) = at
            .listen(self.timing.sms_confirm_timeout, sms::CONFIRM_UNTIL)
            .await?;
        match sms::confirmation(&response) {
            Confirmation::Sent => {
                info!("SMS sent to {}", self.recipient);
                at.console().write_str("\r\nSMS sent\r\n");
                Ok(())
            }
            Confirmation::Failed => {
                error!("SMS rejected");
                at.console().write_str("\r\nSMS failed\r\n");
                Err(Error::SmsRejected)
            }
            Confirmation::Unclear => {
                warn!("Unclear SMS response, message may or may not have been sent");
                at.console().write_str("\r\nSMS status unclear\r\n");
                Err(Error::Ambiguous)
            }
        }
    }
}
