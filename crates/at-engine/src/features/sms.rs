//! SMS in text mode
//!
//! Sending is a two-step exchange: `AT+CMGS="<number>"` is answered with the
//! `> ` prompt, then the body followed by Ctrl-Z is sent as a second
//! transaction whose reply carries `+CMGS: <mr>`.

use std::time::Duration;

use at_protocol::sms::{self, DeleteFlag, SmsCommand, SmsFormat, SmsMessage};
use at_protocol::urc::{self, SMS_NOTIFICATIONS};
use at_protocol::EventBits;
use tracing::{info, warn};

use crate::correlator::Expect;
use crate::error::Result;
use crate::features::EventGroup;
use crate::Session;

/// How long the network may take to accept a message
pub const SEND_TIMEOUT: Duration = Duration::from_secs(60);

impl<T> Session<T> {
    /// Start reporting `+CMGS` and `+CMTI`
    pub fn enable_sms_events(&self) {
        self.enable_group(EventGroup::Sms, &SMS_NOTIFICATIONS);
    }

    /// Stop reporting SMS events
    pub fn disable_sms_events(&self) {
        self.disable_group(EventGroup::Sms);
    }

    /// Select PDU or text mode
    pub async fn set_sms_format(&self, format: SmsFormat) -> Result<()> {
        self.transact(&SmsCommand::SetFormat(format), self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Current message format
    pub async fn sms_format(&self) -> Result<SmsFormat> {
        let reply = self
            .transact_with(
                &SmsCommand::QueryFormat,
                Expect::final_result().prefix("+CMGF"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(sms::parse_format)
    }

    /// Read one stored message
    pub async fn read_sms(&self, index: u16) -> Result<SmsMessage> {
        let reply = self
            .transact_with(
                &SmsCommand::Read(index),
                Expect::final_result().prefix("+CMGR"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(sms::parse_message)
    }

    /// Delete stored messages
    pub async fn delete_sms(&self, index: u16, flag: DeleteFlag) -> Result<()> {
        self.transact(
            &SmsCommand::Delete { index, flag },
            self.config().command_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Send a text message and return its reference number
    ///
    /// The module must already be in text mode.
    pub async fn send_sms(&self, number: &str, text: &str) -> Result<u16> {
        let body = sms::encode_body(text)?;

        self.transact_with(
            &SmsCommand::Send(number.to_string()),
            Expect::final_result().prompt(),
            self.config().command_timeout(),
        )
        .await?;

        let result = self
            .transact_bytes(&body, Expect::final_result().prefix(urc::CMGS), SEND_TIMEOUT)
            .await;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Message to {} failed: {}", number, e);
                return Err(e);
            }
        };

        let reference = reply.parse_with(sms::parse_send_reference)?;
        // A registered +CMGS handler never sees the line, it belongs to the reply
        self.shared.flags.set(EventBits::SMS_SENT);
        info!("Message to {} sent, reference {}", number, reference);
        Ok(reference)
    }

    /// Block until a new message is stored
    pub async fn wait_for_sms(&self, timeout: Duration) -> Result<(String, u16)> {
        let mut events = self.subscribe();
        super::next_event(&mut events, timeout, |kind| match kind {
            at_protocol::EventKind::SmsReceived { storage, index } => {
                Some((storage.clone(), *index))
            }
            _ => None,
        })
        .await
    }
}
