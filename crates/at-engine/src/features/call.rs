//! Voice calls

use std::time::Duration;

use at_protocol::call::{CallCommand, DIAL_FAILURES};
use at_protocol::urc::CALL_NOTIFICATIONS;
use at_protocol::EventBits;
use tracing::info;

use crate::correlator::Expect;
use crate::error::Result;
use crate::features::EventGroup;
use crate::Session;

/// How long `ATD` may take before the module answers
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(20);

impl<T> Session<T> {
    /// Start reporting `RING`, `+CLIP` and `NO CARRIER`
    pub fn enable_call_events(&self) {
        self.enable_group(EventGroup::Call, &CALL_NOTIFICATIONS);
    }

    /// Stop reporting call events
    ///
    /// Handlers registered by the caller for the same names stay in place.
    pub fn disable_call_events(&self) {
        self.disable_group(EventGroup::Call);
    }

    /// Dial a voice call
    pub async fn dial(&self, number: &str) -> Result<()> {
        let cmd = CallCommand::dial(number)?;
        let expect = DIAL_FAILURES
            .iter()
            .fold(Expect::final_result(), |e, token| e.failure(*token));
        self.transact_with(&cmd, expect, DIAL_TIMEOUT).await?;
        info!("Dialing {}", number);
        Ok(())
    }

    /// Answer an incoming call
    pub async fn answer(&self) -> Result<()> {
        self.transact(&CallCommand::Answer, self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Hang up the current call
    pub async fn hang_up(&self) -> Result<()> {
        self.transact(&CallCommand::HangUp, self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Enable or disable caller identity reports
    pub async fn set_caller_id(&self, on: bool) -> Result<()> {
        self.transact(
            &CallCommand::CallerIdPresentation(on),
            self.config().command_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Set the loudspeaker volume (0-100)
    pub async fn set_speaker_volume(&self, level: u8) -> Result<()> {
        let cmd = CallCommand::speaker_volume(level)?;
        self.transact(&cmd, self.config().command_timeout()).await?;
        Ok(())
    }

    /// Mute or unmute the microphone
    pub async fn set_mute(&self, on: bool) -> Result<()> {
        self.transact(&CallCommand::Mute(on), self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Block until the next incoming call rings
    pub async fn wait_for_ring(&self, timeout: Duration) -> Result<()> {
        self.wait(EventBits::RING, timeout).await?;
        Ok(())
    }
}
