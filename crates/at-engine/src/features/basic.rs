//! Basic module control

use at_protocol::misc::BasicCommand;
use tracing::{debug, info};

use crate::error::Result;
use crate::Session;

impl<T> Session<T> {
    /// Check that the module answers `AT`
    pub async fn probe(&self) -> Result<()> {
        self.transact(&BasicCommand::Attention, self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Turn command echo on or off
    ///
    /// Echo filtering follows the new setting once the module has accepted it.
    pub async fn set_echo(&self, on: bool) -> Result<()> {
        self.transact(&BasicCommand::Echo(on), self.config().command_timeout())
            .await?;
        self.shared.correlator.set_echo_filter(on);
        debug!("Command echo {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// Fix the module's baud rate
    ///
    /// The module switches right after `OK`, so the transport has to be
    /// reopened at the new rate by the caller.
    pub async fn set_baud_rate(&self, rate: u32) -> Result<()> {
        let cmd = BasicCommand::baud_rate(rate)?;
        self.transact(&cmd, self.config().command_timeout()).await?;
        info!("Module baud rate set to {}", rate);
        Ok(())
    }

    /// Save the current settings to the user profile
    pub async fn save_profile(&self) -> Result<()> {
        self.transact(&BasicCommand::SaveProfile, self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Power the module down
    ///
    /// The module answers `NORMAL POWER DOWN` instead of `OK`.
    pub async fn power_down(&self, urgent: bool) -> Result<()> {
        let expect = crate::Expect::final_result().token("NORMAL POWER DOWN");
        self.transact_with(
            &BasicCommand::PowerDown { urgent },
            expect,
            self.config().command_timeout(),
        )
        .await?;
        info!("Module powered down");
        Ok(())
    }
}
