//! Voice call commands

use crate::{terminate, EncodeCommand, ParseError};

/// Maximum speaker volume accepted by `AT+CLVL`
pub const MAX_VOLUME: u8 = 100;

/// Final lines `ATD` can end with besides `OK` and `ERROR`
pub const DIAL_FAILURES: &[&str] = &["BUSY", "NO ANSWER", "NO DIALTONE"];

/// Voice call commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    /// `ATD<number>;` - voice call
    Dial(String),
    /// `ATA` - answer an incoming call
    Answer,
    /// `ATH` - hang up
    HangUp,
    /// `AT+CLIP=<0|1>` - report caller identity with `+CLIP`
    CallerIdPresentation(bool),
    /// `AT+CLVL=<level>` - loudspeaker volume
    SpeakerVolume(u8),
    /// `AT+CMUT=<0|1>` - microphone mute
    Mute(bool),
}

impl CallCommand {
    /// Build `ATD`, rejecting characters a dial string cannot carry
    pub fn dial(number: &str) -> Result<Self, ParseError> {
        let valid = !number.is_empty()
            && number
                .chars()
                .enumerate()
                .all(|(i, c)| c.is_ascii_digit() || c == '*' || c == '#' || (c == '+' && i == 0));
        if valid {
            Ok(CallCommand::Dial(number.to_string()))
        } else {
            Err(ParseError::InvalidArgument(format!(
                "invalid dial string {:?}",
                number
            )))
        }
    }

    /// Build `AT+CLVL`, rejecting levels above [`MAX_VOLUME`]
    pub fn speaker_volume(level: u8) -> Result<Self, ParseError> {
        if level > MAX_VOLUME {
            return Err(ParseError::InvalidArgument(format!(
                "volume {} above {}",
                level, MAX_VOLUME
            )));
        }
        Ok(CallCommand::SpeakerVolume(level))
    }
}

impl EncodeCommand for CallCommand {
    fn encode(&self) -> Vec<u8> {
        let body = match self {
            CallCommand::Dial(number) => format!("ATD{};", number),
            CallCommand::Answer => "ATA".to_string(),
            CallCommand::HangUp => "ATH".to_string(),
            CallCommand::CallerIdPresentation(on) => format!("AT+CLIP={}", u8::from(*on)),
            CallCommand::SpeakerVolume(level) => format!("AT+CLVL={}", level),
            CallCommand::Mute(on) => format!("AT+CMUT={}", u8::from(*on)),
        };
        terminate(body)
    }
}

#[cfg(test)]
mod tests {
    use super::CallCommand;
    use crate::EncodeCommand;

    #[test]
    fn test_dial() {
        let cmd = CallCommand::dial("+5581999999999").unwrap();
        assert_eq!(cmd.encode(), b"ATD+5581999999999;\r\n");
    }

    #[test]
    fn test_dial_rejects_garbage() {
        assert!(CallCommand::dial("").is_err());
        assert!(CallCommand::dial("12;ATH").is_err());
        assert!(CallCommand::dial("12+3").is_err());
        assert!(CallCommand::dial("*100#").is_ok());
    }

    #[test]
    fn test_encode() {
        assert_eq!(CallCommand::Answer.encode(), b"ATA\r\n");
        assert_eq!(CallCommand::HangUp.encode(), b"ATH\r\n");
        assert_eq!(CallCommand::CallerIdPresentation(true).encode(), b"AT+CLIP=1\r\n");
        assert_eq!(CallCommand::Mute(false).encode(), b"AT+CMUT=0\r\n");
    }

    #[test]
    fn test_volume_range() {
        assert_eq!(
            CallCommand::speaker_volume(80).unwrap().encode(),
            b"AT+CLVL=80\r\n"
        );
        assert!(CallCommand::speaker_volume(101).is_err());
    }
}
