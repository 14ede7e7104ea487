//! Bearer profile commands (`AT+SAPBR`)
//!
//! The module keeps one IP bearer profile per connection id. The driver only
//! uses connection id 1, which is also what the HTTP stack defaults to.

use std::net::Ipv4Addr;

use crate::error::numeric_arg;
use crate::line::Line;
use crate::{quoted, terminate, EncodeCommand, ParseError};

/// Connection id used for every bearer command
pub const BEARER_CID: u8 = 1;

/// Configurable bearer parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BearerParam {
    /// `CONTYPE` - connection type, `GPRS` or `CSD`
    ConnectionType,
    /// `APN` - access point name
    Apn,
    /// `USER` - user name
    User,
    /// `PWD` - password
    Password,
    /// `PHONENUM` - phone number for CSD calls
    PhoneNumber,
    /// `RATE` - CSD connection rate
    Rate,
}

impl BearerParam {
    /// Tag used on the wire
    pub fn tag(&self) -> &'static str {
        match self {
            BearerParam::ConnectionType => "CONTYPE",
            BearerParam::Apn => "APN",
            BearerParam::User => "USER",
            BearerParam::Password => "PWD",
            BearerParam::PhoneNumber => "PHONENUM",
            BearerParam::Rate => "RATE",
        }
    }

    /// Look up a parameter by its wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CONTYPE" => Some(BearerParam::ConnectionType),
            "APN" => Some(BearerParam::Apn),
            "USER" => Some(BearerParam::User),
            "PWD" => Some(BearerParam::Password),
            "PHONENUM" => Some(BearerParam::PhoneNumber),
            "RATE" => Some(BearerParam::Rate),
            _ => None,
        }
    }
}

/// Bearer commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerCommand {
    /// `AT+SAPBR=1,1`
    Open,
    /// `AT+SAPBR=0,1`
    Close,
    /// `AT+SAPBR=2,1`
    Query,
    /// `AT+SAPBR=3,1,"<tag>","<value>"`
    SetParam(BearerParam, String),
    /// `AT+SAPBR=4,1`
    GetParams,
}

impl EncodeCommand for BearerCommand {
    fn encode(&self) -> Vec<u8> {
        let body = match self {
            BearerCommand::Close => format!("AT+SAPBR=0,{}", BEARER_CID),
            BearerCommand::Open => format!("AT+SAPBR=1,{}", BEARER_CID),
            BearerCommand::Query => format!("AT+SAPBR=2,{}", BEARER_CID),
            BearerCommand::SetParam(param, value) => format!(
                "AT+SAPBR=3,{},{},{}",
                BEARER_CID,
                quoted(param.tag()),
                quoted(value)
            ),
            BearerCommand::GetParams => format!("AT+SAPBR=4,{}", BEARER_CID),
        };
        terminate(body)
    }
}

/// Bearer connection state from `AT+SAPBR=2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BearerStatus {
    /// Being brought up
    Connecting,
    /// Up with an address
    Connected,
    /// Being torn down
    Closing,
    /// Down
    Closed,
}

/// Result of `AT+SAPBR=2,1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerInfo {
    /// Connection id
    pub cid: u8,
    /// Connection state
    pub status: BearerStatus,
    /// Assigned address, if any
    pub address: Option<Ipv4Addr>,
}

/// Parameters reported by `AT+SAPBR=4,1`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerProfile {
    /// Parameters in the order the module listed them
    pub params: Vec<(BearerParam, String)>,
}

impl BearerProfile {
    /// Value of a single parameter
    pub fn get(&self, param: BearerParam) -> Option<&str> {
        self.params
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse the reply to `AT+SAPBR=2,1`, e.g. `+SAPBR: 1,1,"10.89.193.1"`
pub fn parse_query(lines: &[String]) -> Result<BearerInfo, ParseError> {
    let line = lines
        .iter()
        .map(|raw| Line::parse(raw))
        .find(|line| line.name() == "+SAPBR")
        .ok_or(ParseError::MissingLine("+SAPBR"))?;
    let args = line.args();

    let status = match numeric_arg::<u8>(args, 1, "+SAPBR", "bearer status")? {
        0 => BearerStatus::Connecting,
        1 => BearerStatus::Connected,
        2 => BearerStatus::Closing,
        3 => BearerStatus::Closed,
        other => {
            return Err(ParseError::InvalidField {
                field: "bearer status",
                value: other.to_string(),
            })
        }
    };

    // A closed bearer reports 0.0.0.0
    let address = args
        .get(2)
        .and_then(|a| a.parse::<Ipv4Addr>().ok())
        .filter(|a| !a.is_unspecified());

    Ok(BearerInfo {
        cid: numeric_arg(args, 0, "+SAPBR", "connection id")?,
        status,
        address,
    })
}

/// Parse the reply to `AT+SAPBR=4,1`
///
/// The module prints a bare `+SAPBR:` header followed by `TAG: value` lines.
pub fn parse_profile(lines: &[String]) -> Result<BearerProfile, ParseError> {
    let params = lines
        .iter()
        .filter_map(|raw| raw.split_once(':'))
        .filter_map(|(tag, value)| {
            BearerParam::from_tag(tag.trim()).map(|p| (p, value.trim().to_string()))
        })
        .collect();
    Ok(BearerProfile { params })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode() {
        assert_eq!(BearerCommand::Open.encode(), b"AT+SAPBR=1,1\r\n");
        assert_eq!(BearerCommand::Close.encode(), b"AT+SAPBR=0,1\r\n");
        assert_eq!(BearerCommand::Query.encode(), b"AT+SAPBR=2,1\r\n");
        assert_eq!(BearerCommand::GetParams.encode(), b"AT+SAPBR=4,1\r\n");
        assert_eq!(
            BearerCommand::SetParam(BearerParam::Apn, "internet".into()).encode(),
            b"AT+SAPBR=3,1,\"APN\",\"internet\"\r\n"
        );
    }

    #[test]
    fn test_parse_query_connected() {
        let info = parse_query(&lines(&["+SAPBR: 1,1,\"10.89.193.1\""])).unwrap();
        assert_eq!(info.cid, 1);
        assert_eq!(info.status, BearerStatus::Connected);
        assert_eq!(info.address, Some(Ipv4Addr::new(10, 89, 193, 1)));
    }

    #[test]
    fn test_parse_query_closed() {
        let info = parse_query(&lines(&["+SAPBR: 1,3,\"0.0.0.0\""])).unwrap();
        assert_eq!(info.status, BearerStatus::Closed);
        assert_eq!(info.address, None);
    }

    #[test]
    fn test_parse_query_bad_status() {
        assert!(parse_query(&lines(&["+SAPBR: 1,9,\"0.0.0.0\""])).is_err());
        assert!(parse_query(&lines(&["OK"])).is_err());
    }

    #[test]
    fn test_parse_profile() {
        let profile = parse_profile(&lines(&[
            "+SAPBR:",
            "CONTYPE: GPRS",
            "APN: internet",
            "PHONENUM: ",
            "USER: ",
            "PWD: ",
            "RATE: 2",
        ]))
        .unwrap();
        assert_eq!(profile.get(BearerParam::ConnectionType), Some("GPRS"));
        assert_eq!(profile.get(BearerParam::Apn), Some("internet"));
        assert_eq!(profile.get(BearerParam::User), Some(""));
        assert_eq!(profile.get(BearerParam::Rate), Some("2"));
        assert_eq!(profile.params.len(), 6);
    }
}
