//! HTTP client commands (`AT+HTTP*`)

use crate::error::numeric_arg;
use crate::line::Line;
use crate::{quoted, terminate, EncodeCommand, ParseError};

/// HTTP request method for `AT+HTTPACTION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// HEAD
    Head,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method code used on the wire
    pub fn code(&self) -> u8 {
        match self {
            HttpMethod::Get => 0,
            HttpMethod::Post => 1,
            HttpMethod::Head => 2,
            HttpMethod::Delete => 3,
        }
    }

    /// Decode a wire method code
    pub fn from_code(code: u8) -> Result<Self, ParseError> {
        match code {
            0 => Ok(HttpMethod::Get),
            1 => Ok(HttpMethod::Post),
            2 => Ok(HttpMethod::Head),
            3 => Ok(HttpMethod::Delete),
            other => Err(ParseError::InvalidField {
                field: "HTTP method",
                value: other.to_string(),
            }),
        }
    }
}

/// Parameters set with `AT+HTTPPARA`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HttpParam {
    /// `CID` - bearer profile id
    Cid,
    /// `URL`
    Url,
    /// `UA` - user agent
    UserAgent,
    /// `PROIP` - proxy address
    ProxyIp,
    /// `PROPORT` - proxy port
    ProxyPort,
    /// `REDIR` - follow redirects
    Redirect,
    /// `BREAK` - range start
    Break,
    /// `BREAKEND` - range end
    BreakEnd,
    /// `TIMEOUT` - session timeout in seconds
    Timeout,
    /// `CONTENT` - Content-Type header
    ContentType,
    /// `USERDATA` - extra header lines
    UserData,
}

impl HttpParam {
    /// Tag used on the wire
    pub fn tag(&self) -> &'static str {
        match self {
            HttpParam::Cid => "CID",
            HttpParam::Url => "URL",
            HttpParam::UserAgent => "UA",
            HttpParam::ProxyIp => "PROIP",
            HttpParam::ProxyPort => "PROPORT",
            HttpParam::Redirect => "REDIR",
            HttpParam::Break => "BREAK",
            HttpParam::BreakEnd => "BREAKEND",
            HttpParam::Timeout => "TIMEOUT",
            HttpParam::ContentType => "CONTENT",
            HttpParam::UserData => "USERDATA",
        }
    }

    /// Look up a parameter by its wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            HttpParam::Cid,
            HttpParam::Url,
            HttpParam::UserAgent,
            HttpParam::ProxyIp,
            HttpParam::ProxyPort,
            HttpParam::Redirect,
            HttpParam::Break,
            HttpParam::BreakEnd,
            HttpParam::Timeout,
            HttpParam::ContentType,
            HttpParam::UserData,
        ]
        .into_iter()
        .find(|p| p.tag() == tag)
    }
}

/// HTTP commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCommand {
    /// `AT+HTTPINIT`
    Init,
    /// `AT+HTTPTERM`
    Terminate,
    /// `AT+HTTPPARA="<tag>","<value>"`
    SetParam(HttpParam, String),
    /// `AT+HTTPPARA?`
    GetParams,
    /// `AT+HTTPACTION=<method>` - completion arrives later as `+HTTPACTION`
    Action(HttpMethod),
    /// `AT+HTTPREAD=<start>,<len>`
    Read {
        /// Offset into the response body
        start: usize,
        /// Number of bytes to read
        len: usize,
    },
}

impl EncodeCommand for HttpCommand {
    fn encode(&self) -> Vec<u8> {
        let body = match self {
            HttpCommand::Init => "AT+HTTPINIT".to_string(),
            HttpCommand::Terminate => "AT+HTTPTERM".to_string(),
            HttpCommand::SetParam(param, value) => {
                format!("AT+HTTPPARA={},{}", quoted(param.tag()), quoted(value))
            }
            HttpCommand::GetParams => "AT+HTTPPARA?".to_string(),
            HttpCommand::Action(method) => format!("AT+HTTPACTION={}", method.code()),
            HttpCommand::Read { start, len } => format!("AT+HTTPREAD={},{}", start, len),
        };
        terminate(body)
    }
}

/// Parameters reported by `AT+HTTPPARA?`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpParams {
    /// Parameters in the order the module listed them
    pub params: Vec<(HttpParam, String)>,
}

impl HttpParams {
    /// Value of a single parameter
    pub fn get(&self, param: HttpParam) -> Option<&str> {
        self.params
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse the reply to `AT+HTTPPARA?`
///
/// Each parameter comes on its own `TAG: value` line. Values may contain
/// colons (URLs), so only the first one separates the tag.
pub fn parse_params(lines: &[String]) -> Result<HttpParams, ParseError> {
    let params: Vec<_> = lines
        .iter()
        .filter_map(|raw| raw.split_once(':'))
        .filter_map(|(tag, value)| {
            HttpParam::from_tag(tag.trim()).map(|p| (p, value.trim().to_string()))
        })
        .collect();
    if params.is_empty() {
        return Err(ParseError::MissingLine("+HTTPPARA"));
    }
    Ok(HttpParams { params })
}

/// Extract the body from the reply to `AT+HTTPREAD`
///
/// The reply is a `+HTTPREAD: <len>` header followed by the data lines.
pub fn parse_read(lines: &[String]) -> Result<String, ParseError> {
    let header = lines
        .iter()
        .position(|raw| Line::parse(raw).name() == "+HTTPREAD")
        .ok_or(ParseError::MissingLine("+HTTPREAD"))?;
    let announced: usize = numeric_arg(
        Line::parse(&lines[header]).args(),
        0,
        "+HTTPREAD",
        "data length",
    )?;

    let body = lines[header + 1..].join("\n");
    if body.len() > announced {
        return Err(ParseError::InvalidField {
            field: "HTTP data length",
            value: format!("{} bytes announced, {} received", announced, body.len()),
        });
    }
    Ok(body)
}
