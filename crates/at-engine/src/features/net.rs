//! GPRS bearer and HTTP client

use std::time::Duration;

use at_protocol::bearer::{self, BearerCommand, BearerInfo, BearerParam, BearerProfile};
use at_protocol::http::{self, HttpCommand, HttpMethod, HttpParam, HttpParams};
use at_protocol::urc::HTTP_NOTIFICATIONS;
use at_protocol::{EventBits, EventKind};
use tracing::{debug, info};

use crate::correlator::Expect;
use crate::error::Result;
use crate::features::EventGroup;
use crate::Session;

/// Opening or closing a bearer can take this long
pub const BEARER_TIMEOUT: Duration = Duration::from_secs(85);

/// `AT+HTTPINIT` timeout
pub const HTTP_INIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of `AT+HTTPACTION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Body length available to [`Session::http_read`]
    pub length: usize,
}

impl<T> Session<T> {
    // -------------------------------------------------------------------------
    // Bearer
    // -------------------------------------------------------------------------

    /// Open the GPRS bearer
    pub async fn open_bearer(&self) -> Result<()> {
        self.transact(&BearerCommand::Open, BEARER_TIMEOUT).await?;
        info!("Bearer open");
        Ok(())
    }

    /// Close the GPRS bearer
    pub async fn close_bearer(&self) -> Result<()> {
        self.transact(&BearerCommand::Close, BEARER_TIMEOUT).await?;
        info!("Bearer closed");
        Ok(())
    }

    /// Bearer status and address
    pub async fn query_bearer(&self) -> Result<BearerInfo> {
        let reply = self
            .transact_with(
                &BearerCommand::Query,
                Expect::final_result().prefix("+SAPBR"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(bearer::parse_query)
    }

    /// Set one bearer parameter
    pub async fn set_bearer_param(&self, param: BearerParam, value: &str) -> Result<()> {
        self.transact(
            &BearerCommand::SetParam(param, value.to_string()),
            self.config().command_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Current bearer parameters
    pub async fn bearer_profile(&self) -> Result<BearerProfile> {
        let reply = self
            .transact_with(
                &BearerCommand::GetParams,
                Expect::final_result().prefix("+SAPBR"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(bearer::parse_profile)
    }

    // -------------------------------------------------------------------------
    // HTTP
    // -------------------------------------------------------------------------

    /// Start the HTTP service and listen for `+HTTPACTION`
    pub async fn http_init(&self) -> Result<()> {
        self.enable_group(EventGroup::Http, &HTTP_NOTIFICATIONS);
        if let Err(e) = self.transact(&HttpCommand::Init, HTTP_INIT_TIMEOUT).await {
            self.disable_group(EventGroup::Http);
            return Err(e);
        }
        Ok(())
    }

    /// Stop the HTTP service
    pub async fn http_terminate(&self) -> Result<()> {
        self.disable_group(EventGroup::Http);
        self.transact(&HttpCommand::Terminate, self.config().command_timeout())
            .await?;
        Ok(())
    }

    /// Set one HTTP parameter
    pub async fn set_http_param(&self, param: HttpParam, value: &str) -> Result<()> {
        self.transact(
            &HttpCommand::SetParam(param, value.to_string()),
            self.config().command_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Current HTTP parameters as reported by the module
    pub async fn http_params(&self) -> Result<HttpParams> {
        let reply = self
            .transact_with(
                &HttpCommand::GetParams,
                Expect::final_result().prefix("+HTTPPARA"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(http::parse_params)
    }

    /// Run a request and wait for its `+HTTPACTION` report
    ///
    /// `timeout` covers the whole request, which the module only reports once
    /// the server has answered.
    pub async fn http_action(&self, method: HttpMethod, timeout: Duration) -> Result<HttpResponse> {
        // Subscribe before sending so a fast report is not missed
        let mut events = self.subscribe();
        self.transact(&HttpCommand::Action(method), self.config().command_timeout())
            .await?;

        let response = super::next_event(&mut events, timeout, |kind| match kind {
            EventKind::HttpAction {
                method: m,
                status,
                length,
            } if *m == method => Some(HttpResponse {
                status: *status,
                length: *length,
            }),
            _ => None,
        })
        .await?;

        self.clear_flags(EventBits::HTTP_ACTION);
        debug!("{:?} finished: {:?}", method, response);
        Ok(response)
    }

    /// Read part of the response body
    pub async fn http_read(&self, start: usize, len: usize) -> Result<String> {
        let reply = self
            .transact_with(
                &HttpCommand::Read { start, len },
                Expect::final_result().prefix("+HTTPREAD"),
                self.config().command_timeout(),
            )
            .await?;
        reply.parse_with(http::parse_read)
    }

    /// `GET` a URL over an open bearer and return status and body
    pub async fn http_get(&self, url: &str, timeout: Duration) -> Result<(u16, String)> {
        self.set_http_param(HttpParam::Cid, &bearer::BEARER_CID.to_string())
            .await?;
        self.set_http_param(HttpParam::Url, url).await?;
        let response = self.http_action(HttpMethod::Get, timeout).await?;
        let body = if response.length > 0 {
            self.http_read(0, response.length).await?
        } else {
            String::new()
        };
        Ok((response.status, body))
    }
}
