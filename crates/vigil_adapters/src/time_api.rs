//! Steam's time endpoint, backing clock-skew correction.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::{debug, instrument};
use vigil_core::config::Settings;
use vigil_core::ports::TimeEndpoint;
use vigil_core::Error;

use crate::network::{build_api_client, API_BASE_URL};

const QUERY_TIME_PATH: &str = "/ITwoFactorService/QueryTime/v0001/";

#[derive(Debug, Deserialize)]
struct QueryTimeResponse {
    response: QueryTimeBody,
}

#[derive(Debug, Deserialize)]
struct QueryTimeBody {
    server_time: String,
}

pub struct SteamTimeEndpoint {
    client: Client,
    base_url: String,
}

impl SteamTimeEndpoint {
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        Ok(Self {
            client: build_api_client(&settings.network)?,
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl TimeEndpoint for SteamTimeEndpoint {
    #[instrument(skip(self))]
    async fn server_time(&self) -> Result<u64, Error> {
        let url = format!("{}{}", self.base_url, QUERY_TIME_PATH);

        // The endpoint takes no body but insists on an explicit length.
        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("time query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "time query returned HTTP {}",
                response.status()
            )));
        }

        let body: QueryTimeResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed time response: {}", e)))?;

        let server_time = body
            .response
            .server_time
            .parse::<u64>()
            .map_err(|_| Error::Protocol("server_time is not a number".to_string()))?;

        debug!(server_time, "queried server time");
        Ok(server_time)
    }
}
