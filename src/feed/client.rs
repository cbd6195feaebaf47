use std::time::Duration;

use prost::Message;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::error::{FeedError, FeedResult};
use crate::alerts::track::RawAlert;
use crate::gtfs::structure::realtime::FeedMessage;

/// Fetches the live feeds. Cheap to clone, the connection pool is shared.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    vehicle_positions_url: Url,
    alerts_url: Url,
}

impl FeedClient {
    pub fn new(vehicle_positions_url: &str, alerts_url: &str) -> FeedResult<FeedClient> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FeedError::Init(e.to_string()))?;

        Ok(FeedClient {
            client,
            vehicle_positions_url: Url::parse(vehicle_positions_url)?,
            alerts_url: Url::parse(alerts_url)?,
        })
    }

    async fn request<T>(&self, url: &Url) -> FeedResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        log::debug!("Requesting {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let data_str = response.text().await?;
        log::trace!("Response: {}", data_str);
        let data = serde_json::from_str(&data_str)?;

        Ok(data)
    }

    pub async fn get_vehicle_positions(&self) -> FeedResult<FeedMessage> {
        let url = &self.vehicle_positions_url;
        log::debug!("Requesting {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await?;

        decode_vehicle_feed(content_type.as_deref(), &body)
    }

    pub async fn get_alerts(&self) -> FeedResult<Vec<RawAlert>> {
        self.request(&self.alerts_url).await
    }
}

/// Decodes a vehicle positions feed served as JSON or protobuf.
/// The content type decides, and failing that the first byte.
pub fn decode_vehicle_feed(content_type: Option<&str>, body: &[u8]) -> FeedResult<FeedMessage> {
    let is_json = match content_type {
        Some(ct) if ct.contains("json") => true,
        Some(ct) if ct.contains("protobuf") => false,
        _ => body
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{'),
    };

    if is_json {
        Ok(serde_json::from_slice(body)?)
    } else {
        let message = gtfs_realtime::FeedMessage::decode(body)?;
        Ok(message.into())
    }
}
