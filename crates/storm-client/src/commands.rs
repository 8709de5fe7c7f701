use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use storm_core::{
    ActiveCheck, ChannelInstanceView, ConfigError, ContextReply, InstanceId, StormConfig,
};

use crate::errors::{self, ClientError};

/// Where the engine lives unless the user points the panel elsewhere.
pub const DEFAULT_HOST: &str = "http://localhost:1919";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What `POST /storm/start` hands back: the acknowledgment line plus the
/// initial instance table.
#[derive(Clone, Debug, Deserialize)]
pub struct StartedStorm {
    pub message: String,
    pub channels: BTreeMap<InstanceId, ChannelInstanceView>,
}

/// Display metadata for one provisioned channel, as the roster reports it.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

/// Roster reply for the channel-selection form. `running_channels` is only
/// populated for [`RosterQuery::AddChannels`].
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelsData {
    pub no_of_channels: u32,
    pub channels: BTreeMap<InstanceId, RosterEntry>,
    #[serde(default)]
    pub running_channels: Vec<InstanceId>,
}

/// Which form is asking for the roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RosterQuery {
    /// Fresh storm form; every provisioned channel is selectable.
    NewStorm,
    /// Mid-session additions; the reply also lists the channels already live
    /// so the form can grey them out.
    AddChannels,
}

impl RosterQuery {
    fn mode(self) -> &'static str {
        match self {
            Self::NewStorm => "new",
            Self::AddChannels => "add",
        }
    }
}

/// Free/total system memory in gigabytes, rounded as the engine reports it.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct RamInfo {
    pub free: f64,
    pub total: f64,
}

/// Engine build info from `GET /config`.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineInfo {
    pub version: String,
    pub log_file_path: String,
}

/// REST command client for one engine host. Cheap to clone; clones share
/// the cancellation token, so tearing down a panel aborts everything it
/// still has in flight.
#[derive(Clone)]
pub struct StormClient {
    http: Client,
    host: String,
    cancel: CancellationToken,
}

impl StormClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_cancellation(host, CancellationToken::new())
    }

    pub fn with_cancellation(host: impl Into<String>, cancel: CancellationToken) -> Self {
        let mut host = host.into();
        while host.ends_with('/') {
            host.pop();
        }
        Self {
            http: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            host,
            cancel,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Abort every request in flight on this client and its clones. Used
    /// when the panel unmounts or the host address changes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.host)
    }

    /// Raw request, racing the cancellation token. No envelope
    /// interpretation; some read endpoints answer `success: false` as data.
    async fn fetch(&self, req: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let work = async {
            let resp = req.send().await?;
            let body: Value = resp.json().await?;
            Ok::<Value, ClientError>(body)
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            body = work => body,
        }
    }

    /// Request plus envelope check: `success: false` becomes a classified
    /// error instead of a payload.
    async fn command(&self, req: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let body = self.fetch(req).await?;
        if body["success"].as_bool().unwrap_or(false) {
            Ok(body)
        } else {
            Err(envelope_error(&body))
        }
    }

    // Storm lifecycle.

    /// `GET /` liveness line; used to probe whether a host address works.
    pub async fn ping(&self) -> Result<String, ClientError> {
        let body = self.command(self.http.get(self.url("/"))).await?;
        Ok(message_of(&body))
    }

    pub async fn active_storm(&self) -> Result<ActiveCheck, ClientError> {
        let body = self.fetch(self.http.get(self.url("/storm"))).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Snapshot fetch. All three reply shapes come back as data; it is the
    /// caller's job to react to "no storm" versus a transient failure.
    pub async fn context(&self) -> Result<ContextReply, ClientError> {
        let body = self.fetch(self.http.get(self.url("/storm/context"))).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn start_time(&self) -> Result<DateTime<Utc>, ClientError> {
        let body = self
            .command(self.http.get(self.url("/storm/start_time")))
            .await?;
        let raw = body["start_time"]
            .as_str()
            .ok_or_else(|| ClientError::Network("malformed response: missing start_time".into()))?;
        let time = DateTime::parse_from_rfc3339(raw)
            .map_err(|err| ClientError::Network(format!("malformed response: {err}")))?;
        Ok(time.with_timezone(&Utc))
    }

    /// Start a storm from an already validated config. The resolved channel
    /// list is posted as an explicit selection, so what was validated is
    /// exactly what runs.
    pub async fn start_storm(&self, config: &StormConfig) -> Result<StartedStorm, ClientError> {
        let body = json!({
            "video_url": config.video_url(),
            "messages": config.messages(),
            "slow_mode": config.slow_mode(),
            "subscribe": config.subscribe(),
            "subscribe_and_wait": config.subscribe_and_wait(),
            "subscribe_wait_time": config.subscribe_wait_time(),
            "background": config.background(),
            "channels": {"mode": "advanced", "channels": config.channels()},
        });
        let reply = self
            .command(self.http.post(self.url("/storm/start")).json(&body))
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Release the posting gate without waiting for stragglers.
    pub async fn start_without_waiting(&self) -> Result<String, ClientError> {
        let body = self
            .command(self.http.post(self.url("/storm/start_storm_dont_wait")))
            .await?;
        Ok(message_of(&body))
    }

    pub async fn stop_storm(&self) -> Result<String, ClientError> {
        let body = self.command(self.http.post(self.url("/storm/stop"))).await?;
        Ok(message_of(&body))
    }

    pub async fn pause_storm(&self) -> Result<String, ClientError> {
        let body = self
            .command(self.http.post(self.url("/storm/pause")))
            .await?;
        Ok(message_of(&body))
    }

    pub async fn resume_storm(&self) -> Result<String, ClientError> {
        let body = self
            .command(self.http.post(self.url("/storm/resume")))
            .await?;
        Ok(message_of(&body))
    }

    pub async fn change_messages(&self, messages: Vec<String>) -> Result<String, ClientError> {
        if messages.is_empty() {
            return Err(ConfigError::NoMessages.into());
        }
        let body = self
            .command(
                self.http
                    .post(self.url("/storm/change_messages"))
                    .json(&json!({"messages": messages})),
            )
            .await?;
        Ok(message_of(&body))
    }

    pub async fn change_slow_mode(&self, seconds: u32) -> Result<String, ClientError> {
        let body = self
            .command(
                self.http
                    .post(self.url("/storm/change_slow_mode"))
                    .json(&json!({"slow_mode": seconds})),
            )
            .await?;
        Ok(message_of(&body))
    }

    pub async fn start_more_channels(&self, channels: Vec<u32>) -> Result<String, ClientError> {
        if channels.is_empty() {
            return Err(ConfigError::NoChannels.into());
        }
        let body = self
            .command(
                self.http
                    .post(self.url("/storm/start_more_channels"))
                    .json(&json!({"channels": channels})),
            )
            .await?;
        Ok(message_of(&body))
    }

    pub async fn kill_instance(&self, instance: InstanceId) -> Result<String, ClientError> {
        let body = self
            .command(
                self.http
                    .post(self.url("/storm/kill_instance"))
                    .json(&json!({"index": instance})),
            )
            .await?;
        Ok(message_of(&body))
    }

    pub async fn channels_data(&self, query: RosterQuery) -> Result<ChannelsData, ClientError> {
        let body = self
            .command(
                self.http
                    .post(self.url("/storm/get_channels_data"))
                    .json(&json!({"mode": query.mode()})),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    // Environment.

    /// Fire-and-start: the reply only acknowledges the kickoff. Progress
    /// arrives as `log` events on the feed.
    pub async fn create_profiles(&self, count: u32) -> Result<String, ClientError> {
        let body = self
            .command(
                self.http
                    .post(self.url("/environment/profiles/create"))
                    .json(&json!({"count": count})),
            )
            .await?;
        Ok(message_of(&body))
    }

    pub async fn save_cookies(&self, cookies: Value) -> Result<String, ClientError> {
        let body = self
            .command(
                self.http
                    .post(self.url("/environment/profiles/save_cookies"))
                    .json(&cookies),
            )
            .await?;
        Ok(message_of(&body))
    }

    // Engine info and polling.

    pub async fn engine_info(&self) -> Result<EngineInfo, ClientError> {
        let body = self.command(self.http.get(self.url("/config"))).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// One sample for the 1-second RAM gauge. The reply is bare numbers,
    /// not an envelope.
    pub async fn ram_info(&self) -> Result<RamInfo, ClientError> {
        let body = self
            .fetch(self.http.get(self.url("/get_ram_info")))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    // Settings surfaces the panel renders as-is.

    /// Raw GET without envelope interpretation; `/ai/status` and friends
    /// answer shapes of their own.
    pub async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        self.fetch(self.http.get(self.url(path))).await
    }

    /// Envelope-checked POST for the settings forms.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.command(self.http.post(self.url(path)).json(body)).await
    }

    /// Envelope-checked DELETE (clear-login-data).
    pub async fn delete_json(&self, path: &str) -> Result<Value, ClientError> {
        self.command(self.http.delete(self.url(path))).await
    }
}

impl Default for StormClient {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

fn message_of(body: &Value) -> String {
    body["message"].as_str().unwrap_or_default().to_string()
}

fn envelope_error(body: &Value) -> ClientError {
    let message = body["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .unwrap_or("engine rejected the request without a reason")
        .to_string();
    let code = body["code"].as_str().map(String::from);
    errors::classify(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use storm_core::ChannelSelection;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_config() -> StormConfig {
        StormConfig::builder("https://youtu.be/dQw4w9WgXcQ")
            .messages(vec!["hello".into()])
            .channels(ChannelSelection::Basic { count: 2 })
            .build()
            .unwrap()
    }

    #[test]
    fn trailing_slashes_are_stripped_from_the_host() {
        let client = StormClient::new("http://engine:1919///");
        assert_eq!(client.host(), "http://engine:1919");
    }

    #[tokio::test]
    async fn start_posts_the_normalized_watch_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storm/start"))
            .and(body_partial_json(json!({
                "video_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "channels": {"mode": "advanced", "channels": [1, 2]},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Storm started successfully",
                "channels": {
                    "1": {"name": "Channel 1", "status": 1},
                    "2": {"name": "Channel 2", "status": 1},
                },
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let started = client.start_storm(&sample_config()).await.unwrap();
        assert_eq!(started.message, "Storm started successfully");
        assert_eq!(started.channels.len(), 2);
        assert_eq!(started.channels[&InstanceId(2)].name, "Channel 2");
    }

    #[tokio::test]
    async fn conflict_codes_ask_for_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storm/start"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "success": false,
                "message": "a storm is already running. Stop the current storm before starting a new one",
                "code": "ALREADY_ACTIVE",
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let err = client.start_storm(&sample_config()).await.unwrap_err();
        assert_matches!(err, ClientError::StateConflict { ref code, .. } if code == "ALREADY_ACTIVE");
    }

    #[tokio::test]
    async fn plain_rejections_keep_their_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storm/stop"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "message": "no storm is running",
                "code": "NO_ACTIVE_SESSION",
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let err = client.stop_storm().await.unwrap_err();
        assert_matches!(err, ClientError::Rejected { .. });
        assert_eq!(err.code(), Some("NO_ACTIVE_SESSION"));
        assert_eq!(err.to_string(), "no storm is running");
    }

    #[tokio::test]
    async fn context_parses_every_reply_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storm/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "storm": false,
            })))
            .mount(&server)
            .await;
        let client = StormClient::new(server.uri());
        let reply = client.context().await.unwrap();
        assert!(reply.is_no_storm());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storm/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "timeout",
            })))
            .mount(&server)
            .await;
        let client = StormClient::new(server.uri());
        let reply = client.context().await.unwrap();
        assert_eq!(reply, ContextReply::failed("timeout"));
    }

    #[tokio::test]
    async fn unreachable_hosts_classify_as_network() {
        let client = StormClient::new("http://127.0.0.1:9");
        let err = client.active_storm().await.unwrap_err();
        assert_matches!(err, ClientError::Network(_));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancellation_aborts_an_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storm"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "storm": false, "message": "Storm is not running"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let in_flight = tokio::spawn({
            let client = client.clone();
            async move { client.active_storm().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.cancel();
        let err = in_flight.await.unwrap().unwrap_err();
        assert_matches!(err, ClientError::Cancelled);
    }

    #[tokio::test]
    async fn empty_message_rotation_is_rejected_before_sending() {
        // Unreachable host on purpose: a validation failure must never
        // become a request.
        let client = StormClient::new("http://127.0.0.1:9");
        let err = client.change_messages(vec![]).await.unwrap_err();
        assert_matches!(err, ClientError::Validation(ConfigError::NoMessages));
    }

    #[tokio::test]
    async fn kill_posts_the_instance_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storm/kill_instance"))
            .and(body_partial_json(json!({"index": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Instance killed successfully",
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let message = client.kill_instance(InstanceId(3)).await.unwrap();
        assert_eq!(message, "Instance killed successfully");
    }

    #[tokio::test]
    async fn roster_reply_parses_into_typed_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storm/get_channels_data"))
            .and(body_partial_json(json!({"mode": "add"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "no_of_channels": 2,
                "channels": {
                    "1": {"name": "Channel 1"},
                    "2": {"name": "Channel 2", "logo": "https://example.com/2.png"},
                },
                "running_channels": [1],
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let data = client.channels_data(RosterQuery::AddChannels).await.unwrap();
        assert_eq!(data.no_of_channels, 2);
        assert_eq!(data.channels[&InstanceId(1)].logo, None);
        assert_eq!(
            data.channels[&InstanceId(2)].logo.as_deref(),
            Some("https://example.com/2.png")
        );
        assert_eq!(data.running_channels, vec![InstanceId(1)]);
    }

    #[tokio::test]
    async fn start_time_parses_rfc3339() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storm/start_time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "start_time": "2026-08-25T12:30:01+00:00",
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let time = client.start_time().await.unwrap();
        assert_eq!(time.to_rfc3339(), "2026-08-25T12:30:01+00:00");
    }

    #[tokio::test]
    async fn profile_creation_only_acknowledges_the_kickoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/environment/profiles/create"))
            .and(body_partial_json(json!({"count": 4})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Profile creation started",
            })))
            .mount(&server)
            .await;

        let client = StormClient::new(server.uri());
        let message = client.create_profiles(4).await.unwrap();
        assert_eq!(message, "Profile creation started");
    }
}
