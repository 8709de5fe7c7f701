use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;

const WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";
const VIDEO_ID_LEN: usize = 11;

/// Validation failures raised when constructing a [`StormConfig`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid video url: {0}")]
    InvalidVideoUrl(String),
    #[error("messages cannot be empty")]
    NoMessages,
    #[error("message {index} is empty")]
    EmptyMessage { index: usize },
    #[error("channels cannot be empty")]
    NoChannels,
    #[error("channel ids must be positive")]
    NonPositiveChannel,
}

/// How the user picked channels in the storm form. Resolution order is
/// selection order; instance ids are the selected channel ids themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChannelSelection {
    /// The first `count` channels: `{1..=count}`.
    Basic { count: u32 },
    /// An inclusive range: `{start..=end}`.
    Intermediate { start: u32, end: u32 },
    /// An explicit list, kept in the given order.
    Advanced { channels: Vec<u32> },
}

impl ChannelSelection {
    /// Resolve to the ordered channel id list, duplicates removed.
    pub fn resolve(&self) -> Result<Vec<InstanceId>, ConfigError> {
        let raw: Vec<u32> = match self {
            Self::Basic { count } => (1..=*count).collect(),
            Self::Intermediate { start, end } => (*start..=*end).collect(),
            Self::Advanced { channels } => channels.clone(),
        };
        if raw.iter().any(|&id| id == 0) {
            return Err(ConfigError::NonPositiveChannel);
        }
        let mut seen = std::collections::HashSet::new();
        let ids: Vec<InstanceId> = raw
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(InstanceId)
            .collect();
        if ids.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        Ok(ids)
    }
}

/// Rewrite the URL shapes users actually paste into the canonical watch form.
pub fn normalize_video_url(input: &str) -> String {
    let mut url = input.trim().replace("youtu.be/", "youtube.com/watch?v=");
    if let Some(rest) = url.strip_prefix("https://youtube.com") {
        url = format!("https://www.youtube.com{rest}");
    }
    url
}

fn validate_video_url(url: &str) -> Result<(), ConfigError> {
    let err = || ConfigError::InvalidVideoUrl(url.to_string());
    let rest = url.strip_prefix(WATCH_PREFIX).ok_or_else(err)?;
    if url.contains(' ') {
        return Err(err());
    }
    let video_id = rest.split('&').next().unwrap_or("").trim_end_matches('/');
    if video_id.len() != VIDEO_ID_LEN {
        return Err(err());
    }
    Ok(())
}

/// The chat URL is always derived from the watch URL, never taken from input.
pub fn derive_chat_url(video_url: &str) -> String {
    video_url.replacen("watch", "live_chat", 1)
}

fn clean_messages(messages: Vec<String>) -> Result<Vec<String>, ConfigError> {
    if messages.is_empty() {
        return Err(ConfigError::NoMessages);
    }
    let mut cleaned = Vec::with_capacity(messages.len());
    for (index, msg) in messages.into_iter().enumerate() {
        let msg = msg
            .trim_matches(|c| matches!(c, '"' | '\'' | '[' | ']' | ','))
            .to_string();
        if msg.trim().is_empty() {
            return Err(ConfigError::EmptyMessage { index });
        }
        cleaned.push(msg);
    }
    Ok(cleaned)
}

/// Immutable, validated parameters of one storm. Construct through
/// [`StormConfigBuilder`]; mid-session changes go through the `with_*`
/// methods, which return a fresh value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StormConfig {
    video_url: String,
    chat_url: String,
    messages: Vec<String>,
    subscribe: bool,
    subscribe_and_wait: bool,
    subscribe_wait_time: u32,
    slow_mode: u32,
    channels: Vec<InstanceId>,
    background: bool,
}

impl StormConfig {
    pub fn builder(video_url: impl Into<String>) -> StormConfigBuilder {
        StormConfigBuilder::new(video_url)
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn subscribe(&self) -> bool {
        self.subscribe
    }

    pub fn subscribe_and_wait(&self) -> bool {
        self.subscribe_and_wait
    }

    pub fn subscribe_wait_time(&self) -> u32 {
        self.subscribe_wait_time
    }

    pub fn slow_mode(&self) -> u32 {
        self.slow_mode
    }

    pub fn channels(&self) -> &[InstanceId] {
        &self.channels
    }

    pub fn background(&self) -> bool {
        self.background
    }

    /// Replace the message rotation, keeping everything else.
    pub fn with_messages(&self, messages: Vec<String>) -> Result<Self, ConfigError> {
        let messages = clean_messages(messages)?;
        let mut next = self.clone();
        next.messages = messages;
        Ok(next)
    }

    /// Replace the slow-mode delay, keeping everything else.
    pub fn with_slow_mode(&self, slow_mode: u32) -> Self {
        let mut next = self.clone();
        next.slow_mode = slow_mode;
        next
    }
}

/// Builder with normalizing setters. The subscribe flags are coupled: setting
/// `subscribe_and_wait` turns `subscribe` on, clearing `subscribe` turns
/// `subscribe_and_wait` off. Validation happens once, in [`build`].
///
/// [`build`]: StormConfigBuilder::build
#[derive(Clone, Debug)]
pub struct StormConfigBuilder {
    video_url: String,
    messages: Vec<String>,
    subscribe: bool,
    subscribe_and_wait: bool,
    subscribe_wait_time: u32,
    slow_mode: u32,
    selection: Option<ChannelSelection>,
    background: bool,
}

impl StormConfigBuilder {
    pub fn new(video_url: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            messages: Vec::new(),
            subscribe: false,
            subscribe_and_wait: false,
            subscribe_wait_time: 0,
            slow_mode: 0,
            selection: None,
            background: false,
        }
    }

    pub fn messages(mut self, messages: Vec<String>) -> Self {
        self.messages = messages;
        self
    }

    pub fn subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        if !subscribe {
            self.subscribe_and_wait = false;
        }
        self
    }

    pub fn subscribe_and_wait(mut self, wait: bool) -> Self {
        self.subscribe_and_wait = wait;
        if wait {
            self.subscribe = true;
        }
        self
    }

    pub fn subscribe_wait_time(mut self, seconds: u32) -> Self {
        self.subscribe_wait_time = seconds;
        self
    }

    pub fn slow_mode(mut self, seconds: u32) -> Self {
        self.slow_mode = seconds;
        self
    }

    pub fn channels(mut self, selection: ChannelSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn build(self) -> Result<StormConfig, ConfigError> {
        let video_url = normalize_video_url(&self.video_url);
        validate_video_url(&video_url)?;
        let chat_url = derive_chat_url(&video_url);
        let messages = clean_messages(self.messages)?;
        let channels = self
            .selection
            .as_ref()
            .ok_or(ConfigError::NoChannels)?
            .resolve()?;

        Ok(StormConfig {
            video_url,
            chat_url,
            messages,
            subscribe: self.subscribe,
            subscribe_and_wait: self.subscribe_and_wait,
            subscribe_wait_time: self.subscribe_wait_time,
            slow_mode: self.slow_mode,
            channels,
            background: self.background,
        })
    }
}
