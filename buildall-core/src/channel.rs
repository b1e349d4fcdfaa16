//! Channels, upload labels and the channel precedence used for builds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Base URL that short `owner/label/name` channels resolve against.
pub const ANACONDA_CHANNEL_BASE: &str = "https://conda.anaconda.org";

/// A package channel: either a full URL or a short `owner[/label/name]` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel(pub String);

impl Channel {
    /// Fully-qualified channel URL.
    ///
    /// `defaults` is a conda alias and is passed through untouched.
    pub fn url(&self) -> String {
        let raw = self.0.trim().trim_end_matches('/');
        if raw.contains("://") || raw == "defaults" {
            raw.to_string()
        } else {
            format!("{ANACONDA_CHANNEL_BASE}/{}", raw.trim_start_matches('/'))
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Channel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Standard partitions of a hosting-service channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Main,
    Dev,
    Rc,
    Beta,
}

/// Labels checked for existing packages by default.
pub const STANDARD_LABELS: [Label; 4] = [Label::Main, Label::Dev, Label::Rc, Label::Beta];

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Main => "main",
            Label::Dev => "dev",
            Label::Rc => "rc",
            Label::Beta => "beta",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Label::Main),
            "dev" => Ok(Label::Dev),
            "rc" => Ok(Label::Rc),
            "beta" => Ok(Label::Beta),
            other => Err(CoreError::UnknownLabel(other.to_string())),
        }
    }
}

/// Fixed channels wrapped around the user's channels for every build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPolicy {
    /// Account whose labels are checked and uploaded to.
    pub owner: String,
    /// Put in front of the user's channels.
    pub upstream: Channel,
    /// Appended after the user's channels.
    pub fallback: Channel,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            owner: "omnia".to_string(),
            upstream: Channel::from("conda-forge"),
            fallback: Channel::from("defaults"),
        }
    }
}

impl ChannelPolicy {
    /// `<owner>/label/<label>`
    pub fn label_channel(&self, label: Label) -> Channel {
        Channel(format!("{}/label/{}", self.owner, label))
    }

    /// The owner's four standard-label channels.
    pub fn default_check_against(&self) -> Vec<Channel> {
        STANDARD_LABELS
            .iter()
            .map(|label| self.label_channel(*label))
            .collect()
    }

    /// Channel list for one build, highest precedence first: the extra label
    /// channel, upstream, the user's channels, fallback. Repeats keep their
    /// first position.
    pub fn build_channels(&self, extra_label: Option<Label>, user: &[Channel]) -> Vec<Channel> {
        let mut ordered: Vec<Channel> = Vec::with_capacity(user.len() + 3);
        let candidates = extra_label
            .map(|label| self.label_channel(label))
            .into_iter()
            .chain(std::iter::once(self.upstream.clone()))
            .chain(user.iter().cloned())
            .chain(std::iter::once(self.fallback.clone()));
        for channel in candidates {
            if !ordered.contains(&channel) {
                ordered.push(channel);
            }
        }
        ordered
    }
}
