//! # Release Channels
//!
//! A channel is a named release track. `unpublished` is not a real channel: it
//! denotes "no channel" and only ever appears as an ACL key or as an explicit,
//! revision-qualified lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

//================================================================================================
// Types
//================================================================================================

/// A release track, ordered from least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// The default, owner-only visibility of freshly uploaded revisions.
    Unpublished,
    /// Bleeding edge builds.
    Edge,
    /// Beta releases.
    Beta,
    /// Release candidates.
    Candidate,
    /// The default channel for resolution.
    Stable,
}

/// An error parsing a channel name.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// The name does not denote any known channel.
    #[error("unknown channel: {0:?}")]
    Unknown(String),
}

//================================================================================================
// Impls
//================================================================================================

impl Channel {
    /// Every channel, `Unpublished` included.
    pub const ALL: [Channel; 5] = [
        Channel::Unpublished,
        Channel::Edge,
        Channel::Beta,
        Channel::Candidate,
        Channel::Stable,
    ];
    /// The channel used when a reference names none.
    pub const DEFAULT: Channel = Channel::Stable;
    /// The channels a revision can actually be released to.
    pub const RELEASE: [Channel; 4] = [
        Channel::Edge,
        Channel::Beta,
        Channel::Candidate,
        Channel::Stable,
    ];

    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Unpublished => "unpublished",
            Channel::Edge => "edge",
            Channel::Beta => "beta",
            Channel::Candidate => "candidate",
            Channel::Stable => "stable",
        }
    }

    /// Whether revisions can be published to this channel.
    pub fn is_release(&self) -> bool {
        !matches!(self, Channel::Unpublished)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ChannelError::Unknown(s.to_owned()))
    }
}

impl Serialize for Channel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
