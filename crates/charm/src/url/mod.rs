//! # Charm References
//!
//! This module contains the identity model of the store: the [`Reference`] type
//! naming an artifact (fully or partially), the validated components it is built
//! from, and the derivations the rest of the engine groups and aliases by.
//!
//! ## Syntax
//!
//! ```text
//! [cs:][~user/][series/]name[-revision]
//! ```
//!
//! - **user** - the owning user. When absent the reference addresses the
//!   *promulgated* namespace for the name, not an ownerless artifact.
//! - **series** - the target platform (`trusty`, `xenial`, ...) or the
//!   pseudo-series `bundle`. Absent for multi-series charms.
//! - **name** - lowercase letters, digits and hyphens, starting with a letter.
//!   A trailing `-<digits>` is always read as the revision.
//! - **revision** - a non-negative integer.
//!
//! The release channel is not part of the textual form. It rides along as an
//! informational field set with [`Reference::with_channel`], and is dropped when
//! a reference is serialized.
//!
//! ## Derivations
//!
//! - [`Reference::base_url`] strips series, revision and channel, yielding the
//!   grouping key of one (user, name) pair.
//! - [`Reference::promulgated`] re-homes a reference into the user-less
//!   namespace under a promulgated revision.
//!
//! ```rust
//! use charm::Reference;
//!
//! let url: Reference = "cs:~alice/trusty/foo-3".parse().unwrap();
//! assert_eq!(url.base_url().to_string(), "cs:~alice/foo");
//! assert_eq!(url.promulgated(7).to_string(), "cs:trusty/foo-7");
//! ```


use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use lazy_regex::{Lazy, Regex};
use nom::IResult;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, opt};
use nom::sequence::{delimited, pair};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::Channel;

//================================================================================================
// Statics
//================================================================================================

static NAME_REGEX: Lazy<Regex> =
    lazy_regex::lazy_regex!(r"^[a-z][a-z0-9]*(-[a-z0-9]*[a-z][a-z0-9]*)*$");
static USER_REGEX: Lazy<Regex> = lazy_regex::lazy_regex!(r"^[a-z0-9][a-zA-Z0-9+.-]+$");
static SERIES_REGEX: Lazy<Regex> = lazy_regex::lazy_regex!(r"^[a-z]+([a-z0-9]+)?$");

const SCHEMA: &str = "cs:";

//================================================================================================
// Types
//================================================================================================

/// A vetted package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Name(String);

/// A vetted owning user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct User(String);

/// A vetted series, including the `bundle` pseudo-series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Series(String);

/// A possibly partial reference to a stored artifact.
///
/// It is typically created through the `FromStr` implementation and refined with the
/// `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    user: Option<User>,
    name: Name,
    series: Option<Series>,
    revision: Option<u32>,
    channel: Option<Channel>,
}

/// An error encountered when parsing or validating a reference.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    /// The reference has no name.
    #[error("a charm reference cannot be empty")]
    Empty,
    /// The name contains invalid characters or shape.
    #[error("invalid charm name: {0:?}")]
    BadName(String),
    /// The user contains invalid characters or shape.
    #[error("invalid user name: {0:?}")]
    BadUser(String),
    /// The series contains invalid characters or shape.
    #[error("invalid series: {0:?}")]
    BadSeries(String),
    /// The revision is not a non-negative integer.
    #[error("invalid revision: {0:?}")]
    BadRevision(String),
    /// The reference has more path segments than the syntax allows.
    #[error("malformed charm reference: {0:?}")]
    Malformed(String),
}

#[derive(Debug, PartialEq, Eq)]
struct Parts<'a> {
    user: Option<&'a str>,
    series: Option<&'a str>,
    name: &'a str,
    revision: Option<&'a str>,
}

//================================================================================================
// Impls
//================================================================================================

macro_rules! vetted {
    ($ty:ident, $regex:ident, $err:ident) => {
        impl $ty {
            fn validate(s: &str) -> Result<(), UrlError> {
                if $regex.is_match(s) {
                    Ok(())
                } else {
                    Err(UrlError::$err(s.to_owned()))
                }
            }
        }

        impl Deref for $ty {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = UrlError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::validate(s)?;
                Ok($ty(s.to_owned()))
            }
        }

        impl TryFrom<String> for $ty {
            type Error = UrlError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $ty::validate(&s)?;
                Ok($ty(s))
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = UrlError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

vetted!(Name, NAME_REGEX, BadName);
vetted!(User, USER_REGEX, BadUser);
vetted!(Series, SERIES_REGEX, BadSeries);

impl Series {
    /// The pseudo-series bundles are released under.
    pub fn bundle() -> Self {
        Series(crate::BUNDLE_SERIES.to_owned())
    }

    /// Whether this is the `bundle` pseudo-series.
    pub fn is_bundle(&self) -> bool {
        self.0 == crate::BUNDLE_SERIES
    }
}

impl Reference {
    /// A reference naming only a package, in the promulgated namespace.
    pub fn new(name: Name) -> Self {
        Reference {
            user: None,
            name,
            series: None,
            revision: None,
            channel: None,
        }
    }

    /// Set the owning user.
    #[must_use]
    pub fn with_user(mut self, user: Option<User>) -> Self {
        self.user = user;
        self
    }

    /// Set the series constraint.
    #[must_use]
    pub fn with_series(mut self, series: Option<Series>) -> Self {
        self.series = series;
        self
    }

    /// Set the revision.
    #[must_use]
    pub fn with_revision(mut self, revision: Option<u32>) -> Self {
        self.revision = revision;
        self
    }

    /// Set the informational channel tag used by resolution.
    #[must_use]
    pub fn with_channel(mut self, channel: Option<Channel>) -> Self {
        self.channel = channel;
        self
    }

    /// The owning user, `None` for the promulgated namespace.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The package name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The series, `None` for multi-series artifacts or wildcards.
    pub fn series(&self) -> Option<&Series> {
        self.series.as_ref()
    }

    /// The revision, `None` for wildcards.
    pub fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// The channel tag, if any.
    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// Whether this reference addresses the user-less promulgated namespace.
    pub fn is_promulgated_namespace(&self) -> bool {
        self.user.is_none()
    }

    /// The grouping key of all revisions of this (user, name) pair.
    #[must_use]
    pub fn base_url(&self) -> Reference {
        Reference {
            user: self.user.clone(),
            name: self.name.clone(),
            series: None,
            revision: None,
            channel: None,
        }
    }

    /// This reference re-homed into the promulgated namespace at `revision`.
    #[must_use]
    pub fn promulgated(&self, revision: u32) -> Reference {
        Reference {
            user: None,
            name: self.name.clone(),
            series: self.series.clone(),
            revision: Some(revision),
            channel: None,
        }
    }

    /// Whether this names one concrete stored artifact: owned and revisioned.
    pub fn is_concrete(&self) -> bool {
        self.user.is_some() && self.revision.is_some()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEMA)?;
        if let Some(user) = &self.user {
            write!(f, "~{user}/")?;
        }
        if let Some(series) = &self.series {
            write!(f, "{series}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(revision) = self.revision {
            write!(f, "-{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Parts {
            user,
            series,
            name,
            revision,
        } = Parts::parse(s)?;

        let revision = revision
            .map(|r| r.parse::<u32>().map_err(|_| UrlError::BadRevision(r.to_owned())))
            .transpose()?;

        let reference = Reference {
            user: user.map(User::try_from).transpose()?,
            name: Name::try_from(name)?,
            series: series.map(Series::try_from).transpose()?,
            revision,
            channel: None,
        };

        tracing::trace!(input = s, reference = %reference, "parsed charm reference");

        Ok(reference)
    }
}

impl TryFrom<String> for Reference {
    type Error = UrlError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Reference {
    type Error = UrlError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Reference> for String {
    fn from(r: Reference) -> Self {
        r.to_string()
    }
}

impl<'a> Parts<'a> {
    fn parse(input: &'a str) -> Result<Self, UrlError> {
        let malformed = || UrlError::Malformed(input.to_owned());

        let (path, (_, user)) =
            pair(opt(tag(SCHEMA)), user)(input).map_err(|_: nom::Err<()>| malformed())?;

        let (series, tail) = match path.split_once('/') {
            Some((_, tail)) if tail.contains('/') => return Err(malformed()),
            Some((series, tail)) => (Some(series), tail),
            None => (None, path),
        };

        if tail.is_empty() {
            return Err(UrlError::Empty);
        }

        let (name, revision) = split_revision(tail);

        Ok(Parts {
            user,
            series,
            name,
            revision,
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

fn user<'a, E: nom::error::ParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Option<&'a str>, E> {
    opt(delimited(tag("~"), take_until("/"), tag("/")))(input)
}

/// Split a trailing `-<digits>` off as the revision.
fn split_revision(input: &str) -> (&str, Option<&str>) {
    match input.rsplit_once('-') {
        Some((name, rev))
            if !name.is_empty() && all_consuming(digit1::<_, ()>)(rev).is_ok() =>
        {
            (name, Some(rev))
        },
        _ => (input, None),
    }
}
