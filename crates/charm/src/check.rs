//! # Invariant Checker
//!
//! A read-only walk over every base entity reporting where the store departs from
//! the invariants the publisher maintains:
//!
//! - at most one owner per name holds the promulgated flag,
//! - every release pointer targets an existing entity, flagged published on that
//!   channel, which supports the series it is released under,
//! - no entity of an owner without the flag carries a promulgated mirror.
//!
//! Interrupted multi-document writes can leave transient violations behind; the
//! checker reports them and repairs nothing.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::channel::Channel;
use crate::error::Error;
use crate::store::{Session, Store};
use crate::url::{Name, Reference, Series};

/// One departure from the store invariants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// More than one owner of a name is flagged promulgated.
    MultiplePromulgated {
        /// The contested name.
        name: Name,
        /// Every flagged base URL.
        owners: Vec<Reference>,
    },
    /// A release pointer targets no stored entity.
    DanglingPointer {
        /// The base entity holding the pointer.
        base: Reference,
        /// The channel of the pointer.
        channel: Channel,
        /// The series key of the pointer.
        series: Series,
        /// The missing target.
        target: Reference,
    },
    /// A release pointer targets an entity not flagged published on its channel.
    UnflaggedTarget {
        /// The base entity holding the pointer.
        base: Reference,
        /// The channel of the pointer.
        channel: Channel,
        /// The series key of the pointer.
        series: Series,
        /// The target lacking its flag.
        target: Reference,
    },
    /// A release pointer is keyed by a series its target does not support.
    UnsupportedSeries {
        /// The base entity holding the pointer.
        base: Reference,
        /// The channel of the pointer.
        channel: Channel,
        /// The offending series key.
        series: Series,
        /// The target.
        target: Reference,
    },
    /// An entity of an owner without the promulgated flag carries a mirror.
    StaleMirror {
        /// The entity.
        url: Reference,
        /// Its leftover promulgated URL.
        promulgated: Reference,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MultiplePromulgated { name, owners } => {
                let owners: Vec<String> = owners.iter().map(ToString::to_string).collect();
                write!(f, "{name} promulgated by {}", owners.join(", "))
            },
            Violation::DanglingPointer {
                base,
                channel,
                series,
                target,
            } => write!(f, "{base} {channel}/{series} points at missing {target}"),
            Violation::UnflaggedTarget {
                base,
                channel,
                series,
                target,
            } => write!(f, "{base} {channel}/{series} points at unflagged {target}"),
            Violation::UnsupportedSeries {
                base,
                channel,
                series,
                target,
            } => write!(f, "{base} {channel}/{series}: {target} does not support {series}"),
            Violation::StaleMirror { url, promulgated } => {
                write!(f, "{url} still mirrored as {promulgated}")
            },
        }
    }
}

impl Store {
    /// Walk the whole store and report every invariant violation, sorted.
    pub async fn check_invariants(&self) -> Result<Vec<Violation>, Error> {
        self.session().await?.check_invariants().await
    }
}

impl Session<'_> {
    pub(crate) async fn check_invariants(&self) -> Result<Vec<Violation>, Error> {
        let bases = self.all_base_entities().await?;
        let mut violations = Vec::new();

        let mut flagged: BTreeMap<&Name, Vec<Reference>> = BTreeMap::new();
        for base in bases.iter().filter(|b| b.promulgated) {
            flagged.entry(&base.name).or_default().push(base.url.clone());
        }
        for (name, owners) in flagged {
            if owners.len() > 1 {
                violations.push(Violation::MultiplePromulgated {
                    name: name.clone(),
                    owners,
                });
            }
        }

        for base in &bases {
            for (channel, pointers) in &base.channel_entities {
                for (series, target) in pointers {
                    let entity = match target.revision() {
                        Some(rev) => self.revision(&target.base_url(), rev).await?,
                        None => None,
                    };
                    let (base, channel, series, target) =
                        (base.url.clone(), *channel, series.clone(), target.clone());
                    let Some(entity) = entity.filter(|e| e.url == target) else {
                        violations.push(Violation::DanglingPointer {
                            base,
                            channel,
                            series,
                            target,
                        });
                        continue;
                    };
                    if !entity.kind.supports(&series) {
                        violations.push(Violation::UnsupportedSeries {
                            base: base.clone(),
                            channel,
                            series: series.clone(),
                            target: target.clone(),
                        });
                    }
                    if !entity.is_published(channel) {
                        violations.push(Violation::UnflaggedTarget {
                            base,
                            channel,
                            series,
                            target,
                        });
                    }
                }
            }

            if !base.promulgated {
                for entity in self.entities(&base.url).await? {
                    if let Some(promulgated) = entity.promulgated_url {
                        violations.push(Violation::StaleMirror {
                            url: entity.url,
                            promulgated,
                        });
                    }
                }
            }
        }

        violations.sort();
        tracing::debug!(
            bases = bases.len(),
            violations = violations.len(),
            "checked invariants"
        );
        Ok(violations)
    }
}
