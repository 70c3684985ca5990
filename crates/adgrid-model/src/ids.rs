// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Campaign,
    AdGroup,
    ContentAd,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::ContentAd => "content_ad",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "account" => Some(Self::Account),
            "campaign" => Some(Self::Campaign),
            "ad_group" => Some(Self::AdGroup),
            "content_ad" => Some(Self::ContentAd),
            _ => None,
        }
    }
}

/// Reference to a domain object a row is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub const fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Parses the `kind:id` form used on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        let (kind, id) = value.split_once(':')?;
        let kind = EntityKind::parse(kind.trim())?;
        let id = id.trim().parse::<i64>().ok()?;
        if id <= 0 {
            return None;
        }
        Some(Self { kind, id })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

const PATH_SEPARATOR: &str = "||";
const FOOTER_ID: &str = "__footer__";

/// Grid-wide row identity: the chain of per-parent row ids joined with `||`.
///
/// Row ids are only unique among siblings, so everything that has to address a
/// row across the whole grid (collapse state, selection, save serialization)
/// keys on the full path instead.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BreakdownId(String);

impl BreakdownId {
    pub fn root(row_id: &str) -> Self {
        Self(row_id.to_owned())
    }

    pub fn footer() -> Self {
        Self(FOOTER_ID.to_owned())
    }

    pub fn child(&self, row_id: &str) -> Self {
        Self(format!("{}{PATH_SEPARATOR}{row_id}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_footer(&self) -> bool {
        self.0 == FOOTER_ID
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn row_id(&self) -> &str {
        self.segments().last().unwrap_or(self.0.as_str())
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(PATH_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_owned()))
    }

    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(PATH_SEPARATOR)
    }
}

impl fmt::Display for BreakdownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{BreakdownId, EntityKind, EntityRef};

    #[test]
    fn breakdown_id_tracks_path_segments() {
        let campaign = BreakdownId::root("12");
        let source = campaign.child("outbrain");

        assert_eq!(source.as_str(), "12||outbrain");
        assert_eq!(source.depth(), 2);
        assert_eq!(source.row_id(), "outbrain");
        assert_eq!(source.parent(), Some(campaign.clone()));
        assert_eq!(campaign.parent(), None);
    }

    #[test]
    fn ancestor_check_respects_segment_boundaries() {
        let parent = BreakdownId::root("1");
        let child = parent.child("7");
        let lookalike = BreakdownId::root("11");

        assert!(parent.is_ancestor_of(&child));
        assert!(!parent.is_ancestor_of(&lookalike));
        assert!(!parent.is_ancestor_of(&parent));
    }

    #[test]
    fn entity_ref_parses_cli_form() {
        assert_eq!(
            EntityRef::parse("ad_group:42"),
            Some(EntityRef::new(EntityKind::AdGroup, 42))
        );
        assert_eq!(EntityRef::parse("ad_group:0"), None);
        assert_eq!(EntityRef::parse("publisher:3"), None);
        assert_eq!(EntityRef::parse("campaign"), None);
    }
}
