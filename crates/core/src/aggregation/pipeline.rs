//! Declarative read pipelines.
//!
//! A pipeline is an ordered list of stages over one source collection:
//! match, join, derive, project, sort, skip, limit. Stages must appear in
//! that order; joins and derivations may repeat, the others appear at most
//! once. Joins carry their own nested stages, which shape the joined rows.

use tubeline_common::{AppError, AppResult};
use tubeline_db::store::{CollectionName, Filter, SortKey};

/// How many joined rows attach to each primary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The first match or `null`.
    One,
    /// Every match; an empty array when none.
    Many,
}

/// Left-outer join from the current rows into another collection.
///
/// `local` may hold a single value or an array of values. For an array the
/// joined rows follow the array's order.
#[derive(Debug, Clone)]
pub struct Join {
    pub into: &'static str,
    pub collection: CollectionName,
    pub local: &'static str,
    pub foreign: &'static str,
    pub cardinality: Cardinality,
    pub stages: Vec<Stage>,
}

impl Join {
    /// Attach the single row of `collection` whose `foreign` equals `local`.
    #[must_use]
    pub const fn one(
        into: &'static str,
        collection: CollectionName,
        local: &'static str,
        foreign: &'static str,
    ) -> Self {
        Self {
            into,
            collection,
            local,
            foreign,
            cardinality: Cardinality::One,
            stages: Vec::new(),
        }
    }

    /// Attach every row of `collection` whose `foreign` matches `local`.
    #[must_use]
    pub const fn many(
        into: &'static str,
        collection: CollectionName,
        local: &'static str,
        foreign: &'static str,
    ) -> Self {
        Self {
            into,
            collection,
            local,
            foreign,
            cardinality: Cardinality::Many,
            stages: Vec::new(),
        }
    }

    /// Restrict the joined rows.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    /// Nested join on the joined rows.
    #[must_use]
    pub fn join(mut self, join: Self) -> Self {
        self.stages.push(Stage::Join(join));
        self
    }

    /// Derivation on the joined rows.
    #[must_use]
    pub fn derive(mut self, derive: Derive) -> Self {
        self.stages.push(Stage::Derive(derive));
        self
    }

    /// Field allow-list for the joined rows.
    #[must_use]
    pub fn project(mut self, fields: &[&'static str]) -> Self {
        self.stages.push(Stage::Project(fields.to_vec()));
        self
    }

    /// Order of joined rows for a many-join on a scalar key.
    #[must_use]
    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.stages.push(Stage::Sort(keys));
        self
    }
}

/// A computed field.
#[derive(Debug, Clone)]
pub enum Derive {
    /// Number of rows in `collection` whose `foreign` equals this row's `local`.
    Count {
        into: &'static str,
        collection: CollectionName,
        foreign: &'static str,
        local: &'static str,
        filter: Filter,
    },
    /// Whether such a row exists with `actor_field == actor`.
    ///
    /// Always `false` without an actor.
    Exists {
        into: &'static str,
        collection: CollectionName,
        foreign: &'static str,
        local: &'static str,
        filter: Filter,
        actor_field: &'static str,
        actor: Option<String>,
    },
    /// Sum of `field` across the objects in the array at `from`.
    Sum {
        into: &'static str,
        from: &'static str,
        field: &'static str,
    },
    /// Length of the array at `from`.
    Size {
        into: &'static str,
        from: &'static str,
    },
    /// `field` of the first object in the array at `from`.
    First {
        into: &'static str,
        from: &'static str,
        field: &'static str,
    },
    /// Copy of the value at `from`.
    Copy {
        into: &'static str,
        from: &'static str,
    },
}

impl Derive {
    /// Field the derivation writes.
    #[must_use]
    pub const fn into(&self) -> &'static str {
        match self {
            Self::Count { into, .. }
            | Self::Exists { into, .. }
            | Self::Sum { into, .. }
            | Self::Size { into, .. }
            | Self::First { into, .. }
            | Self::Copy { into, .. } => into,
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Join(Join),
    Derive(Derive),
    Project(Vec<&'static str>),
    Sort(Vec<SortKey>),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    const fn rank(&self) -> u8 {
        match self {
            Self::Match(_) => 0,
            Self::Join(_) => 1,
            Self::Derive(_) => 2,
            Self::Project(_) => 3,
            Self::Sort(_) => 4,
            Self::Skip(_) => 5,
            Self::Limit(_) => 6,
        }
    }

    const fn repeatable(&self) -> bool {
        matches!(self, Self::Join(_) | Self::Derive(_))
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "match",
            Self::Join(_) => "join",
            Self::Derive(_) => "derive",
            Self::Project(_) => "project",
            Self::Sort(_) => "sort",
            Self::Skip(_) => "skip",
            Self::Limit(_) => "limit",
        }
    }

    /// Field this stage adds to each row, if any.
    #[must_use]
    pub const fn produces(&self) -> Option<&'static str> {
        match self {
            Self::Join(join) => Some(join.into),
            Self::Derive(derive) => Some(derive.into()),
            _ => None,
        }
    }
}

fn check_order(stages: &[Stage], nested: bool) -> AppResult<()> {
    let mut previous: Option<&Stage> = None;
    for stage in stages {
        if nested && matches!(stage, Stage::Skip(_) | Stage::Limit(_)) {
            return Err(invalid(format!("{} is not allowed inside a join", stage.name())));
        }
        if let Some(prev) = previous {
            if stage.rank() < prev.rank() {
                return Err(invalid(format!(
                    "{} may not follow {}",
                    stage.name(),
                    prev.name()
                )));
            }
            if stage.rank() == prev.rank() && !stage.repeatable() {
                return Err(invalid(format!("{} appears twice", stage.name())));
            }
        }
        if let Stage::Join(join) = stage {
            check_order(&join.stages, true)?;
        }
        previous = Some(stage);
    }
    Ok(())
}

fn invalid(message: String) -> AppError {
    AppError::Internal(format!("invalid pipeline: {message}"))
}

/// A pipeline over one source collection.
#[derive(Debug, Clone)]
pub struct Pipeline {
    source: CollectionName,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline over `source`.
    #[must_use]
    pub const fn new(source: CollectionName) -> Self {
        Self {
            source,
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a match stage.
    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    /// Append a join stage.
    #[must_use]
    pub fn join(self, join: Join) -> Self {
        self.stage(Stage::Join(join))
    }

    /// Append a derive stage.
    #[must_use]
    pub fn derive(self, derive: Derive) -> Self {
        self.stage(Stage::Derive(derive))
    }

    /// Append a projection.
    #[must_use]
    pub fn project(self, fields: &[&'static str]) -> Self {
        self.stage(Stage::Project(fields.to_vec()))
    }

    /// Append a sort.
    #[must_use]
    pub fn sort(self, keys: Vec<SortKey>) -> Self {
        self.stage(Stage::Sort(keys))
    }

    /// Append a skip.
    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        self.stage(Stage::Skip(n))
    }

    /// Append a limit.
    #[must_use]
    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    /// Source collection.
    #[must_use]
    pub const fn source(&self) -> CollectionName {
        self.source
    }

    /// The stages, in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Check the stage order.
    pub fn validate(&self) -> AppResult<()> {
        check_order(&self.stages, false)
    }
}

/// A validated stage list split by role.
#[derive(Debug, Default)]
pub(crate) struct Parts<'a> {
    pub filter: Filter,
    pub enrich: Vec<&'a Stage>,
    pub project: Option<&'a [&'static str]>,
    pub sort: Option<&'a [SortKey]>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl<'a> Parts<'a> {
    pub(crate) fn of(stages: &'a [Stage]) -> Self {
        let mut parts = Self::default();
        for stage in stages {
            match stage {
                Stage::Match(filter) => parts.filter = filter.clone(),
                Stage::Join(_) | Stage::Derive(_) => parts.enrich.push(stage),
                Stage::Project(fields) => parts.project = Some(fields.as_slice()),
                Stage::Sort(keys) => parts.sort = Some(keys.as_slice()),
                Stage::Skip(n) => parts.skip = *n,
                Stage::Limit(n) => parts.limit = Some(*n),
            }
        }
        parts
    }

    /// Whether any sort key names a field added by a join or derivation.
    pub(crate) fn sorts_on_derived(&self) -> bool {
        let Some(keys) = self.sort else {
            return false;
        };
        keys.iter()
            .any(|key| self.enrich.iter().any(|s| s.produces() == Some(key.field)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn owner() -> Join {
        Join::one("owner", CollectionName::Users, "owner_id", "id")
            .project(&["id", "username"])
    }

    #[test]
    fn test_canonical_order_is_valid() {
        let pipeline = Pipeline::new(CollectionName::Videos)
            .filter(Filter::all().eq("is_published", true))
            .join(owner())
            .derive(Derive::Size {
                into: "n",
                from: "x",
            })
            .derive(Derive::Copy {
                into: "m",
                from: "y",
            })
            .project(&["id", "owner"])
            .sort(vec![SortKey::desc("created_at")])
            .skip(10)
            .limit(10);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_out_of_order_stage_is_rejected() {
        let pipeline = Pipeline::new(CollectionName::Videos)
            .sort(vec![SortKey::desc("created_at")])
            .join(owner());
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("join may not follow sort"));
    }

    #[test]
    fn test_duplicate_singleton_stage_is_rejected() {
        let pipeline = Pipeline::new(CollectionName::Videos)
            .limit(1)
            .limit(2);
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_window_inside_join_is_rejected() {
        let join = owner().stage_for_test(Stage::Limit(1));
        let pipeline = Pipeline::new(CollectionName::Videos).join(join);
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_sorts_on_derived() {
        let stages = vec![
            Stage::Derive(Derive::Size {
                into: "likes_count",
                from: "likes",
            }),
            Stage::Sort(vec![SortKey::desc("likes_count")]),
        ];
        assert!(Parts::of(&stages).sorts_on_derived());

        let stages = vec![
            Stage::Join(owner()),
            Stage::Sort(vec![SortKey::desc("views")]),
        ];
        assert!(!Parts::of(&stages).sorts_on_derived());
    }

    impl Join {
        fn stage_for_test(mut self, stage: Stage) -> Self {
            self.stages.push(stage);
            self
        }
    }
}
