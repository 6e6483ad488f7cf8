//! Listing query composition.
//!
//! Callers describe searches with a closed condition/keyword pair and an
//! ordered list of sort requests. The composer resolves both against
//! per-entity allow-lists and emits a [`ComposedQuery`]: an abstract
//! predicate tree plus normalized ordering. Stores interpret the tree,
//! either by rendering parameterized SQL or by evaluating it in memory,
//! so raw caller input never reaches query text.

use serde::{Deserialize, Serialize};

// ========== Caller-facing request types ==========

/// Which text fields a keyword search inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCondition {
    Title,
    Body,
    TitleOrBody,
    Writer,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort request. `key` is matched against the entity allow-list;
/// unrecognized keys degrade to the default ordering instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

/// A keyword search request. The keyword is split on whitespace and the
/// resulting terms are combined with OR semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpec {
    pub condition: SearchCondition,
    pub keyword: String,
}

impl SearchSpec {
    pub fn new(condition: SearchCondition, keyword: impl Into<String>) -> Self {
        Self {
            condition,
            keyword: keyword.into(),
        }
    }
}

/// Soft-delete visibility. Applied as its own AND clause so a keyword
/// match can never resurrect a deleted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    IncludeDeleted,
}

// ========== Composed output ==========

/// Text columns a predicate can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Body,
    Writer,
}

/// Sortable columns. A closed set: stores map these to column names
/// themselves, so ordering can never smuggle caller input into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    CreatedAt,
    UpdatedAt,
    ViewCount,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderClause {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl OrderClause {
    /// Newest-first, the fallback whenever no usable sort was requested.
    pub fn newest_first() -> Self {
        Self {
            column: SortColumn::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Abstract filter tree. Keyword terms stay data until a store binds them.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Matches no row. Composed when a search names only fields the
    /// entity does not have.
    False,
    /// Excludes soft-deleted rows.
    ActiveOnly,
    /// Case-insensitive substring match on one text field.
    Contains { field: TextField, term: String },
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
}

/// A row projection used for in-memory predicate evaluation. Entities
/// without a given field expose `None` and never match on it.
#[derive(Debug, Clone, Copy)]
pub struct SearchDoc<'a> {
    pub title: Option<&'a str>,
    pub body: &'a str,
    pub writer: &'a str,
    pub deleted: bool,
}

impl Predicate {
    /// Evaluate against an in-memory row.
    pub fn matches(&self, doc: &SearchDoc<'_>) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::ActiveOnly => !doc.deleted,
            Predicate::Contains { field, term } => {
                let haystack = match field {
                    TextField::Title => doc.title.unwrap_or(""),
                    TextField::Body => doc.body,
                    TextField::Writer => doc.writer,
                };
                contains_ignore_case(haystack, term)
            }
            Predicate::Or(children) => children.iter().any(|c| c.matches(doc)),
            Predicate::And(children) => children.iter().all(|c| c.matches(doc)),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Final composition result handed to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    pub predicate: Predicate,
    pub ordering: Vec<OrderClause>,
}

// ========== Composer ==========

/// Per-entity query composer. Holds the searchable fields and the sort
/// allow-list resolved once from configuration.
#[derive(Debug, Clone)]
pub struct QueryComposer {
    fields: &'static [TextField],
    allowed_sorts: Vec<(String, SortColumn)>,
}

const POST_FIELDS: &[TextField] = &[TextField::Title, TextField::Body, TextField::Writer];
const COMMENT_FIELDS: &[TextField] = &[TextField::Body, TextField::Writer];

const POST_COLUMNS: &[SortColumn] = &[
    SortColumn::CreatedAt,
    SortColumn::UpdatedAt,
    SortColumn::ViewCount,
    SortColumn::Title,
];
const COMMENT_COLUMNS: &[SortColumn] = &[SortColumn::CreatedAt, SortColumn::UpdatedAt];

impl QueryComposer {
    pub fn for_posts(sort_keys: &[String]) -> Self {
        Self::new(POST_FIELDS, POST_COLUMNS, sort_keys)
    }

    pub fn for_comments(sort_keys: &[String]) -> Self {
        Self::new(COMMENT_FIELDS, COMMENT_COLUMNS, sort_keys)
    }

    fn new(fields: &'static [TextField], columns: &[SortColumn], sort_keys: &[String]) -> Self {
        let allowed_sorts = sort_keys
            .iter()
            .filter_map(|key| {
                let column = column_for_key(key)?;
                columns.contains(&column).then(|| (key.clone(), column))
            })
            .collect();
        Self {
            fields,
            allowed_sorts,
        }
    }

    /// Build the predicate tree and ordering for one listing call.
    pub fn compose(
        &self,
        search: Option<&SearchSpec>,
        sorts: &[SortSpec],
        visibility: Visibility,
    ) -> ComposedQuery {
        let mut clauses = Vec::new();
        if let Some(spec) = search {
            if let Some(predicate) = self.keyword_predicate(spec) {
                clauses.push(predicate);
            }
        }
        if visibility == Visibility::Active {
            clauses.push(Predicate::ActiveOnly);
        }
        let predicate = match clauses.len() {
            0 => Predicate::True,
            1 => clauses.remove(0),
            _ => Predicate::And(clauses),
        };
        ComposedQuery {
            predicate,
            ordering: self.resolve_ordering(sorts),
        }
    }

    /// OR of `Contains` leaves over every (field, term) pair. `None` when
    /// the keyword is blank; `False` when the condition names only fields
    /// this entity lacks, so such a search matches nothing rather than
    /// everything.
    fn keyword_predicate(&self, spec: &SearchSpec) -> Option<Predicate> {
        let terms: Vec<&str> = spec.keyword.split_whitespace().collect();
        if terms.is_empty() {
            return None;
        }
        let fields = self.fields_for(spec.condition);
        if fields.is_empty() {
            return Some(Predicate::False);
        }
        let mut alternatives = Vec::with_capacity(fields.len() * terms.len());
        for field in &fields {
            for term in &terms {
                alternatives.push(Predicate::Contains {
                    field: *field,
                    term: (*term).to_string(),
                });
            }
        }
        Some(match alternatives.len() {
            1 => alternatives.remove(0),
            _ => Predicate::Or(alternatives),
        })
    }

    /// Fields the condition targets, restricted to what the entity has.
    fn fields_for(&self, condition: SearchCondition) -> Vec<TextField> {
        let requested: &[TextField] = match condition {
            SearchCondition::Title => &[TextField::Title],
            SearchCondition::Body => &[TextField::Body],
            SearchCondition::TitleOrBody => &[TextField::Title, TextField::Body],
            SearchCondition::Writer => &[TextField::Writer],
            SearchCondition::All => self.fields,
        };
        requested
            .iter()
            .copied()
            .filter(|field| self.fields.contains(field))
            .collect()
    }

    /// Resolve sort requests against the allow-list. Unrecognized keys
    /// contribute the default clause; duplicate columns keep their first
    /// occurrence; an empty request means newest-first.
    fn resolve_ordering(&self, sorts: &[SortSpec]) -> Vec<OrderClause> {
        if sorts.is_empty() {
            return vec![OrderClause::newest_first()];
        }
        let mut ordering: Vec<OrderClause> = Vec::with_capacity(sorts.len());
        for spec in sorts {
            let clause = match self.lookup_sort(&spec.key) {
                Some(column) => OrderClause {
                    column,
                    direction: spec.direction,
                },
                None => OrderClause::newest_first(),
            };
            if !ordering.iter().any(|c| c.column == clause.column) {
                ordering.push(clause);
            }
        }
        ordering
    }

    fn lookup_sort(&self, key: &str) -> Option<SortColumn> {
        self.allowed_sorts
            .iter()
            .find(|(allowed, _)| allowed == key)
            .map(|(_, column)| *column)
    }
}

fn column_for_key(key: &str) -> Option<SortColumn> {
    match key {
        "created_at" => Some(SortColumn::CreatedAt),
        "updated_at" => Some(SortColumn::UpdatedAt),
        "view_count" => Some(SortColumn::ViewCount),
        "title" => Some(SortColumn::Title),
        _ => None,
    }
}
