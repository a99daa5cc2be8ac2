//! Declarative queries and their normalization into driver-facing parameters.
//!
//! A [`QueryDescriptor`] is what callers hand to the store: match criteria plus optional
//! pagination, sorting, projection and expansion directives. [`normalize`] validates it
//! and produces a [`NormalizedQuery`] whose `filter` and [`QueryOptions`] can be fed to
//! a storage driver as-is.
//!
//! # Query Building
//!
//! Descriptors can be constructed with the fluent builder API:
//!
//! ```ignore
//! use bson::doc;
//! use docshim::query::{QueryDescriptor, SortDirection};
//!
//! let query = QueryDescriptor::builder()
//!     .match_criteria(doc! { "status": "active" })
//!     .limit(10)
//!     .skip(20)
//!     .sort("createdAt", SortDirection::Desc)
//!     .expand("author")
//!     .build();
//! ```
//!
//! or parsed from the JSON sent by a host application with [`QueryDescriptor::from_json`].
//!
//! # Normalization rules
//!
//! - the descriptor must carry match criteria, otherwise [`StoreError::InvalidQuery`],
//! - an `_id` criterion is strictly parsed into an [`ObjectId`](bson::oid::ObjectId);
//!   a malformed identifier fails with [`StoreError::InvalidIdentifier`],
//! - numeric options given as strings are coerced; options that cannot be coerced are
//!   dropped with a warning instead of failing the query,
//! - absent options stay absent.

use bson::{Bson, Document, doc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{StoreError, StoreResult},
    identifier::parse_object_id,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    fn as_bson(self) -> Bson {
        match self {
            SortDirection::Asc => Bson::Int32(1),
            SortDirection::Desc => Bson::Int32(-1),
        }
    }

    /// Interprets a caller-supplied direction (`1`, `-1`, `"asc"`, `"descending"`, ...).
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let signum = match value {
            Bson::Int32(n) => i64::from(*n).signum(),
            Bson::Int64(n) => n.signum(),
            Bson::Double(n) if *n != 0.0 && !n.is_nan() => {
                if *n > 0.0 { 1 } else { -1 }
            }
            Bson::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "asc" | "ascending" | "1" => 1,
                "desc" | "descending" | "-1" => -1,
                _ => 0,
            },
            _ => 0,
        };

        match signum {
            1 => Some(SortDirection::Asc),
            -1 => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// The declarative, caller-facing description of a selection.
///
/// Field names follow the host application's JSON conventions; both the short names
/// (`matchCriteria`, `limit`, `skip`, `sortBy`, `expandFields`) and the long ones
/// (`fieldsMatching`, `limitResultsTo`, `startResultsFrom`, `sortResultsBy`, `populate`)
/// are accepted.
///
/// `limit` and `skip` are kept as raw BSON because callers routinely send them as
/// strings; they are coerced during [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Field path to expected value (or match expression).
    #[serde(alias = "fieldsMatching")]
    pub match_criteria: Option<Document>,
    /// Maximum number of results.
    #[serde(alias = "limitResultsTo")]
    pub limit: Option<Bson>,
    /// Number of results to skip.
    #[serde(alias = "startResultsFrom")]
    pub skip: Option<Bson>,
    /// Field path to sort direction.
    #[serde(alias = "sortResultsBy")]
    pub sort_by: Option<Document>,
    /// Projection: a document, an array of paths or a space separated string of paths.
    pub include_fields: Option<Bson>,
    /// Relation fields to resolve, in order.
    #[serde(alias = "populate")]
    pub expand_fields: Option<Vec<String>>,
}

impl QueryDescriptor {
    /// Creates a descriptor matching the given criteria, with no other directives.
    pub fn new(match_criteria: Document) -> Self {
        QueryDescriptor {
            match_criteria: Some(match_criteria),
            ..Default::default()
        }
    }

    /// Creates a new descriptor builder for fluent construction.
    pub fn builder() -> QueryDescriptorBuilder {
        QueryDescriptorBuilder::new()
    }

    /// Parses a descriptor from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] if the value is not an object of the expected shape.
    pub fn from_json(value: Value) -> StoreResult<Self> {
        if !value.is_object() {
            return Err(StoreError::InvalidQuery(format!("expected a query object, got {value}")));
        }

        serde_json::from_value(value).map_err(|e| StoreError::InvalidQuery(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryDescriptorBuilder {
    query: QueryDescriptor,
}

impl QueryDescriptorBuilder {
    /// Creates a new descriptor builder.
    pub fn new() -> Self {
        QueryDescriptorBuilder { query: QueryDescriptor::default() }
    }

    /// Sets the match criteria.
    pub fn match_criteria(mut self, criteria: Document) -> Self {
        self.query.match_criteria = Some(criteria);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: impl Into<Bson>) -> Self {
        self.query.limit = Some(limit.into());
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: impl Into<Bson>) -> Self {
        self.query.skip = Some(skip.into());
        self
    }

    /// Appends a sort key. Keys are applied in the order they are added.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query
            .sort_by
            .get_or_insert_with(Document::new)
            .insert(field.into(), direction.as_bson());
        self
    }

    /// Sets the projection.
    pub fn include_fields(mut self, fields: impl Into<Bson>) -> Self {
        self.query.include_fields = Some(fields.into());
        self
    }

    /// Appends a relation field to expand.
    pub fn expand(mut self, field: impl Into<String>) -> Self {
        self.query
            .expand_fields
            .get_or_insert_with(Vec::new)
            .push(field.into());
        self
    }

    /// Builds and returns the final descriptor.
    pub fn build(self) -> QueryDescriptor {
        self.query
    }
}

/// Driver options derived from a descriptor. Absent entries are `None`, never null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

impl QueryOptions {
    /// Renders the options as a document, omitting absent entries.
    pub fn to_document(&self) -> Document {
        let mut options = Document::new();

        if let Some(limit) = self.limit {
            options.insert("limit", limit);
        }
        if let Some(skip) = self.skip {
            options.insert("skip", skip as i64);
        }
        if let Some(sort) = &self.sort {
            options.insert("sort", sort.clone());
        }
        if let Some(projection) = &self.projection {
            options.insert("projection", projection.clone());
        }

        options
    }
}

/// The driver-facing translation of a [`QueryDescriptor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedQuery {
    /// Match criteria with `_id` converted to a typed identifier.
    pub filter: Document,
    /// Pagination, sort and projection options.
    pub options: QueryOptions,
    /// Space separated relation names to expand, if any were requested.
    pub populate_paths: Option<String>,
}

impl NormalizedQuery {
    /// Returns the relation names to expand, in request order.
    pub fn populate_paths(&self) -> impl Iterator<Item = &str> {
        self.populate_paths
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
    }

    /// Renders the options mapping, omitting absent entries.
    pub fn options_document(&self) -> Document {
        self.options.to_document()
    }
}

impl TryFrom<QueryDescriptor> for NormalizedQuery {
    type Error = StoreError;

    fn try_from(descriptor: QueryDescriptor) -> StoreResult<Self> {
        normalize(Some(descriptor))
    }
}

/// Checks that a descriptor is present and carries match criteria.
///
/// # Errors
///
/// Returns [`StoreError::InvalidQuery`] otherwise.
pub fn validate(descriptor: Option<&QueryDescriptor>) -> StoreResult<()> {
    match descriptor {
        None => Err(StoreError::InvalidQuery("expected a query".to_string())),
        Some(QueryDescriptor { match_criteria: None, .. }) => Err(StoreError::InvalidQuery(
            "expected the query to define match criteria".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

/// Validates a descriptor and projects it into a [`NormalizedQuery`].
///
/// # Errors
///
/// Returns [`StoreError::InvalidQuery`] if validation fails and
/// [`StoreError::InvalidIdentifier`] if the `_id` criterion is malformed. Malformed
/// pagination options are dropped rather than reported.
pub fn normalize(descriptor: Option<QueryDescriptor>) -> StoreResult<NormalizedQuery> {
    validate(descriptor.as_ref())?;

    let QueryDescriptor {
        match_criteria,
        limit,
        skip,
        sort_by,
        include_fields,
        expand_fields,
    } = descriptor.unwrap_or_default();

    let mut filter = match_criteria.unwrap_or_default();
    if let Some(id) = filter.get_mut("_id") {
        *id = coerce_id_criterion(id)?;
    }

    let options = QueryOptions {
        limit: limit.and_then(|value| {
            coerce_integer("limit", &value).filter(|n| {
                let valid = *n > 0;
                if !valid {
                    warn!(limit = n, "dropping non-positive limit from query options");
                }
                valid
            })
        }),
        skip: skip.and_then(|value| {
            coerce_integer("skip", &value).and_then(|n| match u64::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!(skip = n, "dropping negative skip from query options");
                    None
                }
            })
        }),
        sort: sort_by
            .map(normalize_sort)
            .filter(|sort| !sort.is_empty()),
        projection: include_fields.and_then(normalize_projection),
    };

    let populate_paths = expand_fields
        .map(|fields| {
            fields
                .iter()
                .map(|field| field.trim())
                .filter(|field| !field.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|paths| !paths.is_empty());

    Ok(NormalizedQuery { filter, options, populate_paths })
}

/// Strictly converts an `_id` criterion: a scalar, or every operand of an operator document.
fn coerce_id_criterion(value: &Bson) -> StoreResult<Bson> {
    match value {
        Bson::Document(operators) if operators.keys().all(|key| key.starts_with('$')) => {
            let mut coerced = Document::new();

            for (operator, operand) in operators {
                let operand = match (operator.as_str(), operand) {
                    // operands that describe the field rather than hold an identifier
                    ("$exists" | "$type", _) => operand.clone(),
                    ("$eq" | "$ne", Bson::Null) => Bson::Null,
                    (_, Bson::Array(values)) => Bson::Array(
                        values
                            .iter()
                            .map(|value| parse_object_id(value).map(Bson::ObjectId))
                            .collect::<StoreResult<Vec<_>>>()?,
                    ),
                    (_, other) => Bson::ObjectId(parse_object_id(other)?),
                };
                coerced.insert(operator.clone(), operand);
            }

            Ok(Bson::Document(coerced))
        }
        other => Ok(Bson::ObjectId(parse_object_id(other)?)),
    }
}

fn coerce_integer(option: &str, value: &Bson) -> Option<i64> {
    let coerced = match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
        Bson::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    if coerced.is_none() {
        warn!(option, value = %value, "dropping malformed query option");
    }

    coerced
}

fn normalize_sort(sort_by: Document) -> Document {
    sort_by
        .into_iter()
        .filter_map(|(field, direction)| match SortDirection::from_bson(&direction) {
            Some(direction) => Some((field, direction.as_bson())),
            None => {
                warn!(field = %field, direction = %direction, "dropping unrecognised sort direction");
                None
            }
        })
        .collect()
}

fn normalize_projection(include_fields: Bson) -> Option<Document> {
    let inclusion = |paths: Vec<String>| -> Document {
        paths.into_iter().map(|path| (path, Bson::Int32(1))).collect()
    };

    let projection = match include_fields {
        Bson::Document(projection) => Some(projection),
        Bson::Array(paths) => Some(inclusion(
            paths
                .into_iter()
                .filter_map(|path| match path {
                    Bson::String(path) => Some(path),
                    other => {
                        warn!(path = %other, "dropping non-string projection path");
                        None
                    }
                })
                .collect(),
        )),
        Bson::String(paths) => Some(inclusion(
            paths.split_whitespace().map(str::to_string).collect(),
        )),
        other => {
            warn!(include_fields = %other, "dropping malformed projection");
            None
        }
    };

    projection.filter(|projection| !projection.is_empty())
}

/// Builds the `{ "_id": id }` filter used for point reads.
pub fn by_id(id: impl Into<Bson>) -> Document {
    doc! { "_id": id.into() }
}
