//! Coercing keywords for an external schema validator.
//!
//! The host's schema validator owns the validation engine; docshim only supplies the
//! keyword callbacks. A keyword is handed the container holding the value being
//! validated and the property name, so that on success it can replace the raw string
//! with its typed counterpart in place.
//!
//! Two keywords ship with the crate:
//!
//! - [`ObjectIdKeyword`] (`isObjectId`) turns identifier strings into [`ObjectId`](bson::oid::ObjectId)s,
//! - [`DateKeyword`] (`isDate`) turns RFC 3339 or `YYYY-MM-DD` strings into [`DateTime`]s.
//!
//! They are registered through any [`KeywordRegistry`]; [`KeywordSet`] is a plain
//! in-process registry.

use bson::{Bson, DateTime, Document};
use chrono::NaiveDate;
use std::{collections::HashMap, fmt::Debug};
use tracing::debug;

use crate::{error::StoreResult, identifier::parse_object_id};

/// A named validation callback that may rewrite the value it validates.
pub trait SchemaKeyword: Send + Sync + Debug {
    /// The keyword name used in schemas.
    fn name(&self) -> &str;

    /// Validates `parent[property]`, replacing it with the typed value on success.
    ///
    /// Returns `false`, leaving the container untouched, if the value is missing or does
    /// not pass.
    fn check(&self, parent: &mut Document, property: &str) -> bool;
}

/// Anything that accepts keyword registrations.
pub trait KeywordRegistry {
    /// Registers a keyword.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a registration, for example a name clash.
    fn add_keyword(&mut self, keyword: Box<dyn SchemaKeyword>) -> StoreResult<()>;
}

impl<R: KeywordRegistry + ?Sized> KeywordRegistry for &mut R {
    fn add_keyword(&mut self, keyword: Box<dyn SchemaKeyword>) -> StoreResult<()> {
        (**self).add_keyword(keyword)
    }
}

/// `isObjectId`: the value must be an identifier, typed or as a 24 character hex string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdKeyword;

impl SchemaKeyword for ObjectIdKeyword {
    fn name(&self) -> &str {
        "isObjectId"
    }

    fn check(&self, parent: &mut Document, property: &str) -> bool {
        let Some(value) = parent.get_mut(property) else {
            return false;
        };

        match parse_object_id(value) {
            Ok(oid) => {
                *value = Bson::ObjectId(oid);
                true
            }
            Err(_) => false,
        }
    }
}

/// `isDate`: the value must be a date, typed or as an RFC 3339 / `YYYY-MM-DD` string.
///
/// Date-only strings are taken as midnight UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateKeyword;

impl DateKeyword {
    fn parse(s: &str) -> Option<DateTime> {
        let s = s.trim();

        if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(s) {
            return Some(DateTime::from_chrono(datetime));
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| DateTime::from_chrono(midnight.and_utc()))
    }
}

impl SchemaKeyword for DateKeyword {
    fn name(&self) -> &str {
        "isDate"
    }

    fn check(&self, parent: &mut Document, property: &str) -> bool {
        let Some(value) = parent.get_mut(property) else {
            return false;
        };

        let parsed = match value {
            Bson::DateTime(_) => return true,
            Bson::String(s) => DateKeyword::parse(s),
            _ => None,
        };

        match parsed {
            Some(datetime) => {
                *value = Bson::DateTime(datetime);
                true
            }
            None => false,
        }
    }
}

/// The keywords shipped with docshim.
pub fn builtin_keywords() -> Vec<Box<dyn SchemaKeyword>> {
    vec![Box::new(ObjectIdKeyword), Box::new(DateKeyword)]
}

/// Registers every built-in keyword into `registry`.
pub fn register_builtin_keywords<R: KeywordRegistry + ?Sized>(registry: &mut R) -> StoreResult<()> {
    for keyword in builtin_keywords() {
        debug!(keyword = keyword.name(), "registering schema keyword");
        registry.add_keyword(keyword)?;
    }

    Ok(())
}

/// A simple name-indexed keyword registry.
///
/// Registering a name twice replaces the earlier keyword.
#[derive(Debug, Default)]
pub struct KeywordSet {
    keywords: HashMap<String, Box<dyn SchemaKeyword>>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered keyword with the given name.
    pub fn get(&self, name: &str) -> Option<&dyn SchemaKeyword> {
        self.keywords.get(name).map(|keyword| keyword.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keywords.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Runs the named keyword against `parent[property]`.
    ///
    /// Returns `None` if no keyword with that name is registered.
    pub fn check(&self, name: &str, parent: &mut Document, property: &str) -> Option<bool> {
        self.get(name).map(|keyword| keyword.check(parent, property))
    }
}

impl KeywordRegistry for KeywordSet {
    fn add_keyword(&mut self, keyword: Box<dyn SchemaKeyword>) -> StoreResult<()> {
        self.keywords.insert(keyword.name().to_string(), keyword);
        Ok(())
    }
}
