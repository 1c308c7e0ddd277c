//! The attribute-metadata and ident cache.
//!
//! The transaction processor consults this cache to validate proposed
//! operations, the identifier resolver to find upsert-capable attributes,
//! and the history reader to turn numeric identifiers back into symbolic
//! idents where a reverse mapping exists.

use std::collections::HashMap;
use std::fmt;

use bimap::BiMap;

use crate::construct::{Entid, EntidHasher};
use crate::error::{FactlogError, Result};

/// The declared type of an attribute's values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueType {
    Integer,
    Float,
    String,
    Boolean,
    Ref,
}
impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Ref => "ref",
        }
    }
    pub fn from_name(name: &str) -> Option<ValueType> {
        match name {
            "integer" => Some(ValueType::Integer),
            "float" => Some(ValueType::Float),
            "string" => Some(ValueType::String),
            "boolean" => Some(ValueType::Boolean),
            "ref" => Some(ValueType::Ref),
            _ => None,
        }
    }
}
impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Cardinality {
    One,
    Many,
}
impl Cardinality {
    pub fn name(&self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
        }
    }
    pub fn from_name(name: &str) -> Option<Cardinality> {
        match name {
            "one" => Some(Cardinality::One),
            "many" => Some(Cardinality::Many),
            _ => None,
        }
    }
}

/// Attribute metadata as consumed by validation and resolution.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Attribute {
    entid: Entid,
    value_type: ValueType,
    cardinality: Cardinality,
    unique: bool,
    fulltext: bool,
}
impl Attribute {
    pub fn new(
        entid: Entid,
        value_type: ValueType,
        cardinality: Cardinality,
        unique: bool,
        fulltext: bool,
    ) -> Self {
        Self {
            entid,
            value_type,
            cardinality,
            unique,
            fulltext,
        }
    }
    pub fn entid(&self) -> Entid {
        self.entid
    }
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
    pub fn unique(&self) -> bool {
        self.unique
    }
    pub fn fulltext(&self) -> bool {
        self.fulltext
    }

    /// The rules an attribute definition must satisfy before it is
    /// admitted to the cache.
    pub fn validate(&self, ident: &str) -> Result<()> {
        if self.fulltext && self.value_type != ValueType::String {
            return Err(FactlogError::Schema(format!(
                "fulltext true without value type string for attribute {}",
                ident
            )));
        }
        if self.unique && self.cardinality != Cardinality::One {
            return Err(FactlogError::Schema(format!(
                "unique true without cardinality one for attribute {}",
                ident
            )));
        }
        if self.unique && self.fulltext {
            return Err(FactlogError::Schema(format!(
                "unique true together with fulltext true for attribute {}",
                ident
            )));
        }
        Ok(())
    }
}

/// Double indexing: idents are looked up by name during input handling
/// and by entid when rendering output, so a bidirectional map carries
/// the one-to-one ident <-> entid association.
pub struct Schema {
    idents: BiMap<String, Entid>,
    attributes: HashMap<Entid, Attribute, EntidHasher>,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            idents: BiMap::new(),
            attributes: HashMap::default(),
        }
    }
    pub fn declare(
        &mut self,
        ident: &str,
        entid: Entid,
        value_type: ValueType,
        cardinality: Cardinality,
        unique: bool,
        fulltext: bool,
    ) -> Result<Attribute> {
        if self.idents.contains_left(ident) {
            return Err(FactlogError::Schema(format!(
                "ident {} is already declared",
                ident
            )));
        }
        let attribute = Attribute::new(entid, value_type, cardinality, unique, fulltext);
        attribute.validate(ident)?;
        self.idents.insert(ident.to_owned(), entid);
        self.attributes.insert(entid, attribute.clone());
        Ok(attribute)
    }
    pub fn attribute(&self, entid: Entid) -> Option<&Attribute> {
        self.attributes.get(&entid)
    }
    pub fn entid(&self, ident: &str) -> Option<Entid> {
        self.idents.get_by_left(ident).copied()
    }
    pub fn ident(&self, entid: Entid) -> Option<&str> {
        self.idents.get_by_right(&entid).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.attributes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declare_and_lookup_both_ways() {
        let mut schema = Schema::new();
        let attribute = schema
            .declare("person/name", 0x10000, ValueType::String, Cardinality::One, true, false)
            .expect("declare");
        assert_eq!(attribute.entid(), 0x10000);
        assert_eq!(schema.entid("person/name"), Some(0x10000));
        assert_eq!(schema.ident(0x10000), Some("person/name"));
        assert!(schema.attribute(0x10000).unwrap().unique());
    }

    #[test]
    fn duplicate_ident_is_rejected() {
        let mut schema = Schema::new();
        schema
            .declare("person/name", 0x10000, ValueType::String, Cardinality::One, false, false)
            .expect("declare");
        let err = schema
            .declare("person/name", 0x10001, ValueType::String, Cardinality::One, false, false)
            .unwrap_err();
        assert!(err.to_string().contains("already declared"));
    }

    #[test]
    fn fulltext_requires_string() {
        let mut schema = Schema::new();
        let err = schema
            .declare("person/age", 0x10000, ValueType::Integer, Cardinality::One, false, true)
            .unwrap_err();
        assert!(err.to_string().contains("fulltext"));
    }

    #[test]
    fn unique_requires_cardinality_one() {
        let mut schema = Schema::new();
        let err = schema
            .declare("person/alias", 0x10000, ValueType::String, Cardinality::Many, true, false)
            .unwrap_err();
        assert!(err.to_string().contains("cardinality one"));
    }
}
