//! Attribute requirements of templates
//!
//! An [`AttributeMap`] maps an object name (the entry itself under
//! `__self__`, or a join name) to the attributes templates read from it. Maps
//! of every template of a sync map item are merged to build one directory
//! search per join.

use crate::constants::SELF_OBJECT;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap(BTreeMap<String, BTreeSet<String>>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(object: &str, attribute: &str) -> Self {
        let mut map = Self::new();
        map.insert(object, attribute);
        map
    }

    pub fn insert(&mut self, object: &str, attribute: &str) {
        self.0
            .entry(object.to_string())
            .or_default()
            .insert(attribute.to_string());
    }

    /// Merge `other` into this map.
    ///
    /// When a name is both an attribute of `__self__` and an object, the
    /// object wins: `{member}` then designates the joined entry, rendered as
    /// its DN, so it can be combined with `{member.cn}` consistently.
    pub fn update(&mut self, other: &AttributeMap) {
        for (object, attributes) in &other.0 {
            self.0
                .entry(object.clone())
                .or_default()
                .extend(attributes.iter().cloned());
        }
        self.promote_objects();
    }

    /// Apply the object-wins policy against a set of bound object names.
    pub fn resolve_objects<'a>(&mut self, objects: impl IntoIterator<Item = &'a str>) {
        let Some(own) = self.0.get(SELF_OBJECT) else {
            return;
        };
        let promoted: Vec<String> = objects
            .into_iter()
            .filter(|name| *name != SELF_OBJECT && own.contains(*name))
            .map(str::to_string)
            .collect();
        for name in promoted {
            self.promote(&name);
        }
    }

    fn promote_objects(&mut self) {
        let Some(own) = self.0.get(SELF_OBJECT) else {
            return;
        };
        let promoted: Vec<String> = own
            .iter()
            .filter(|name| self.0.contains_key(*name))
            .cloned()
            .collect();
        for name in promoted {
            self.promote(&name);
        }
    }

    fn promote(&mut self, name: &str) {
        if let Some(own) = self.0.get_mut(SELF_OBJECT) {
            own.remove(name);
            if own.is_empty() {
                self.0.remove(SELF_OBJECT);
            }
        }
        self.insert(name, "dn");
    }

    pub fn get(&self, object: &str) -> Option<&BTreeSet<String>> {
        self.0.get(object)
    }

    pub fn contains_object(&self, object: &str) -> bool {
        self.0.contains_key(object)
    }

    pub fn self_attributes(&self) -> impl Iterator<Item = &str> {
        self.0
            .get(SELF_OBJECT)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Every object except `__self__`, with its attributes.
    pub fn joins(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0
            .iter()
            .filter(|(name, _)| name.as_str() != SELF_OBJECT)
            .map(|(name, attributes)| (name.as_str(), attributes))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0
            .iter()
            .map(|(name, attributes)| (name.as_str(), attributes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a AttributeMap> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = &'a AttributeMap>>(iter: T) -> Self {
        let mut map = AttributeMap::new();
        for other in iter {
            map.update(other);
        }
        map
    }
}
