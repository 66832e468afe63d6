//! Template expansion over multi-valued directory attributes
//!
//! A [`Template`] such as `{cn}_{member.mail}` is parsed once into literal
//! text and place-holder fields. [`Template::expand`] yields one string per
//! combination of the values bound to those fields: values of different
//! attributes combine freely, entries of different objects combine freely,
//! and a template without place-holders yields itself once.

pub mod attributes;
pub mod bindings;

pub use attributes::AttributeMap;
pub use bindings::{Bindings, Record};

use crate::constants::SELF_OBJECT;
use crate::error::SyncError;
use itertools::{Either, Itertools};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Lower,
    Upper,
}

impl Method {
    fn apply(self, value: &str) -> String {
        match self {
            Method::Lower => value.to_lowercase(),
            Method::Upper => value.to_uppercase(),
        }
    }
}

/// One `{...}` place-holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub object: String,
    pub attribute: String,
    pub method: Option<Method>,
}

impl Field {
    /// `{cn}` and `{dn.cn}` read the entry itself, `{member.cn}` reads the
    /// `cn` of each `member`.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let (path, method) = if let Some(path) = text.strip_suffix(".lower()") {
            (path, Some(Method::Lower))
        } else if let Some(path) = text.strip_suffix(".upper()") {
            (path, Some(Method::Upper))
        } else {
            (text, None)
        };

        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !path.split('.').all(valid) {
            return Err(SyncError::user(format!("Invalid place-holder {{{}}}", text)));
        }

        let (object, attribute) = match path.split_once('.') {
            Some(("dn", _)) | None => (SELF_OBJECT, path),
            Some((object, attribute)) => (object, attribute),
        };

        Ok(Self {
            object: object.to_string(),
            attribute: attribute.to_string(),
            method,
        })
    }

    pub fn attributes_map(&self) -> AttributeMap {
        AttributeMap::single(&self.object, &self.attribute)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.object == SELF_OBJECT {
            write!(f, "{}", self.attribute)
        } else {
            write!(f, "{}.{}", self.object, self.attribute)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, SyncError> {
        let invalid = |reason: &str| SyncError::user(format!("Invalid template {:?}: {}", source, reason));

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unclosed place-holder")),
                            Some(c) => inner.push(c),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(Field::parse(inner.trim())?));
                }
                '}' => return Err(invalid("single '}' is not allowed")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(field) => Some(field),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.fields().next().is_none()
    }

    pub fn attributes_map(&self) -> AttributeMap {
        self.fields().map(Field::attributes_map).fold(
            AttributeMap::new(),
            |mut map, other| {
                map.update(&other);
                map
            },
        )
    }

    /// Every string this template renders to with `bindings`.
    ///
    /// Missing attributes are reported before the first string is produced.
    /// The returned iterator borrows both the template and the bindings and
    /// can be obtained again for a fresh pass.
    pub fn expand<'a>(
        &'a self,
        bindings: &'a Bindings,
    ) -> Result<impl Iterator<Item = String> + 'a, SyncError> {
        if self.is_static() {
            return Ok(Either::Left(std::iter::once(self.render_literal())));
        }

        let mut map = self.attributes_map();
        map.resolve_objects(bindings.objects());

        let mut objects: Vec<ObjectCombinations> = Vec::new();
        for (object, attributes) in map.iter() {
            objects.push(ObjectCombinations::collect(object, attributes, bindings)?);
        }

        let slots = self
            .fields()
            .map(|field| locate(field, &objects))
            .collect::<Result<Vec<_>, _>>()?;

        let ranges: Vec<_> = objects.iter().map(|o| 0..o.combinations.len()).collect();
        let strings = ranges
            .into_iter()
            .multi_cartesian_product()
            .map(move |picked| self.render(&objects, &slots, &picked));

        Ok(Either::Right(strings))
    }

    fn render_literal(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Field(_) => "",
            })
            .collect()
    }

    fn render(&self, objects: &[ObjectCombinations], slots: &[Slot], picked: &[usize]) -> String {
        let mut out = String::new();
        let mut slots = slots.iter();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    if let Some(slot) = slots.next() {
                        let value = &objects[slot.object].combinations[picked[slot.object]]
                            [slot.attribute];
                        match field.method {
                            Some(method) => out.push_str(&method.apply(value)),
                            None => out.push_str(value),
                        }
                    }
                }
            }
        }
        out
    }
}

impl TryFrom<String> for Template {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Template::parse(&value)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Every attribute combination of every record of one object.
struct ObjectCombinations {
    name: String,
    attributes: Vec<String>,
    combinations: Vec<Vec<String>>,
}

impl ObjectCombinations {
    fn collect(
        object: &str,
        requested: &std::collections::BTreeSet<String>,
        bindings: &Bindings,
    ) -> Result<Self, SyncError> {
        let missing = |attribute: &str| SyncError::MissingAttribute {
            path: if object == SELF_OBJECT {
                attribute.to_string()
            } else {
                format!("{}.{}", object, attribute)
            },
        };

        let mut attributes: Vec<String> = requested.iter().cloned().collect();
        if !requested.contains("dn") {
            attributes.push("dn".to_string());
        }

        let records = bindings.records(object).ok_or_else(|| SyncError::MissingAttribute {
            path: object.to_string(),
        })?;

        let mut combinations = Vec::new();
        for record in records {
            let values = attributes
                .iter()
                .map(|attribute| {
                    record
                        .get(attribute)
                        .map(|values| values.iter())
                        .ok_or_else(|| missing(attribute))
                })
                .collect::<Result<Vec<_>, _>>()?;
            combinations.extend(
                values
                    .into_iter()
                    .multi_cartesian_product()
                    .map(|combination| combination.into_iter().cloned().collect::<Vec<_>>()),
            );
        }

        Ok(Self {
            name: object.to_string(),
            attributes,
            combinations,
        })
    }

    fn position(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == attribute)
    }
}

/// Where a field reads its value: object index, then attribute index.
struct Slot {
    object: usize,
    attribute: usize,
}

fn locate(field: &Field, objects: &[ObjectCombinations]) -> Result<Slot, SyncError> {
    let find = |object: &str, attribute: &str| {
        objects.iter().position(|o| o.name == object).and_then(|index| {
            objects[index].position(attribute).map(|attribute| Slot {
                object: index,
                attribute,
            })
        })
    };

    // A self attribute bound as an object renders as the object's DN.
    let slot = if field.object == SELF_OBJECT {
        find(SELF_OBJECT, &field.attribute).or_else(|| find(&field.attribute, "dn"))
    } else {
        find(&field.object, &field.attribute)
    };

    slot.ok_or_else(|| SyncError::MissingAttribute {
        path: field.to_string(),
    })
}
