//! Values bound to template objects for one directory entry

use super::AttributeMap;
use crate::constants::SELF_OBJECT;
use crate::directory::DirectoryEntry;
use crate::directory::dn::dn_component;
use crate::error::SyncError;
use std::collections::BTreeMap;

/// Attribute name to its values, for one entry of an object.
pub type Record = BTreeMap<String, Vec<String>>;

/// Object name to the records of that object.
///
/// `__self__` holds exactly one record. A join holds one record per joined
/// entry. A DN-valued attribute read through components (`{manager.cn}`)
/// without a join holds one record per value, decoded from the DN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(BTreeMap<String, Vec<Record>>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: &str, records: Vec<Record>) {
        self.0.insert(object.to_string(), records);
    }

    pub fn records(&self, object: &str) -> Option<&[Record]> {
        self.0.get(object).map(|records| records.as_slice())
    }

    pub fn objects(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Collect from `entry` every value requested by `map`.
    pub fn from_entry(entry: &DirectoryEntry, map: &AttributeMap) -> Result<Self, SyncError> {
        let mut bindings = Bindings::new();

        let mut own = Record::new();
        own.insert("dn".to_string(), vec![entry.dn.clone()]);
        for attribute in map.self_attributes() {
            own.insert(attribute.to_string(), entry.values(attribute)?);
        }
        bindings.insert(SELF_OBJECT, vec![own]);

        for (object, attributes) in map.joins() {
            let records = if let Some(children) = entry.children(object) {
                children
                    .iter()
                    .map(|child| {
                        let mut record = Record::new();
                        record.insert("dn".to_string(), vec![child.dn.clone()]);
                        for attribute in attributes.iter().filter(|a| *a != "dn") {
                            record.insert(attribute.clone(), child.values(attribute)?);
                        }
                        Ok(record)
                    })
                    .collect::<Result<Vec<_>, SyncError>>()?
            } else {
                let values = entry
                    .attribute(object)
                    .ok_or_else(|| SyncError::MissingAttribute {
                        path: object.to_string(),
                    })?;
                values
                    .iter()
                    .map(|value| decode_record(object, value, attributes.iter()))
                    .collect::<Result<Vec<_>, SyncError>>()?
            };
            bindings.insert(object, records);
        }

        Ok(bindings)
    }
}

fn decode_record<'a>(
    object: &str,
    dn: &str,
    attributes: impl Iterator<Item = &'a String>,
) -> Result<Record, SyncError> {
    let mut record = Record::new();
    record.insert("dn".to_string(), vec![dn.to_string()]);
    for attribute in attributes.filter(|a| *a != "dn") {
        let path = format!("{}.{}", object, attribute);
        let value = match dn_component(dn, attribute) {
            Ok(Some(value)) => value,
            Ok(None) => return Err(SyncError::MissingAttribute { path }),
            Err(_) => {
                return Err(SyncError::Decode {
                    value: dn.to_string(),
                    key: path,
                });
            }
        };
        record.insert(attribute.clone(), vec![value]);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_records_come_from_children() {
        let entry = DirectoryEntry::new("cn=dba,ou=groups")
            .with_attribute("cn", ["dba"])
            .with_children(
                "member",
                vec![
                    DirectoryEntry::new("cn=alice,ou=people").with_attribute("mail", ["a@x", "b@x"]),
                ],
            );
        let mut map = AttributeMap::single(SELF_OBJECT, "cn");
        map.insert("member", "mail");

        let bindings = Bindings::from_entry(&entry, &map).unwrap();
        let members = bindings.records("member").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["mail"].len(), 2);
        assert_eq!(members[0]["dn"], ["cn=alice,ou=people"]);
        assert_eq!(bindings.records(SELF_OBJECT).unwrap()[0]["cn"], ["dba"]);
    }

    #[test]
    fn test_dn_valued_attribute_without_join_is_decoded() {
        let entry = DirectoryEntry::new("cn=dba,ou=groups")
            .with_attribute("member", ["cn=alice,ou=people", "cn=bob,ou=people"]);
        let map = AttributeMap::single("member", "cn");

        let bindings = Bindings::from_entry(&entry, &map).unwrap();
        let members = bindings.records("member").unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1]["cn"], ["bob"]);
        assert_eq!(members[1]["dn"], ["cn=bob,ou=people"]);
    }

    #[test]
    fn test_undecodable_member_fails() {
        let entry = DirectoryEntry::new("cn=dba").with_attribute("member", ["garbage"]);
        let map = AttributeMap::single("member", "cn");
        let err = Bindings::from_entry(&entry, &map).unwrap_err();
        assert_eq!(
            err,
            SyncError::Decode {
                value: "garbage".to_string(),
                key: "member.cn".to_string()
            }
        );
    }
}
