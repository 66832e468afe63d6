//! Grant rules: generate wanted grants from directory entries

use super::OneOrMany;
use super::role::expand_all;
use crate::catalog::grant::{Grant, Target};
use crate::constants::ALL_WILDCARD;
use crate::error::SyncError;
use crate::format::{AttributeMap, Bindings, Template};
use glob::Pattern;
use itertools::iproduct;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "GrantRuleInput")]
pub struct GrantRule {
    pub privileges: Vec<Template>,
    pub databases: Vec<Template>,
    pub schemas: Vec<Template>,
    pub roles: Vec<Template>,
    /// Only grant to generated role names matching this pattern.
    pub role_match: Option<Pattern>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GrantRuleInput {
    #[serde(alias = "privileges", alias = "acl")]
    privilege: Option<OneOrMany<Template>>,
    #[serde(alias = "database")]
    databases: Option<OneOrMany<Template>>,
    #[serde(alias = "schema")]
    schemas: Option<OneOrMany<Template>>,
    #[serde(alias = "role")]
    roles: Option<OneOrMany<Template>>,
    role_match: Option<String>,
}

impl TryFrom<GrantRuleInput> for GrantRule {
    type Error = SyncError;

    fn try_from(input: GrantRuleInput) -> Result<Self, Self::Error> {
        let privileges = input
            .privilege
            .ok_or_else(|| SyncError::user("Missing privilege to grant rule."))?
            .into_vec();
        let roles = input
            .roles
            .ok_or_else(|| SyncError::user("Missing role in grant rule."))?
            .into_vec();
        let role_match = input
            .role_match
            .map(|pattern| {
                Pattern::new(&pattern)
                    .map_err(|e| SyncError::user(format!("Invalid role_match {:?}: {}", pattern, e)))
            })
            .transpose()?;

        Ok(GrantRule {
            privileges,
            databases: input.databases.map(OneOrMany::into_vec).unwrap_or_else(all),
            schemas: input.schemas.map(OneOrMany::into_vec).unwrap_or_else(all),
            roles,
            role_match,
        })
    }
}

fn all() -> Vec<Template> {
    Template::parse(ALL_WILDCARD).map(|t| vec![t]).unwrap_or_default()
}

impl GrantRule {
    fn templates(&self) -> impl Iterator<Item = &Template> {
        self.privileges
            .iter()
            .chain(&self.databases)
            .chain(&self.schemas)
            .chain(&self.roles)
    }

    pub fn attributes_map(&self) -> AttributeMap {
        let mut map = AttributeMap::new();
        for template in self.templates() {
            map.update(&template.attributes_map());
        }
        map
    }

    pub fn has_static_roles(&self) -> bool {
        self.roles.iter().any(Template::is_static)
    }

    pub fn is_static(&self) -> bool {
        self.templates().all(Template::is_static)
    }

    /// Unexpanded grants for one set of bindings: `__all__` stays a wildcard
    /// until the privilege catalog expands it against the topology.
    pub fn generate(&self, bindings: &Bindings) -> Result<Vec<Grant>, SyncError> {
        let privileges = expand_all(&self.privileges, bindings)?;
        let databases = expand_all(&self.databases, bindings)?;
        let schemas = expand_all(&self.schemas, bindings)?;
        let roles: Vec<String> = expand_all(&self.roles, bindings)?
            .into_iter()
            .filter(|role| self.role_match.as_ref().is_none_or(|p| p.matches(role)))
            .collect();

        Ok(iproduct!(&privileges, &databases, &schemas, &roles)
            .map(|(privilege, database, schema, role)| {
                Grant::new(
                    privilege,
                    Target::parse(database),
                    Some(Target::parse(schema)),
                    role,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryEntry;

    fn rule(yaml: &str) -> GrantRule {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_to_every_database_and_schema() {
        let rule = rule("{privilege: ro, role: readers}");
        let grants = rule.generate(&Bindings::new()).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].dbname, Target::All);
        assert_eq!(grants[0].schema, Some(Target::All));
        assert_eq!(grants[0].role, "readers");
    }

    #[test]
    fn test_lists_multiply() {
        let rule = rule("{privilege: [ro, rw], databases: [app, crm], schema: public, roles: [a, b]}");
        let grants = rule.generate(&Bindings::new()).unwrap();
        assert_eq!(grants.len(), 8);
        assert!(grants.iter().all(|g| g.schema == Some(Target::named("public"))));
    }

    #[test]
    fn test_role_match_filters_generated_names() {
        let entry = DirectoryEntry::new("cn=staff,dc=acme")
            .with_attribute("member", ["cn=app_ro,dc=acme", "cn=alice,dc=acme", "cn=crm_ro,dc=acme"]);
        let rule = rule("{privilege: ro, roles: '{member.cn}', role_match: '*_ro'}");
        let bindings = Bindings::from_entry(&entry, &rule.attributes_map()).unwrap();
        let roles: Vec<String> = rule
            .generate(&bindings)
            .unwrap()
            .into_iter()
            .map(|g| g.role)
            .collect();
        assert_eq!(roles, vec!["app_ro", "crm_ro"]);
    }

    #[test]
    fn test_invalid_rules() {
        assert!(serde_yaml::from_str::<GrantRule>("{role: x}").is_err());
        assert!(serde_yaml::from_str::<GrantRule>("{privilege: x}").is_err());
        assert!(serde_yaml::from_str::<GrantRule>("{privilege: x, role: y, object: z}").is_err());
        assert!(serde_yaml::from_str::<GrantRule>("{privilege: x, role: y, role_match: '[a'}").is_err());
    }
}
