//! Role rules: generate wanted roles from directory entries

use super::OneOrMany;
use crate::catalog::role::{Role, RoleOptions};
use crate::error::SyncError;
use crate::format::{AttributeMap, Bindings, Template};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RoleRuleSpec")]
pub struct RoleRule {
    pub names: Vec<Template>,
    pub parents: Vec<Template>,
    pub members: Vec<Template>,
    pub options: RoleOptions,
    pub comment: Option<Template>,
}

/// A bare string is a role name.
#[derive(Deserialize)]
#[serde(untagged)]
enum RoleRuleSpec {
    Name(Template),
    Rule(RoleRuleInput),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleRuleInput {
    #[serde(alias = "name")]
    names: Option<OneOrMany<Template>>,
    #[serde(default, alias = "parent")]
    parents: OneOrMany<Template>,
    #[serde(default, alias = "member")]
    members: OneOrMany<Template>,
    #[serde(default)]
    options: Option<OptionsInput>,
    comment: Option<Template>,
}

/// `LOGIN NOSUPERUSER`, `[LOGIN, NOSUPERUSER]` or `{LOGIN: true}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsInput {
    Keywords(String),
    List(Vec<String>),
    Flags(BTreeMap<String, bool>),
}

impl TryFrom<OptionsInput> for RoleOptions {
    type Error = SyncError;

    fn try_from(input: OptionsInput) -> Result<Self, Self::Error> {
        match input {
            OptionsInput::Keywords(spec) => RoleOptions::parse(&spec),
            OptionsInput::List(keywords) => RoleOptions::parse(&keywords.join(" ")),
            OptionsInput::Flags(flags) => {
                let mut options = RoleOptions::default();
                for (name, value) in flags {
                    options.set(&name, value)?;
                }
                Ok(options)
            }
        }
    }
}

impl TryFrom<RoleRuleSpec> for RoleRule {
    type Error = SyncError;

    fn try_from(spec: RoleRuleSpec) -> Result<Self, Self::Error> {
        let input = match spec {
            RoleRuleSpec::Name(name) => return Ok(RoleRule::new(name)),
            RoleRuleSpec::Rule(input) => input,
        };
        let names = input
            .names
            .ok_or_else(|| SyncError::user("Missing role name"))?
            .into_vec();
        Ok(RoleRule {
            names,
            parents: input.parents.into_vec(),
            members: input.members.into_vec(),
            options: input.options.map(RoleOptions::try_from).transpose()?.unwrap_or_default(),
            comment: input.comment,
        })
    }
}

impl RoleRule {
    pub fn new(name: Template) -> Self {
        Self {
            names: vec![name],
            parents: Vec::new(),
            members: Vec::new(),
            options: RoleOptions::default(),
            comment: None,
        }
    }

    fn templates(&self) -> impl Iterator<Item = &Template> {
        self.names
            .iter()
            .chain(&self.parents)
            .chain(&self.members)
            .chain(&self.comment)
    }

    pub fn attributes_map(&self) -> AttributeMap {
        let mut map = AttributeMap::new();
        for template in self.templates() {
            map.update(&template.attributes_map());
        }
        map
    }

    pub fn has_static_names(&self) -> bool {
        self.names.iter().any(Template::is_static)
    }

    pub fn is_static(&self) -> bool {
        self.templates().all(Template::is_static)
    }

    /// Roles wanted for one set of bindings.
    ///
    /// A comment template must render either one value, shared by every
    /// role, or exactly one value per role name.
    pub fn generate(&self, bindings: &Bindings) -> Result<Vec<Role>, SyncError> {
        let names = expand_all(&self.names, bindings)?;
        let parents = expand_all(&self.parents, bindings)?;
        let members = expand_all(&self.members, bindings)?;

        let comments = match &self.comment {
            None => Vec::new(),
            Some(template) => {
                let comments: Vec<String> = template.expand(bindings)?.collect();
                if comments.len() != 1 && comments.len() != names.len() {
                    return Err(SyncError::user(format!(
                        "Comment template {:?} renders {} values for {} roles",
                        template.source(),
                        comments.len(),
                        names.len()
                    )));
                }
                comments
            }
        };

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let mut role = Role::new(&name)
                    .with_options(self.options)
                    .with_parents(parents.iter().cloned())
                    .with_members(members.iter().cloned());
                role.comment = comments.get(i).or(comments.first()).cloned();
                role
            })
            .collect())
    }
}

pub(crate) fn expand_all(templates: &[Template], bindings: &Bindings) -> Result<Vec<String>, SyncError> {
    let mut out = Vec::new();
    for template in templates {
        out.extend(template.expand(bindings)?);
    }
    Ok(out)
}
