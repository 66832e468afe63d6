use crate::catalog::grant::Target;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Safe,
    Destructive,
}

/// One SQL statement of the plan, with the message shown to the operator.
///
/// `database` is `None` for statements run on the default database, such as
/// role management. A statement targeting [`Target::All`] is run once per
/// database: its SQL is sent as is and `{database}` in its message is
/// substituted each time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub message: String,
    pub database: Option<Target>,
    pub sql: String,
    pub safety: Safety,
}

impl Statement {
    pub fn new(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            database: None,
            sql: sql.into(),
            safety: Safety::Safe,
        }
    }

    pub fn destructive(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            safety: Safety::Destructive,
            ..Self::new(message, sql)
        }
    }

    pub fn on(mut self, database: Target) -> Self {
        self.database = Some(database);
        self
    }

    pub fn is_destructive(&self) -> bool {
        self.safety == Safety::Destructive
    }

    /// Copy of an all-databases statement bound to `dbname`.
    pub fn for_database(&self, dbname: &str) -> Self {
        Self {
            message: substitute(&self.message, |name| {
                (name == "database").then(|| dbname.to_string())
            }),
            database: Some(Target::named(dbname)),
            sql: self.sql.clone(),
            safety: self.safety,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Replace every all-databases statement by one statement per database,
/// keeping the order of the plan.
pub fn expand_all_databases<'a>(
    statements: Vec<Statement>,
    databases: impl IntoIterator<Item = &'a str> + Clone,
) -> Vec<Statement> {
    let mut expanded = Vec::with_capacity(statements.len());
    for statement in statements {
        if statement.database == Some(Target::All) {
            expanded.extend(
                databases
                    .clone()
                    .into_iter()
                    .map(|dbname| statement.for_database(dbname)),
            );
        } else {
            expanded.push(statement);
        }
    }
    expanded
}

/// Replace every `{name}` placeholder of `template` known to `lookup`, in a
/// single pass.
///
/// Substituted values are never scanned again. Unknown placeholders are
/// kept as is and `{{` or `}}` stand for a literal brace.
pub fn substitute(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(['{', '}']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if let Some(body) = tail.strip_prefix('{') {
            if let Some(end) = body.find(['{', '}']) {
                if body[end..].starts_with('}') {
                    if let Some(value) = lookup(&body[..end]) {
                        out.push_str(&value);
                        rest = &body[end + 1..];
                        continue;
                    }
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Protect braces of `text` from [`substitute`].
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Join identifiers as a SQL list: `"a", "b"`.
pub fn quote_ident_list<'a>(idents: impl IntoIterator<Item = &'a str>) -> String {
    idents
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}
