//! Small SQL assembly helpers: statements made of optional clauses, and
//! named parameters that are rewritten to positional placeholders when the
//! statement is executed.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

use crate::error::{QueryError, QueryResult};

/// An ordered list of `(keyword, content)` clauses. Clauses without content
/// are left out of the rendered text.
#[derive(Debug, Clone)]
pub struct Statement {
    clauses: Vec<(&'static str, Option<String>)>,
    separator: &'static str,
}

impl Default for Statement {
    fn default() -> Self {
        Self::new()
    }
}

impl Statement {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            separator: "\n",
        }
    }

    pub fn separator(mut self, separator: &'static str) -> Self {
        self.separator = separator;
        self
    }

    pub fn clause<S: Into<String>>(mut self, keyword: &'static str, content: Option<S>) -> Self {
        self.clauses.push((keyword, content.map(Into::into)));
        self
    }

    pub fn render(&self) -> String {
        self.clauses
            .iter()
            .filter_map(|(keyword, content)| match content {
                Some(content) if !content.is_empty() => Some(format!("{keyword} {content}")),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(self.separator)
    }
}

/// Joins the present conditions with `AND`; `None` when nothing is left.
pub fn all_of<I>(conditions: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let present: Vec<String> = conditions
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(" AND "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Timestamp(DateTime<Utc>),
    Text(String),
    TextArray(Vec<String>),
}

impl Param {
    fn is_empty(&self) -> bool {
        match self {
            Param::Timestamp(_) => false,
            Param::Text(value) => value.is_empty(),
            Param::TextArray(values) => values.is_empty(),
        }
    }

    pub fn bind_to<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Param::Timestamp(value) => query.bind(value),
            Param::Text(value) => query.bind(value),
            Param::TextArray(values) => query.bind(values),
        }
    }
}

/// Named parameters; absent or empty values are never recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(&'static str, Param)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: Option<Param>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.push((name, value));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|(n, _)| *n).collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Params,
}

impl BoundQuery {
    pub fn new(sql: String, params: Params) -> Self {
        Self { sql, params }
    }

    /// Rewrites `$(name)` placeholders to `$1`, `$2`, ... in order of first
    /// appearance and returns the values in that order.
    pub fn positional(&self) -> QueryResult<(String, Vec<Param>)> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut order: Vec<&str> = Vec::new();
        let mut rest = self.sql.as_str();

        while let Some(start) = rest.find("$(") {
            let Some(len) = rest[start + 2..].find(')') else {
                break;
            };
            let name = &rest[start + 2..start + 2 + len];
            let index = match order.iter().position(|n| *n == name) {
                Some(i) => i + 1,
                None => {
                    order.push(name);
                    order.len()
                }
            };
            sql.push_str(&rest[..start]);
            sql.push_str(&format!("${index}"));
            rest = &rest[start + 3 + len..];
        }
        sql.push_str(rest);

        let values = order
            .into_iter()
            .map(|name| {
                self.params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| QueryError::UnboundParameter(name.to_string()))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        Ok((sql, values))
    }
}
