use crate::types::{Instance, ReplicaSet};

use super::parser::{FieldPredicate, MatchMode, SearchField, SearchQuery};

/// Lowercased value of one searchable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Missing,
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    fn scalar(value: &str) -> Self {
        FieldValue::Scalar(value.to_lowercase())
    }

    fn optional(value: Option<&str>) -> Self {
        value.map_or(FieldValue::Missing, FieldValue::scalar)
    }

    fn list<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        FieldValue::List(values.into_iter().map(str::to_lowercase).collect())
    }

    /// A list contains the needle when any element does.
    fn contains(&self, needle: &str, as_substring: bool) -> bool {
        match self {
            FieldValue::Missing => false,
            FieldValue::Scalar(value) if as_substring => value.contains(needle),
            FieldValue::Scalar(value) => value == needle,
            FieldValue::List(values) if as_substring => {
                values.iter().any(|value| value.contains(needle))
            }
            FieldValue::List(values) => values.iter().any(|value| value == needle),
        }
    }

    pub fn matches(&self, predicate: &FieldPredicate) -> bool {
        match predicate.mode {
            MatchMode::Exact => self.contains(&predicate.value, false),
            MatchMode::Substring => self.contains(&predicate.value, true),
            MatchMode::Negate => !self.contains(&predicate.value, false),
        }
    }
}

/// Precomputed search data of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    search_string: String,
    uuid: FieldValue,
    roles: FieldValue,
    alias: FieldValue,
    status: FieldValue,
    uri: FieldValue,
    labels: FieldValue,
}

fn server_search_items(instance: &Instance) -> Vec<String> {
    let leadership = if instance.read_only { "is:follower" } else { "is:leader" };
    [
        instance.uri.clone(),
        instance.alias.clone().unwrap_or_default(),
        format!("status:{}", instance.status),
        leadership.to_string(),
    ]
    .into_iter()
    .filter(|item| !item.is_empty())
    .collect()
}

fn join_items(items: impl IntoIterator<Item = String>) -> String {
    items
        .into_iter()
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn label_pairs<'a>(instances: impl IntoIterator<Item = &'a Instance>) -> Vec<String> {
    instances
        .into_iter()
        .flat_map(|instance| instance.labels.iter())
        .map(|label| format!("{}:{}", label.name, label.value))
        .collect()
}

impl SearchDocument {
    pub fn for_instance(instance: &Instance) -> Self {
        Self {
            search_string: join_items(server_search_items(instance)),
            uuid: FieldValue::scalar(&instance.uuid),
            roles: FieldValue::Missing,
            alias: FieldValue::optional(instance.alias.as_deref()),
            status: FieldValue::scalar(&instance.status),
            uri: FieldValue::scalar(&instance.uri),
            labels: FieldValue::list(label_pairs([instance]).iter().map(String::as_str)),
        }
    }

    pub fn for_replica_set(replica_set: &ReplicaSet) -> Self {
        let items = std::iter::once(replica_set.alias.clone())
            .chain(replica_set.roles.iter().cloned())
            .chain(replica_set.servers.iter().flat_map(server_search_items));

        Self {
            search_string: join_items(items),
            uuid: FieldValue::scalar(&replica_set.uuid),
            roles: FieldValue::list(replica_set.roles.iter().map(String::as_str)),
            alias: FieldValue::scalar(&replica_set.alias),
            status: FieldValue::scalar(&replica_set.status),
            uri: FieldValue::list(replica_set.servers.iter().map(|server| server.uri.as_str())),
            labels: FieldValue::list(label_pairs(&replica_set.servers).iter().map(String::as_str)),
        }
    }

    pub fn search_string(&self) -> &str {
        &self.search_string
    }

    pub fn field(&self, field: SearchField) -> &FieldValue {
        match field {
            SearchField::Uuid => &self.uuid,
            SearchField::Roles => &self.roles,
            SearchField::Alias => &self.alias,
            SearchField::Status => &self.status,
            SearchField::Uri => &self.uri,
            SearchField::Labels => &self.labels,
        }
    }

    /// Every untagged token occurs in the search string.
    pub fn contains_all(&self, tokens: &[String]) -> bool {
        tokens.iter().all(|token| self.search_string.contains(token.as_str()))
    }

    fn uuid_starts_with(&self, token: &str) -> bool {
        matches!(&self.uuid, FieldValue::Scalar(uuid) if uuid.starts_with(token))
    }

    /// Untagged tokens may also match as a bare uuid prefix.
    pub fn contains_all_or_uuid_prefix(&self, tokens: &[String]) -> bool {
        tokens.iter().all(|token| {
            self.search_string.contains(token.as_str()) || self.uuid_starts_with(token)
        })
    }

    pub fn matches_fields(&self, query: &SearchQuery) -> bool {
        query.fields().all(|(field, predicates)| {
            let value = self.field(field);
            predicates.iter().all(|predicate| value.matches(predicate))
        })
    }
}
