use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const TOKEN_SEPARATOR: char = ':';

/// Record fields addressable with a `prefix:` token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchField {
    Uuid,
    Roles,
    Alias,
    Status,
    Uri,
    Labels,
}

impl SearchField {
    pub const ALL: [SearchField; 6] = [
        SearchField::Uuid,
        SearchField::Roles,
        SearchField::Alias,
        SearchField::Status,
        SearchField::Uri,
        SearchField::Labels,
    ];

    /// Resolve a query prefix. `role` is accepted as a synonym of `roles`.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "uuid" => Some(SearchField::Uuid),
            "roles" | "role" => Some(SearchField::Roles),
            "alias" => Some(SearchField::Alias),
            "status" => Some(SearchField::Status),
            "uri" => Some(SearchField::Uri),
            "labels" => Some(SearchField::Labels),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Uuid => "uuid",
            SearchField::Roles => "roles",
            SearchField::Alias => "alias",
            SearchField::Status => "status",
            SearchField::Uri => "uri",
            SearchField::Labels => "labels",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// `prefix:value`: the field equals the value
    Exact,
    /// `prefix*:value`: the field contains the value
    Substring,
    /// `prefix!:value`: the field does not equal the value
    Negate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPredicate {
    pub value: String,
    pub mode: MatchMode,
}

impl FieldPredicate {
    pub fn new(value: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            value: value.into(),
            mode,
        }
    }

    pub fn as_substring(&self) -> bool {
        self.mode == MatchMode::Substring
    }

    pub fn negate(&self) -> bool {
        self.mode == MatchMode::Negate
    }
}

enum Token<'a> {
    Untagged(&'a str),
    Field(SearchField, FieldPredicate),
}

fn classify(token: &str) -> Option<Token<'_>> {
    let Some(separator) = token.find(TOKEN_SEPARATOR) else {
        return Some(Token::Untagged(token));
    };

    let head = &token[..separator];
    let value = &token[separator + 1..];
    if value.is_empty() {
        return None;
    }

    // `status*:healthy` has prefix `status` and modifier `*`
    let (prefix, mode) = match head.as_bytes().last() {
        Some(b'!') => (&head[..head.len() - 1], MatchMode::Negate),
        Some(b'*') => (&head[..head.len() - 1], MatchMode::Substring),
        _ => (head, MatchMode::Exact),
    };

    match SearchField::from_prefix(prefix) {
        Some(field) => Some(Token::Field(field, FieldPredicate::new(value, mode))),
        // unknown prefixes are just part of the text
        None => Some(Token::Untagged(token)),
    }
}

/// Parsed free-text filter.
///
/// The grammar has no reject states: every input yields some query, possibly
/// an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    all: Vec<String>,
    fields: BTreeMap<SearchField, Vec<FieldPredicate>>,
}

impl SearchQuery {
    pub fn parse(input: &str) -> Self {
        let lowered = input.to_lowercase();
        let mut query = SearchQuery::default();

        for token in lowered.split_whitespace() {
            match classify(token) {
                Some(Token::Untagged(text)) => query.all.push(text.to_string()),
                Some(Token::Field(field, predicate)) => {
                    query.fields.entry(field).or_default().push(predicate)
                }
                None => {}
            }
        }

        query
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.fields.is_empty()
    }

    /// Tokens without a recognised prefix
    pub fn untagged(&self) -> &[String] {
        &self.all
    }

    pub fn predicates(&self, field: SearchField) -> &[FieldPredicate] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (SearchField, &[FieldPredicate])> {
        self.fields
            .iter()
            .map(|(field, predicates)| (*field, predicates.as_slice()))
    }
}

impl FromStr for SearchQuery {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SearchQuery::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_tokens_are_lowercased_and_split() {
        let query = SearchQuery::parse("  Storage   RS-1\tmsk ");
        assert_eq!(query.untagged(), ["storage", "rs-1", "msk"]);
        assert_eq!(query.fields().count(), 0);
    }

    #[test]
    fn test_prefix_modifiers() {
        let query = SearchQuery::parse("alias:storage-1 status!:healthy uri*:3301");
        assert_eq!(
            query.predicates(SearchField::Alias),
            [FieldPredicate::new("storage-1", MatchMode::Exact)]
        );
        assert_eq!(
            query.predicates(SearchField::Status),
            [FieldPredicate::new("healthy", MatchMode::Negate)]
        );
        assert!(query.predicates(SearchField::Uri)[0].as_substring());
        assert!(query.untagged().is_empty());
    }

    #[test]
    fn test_role_is_alias_for_roles() {
        let query = SearchQuery::parse("role:storage roles!:router");
        let roles = query.predicates(SearchField::Roles);
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].value, "storage");
        assert!(roles[1].negate());
    }

    #[test]
    fn test_unknown_prefix_falls_back_to_whole_token() {
        let query = SearchQuery::parse("is:leader zone*:msk :x");
        assert_eq!(query.untagged(), ["is:leader", "zone*:msk", ":x"]);
        assert_eq!(query.fields().count(), 0);
    }

    #[test]
    fn test_empty_value_is_dropped() {
        let query = SearchQuery::parse("status: alias*: nothing:");
        assert!(query.is_empty());
    }

    #[test]
    fn test_value_keeps_later_separators() {
        let query = SearchQuery::parse("labels:dc:msk");
        assert_eq!(query.predicates(SearchField::Labels)[0].value, "dc:msk");
    }

    #[test]
    fn test_from_str_never_fails() {
        let query: SearchQuery = "UUID*:AAAA".parse().unwrap();
        assert_eq!(
            query.predicates(SearchField::Uuid),
            [FieldPredicate::new("aaaa", MatchMode::Substring)]
        );
    }
}
