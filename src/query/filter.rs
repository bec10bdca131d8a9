use std::borrow::Cow;

use crate::types::{Instance, ReplicaSet, TopologySnapshot};

use super::document::SearchDocument;
use super::index::SearchIndex;
use super::parser::SearchQuery;

/// Instance decorated with its search document
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredInstanceView {
    pub instance: Instance,
    pub document: SearchDocument,
    /// Set by replica-set filtering: does the instance match the untagged tokens
    pub filter_matching: Option<bool>,
}

impl FilteredInstanceView {
    pub fn new(instance: &Instance) -> Self {
        Self {
            document: SearchDocument::for_instance(instance),
            instance: instance.clone(),
            filter_matching: None,
        }
    }
}

/// Replica set decorated with search documents for itself and its servers
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredReplicaSetView {
    pub replica_set: ReplicaSet,
    pub document: SearchDocument,
    pub servers: Vec<FilteredInstanceView>,
    /// Set by filtering with a non-empty query
    pub matching_servers_count: Option<usize>,
}

impl FilteredReplicaSetView {
    pub fn new(replica_set: &ReplicaSet) -> Self {
        Self {
            document: SearchDocument::for_replica_set(replica_set),
            servers: replica_set.servers.iter().map(FilteredInstanceView::new).collect(),
            replica_set: replica_set.clone(),
            matching_servers_count: None,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.replica_set.uuid
    }

    pub fn total_servers_count(&self) -> usize {
        self.servers.len()
    }
}

/// Filter prepared replica sets by a raw query string.
///
/// An empty query returns the input as is, borrowed and without match flags.
pub fn filter_replica_sets<'a>(
    list: &'a [FilteredReplicaSetView],
    query: &str,
) -> Cow<'a, [FilteredReplicaSetView]> {
    filter_replica_sets_with(list, &SearchQuery::parse(query))
}

pub fn filter_replica_sets_with<'a>(
    list: &'a [FilteredReplicaSetView],
    query: &SearchQuery,
) -> Cow<'a, [FilteredReplicaSetView]> {
    if query.is_empty() {
        return Cow::Borrowed(list);
    }

    let untagged = query.untagged();
    let filtered = list
        .iter()
        .filter(|view| view.document.contains_all_or_uuid_prefix(untagged))
        .filter(|view| view.document.matches_fields(query))
        .map(|view| {
            // servers are highlighted by the untagged tokens only
            let servers: Vec<FilteredInstanceView> = view
                .servers
                .iter()
                .map(|server| FilteredInstanceView {
                    filter_matching: Some(server.document.contains_all(untagged)),
                    ..server.clone()
                })
                .collect();
            let matching = servers
                .iter()
                .filter(|server| server.filter_matching == Some(true))
                .count();

            FilteredReplicaSetView {
                replica_set: view.replica_set.clone(),
                document: view.document.clone(),
                servers,
                matching_servers_count: Some(matching),
            }
        })
        .collect::<Vec<_>>();

    Cow::Owned(filtered)
}

/// Filter prepared instances, e.g. the unconfigured ones.
///
/// Unlike replica sets, untagged tokens never match a bare uuid prefix here.
pub fn filter_instances<'a>(
    list: &'a [FilteredInstanceView],
    query: &str,
) -> Cow<'a, [FilteredInstanceView]> {
    let query = SearchQuery::parse(query);
    if query.is_empty() {
        return Cow::Borrowed(list);
    }

    let filtered = list
        .iter()
        .filter(|view| view.document.contains_all(query.untagged()))
        .filter(|view| view.document.matches_fields(&query))
        .cloned()
        .collect::<Vec<_>>();

    Cow::Owned(filtered)
}

/// Build an index for `snapshot` and filter its replica sets.
///
/// Convenient for one-off calls; callers filtering on every keystroke should
/// keep a [`SearchIndex`] per snapshot instead.
pub fn filter_snapshot(snapshot: &TopologySnapshot, query: &str) -> Vec<FilteredReplicaSetView> {
    let index = SearchIndex::build(snapshot);
    filter_replica_sets(index.replica_sets(), query).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use std::collections::BTreeSet;

    fn server(uuid: &str, uri: &str, status: &str) -> Instance {
        let mut instance = Instance::new(uuid, uri, status);
        instance.replicaset_uuid = Some("r".to_string());
        instance
    }

    fn snapshot() -> TopologySnapshot {
        let mut r1 = ReplicaSet::new("r1", "rs-a", "healthy");
        r1.roles = vec!["storage".to_string()];
        r1.servers = vec![server("i1", "u1", "healthy")];

        let mut r2 = ReplicaSet::new("r2", "rs-b", "unhealthy");
        r2.roles = vec!["router".to_string()];

        TopologySnapshot {
            replica_sets: vec![r1, r2],
            ..Default::default()
        }
    }

    fn uuids(views: &[FilteredReplicaSetView]) -> BTreeSet<String> {
        views.iter().map(|view| view.uuid().to_string()).collect()
    }

    #[test]
    fn test_empty_query_is_identity() {
        let index = SearchIndex::build(&snapshot());
        let result = filter_replica_sets(index.replica_sets(), "");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(&*result, index.replica_sets());
        assert!(result.iter().all(|view| view.matching_servers_count.is_none()));
    }

    #[test]
    fn test_scenario_queries() {
        let snapshot = snapshot();

        let by_role = filter_snapshot(&snapshot, "role:storage");
        assert_eq!(uuids(&by_role), BTreeSet::from(["r1".to_string()]));

        let by_alias = filter_snapshot(&snapshot, "rs-b");
        assert_eq!(uuids(&by_alias), BTreeSet::from(["r2".to_string()]));

        let by_status = filter_snapshot(&snapshot, "status:healthy");
        assert_eq!(uuids(&by_status), BTreeSet::from(["r1".to_string()]));
        assert_eq!(by_status[0].matching_servers_count, Some(1));
    }

    #[test]
    fn test_exact_versus_substring_alias() {
        let mut rs = ReplicaSet::new("r9", "storage-1", "healthy");
        rs.roles = vec!["vshard-storage".to_string()];
        let snapshot = TopologySnapshot {
            replica_sets: vec![rs],
            ..Default::default()
        };

        assert_eq!(filter_snapshot(&snapshot, "alias:storage-1").len(), 1);
        assert_eq!(filter_snapshot(&snapshot, "alias:storage").len(), 0);
        assert_eq!(filter_snapshot(&snapshot, "alias*:storage").len(), 1);
    }

    #[test]
    fn test_negation() {
        let result = filter_snapshot(&snapshot(), "status!:healthy");
        assert_eq!(uuids(&result), BTreeSet::from(["r2".to_string()]));
    }

    #[test]
    fn test_bare_uuid_prefix_matches_replica_set() {
        let mut rs = ReplicaSet::new("5f3a9c00-0000", "alpha", "healthy");
        rs.roles = vec!["storage".to_string()];
        let snapshot = TopologySnapshot {
            replica_sets: vec![rs],
            ..Default::default()
        };
        assert_eq!(filter_snapshot(&snapshot, "5f3a").len(), 1);
        assert_eq!(filter_snapshot(&snapshot, "9c00").len(), 0);
    }

    #[test]
    fn test_server_highlight_uses_untagged_tokens_only() {
        let mut rs = ReplicaSet::new("r1", "rs-a", "healthy");
        rs.roles = vec!["storage".to_string()];
        rs.servers = vec![
            server("i1", "host-a:3301", "healthy"),
            server("i2", "host-b:3302", "healthy"),
        ];
        let snapshot = TopologySnapshot {
            replica_sets: vec![rs],
            ..Default::default()
        };

        let result = filter_snapshot(&snapshot, "role:storage host-b");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].matching_servers_count, Some(1));
        assert_eq!(result[0].servers[0].filter_matching, Some(false));
        assert_eq!(result[0].servers[1].filter_matching, Some(true));
        assert_eq!(result[0].total_servers_count(), 2);
    }

    #[test]
    fn test_replica_set_labels_cover_servers() {
        let mut labelled = server("i1", "u1", "healthy");
        labelled.labels = vec![Label::new("dc", "msk")];
        let mut rs = ReplicaSet::new("r1", "rs-a", "healthy");
        rs.servers = vec![labelled];
        let snapshot = TopologySnapshot {
            replica_sets: vec![rs, ReplicaSet::new("r2", "rs-b", "healthy")],
            ..Default::default()
        };

        let result = filter_snapshot(&snapshot, "labels:dc:msk");
        assert_eq!(uuids(&result), BTreeSet::from(["r1".to_string()]));
    }

    #[test]
    fn test_filter_instances() {
        let mut a = Instance::new("aaaa", "10.0.0.1:3301", "unconfigured");
        a.alias = Some("spare-1".to_string());
        let b = Instance::new("bbbb", "10.0.0.2:3301", "unconfigured");
        let views: Vec<_> = [a, b].iter().map(FilteredInstanceView::new).collect();

        assert_eq!(filter_instances(&views, "spare").len(), 1);
        assert_eq!(filter_instances(&views, "uri*:10.0.0").len(), 2);
        // no bare uuid prefix for instances
        assert_eq!(filter_instances(&views, "bbbb").len(), 0);
        assert!(matches!(filter_instances(&views, "   "), Cow::Borrowed(_)));
    }
}
