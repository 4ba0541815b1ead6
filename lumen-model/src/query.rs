use serde::{Deserialize, Serialize};

use crate::ids::ItemId;
use crate::item::ItemType;

/// Paged list envelope used by item and view endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total_record_count: u32,
    #[serde(default)]
    pub start_index: u32,
}

impl<T> Default for QueryResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_record_count: 0,
            start_index: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_query_value(self) -> &'static str {
        match self {
            SortOrder::Ascending => "Ascending",
            SortOrder::Descending => "Descending",
        }
    }
}

/// Filter for item listings and search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub parent_id: Option<ItemId>,
    pub include_item_types: Vec<ItemType>,
    pub search_term: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub start_index: Option<u32>,
    pub limit: Option<u32>,
    pub recursive: bool,
    pub favorites_only: bool,
}

impl ItemQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent_id: impl Into<ItemId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn include(mut self, item_type: ItemType) -> Self {
        if !self.include_item_types.contains(&item_type) {
            self.include_item_types.push(item_type);
        }
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn page(mut self, start_index: u32, limit: u32) -> Self {
        self.start_index = Some(start_index);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn favorites_only(mut self, favorites_only: bool) -> Self {
        self.favorites_only = favorites_only;
        self
    }

    /// Query-string pairs in the server's parameter naming
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(parent) = &self.parent_id {
            pairs.push(("ParentId", parent.to_string()));
        }
        if !self.include_item_types.is_empty() {
            let types = self
                .include_item_types
                .iter()
                .map(|t| t.as_query_value())
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("IncludeItemTypes", types));
        }
        if let Some(term) =
            self.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty())
        {
            pairs.push(("SearchTerm", term.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("SortBy", sort_by.clone()));
            pairs.push(("SortOrder", self.sort_order.as_query_value().into()));
        }
        if let Some(start) = self.start_index {
            pairs.push(("StartIndex", start.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("Limit", limit.to_string()));
        }
        if self.recursive {
            pairs.push(("Recursive", "true".into()));
        }
        if self.favorites_only {
            pairs.push(("Filters", "IsFavorite".into()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_has_no_pairs() {
        assert!(ItemQuery::new().to_query_pairs().is_empty());
    }

    #[test]
    fn builder_emits_server_parameter_names() {
        let query = ItemQuery::new()
            .parent("lib-1")
            .include(ItemType::Movie)
            .include(ItemType::Series)
            .include(ItemType::Movie)
            .sort("SortName", SortOrder::Descending)
            .page(20, 10)
            .recursive(true);
        let pairs = query.to_query_pairs();

        assert!(pairs.contains(&("ParentId", "lib-1".into())));
        assert!(pairs.contains(&("IncludeItemTypes", "Movie,Series".into())));
        assert!(pairs.contains(&("SortBy", "SortName".into())));
        assert!(pairs.contains(&("SortOrder", "Descending".into())));
        assert!(pairs.contains(&("StartIndex", "20".into())));
        assert!(pairs.contains(&("Limit", "10".into())));
        assert!(pairs.contains(&("Recursive", "true".into())));
    }

    #[test]
    fn blank_search_term_is_dropped() {
        let pairs = ItemQuery::new().search("   ").to_query_pairs();
        assert!(pairs.iter().all(|(k, _)| *k != "SearchTerm"));

        let pairs = ItemQuery::new().search(" dune ").to_query_pairs();
        assert!(pairs.contains(&("SearchTerm", "dune".into())));
    }
}
