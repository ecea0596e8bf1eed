use crate::error::{Error, Result};
use crate::filter::{IndexedFilter, LimitedFilter, NodeFilter, RangedFilter};
use crate::index::Index;
use crate::key_order::{MAX_NAME, MIN_NAME};
use crate::node::{NamedNode, Node};

/// Which end of the ordering a limited window is anchored to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViewFrom {
    Left,
    Right,
}

/// One end of a query range: an indexed value and an optional tie-break key.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryBound {
    pub value: Node,
    pub key: Option<String>,
}

/// Ordering, range and limit of a listen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    index: Index,
    start: Option<QueryBound>,
    end: Option<QueryBound>,
    limit: Option<usize>,
    view_from: Option<ViewFrom>,
}

fn bound(value: Node, key: Option<&str>) -> Result<QueryBound> {
    if !(value.is_leaf() || value.is_empty()) {
        return Err(Error::InvalidValue(format!(
            "query bounds must be leaf values, got {value}"
        )));
    }
    Ok(QueryBound {
        value,
        key: key.map(str::to_string),
    })
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, index: Index) -> Self {
        self.index = index;
        self
    }

    pub fn start_at(mut self, value: Node, key: Option<&str>) -> Result<Self> {
        self.start = Some(bound(value, key)?);
        Ok(self)
    }

    pub fn end_at(mut self, value: Node, key: Option<&str>) -> Result<Self> {
        self.end = Some(bound(value, key)?);
        Ok(self)
    }

    pub fn limit_to_first(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self.view_from = Some(ViewFrom::Left);
        self
    }

    pub fn limit_to_last(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self.view_from = Some(ViewFrom::Right);
        self
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn start(&self) -> Option<&QueryBound> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&QueryBound> {
        self.end.as_ref()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn has_anchored_limit(&self) -> bool {
        self.limit.is_some() && self.view_from.is_some()
    }

    /// Whether a limited window keeps the first children rather than the
    /// last. Without an explicit anchor a start bound implies left.
    pub fn is_view_from_left(&self) -> bool {
        match self.view_from {
            Some(view_from) => view_from == ViewFrom::Left,
            None => self.start.is_some(),
        }
    }

    pub fn start_key(&self) -> &str {
        self.start
            .as_ref()
            .and_then(|b| b.key.as_deref())
            .unwrap_or(MIN_NAME)
    }

    pub fn end_key(&self) -> &str {
        self.end
            .as_ref()
            .and_then(|b| b.key.as_deref())
            .unwrap_or(MAX_NAME)
    }

    pub fn start_post(&self) -> NamedNode {
        match &self.start {
            Some(start) => self.index.make_post(&start.value, self.start_key()),
            None => self.index.min_post(),
        }
    }

    pub fn end_post(&self) -> NamedNode {
        match &self.end {
            Some(end) => self.index.make_post(&end.value, self.end_key()),
            None => self.index.max_post(),
        }
    }

    pub fn loads_all_data(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.limit.is_none()
    }

    pub fn is_default(&self) -> bool {
        self.loads_all_data() && self.index == Index::Priority
    }

    pub fn is_valid(&self) -> bool {
        !(self.start.is_some() && self.end.is_some() && self.limit.is_some() && !self.has_anchored_limit())
    }

    pub fn node_filter(&self) -> Box<dyn NodeFilter> {
        if self.loads_all_data() {
            Box::new(IndexedFilter::new(self.index.clone()))
        } else if self.limit.is_some() {
            Box::new(LimitedFilter::new(self))
        } else {
            Box::new(RangedFilter::new(self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_everything() {
        let params = QueryParams::new();
        assert!(params.loads_all_data());
        assert!(params.is_default());
        assert!(params.is_valid());
        assert!(!params.node_filter().filters_nodes());
        assert!(!QueryParams::new().order_by(Index::Key).is_default());
    }

    #[test]
    fn view_direction_follows_limit_then_start() {
        assert!(QueryParams::new().limit_to_first(2).is_view_from_left());
        assert!(!QueryParams::new().limit_to_last(2).is_view_from_left());
        let started = QueryParams::new().start_at(Node::from(1), None).unwrap();
        assert!(started.is_view_from_left());
        assert!(!QueryParams::new().is_view_from_left());
    }

    #[test]
    fn bounds_must_be_leaves() {
        let children = Node::Empty.update_immediate_child("a", Node::from(1));
        assert!(matches!(
            QueryParams::new().start_at(children, None),
            Err(Error::InvalidValue(_))
        ));
        let params = QueryParams::new()
            .order_by(Index::Key)
            .start_at(Node::from("b"), None)
            .unwrap();
        assert_eq!(params.start_post().name, "b");
        assert_eq!(params.end_post(), Index::Key.max_post());
        assert_eq!(params.start_key(), MIN_NAME);
        assert_eq!(params.end_key(), MAX_NAME);
    }

    #[test]
    fn filter_kind_follows_params() {
        let ranged = QueryParams::new().end_at(Node::from(3), None).unwrap();
        assert!(ranged.node_filter().filters_nodes());
        assert!(!ranged.loads_all_data());
        let limited = QueryParams::new().limit_to_first(1);
        assert!(limited.node_filter().filters_nodes());
    }
}
