//! Query cache for the data-access layer.
//!
//! Reads are cached under a [`QueryKey`]; every mutation in the store
//! invalidates the keys whose results it may have changed. A key pattern with
//! `None` as its parameter matches every parameter, so `Selections(None)`
//! drops all per-room selection lists at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::models::{Customer, Room, SelectionView, Tile};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Customers,
    Rooms(Option<Uuid>),
    Selections(Option<Uuid>),
    Tiles,
    Tile(Option<String>),
}

impl QueryKey {
    /// Whether this pattern covers `key`.
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (QueryKey::Customers, QueryKey::Customers) => true,
            (QueryKey::Tiles, QueryKey::Tiles) => true,
            (QueryKey::Rooms(None), QueryKey::Rooms(_)) => true,
            (QueryKey::Rooms(a), QueryKey::Rooms(b)) => a == b,
            (QueryKey::Selections(None), QueryKey::Selections(_)) => true,
            (QueryKey::Selections(a), QueryKey::Selections(b)) => a == b,
            (QueryKey::Tile(None), QueryKey::Tile(_)) => true,
            (QueryKey::Tile(a), QueryKey::Tile(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Cached {
    Customers(Arc<Vec<Customer>>),
    Rooms(Arc<Vec<Room>>),
    Selections(Arc<Vec<SelectionView>>),
    Tiles(Arc<Vec<Tile>>),
    Tile(Option<Tile>),
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Cached>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<Cached> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn put(&self, key: QueryKey, value: Cached) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, value);
    }

    /// Drop every entry matched by `pattern`; returns how many were dropped.
    pub fn invalidate(&self, pattern: &QueryKey) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        let dropped = before - entries.len();
        if dropped > 0 {
            log::debug!("invalidated {} cached queries for {:?}", dropped, pattern);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
