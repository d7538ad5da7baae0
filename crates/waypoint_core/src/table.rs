//! In-memory table with status and secondary indexes.

use crate::record::CachedRecord;
use crate::schema::{IndexDef, IndexKey};
use crate::types::{RecordId, SyncStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type IndexMap = BTreeMap<IndexKey, BTreeSet<RecordId>>;

/// Records of one table plus their indexes.
#[derive(Debug, Default)]
pub(crate) struct Table {
    records: BTreeMap<RecordId, CachedRecord>,
    by_status: HashMap<SyncStatus, BTreeSet<RecordId>>,
    indexes: Vec<(IndexDef, IndexMap)>,
}

impl Table {
    pub(crate) fn new(indexes: &[IndexDef]) -> Self {
        Self {
            records: BTreeMap::new(),
            by_status: HashMap::new(),
            indexes: indexes
                .iter()
                .cloned()
                .map(|def| (def, IndexMap::new()))
                .collect(),
        }
    }

    pub(crate) fn get(&self, id: &RecordId) -> Option<&CachedRecord> {
        self.records.get(id)
    }

    pub(crate) fn put(&mut self, record: CachedRecord) -> Option<CachedRecord> {
        let previous = self.remove(&record.id);
        self.index(&record);
        self.records.insert(record.id.clone(), record);
        previous
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> Option<CachedRecord> {
        let record = self.records.remove(id)?;
        if let Some(ids) = self.by_status.get_mut(&record.sync_status) {
            ids.remove(id);
        }
        for (def, map) in &mut self.indexes {
            if let Some(key) = def.key_for(&record) {
                if let Some(ids) = map.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        map.remove(&key);
                    }
                }
            }
        }
        Some(record)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CachedRecord> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn with_status(&self, status: SyncStatus) -> Vec<&CachedRecord> {
        self.by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Live records matching `key` on the named index, or `None` if the
    /// table has no such index.
    pub(crate) fn lookup(&self, index: &str, key: &IndexKey) -> Option<Vec<&CachedRecord>> {
        let (_, map) = self.indexes.iter().find(|(def, _)| def.name() == index)?;
        Some(
            map.get(key)
                .into_iter()
                .flatten()
                .filter_map(|id| self.records.get(id))
                .filter(|record| record.is_live())
                .collect(),
        )
    }

    fn index(&mut self, record: &CachedRecord) {
        self.by_status
            .entry(record.sync_status)
            .or_default()
            .insert(record.id.clone());
        for (def, map) in &mut self.indexes {
            if let Some(key) = def.key_for(record) {
                map.entry(key).or_default().insert(record.id.clone());
            }
        }
    }
}
