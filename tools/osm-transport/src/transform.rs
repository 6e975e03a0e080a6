use crate::error::TransportError;
use crate::extract::{Extractor, Line, Stop, Tags};
use hashbrown::HashMap;
use roxmltree::Document;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Relation tags that are never copied into a line summary
const SUMMARY_EXCLUDED_TAGS: [&str; 2] = ["type", "stops"];

/// One line serving a stop: the relation id plus its descriptive tags
#[derive(Clone, Debug, PartialEq)]
pub struct LineSummary {
    pub relation_id: i64,
    pub tags: Tags,
}

impl LineSummary {
    pub fn new(relation_id: i64, line: &Line) -> Self {
        let tags = line
            .tags
            .iter()
            .filter(|(k, _)| !SUMMARY_EXCLUDED_TAGS.contains(&k.as_str()))
            .filter(|(k, _)| {
                let shadowed = k.as_str() == "relation_id";
                if shadowed {
                    log::debug!("REL-{}: tag 'relation_id' shadowed by the relation id", relation_id);
                }
                !shadowed
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { relation_id, tags }
    }
}

/// A stop in the output listing, with every line that serves it
#[derive(Clone, Debug, PartialEq)]
pub struct StopRecord {
    pub node_id: i64,
    pub tags: Tags,
    pub lines: Vec<LineSummary>,
}

impl StopRecord {
    pub fn new(node_id: i64, stop: &Stop, lines: Vec<LineSummary>) -> Self {
        let mut tags = stop.tags.clone();
        for key in ["node_id", "lines"] {
            if tags.remove(key).is_some() {
                log::debug!("NODE-{}: tag '{}' shadowed by output field", node_id, key);
            }
        }
        Self {
            node_id,
            tags,
            lines,
        }
    }
}

/// Tags sorted by key so repeated runs serialize identically
fn sorted_tags(tags: &Tags) -> Vec<(&String, &String)> {
    let mut sorted: Vec<_> = tags.iter().collect();
    sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
    sorted
}

impl Serialize for LineSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.tags.len() + 1))?;
        map.serialize_entry("relation_id", &self.relation_id)?;
        for (k, v) in sorted_tags(&self.tags) {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for StopRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.tags.len() + 2))?;
        map.serialize_entry("node_id", &self.node_id)?;
        for (k, v) in sorted_tags(&self.tags) {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("lines", &self.lines)?;
        map.end()
    }
}

/// Lines, stops, and the stop -> lines reverse index built from one document
#[derive(Debug, Default)]
pub struct TransitIndex {
    /// Lines keyed by relation id
    pub lines: HashMap<i64, Line>,
    /// Stops keyed by node id, iterated in ascending id order
    pub stops: BTreeMap<i64, Stop>,
    /// Relation ids referencing each stop, in document order (duplicates kept)
    pub stop_lines: HashMap<i64, Vec<i64>>,
}

impl TransitIndex {
    /// Pass 1: every relation, in document order
    pub fn index_lines(&mut self, doc: &Document<'_>, extractor: &mut Extractor) -> Result<(), TransportError> {
        for elem in doc.descendants().filter(|n| n.has_tag_name("relation")) {
            let Some(relation_id) = extractor.element_id(elem)? else {
                continue;
            };
            let line = extractor.line(elem)?;
            for &stop in &line.stops {
                self.stop_lines.entry(stop).or_default().push(relation_id);
            }
            self.lines.insert(relation_id, line);
        }
        log::info!("  Indexed {} lines", self.lines.len());
        Ok(())
    }

    /// Pass 2: every node, in document order
    pub fn index_stops(&mut self, doc: &Document<'_>, extractor: &mut Extractor) -> Result<(), TransportError> {
        for elem in doc.descendants().filter(|n| n.has_tag_name("node")) {
            let Some(node_id) = extractor.element_id(elem)? else {
                continue;
            };
            self.stops.insert(node_id, extractor.stop(elem));
        }
        log::info!("  Indexed {} stops", self.stops.len());
        Ok(())
    }

    /// Summaries of the lines serving a stop; empty when none do
    pub fn lines_for(&self, node_id: i64) -> Vec<LineSummary> {
        self.stop_lines
            .get(&node_id)
            .map(|relation_ids| {
                relation_ids
                    .iter()
                    .filter_map(|rid| self.lines.get(rid).map(|line| LineSummary::new(*rid, line)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pass 3: one record per indexed stop
    pub fn records(&self) -> Vec<StopRecord> {
        self.stops
            .iter()
            .map(|(&node_id, stop)| StopRecord::new(node_id, stop, self.lines_for(node_id)))
            .collect()
    }

    /// Stop ids referenced by some line but absent from the node records.
    /// These contribute nothing to the output.
    pub fn orphaned_stops(&self) -> Vec<i64> {
        let mut orphans: Vec<i64> = self
            .stop_lines
            .keys()
            .filter(|id| !self.stops.contains_key(*id))
            .copied()
            .collect();
        orphans.sort_unstable();
        orphans
    }

    /// Number of stops served by at least one line
    pub fn served_stops(&self) -> usize {
        self.stops
            .keys()
            .filter(|id| self.stop_lines.contains_key(*id))
            .count()
    }
}
