use crate::error::TransportError;
use hashbrown::HashMap;
use roxmltree::Node;

/// Tag storage type
pub type Tags = HashMap<String, String>;

/// What to do with an element whose identifier cannot be used
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InvalidIdPolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Drop the offending element or member and keep going
    Skip,
}

/// A route relation: its tags and the node ids of its stop members, in order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Line {
    pub stops: Vec<i64>,
    pub tags: Tags,
}

/// A stop node (tags only, coordinates are not kept)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stop {
    pub tags: Tags,
}

/// Counters for anomalies met while extracting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub ignored_children: usize,
    pub skipped: usize,
}

/// Converts `relation` and `node` elements into [`Line`] and [`Stop`] records.
pub struct Extractor {
    policy: InvalidIdPolicy,
    stats: ExtractStats,
}

/// Parse an OSM identifier, which the XML carries as a decimal string
pub fn parse_id(element: impl Into<String>, value: &str) -> Result<i64, TransportError> {
    value
        .parse::<i64>()
        .map_err(|_| TransportError::InvalidIdentifier {
            element: element.into(),
            value: value.to_string(),
        })
}

fn is_stop_member(child: Node<'_, '_>) -> bool {
    child.attribute("type") == Some("node") && child.attribute("role") == Some("stop")
}

fn tag_pair(child: Node<'_, '_>) -> Option<(String, String)> {
    Some((
        child.attribute("k")?.to_string(),
        child.attribute("v")?.to_string(),
    ))
}

/// Render an element as `<name attr="value" ...>` for diagnostics
fn describe(child: Node<'_, '_>) -> String {
    let attrs: String = child
        .attributes()
        .map(|a| format!(" {}=\"{}\"", a.name(), a.value()))
        .collect();
    format!("<{}{}>", child.tag_name().name(), attrs)
}

impl Extractor {
    pub fn new(policy: InvalidIdPolicy) -> Self {
        Self {
            policy,
            stats: ExtractStats::default(),
        }
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    /// Apply the identifier policy to a failed lookup.
    /// Returns `Ok(None)` when the value should be skipped.
    fn apply_policy<T>(&mut self, result: Result<T, TransportError>) -> Result<Option<T>, TransportError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => match self.policy {
                InvalidIdPolicy::Abort => Err(err),
                InvalidIdPolicy::Skip => {
                    log::warn!("Skipping: {}", err);
                    self.stats.skipped += 1;
                    Ok(None)
                }
            },
        }
    }

    /// Numeric `id` of a relation or node element, or `None` if it was skipped
    pub fn element_id(&mut self, elem: Node<'_, '_>) -> Result<Option<i64>, TransportError> {
        let kind = elem.tag_name().name();
        let result = match elem.attribute("id") {
            Some(value) => parse_id(kind, value),
            None => Err(TransportError::MissingAttribute {
                element: kind.to_string(),
                attribute: "id",
            }),
        };
        self.apply_policy(result)
    }

    /// Convert a `relation` element into a [`Line`].
    ///
    /// Members with `type="node"` and `role="stop"` become stops, `tag`
    /// children become tags, and everything else is reported and ignored.
    /// Any other element kind yields an empty line.
    pub fn line(&mut self, elem: Node<'_, '_>) -> Result<Line, TransportError> {
        let mut line = Line::default();
        if !elem.has_tag_name("relation") {
            return Ok(line);
        }
        let rel_id = elem.attribute("id").unwrap_or("?");

        for child in elem.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "member" if is_stop_member(child) => {
                    let element = format!("relation {} member", rel_id);
                    let result = match child.attribute("ref") {
                        Some(value) => parse_id(element, value),
                        None => Err(TransportError::MissingAttribute {
                            element,
                            attribute: "ref",
                        }),
                    };
                    if let Some(stop) = self.apply_policy(result)? {
                        line.stops.push(stop);
                    }
                }
                "tag" => match tag_pair(child) {
                    Some((k, v)) => {
                        line.tags.insert(k, v);
                    }
                    None => {
                        log::warn!("REL-{}: ignored incomplete tag {}", rel_id, describe(child));
                        self.stats.ignored_children += 1;
                    }
                },
                _ => {
                    log::warn!("REL-{}: ignored child {}", rel_id, describe(child));
                    self.stats.ignored_children += 1;
                }
            }
        }

        Ok(line)
    }

    /// Convert a `node` element into a [`Stop`]; any other element kind
    /// yields an empty stop. A repeated key keeps its last value.
    pub fn stop(&mut self, elem: Node<'_, '_>) -> Stop {
        let mut stop = Stop::default();
        if !elem.has_tag_name("node") {
            return stop;
        }

        for child in elem.children().filter(Node::is_element) {
            if !child.has_tag_name("tag") {
                log::debug!(
                    "NODE-{}: ignored child {}",
                    elem.attribute("id").unwrap_or("?"),
                    describe(child)
                );
                continue;
            }
            match tag_pair(child) {
                Some((k, v)) => {
                    stop.tags.insert(k, v);
                }
                None => {
                    log::warn!(
                        "NODE-{}: ignored incomplete tag {}",
                        elem.attribute("id").unwrap_or("?"),
                        describe(child)
                    );
                    self.stats.ignored_children += 1;
                }
            }
        }

        stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    const RELATION: &str = r#"<osm>
  <relation id="100">
    <member type="node" ref="1" role="stop"/>
    <member type="way" ref="50" role=""/>
    <member type="node" ref="2" role="platform"/>
    <member type="node" ref="3" role="stop"/>
    <member type="node" ref="1" role="stop"/>
    <tag k="name" v="Line A"/>
    <tag k="type" v="route"/>
    <nd ref="9"/>
  </relation>
</osm>"#;

    fn first<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Node<'a, 'input> {
        doc.descendants().find(|n| n.has_tag_name(name)).unwrap()
    }

    #[test]
    fn test_line_collects_stop_members_in_order() {
        let doc = Document::parse(RELATION).unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        let line = extractor.line(first(&doc, "relation")).unwrap();

        assert_eq!(line.stops, vec![1, 3, 1]);
        assert_eq!(line.tags.get("name").map(String::as_str), Some("Line A"));
        assert_eq!(line.tags.get("type").map(String::as_str), Some("route"));
        assert_eq!(line.tags.len(), 2);
    }

    #[test]
    fn test_line_counts_ignored_children() {
        let doc = Document::parse(RELATION).unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        extractor.line(first(&doc, "relation")).unwrap();

        // way member, platform member, and the stray <nd>
        assert_eq!(extractor.stats().ignored_children, 3);
        assert_eq!(extractor.stats().skipped, 0);
    }

    #[test]
    fn test_line_from_wrong_element_is_empty() {
        let doc = Document::parse(r#"<osm><node id="1"><tag k="name" v="x"/></node></osm>"#).unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        let line = extractor.line(first(&doc, "node")).unwrap();

        assert!(line.stops.is_empty());
        assert!(line.tags.is_empty());
    }

    #[test]
    fn test_stop_copies_tags_last_value_wins() {
        let doc = Document::parse(
            r#"<osm><node id="7" lat="1" lon="2">
                <tag k="name" v="First"/>
                <tag k="ref" v="S7"/>
                <tag k="name" v="Second"/>
            </node></osm>"#,
        )
        .unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        let stop = extractor.stop(first(&doc, "node"));

        assert_eq!(stop.tags.len(), 2);
        assert_eq!(stop.tags["name"], "Second");
        assert_eq!(stop.tags["ref"], "S7");
    }

    #[test]
    fn test_stop_from_wrong_element_is_empty() {
        let doc = Document::parse(RELATION).unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        let stop = extractor.stop(first(&doc, "relation"));

        assert!(stop.tags.is_empty());
    }

    #[test]
    fn test_invalid_member_ref_aborts() {
        let doc = Document::parse(
            r#"<osm><relation id="5"><member type="node" ref="abc" role="stop"/></relation></osm>"#,
        )
        .unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Abort);

        let err = extractor.line(first(&doc, "relation")).unwrap_err();

        assert!(matches!(err, TransportError::InvalidIdentifier { ref value, .. } if value == "abc"));
    }

    #[test]
    fn test_invalid_member_ref_skipped() {
        let doc = Document::parse(
            r#"<osm><relation id="5">
                <member type="node" ref="abc" role="stop"/>
                <member type="node" role="stop"/>
                <member type="node" ref="4" role="stop"/>
            </relation></osm>"#,
        )
        .unwrap();
        let mut extractor = Extractor::new(InvalidIdPolicy::Skip);

        let line = extractor.line(first(&doc, "relation")).unwrap();

        assert_eq!(line.stops, vec![4]);
        assert_eq!(extractor.stats().skipped, 2);
    }

    #[test]
    fn test_element_id() {
        let doc = Document::parse(r#"<osm><node id="-12"/><node/><node id="1x"/></osm>"#).unwrap();
        let nodes: Vec<_> = doc.descendants().filter(|n| n.has_tag_name("node")).collect();

        let mut strict = Extractor::new(InvalidIdPolicy::Abort);
        assert_eq!(strict.element_id(nodes[0]).unwrap(), Some(-12));
        assert!(matches!(
            strict.element_id(nodes[1]),
            Err(TransportError::MissingAttribute { attribute: "id", .. })
        ));
        assert!(strict.element_id(nodes[2]).is_err());

        let mut lenient = Extractor::new(InvalidIdPolicy::Skip);
        assert_eq!(lenient.element_id(nodes[1]).unwrap(), None);
        assert_eq!(lenient.element_id(nodes[2]).unwrap(), None);
        assert_eq!(lenient.stats().skipped, 2);
    }
}
