use std::path::PathBuf;
use thiserror::Error;

/// Failures specific to turning an OSM extract into a stop listing.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Input path is neither `.osm` nor `.osm.bz2`
    #[error("Invalid input file: {0} (expected .osm or .osm.bz2)")]
    InvalidInput(PathBuf),
    /// Output path does not end in `.json`
    #[error("Invalid output file: {0} (expected .json)")]
    InvalidOutput(PathBuf),
    /// An element lacks the attribute carrying its identifier
    #[error("{element}: missing '{attribute}' attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    /// An identifier is not an integer
    #[error("{element}: invalid identifier '{value}'")]
    InvalidIdentifier { element: String, value: String },
}
