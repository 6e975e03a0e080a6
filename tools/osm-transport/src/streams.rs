use crate::error::TransportError;
use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use strum::Display;

/// How the input file is encoded on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum InputFormat {
    #[strum(serialize = "plain XML")]
    Plain,
    #[strum(serialize = "bzip2-compressed XML")]
    Bzip2,
}

impl InputFormat {
    /// Classify an input path by extension: `.osm.bz2` or `.osm`
    pub fn from_path(path: &Path) -> Result<Self, TransportError> {
        let name = path.to_string_lossy();
        if name.ends_with(".osm.bz2") {
            Ok(Self::Bzip2)
        } else if name.ends_with(".osm") {
            Ok(Self::Plain)
        } else {
            Err(TransportError::InvalidInput(path.to_path_buf()))
        }
    }
}

/// Check that the output path names a `.json` file
pub fn check_output_path(path: &Path) -> Result<(), TransportError> {
    if path.to_string_lossy().ends_with(".json") {
        Ok(())
    } else {
        Err(TransportError::InvalidOutput(path.to_path_buf()))
    }
}

/// Read the whole input document into memory, decompressing if needed
pub fn read_input(path: &Path, format: InputFormat) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;

    let mut reader: Box<dyn Read> = match format {
        InputFormat::Plain => Box::new(BufReader::new(file)),
        InputFormat::Bzip2 => Box::new(MultiBzDecoder::new(BufReader::new(file))),
    };

    let mut xml = String::new();
    reader
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {} from {}", format, path.display()))?;

    Ok(xml)
}

/// Sibling path the output is staged at before being renamed into place
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Removes the staged file unless the write completed
struct StagedFile<'a> {
    path: &'a Path,
    committed: bool,
}

impl Drop for StagedFile<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(self.path) {
                log::debug!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Serialize `value` as JSON to `output_path`.
///
/// The document goes to a staging file first and is renamed over the
/// output only once fully written, so a failed run leaves no output behind.
pub fn write_json<T: Serialize>(value: &T, output_path: &Path, pretty: bool) -> Result<()> {
    let staging = staging_path(output_path);
    let mut staged = StagedFile {
        path: &staging,
        committed: false,
    };

    let file = File::create(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;
    let mut writer = BufWriter::new(file);

    let serialized = if pretty {
        serde_json::to_writer_pretty(&mut writer, value)
    } else {
        serde_json::to_writer(&mut writer, value)
    };
    serialized.context("Failed to serialize JSON")?;

    writer
        .flush()
        .with_context(|| format!("Failed to write JSON to {}", staging.display()))?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", staging.display()))?;
    drop(writer);

    fs::rename(&staging, output_path)
        .with_context(|| format!("Failed to move JSON into {}", output_path.display()))?;
    staged.committed = true;

    Ok(())
}
