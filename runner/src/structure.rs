use crate::sizing::AtomCounter;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::trace;

const DUMP_ATOMS_HEADER: &str = "ITEM: NUMBER OF ATOMS";

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("Failed to read structure {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("No atom count found in {0:?}")]
    MissingAtomCount(PathBuf),
    #[error("Invalid atom count {value:?} in {path:?}")]
    InvalidAtomCount { path: PathBuf, value: String },
}

/// Reads atom counts from LAMMPS data files (`N atoms` header) and LAMMPS text dumps
/// (`ITEM: NUMBER OF ATOMS`)
#[derive(Debug, Clone, Copy, Default)]
pub struct LammpsStructure;

impl LammpsStructure {
    pub fn parse<R: BufRead>(reader: R, path: &Path) -> Result<usize, StructureError> {
        let mut lines = reader.lines();
        let read_error = |source| StructureError::Read {
            path: path.to_path_buf(),
            source,
        };
        let parse_count = |value: &str| {
            value
                .parse::<usize>()
                .map_err(|_| StructureError::InvalidAtomCount {
                    path: path.to_path_buf(),
                    value: value.to_owned(),
                })
        };

        // the first line of a data file is a free-form title
        let mut first = true;

        while let Some(line) = lines.next() {
            let line = line.map_err(read_error)?;
            let content = line.split('#').next().unwrap_or("").trim();

            if content.starts_with(DUMP_ATOMS_HEADER) {
                for next in lines.by_ref() {
                    let next = next.map_err(read_error)?;
                    let next = next.trim();

                    if !next.is_empty() {
                        return parse_count(next);
                    }
                }

                return Err(StructureError::MissingAtomCount(path.to_path_buf()));
            }

            if std::mem::take(&mut first) && !content.starts_with("ITEM:") {
                continue;
            }

            let mut tokens = content.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(count), Some("atoms"), None) => return parse_count(count),
                // header keywords end before the first section
                (Some("Atoms"), None, None) => break,
                _ => trace!(line = content, "Skipped structure header line"),
            }
        }

        Err(StructureError::MissingAtomCount(path.to_path_buf()))
    }
}

impl AtomCounter for LammpsStructure {
    fn atom_count(&self, path: &Path) -> Result<usize, StructureError> {
        let file = File::open(path).map_err(|source| StructureError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(BufReader::new(file), path)
    }
}
