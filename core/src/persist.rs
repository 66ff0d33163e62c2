use crate::error::{Error, Result};
use crate::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

impl MetaFile {
    pub fn describe(store: &MemoryStore) -> Self {
        let stats = store.stats();
        Self {
            num_docs: stats.documents,
            num_terms: stats.terms,
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            version: FORMAT_VERSION,
        }
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn store(&self) -> PathBuf { self.root.join("store.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_store(paths: &IndexPaths, store: &MemoryStore) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = BufWriter::new(File::create(paths.store())?);
    bincode::serialize_into(&mut f, store)?;
    f.flush()?;
    save_meta(paths, &MetaFile::describe(store))?;
    tracing::info!(root = %paths.root.display(), "snapshot saved");
    Ok(())
}

pub fn load_store(paths: &IndexPaths) -> Result<MemoryStore> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::storage(format!(
            "snapshot format version {} is not supported (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    let f = BufReader::new(File::open(paths.store())?);
    let store: MemoryStore = bincode::deserialize_from(f)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "snapshot loaded");
    Ok(store)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = BufWriter::new(File::create(paths.meta())?);
    serde_json::to_writer_pretty(&mut f, meta)?;
    f.flush()?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = BufReader::new(File::open(paths.meta())?);
    Ok(serde_json::from_reader(f)?)
}
