use crate::document::DocStore;
use crate::error::{Error, Result};
use crate::index::{FeatureIndex, Field, FieldIndex, IndexSet, InvertedIndex, PositionalIndex, ReviewIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub attributes: Vec<String>,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn inverted(&self, field: Field) -> PathBuf { self.root.join(format!("{}_inverted.json", field.name())) }
    pub fn positional(&self, field: Field) -> PathBuf { self.root.join(format!("{}_positional.json", field.name())) }
    pub fn feature(&self, attribute: &str) -> PathBuf { self.root.join(format!("{attribute}_index.json")) }
    pub fn reviews(&self) -> PathBuf { self.root.join("reviews.json") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.json") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Attribute names become file names, so keep them to a plain charset.
fn check_attribute_name(name: &str) -> Result<()> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!("attribute name {name:?} is not usable as a file name")))
    }
}

/// Pretty JSON written to a sibling temp file then renamed over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).map_err(|e| Error::artifact(path, e))?;
    serde_json::from_reader(BufReader::new(f)).map_err(|e| Error::artifact(path, e))
}

pub fn save_field_index(paths: &IndexPaths, field: Field, index: &FieldIndex) -> Result<()> {
    write_json_atomic(&paths.inverted(field), &index.inverted)?;
    write_json_atomic(&paths.positional(field), &index.positional)
}

pub fn load_field_index(paths: &IndexPaths, field: Field) -> Result<FieldIndex> {
    let inverted: InvertedIndex = read_json(&paths.inverted(field))?;
    let positional: PositionalIndex = read_json(&paths.positional(field))?;
    let index = FieldIndex { inverted, positional };
    if !index.is_consistent() {
        return Err(Error::artifact(
            paths.positional(field),
            format!("{} positional index disagrees with its inverted index", field.name()),
        ));
    }
    Ok(index)
}

pub fn save_feature_index(paths: &IndexPaths, features: &FeatureIndex) -> Result<()> {
    for (name, index) in features.iter() {
        check_attribute_name(name)?;
        write_json_atomic(&paths.feature(name), index)?;
    }
    Ok(())
}

pub fn load_feature_index<S: AsRef<str>>(paths: &IndexPaths, attributes: &[S]) -> Result<FeatureIndex> {
    let mut features = FeatureIndex::new();
    for name in attributes {
        let name = name.as_ref();
        check_attribute_name(name).map_err(|e| Error::artifact(paths.meta(), e))?;
        features.insert(name, read_json::<InvertedIndex>(&paths.feature(name))?);
    }
    Ok(features)
}

pub fn save_reviews(paths: &IndexPaths, reviews: &ReviewIndex) -> Result<()> {
    write_json_atomic(&paths.reviews(), reviews)
}

pub fn load_reviews(paths: &IndexPaths) -> Result<ReviewIndex> {
    read_json(&paths.reviews())
}

pub fn save_docs(paths: &IndexPaths, docs: &DocStore) -> Result<()> {
    write_json_atomic(&paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<DocStore> {
    read_json(&paths.docs())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    write_json_atomic(&paths.meta(), meta)
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let meta: MetaFile = read_json(&paths.meta())?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::artifact(
            paths.meta(),
            format!("unsupported index version {} (expected {FORMAT_VERSION})", meta.version),
        ));
    }
    Ok(meta)
}

/// Persist every artifact of a build. Only `meta.json` varies between two
/// builds of the same corpus (it carries the build time).
pub fn save_index_set(paths: &IndexPaths, indexes: &IndexSet, docs: &DocStore) -> Result<MetaFile> {
    create_dir_all(&paths.root)?;
    for field in Field::ALL {
        save_field_index(paths, field, indexes.field(field))?;
    }
    save_feature_index(paths, &indexes.features)?;
    save_reviews(paths, &indexes.reviews)?;
    save_docs(paths, docs)?;
    let meta = MetaFile {
        num_docs: indexes.corpus().len() as u32,
        attributes: indexes.features.names().map(str::to_string).collect(),
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "index artifacts written");
    Ok(meta)
}

/// Load everything the query path needs. Any missing or unparsable artifact is an error.
pub fn load_index_set(paths: &IndexPaths) -> Result<(IndexSet, DocStore, MetaFile)> {
    let meta = load_meta(paths)?;
    let indexes = IndexSet {
        title: load_field_index(paths, Field::Title)?,
        description: load_field_index(paths, Field::Description)?,
        features: load_feature_index(paths, &meta.attributes)?,
        reviews: load_reviews(paths)?,
    };
    let docs = load_docs(paths)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, attributes = ?meta.attributes, "index artifacts loaded");
    Ok((indexes, docs, meta))
}
