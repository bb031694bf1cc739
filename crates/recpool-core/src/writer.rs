//! Output layout writer
//!
//! Layout under the output root:
//!
//! ```text
//! invert_index/<f1|f2|...>   <key>\t<id,id,...>      one file per field group
//! subpool.txt                <n>\t<id,id,...>        one line per predicate
//! scores/<name>              <id>\t<score>           one line per item
//! resource.meta.json         {"field": tag, ...}
//! SUCCESS                    empty, written last
//! ```
//!
//! Every file goes through a temporary file in its target directory that is
//! flushed, synced and renamed into place, so a reader never sees a partial
//! file under a final name. `invert_index/` and `scores/` are emptied before a
//! build writes, so they only ever hold the files of the latest plan.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use recpool_types::{ItemCollection, Schema, format_float};
use roaring::RoaringBitmap;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::combination::{CombinationIndex, format_key};
use crate::condition::Subpool;
use crate::error::{PoolError, Result};
use crate::scores::ScoreTable;

pub const INVERT_INDEX_DIR: &str = "invert_index";
pub const SUBPOOL_FILE: &str = "subpool.txt";
pub const SCORES_DIR: &str = "scores";
pub const META_FILE: &str = "resource.meta.json";
pub const SUCCESS_FILE: &str = "SUCCESS";

/// Writes build outputs below one root directory
#[derive(Debug, Clone)]
pub struct IndexWriter {
    root: PathBuf,
}

impl IndexWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root, drop a stale `SUCCESS` marker and clear the per-unit
    /// directories left by an earlier build
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| PoolError::io(&self.root, e))?;
        let marker = self.root.join(SUCCESS_FILE);
        match fs::remove_file(&marker) {
            Ok(()) => debug!(path = %marker.display(), "Removed stale success marker"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PoolError::io(&marker, e)),
        }
        for name in [INVERT_INDEX_DIR, SCORES_DIR] {
            let dir = self.root.join(name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!(path = %dir.display(), "Cleared previous outputs"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(PoolError::io(&dir, e)),
            }
        }
        Ok(())
    }

    pub fn combination_index_path(&self, name: &str) -> PathBuf {
        self.root.join(INVERT_INDEX_DIR).join(name)
    }

    pub fn subpool_path(&self) -> PathBuf {
        self.root.join(SUBPOOL_FILE)
    }

    pub fn score_path(&self, name: &str) -> PathBuf {
        self.root.join(SCORES_DIR).join(name)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    pub fn success_path(&self) -> PathBuf {
        self.root.join(SUCCESS_FILE)
    }

    pub fn write_combination_index(
        &self,
        items: &ItemCollection,
        index: &CombinationIndex,
    ) -> Result<PathBuf> {
        let path = self.combination_index_path(&index.name());
        write_atomic(&path, |out| render_combination_index(out, items, index))?;
        Ok(path)
    }

    pub fn write_subpools(&self, items: &ItemCollection, subpools: &[Subpool]) -> Result<PathBuf> {
        let path = self.subpool_path();
        write_atomic(&path, |out| render_subpools(out, items, subpools))?;
        Ok(path)
    }

    pub fn write_scores(&self, table: &ScoreTable) -> Result<PathBuf> {
        let path = self.score_path(table.name());
        write_atomic(&path, |out| render_scores(out, table))?;
        Ok(path)
    }

    pub fn write_schema(&self, schema: &Schema) -> Result<PathBuf> {
        let path = self.meta_path();
        write_atomic(&path, |out| render_schema(out, schema))?;
        Ok(path)
    }

    /// Write the completion marker; call only after every other output succeeded
    pub fn mark_success(&self) -> Result<PathBuf> {
        let path = self.success_path();
        write_atomic(&path, |_| Ok(()))?;
        Ok(path)
    }
}

/// `<key>\t<ids>` per combination, keys ascending, ids in collection order
pub fn render_combination_index<W: Write + ?Sized>(
    out: &mut W,
    items: &ItemCollection,
    index: &CombinationIndex,
) -> io::Result<()> {
    for (key, posting) in index.iter() {
        writeln!(out, "{}\t{}", format_key(key), join_ids(items, posting))?;
    }
    Ok(())
}

/// `<n>\t<ids>` per subpool in declaration order; an empty selection keeps the tab
pub fn render_subpools<W: Write + ?Sized>(
    out: &mut W,
    items: &ItemCollection,
    subpools: &[Subpool],
) -> io::Result<()> {
    for subpool in subpools {
        writeln!(out, "{}\t{}", subpool.id, join_ids(items, &subpool.members))?;
    }
    Ok(())
}

pub fn render_scores<W: Write + ?Sized>(out: &mut W, table: &ScoreTable) -> io::Result<()> {
    for (id, score) in table.entries() {
        writeln!(out, "{}\t{}", id, format_float(*score))?;
    }
    Ok(())
}

/// Schema descriptor with sorted keys, spaced like the pool producer's JSON.
///
/// Keys come out in name order, not schema declaration order; readers look
/// fields up by name.
pub fn render_schema<W: Write + ?Sized>(out: &mut W, schema: &Schema) -> io::Result<()> {
    let mut entries = Vec::with_capacity(schema.len());
    for (name, field_type) in schema.iter() {
        let name = serde_json::to_string(name).map_err(io::Error::other)?;
        entries.push(format!("{}: {}", name, field_type.tag()));
    }
    write!(out, "{{{}}}", entries.join(", "))
}

fn join_ids(items: &ItemCollection, posting: &RoaringBitmap) -> String {
    posting.iter().filter_map(|ordinal| items.id_of(ordinal)).collect::<Vec<_>>().join(",")
}

// Dropping the temporary file on any error path removes it.
fn write_atomic<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = path.parent().ok_or_else(|| PoolError::io(path, "no parent directory"))?;
    fs::create_dir_all(dir).map_err(|e| PoolError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PoolError::io(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        render(&mut writer).map_err(|e| PoolError::io(path, e))?;
        writer.flush().map_err(|e| PoolError::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| PoolError::io(path, e))?;
    tmp.persist(path).map_err(|e| PoolError::io(path, e.error))?;

    debug!(path = %path.display(), "Wrote output file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::{CombinationJoiner, FieldGroup};
    use crate::condition::Predicate;
    use crate::schema::SchemaCatalog;
    use recpool_types::{FieldType, FieldValue, Item};

    fn fixture() -> (ItemCollection, SchemaCatalog) {
        let catalog = SchemaCatalog::new(Schema::new([
            ("lang", FieldType::String),
            ("level", FieldType::Int64),
            ("ctr", FieldType::Float32),
        ]));
        let items = ItemCollection::new(vec![
            Item::new("a")
                .with_field("lang", FieldValue::String("en".into()))
                .with_field("level", FieldValue::Int64(1))
                .with_field("ctr", FieldValue::Float32(0.9)),
            Item::new("b")
                .with_field("lang", FieldValue::String("en".into()))
                .with_field("level", FieldValue::Int64(2))
                .with_field("ctr", FieldValue::Float32(1.0)),
            Item::new("c")
                .with_field("lang", FieldValue::String("fr".into()))
                .with_field("level", FieldValue::Int64(1))
                .with_field("ctr", FieldValue::Float32(0.00001)),
        ])
        .unwrap();
        (items, catalog)
    }

    #[test]
    fn test_render_single_and_multi_field_index() {
        let (items, catalog) = fixture();
        let joiner = CombinationJoiner::new();

        let single = joiner.build(&items, &catalog, &FieldGroup::new(["lang"]).unwrap()).unwrap();
        let mut out = Vec::new();
        render_combination_index(&mut out, &items, &single).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0|en\ta,b\n0|fr\tc\n");

        let pair = joiner
            .build(&items, &catalog, &FieldGroup::new(["lang", "level"]).unwrap())
            .unwrap();
        let mut out = Vec::new();
        render_combination_index(&mut out, &items, &pair).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0:en|1:1\ta\n0:en|1:2\tb\n0:fr|1:1\tc\n"
        );
    }

    #[test]
    fn test_render_subpools_and_scores() {
        let (items, catalog) = fixture();
        let subpools = vec![
            Subpool::select(1, &items, &catalog, &Predicate::parse("lang='en'").unwrap()).unwrap(),
            Subpool::select(2, &items, &catalog, &Predicate::parse("level > 5").unwrap()).unwrap(),
        ];
        let mut out = Vec::new();
        render_subpools(&mut out, &items, &subpools).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\ta,b\n2\t\n");

        let table = ScoreTable::project(&items, &catalog, "ctr").unwrap();
        let mut out = Vec::new();
        render_scores(&mut out, &table).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\t0.9\nb\t1.0\nc\t1e-05\n");
    }

    #[test]
    fn test_render_schema() {
        let (_, catalog) = fixture();
        let mut out = Vec::new();
        render_schema(&mut out, catalog.schema()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"ctr": 1, "lang": 2, "level": 0}"#);
    }

    #[test]
    fn test_writer_layout_and_stale_marker() {
        let (items, catalog) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let writer = IndexWriter::new(dir.path().join("out"));

        writer.prepare().unwrap();
        writer.mark_success().unwrap();
        assert!(writer.success_path().exists());

        writer.prepare().unwrap();
        assert!(!writer.success_path().exists());

        let index = CombinationJoiner::new()
            .build(&items, &catalog, &FieldGroup::new(["lang", "level"]).unwrap())
            .unwrap();
        let path = writer.write_combination_index(&items, &index).unwrap();
        assert_eq!(path, dir.path().join("out/invert_index/lang|level"));
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);

        let meta = writer.write_schema(catalog.schema()).unwrap();
        assert!(fs::read_to_string(meta).unwrap().starts_with('{'));

        // nothing but the final files is left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("out/invert_index"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_prepare_clears_outputs_of_previous_plan() {
        let (items, catalog) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let writer = IndexWriter::new(dir.path());

        writer.prepare().unwrap();
        let index = CombinationJoiner::new()
            .build(&items, &catalog, &FieldGroup::new(["lang"]).unwrap())
            .unwrap();
        let index_path = writer.write_combination_index(&items, &index).unwrap();
        let table = ScoreTable::project(&items, &catalog, "level").unwrap();
        let score_path = writer.write_scores(&table).unwrap();
        let subpool_path = writer.write_subpools(&items, &[]).unwrap();
        writer.mark_success().unwrap();

        writer.prepare().unwrap();
        assert!(!index_path.exists());
        assert!(!score_path.exists());
        assert!(!writer.success_path().exists());
        // files rewritten by every build are left for the writes to replace
        assert!(subpool_path.exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_unwritable_target_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        // the root is a regular file, so no subdirectory can be created under it
        let writer = IndexWriter::new(&blocker);
        let table = ScoreTable::new("ctr", vec![("a".into(), 1.0)]);
        let err = writer.write_scores(&table).unwrap_err();
        assert_eq!(err.category(), "io");
    }
}
