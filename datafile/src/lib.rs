//! In-memory model of SDBV data files, with one-shot JSON serialization.
//!
//! A data file holds named grids; each grid holds a sparse row-oriented
//! cell block with a declared field schema. Row payloads can be split out
//! into separate files referenced from the main document by an `@import`
//! marker.

use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use jzon::JsonValue;
use jzon::object::Object;

/// Color indexes into the viewer's built-in palette, for data files that
/// color cells by index instead of by hex string.
pub mod color_index {
    pub const GRAY: u32 = 0;
    pub const RED: u32 = 1;
    pub const YELLOW: u32 = 2;
    pub const GREEN: u32 = 3;
    pub const CYAN: u32 = 4;
    pub const BLUE: u32 = 5;
    pub const PURPLE: u32 = 6;
    pub const PINK: u32 = 7;

    pub const LIGHT_GRAY: u32 = 8;
    pub const LIGHT_RED: u32 = 9;
    pub const LIGHT_YELLOW: u32 = 10;
    pub const LIGHT_GREEN: u32 = 11;
    pub const LIGHT_CYAN: u32 = 12;
    pub const LIGHT_BLUE: u32 = 13;
    pub const LIGHT_PURPLE: u32 = 14;
    pub const LIGHT_PINK: u32 = 15;

    pub const DARK_GRAY: u32 = 16;
    pub const DARK_RED: u32 = 17;
    pub const DARK_YELLOW: u32 = 18;
    pub const DARK_GREEN: u32 = 19;
    pub const DARK_CYAN: u32 = 20;
    pub const DARK_BLUE: u32 = 21;
    pub const DARK_PURPLE: u32 = 22;
    pub const DARK_PINK: u32 = 23;
}

/// A build-source citation or description entry: either plain text, or a
/// single {label: value} pair.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaEntry {
    Text(String),
    Pair(String, JsonValue),
}

impl MetaEntry {
    fn to_json(&self) -> JsonValue {
        match self {
            MetaEntry::Text(text) => text.as_str().into(),
            MetaEntry::Pair(key, value) => {
                let mut obj = Object::new();
                obj.insert(key, value.clone());
                JsonValue::Object(obj)
            }
        }
    }
}

/// One encoded cell row. Length never exceeds the owning block's
/// `field_order`; trailing nulls are trimmed away at encoding time.
pub type Row = Vec<JsonValue>;

/// Row payload of a cell block: inline, or marked for deferred write into
/// a separate file referenced by `{"@import": file_name}`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellData {
    Inline(Vec<Row>),
    Import { file_name: String, rows: Vec<Row> },
}

impl Default for CellData {
    fn default() -> Self {
        CellData::Inline(vec![])
    }
}

impl CellData {
    pub fn rows(&self) -> &[Row] {
        match self {
            CellData::Inline(rows) => rows,
            CellData::Import { rows, .. } => rows,
        }
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        match self {
            CellData::Inline(rows) => rows,
            CellData::Import { rows, .. } => rows,
        }
    }

    /// Marks the payload for deferred write under the given relative file
    /// name. The rows stay attached until serialization.
    pub fn split_into(&mut self, file_name: impl Into<String>) {
        let rows = std::mem::take(self.rows_mut());
        *self = CellData::Import {
            file_name: file_name.into(),
            rows,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridCells {
    pub field_order: Vec<String>,
    pub field_templates: IndexMap<String, String>,
    pub template_consts: IndexMap<String, JsonValue>,
    pub data: CellData,
}

impl GridCells {
    pub fn new(field_order: Vec<String>) -> Self {
        GridCells {
            field_order,
            ..Default::default()
        }
    }

    /// Encodes a sparse cell spec into a positional row and appends it.
    ///
    /// Fields are emitted in `field_order`; absent fields become null,
    /// and the maximal suffix of trailing nulls is dropped. A spec with
    /// no known fields encodes to an empty row. Keys outside the schema
    /// are ignored.
    pub fn add_cell<K, V>(&mut self, spec: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<JsonValue>,
    {
        let mut spec: HashMap<String, JsonValue> = spec
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut row = Vec::with_capacity(self.field_order.len());
        let mut nulls_at_end = 0;
        for field in &self.field_order {
            match spec.remove(field) {
                Some(value) => {
                    row.push(value);
                    nulls_at_end = 0;
                }
                None => {
                    row.push(JsonValue::Null);
                    nulls_at_end += 1;
                }
            }
        }
        row.truncate(row.len() - nulls_at_end);
        self.data.rows_mut().push(row);
    }

    fn to_json(&self, imports: &mut Vec<(String, JsonValue)>) -> JsonValue {
        let mut obj = Object::new();
        obj.insert("fieldOrder", self.field_order.clone().into());
        if !self.field_templates.is_empty() {
            let templates = Object::from_iter(
                self.field_templates
                    .iter()
                    .map(|(field, expr)| (field.as_str(), expr.as_str())),
            );
            obj.insert("fieldTemplates", JsonValue::Object(templates));
        }
        if !self.template_consts.is_empty() {
            let consts = Object::from_iter(
                self.template_consts
                    .iter()
                    .map(|(name, table)| (name.as_str(), table.clone())),
            );
            obj.insert("templateConsts", JsonValue::Object(consts));
        }
        let rows = JsonValue::Array(
            self.data
                .rows()
                .iter()
                .map(|row| JsonValue::Array(row.clone()))
                .collect(),
        );
        match &self.data {
            CellData::Inline(_) => obj.insert("data", rows),
            CellData::Import { file_name, .. } => {
                imports.push((file_name.clone(), rows));
                let mut marker = Object::new();
                marker.insert("@import", file_name.as_str().into());
                obj.insert("data", JsonValue::Object(marker));
            }
        }
        JsonValue::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub name: Option<String>,
    pub cols_range: Vec<(i64, i64)>,
    pub rows_range: Vec<(i64, i64)>,
    pub row_headers: Option<JsonValue>,
    pub col_headers: Option<JsonValue>,
    pub cells: GridCells,
}

impl Grid {
    pub fn new() -> Self {
        Grid {
            name: None,
            cols_range: vec![(0, 0)],
            rows_range: vec![(0, 0)],
            row_headers: None,
            col_headers: None,
            cells: GridCells::default(),
        }
    }

    fn to_json(&self, opts: WriteOptions, imports: &mut Vec<(String, JsonValue)>) -> JsonValue {
        let mut obj = Object::new();
        if let Some(name) = &self.name {
            obj.insert("name", name.as_str().into());
        }
        obj.insert("colsRange", ranges_json(&self.cols_range, opts.ranges));
        obj.insert("rowsRange", ranges_json(&self.rows_range, opts.ranges));
        if let Some(headers) = &self.row_headers {
            obj.insert("rowHeaders", headers.clone());
        }
        if let Some(headers) = &self.col_headers {
            obj.insert("colHeaders", headers.clone());
        }
        obj.insert("cells", self.cells.to_json(imports));
        JsonValue::Object(obj)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

fn ranges_json(ranges: &[(i64, i64)], format: RangesFormat) -> JsonValue {
    match format {
        RangesFormat::Single => {
            let (lo, hi) = ranges.first().copied().unwrap_or((0, 0));
            jzon::array![lo, hi]
        }
        RangesFormat::Multiple => JsonValue::Array(
            ranges
                .iter()
                .map(|&(lo, hi)| jzon::array![lo, hi])
                .collect(),
        ),
    }
}

/// Output whitespace: 2-space indented, or everything on one line.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OutputStyle {
    #[default]
    Pretty,
    Minimal,
}

/// Shape of `colsRange`/`rowsRange`: historical files carry a single
/// `[min, max]` pair, current ones a list of pairs. The model always
/// stores a list; `Single` emits only the first pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum RangesFormat {
    Single,
    #[default]
    Multiple,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct WriteOptions {
    pub style: OutputStyle,
    pub ranges: RangesFormat,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFile {
    pub name: Option<String>,
    pub version: Option<String>,
    pub build_date: Option<String>,
    pub build_sources: Vec<MetaEntry>,
    pub description: Vec<MetaEntry>,
    pub grids: IndexMap<String, Grid>,
}

impl DataFile {
    /// Creates a data file containing the default `""` grid.
    pub fn new() -> Self {
        DataFile {
            grids: IndexMap::from([(String::new(), Grid::new())]),
            ..Default::default()
        }
    }

    /// Stamps the build date with seconds precision, no timezone.
    pub fn set_build_date(&mut self, dt: NaiveDateTime) {
        self.build_date = Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
    }

    pub fn add_build_source(&mut self, text: impl Into<String>, url: Option<String>) {
        self.build_sources.push(match url {
            None => MetaEntry::Text(text.into()),
            Some(url) => MetaEntry::Pair(text.into(), url.into()),
        });
    }

    pub fn add_description_entry(
        &mut self,
        text_or_key: impl Into<String>,
        value: Option<JsonValue>,
    ) {
        self.description.push(match value {
            None => MetaEntry::Text(text_or_key.into()),
            Some(value) => MetaEntry::Pair(text_or_key.into(), value),
        });
    }

    /// Converts the document to JSON, collecting deferred `@import`
    /// payloads into the returned side table of (file name, rows).
    pub fn to_json(&self, opts: WriteOptions) -> (JsonValue, Vec<(String, JsonValue)>) {
        let mut imports = vec![];
        let mut obj = Object::new();
        if let Some(name) = &self.name {
            obj.insert("name", name.as_str().into());
        }
        if let Some(version) = &self.version {
            obj.insert("version", version.as_str().into());
        }
        if let Some(date) = &self.build_date {
            obj.insert("buildDate", date.as_str().into());
        }
        if !self.build_sources.is_empty() {
            obj.insert(
                "buildSources",
                JsonValue::Array(self.build_sources.iter().map(MetaEntry::to_json).collect()),
            );
        }
        if !self.description.is_empty() {
            obj.insert(
                "description",
                JsonValue::Array(self.description.iter().map(MetaEntry::to_json).collect()),
            );
        }
        let grids = Object::from_iter(
            self.grids
                .iter()
                .map(|(name, grid)| (name.as_str(), grid.to_json(opts, &mut imports))),
        );
        obj.insert("grids", JsonValue::Object(grids));
        (JsonValue::Object(obj), imports)
    }

    /// Writes the main data file and any `@import` payload files into
    /// `out_dir`, returning the written paths with the main file first.
    pub fn write_files(
        &self,
        main_file_name: &str,
        out_dir: &Path,
        opts: WriteOptions,
    ) -> Result<Vec<PathBuf>, Box<dyn Error>> {
        assert!(!self.grids.is_empty(), "data file has no grids");
        let (doc, imports) = self.to_json(opts);
        let mut files = vec![];
        let path = normalize(&out_dir.join(main_file_name));
        write_json(&path, &doc, opts.style)?;
        files.push(path);
        for (file_name, rows) in imports {
            let path = normalize(&out_dir.join(&file_name));
            write_json(&path, &rows, opts.style)?;
            files.push(path);
        }
        Ok(files)
    }
}

fn write_json(path: &Path, value: &JsonValue, style: OutputStyle) -> Result<(), Box<dyn Error>> {
    let rendered = match style {
        OutputStyle::Pretty => value.pretty(2),
        OutputStyle::Minimal => value.dump(),
    };
    let mut f = File::create(path)?;
    f.write_all(rendered.as_bytes())?;
    Ok(())
}

// Drops interior `.` components, as import names start with `./`.
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(fields: &[&str]) -> GridCells {
        GridCells::new(fields.iter().map(|&f| f.to_string()).collect())
    }

    #[test]
    fn test_add_cell_sparse() {
        let mut c = cells(&["a", "b", "c", "d"]);
        c.add_cell([("a", JsonValue::from(1)), ("c", "x".into())]);
        assert_eq!(
            c.data.rows(),
            &[vec![1.into(), JsonValue::Null, "x".into()]]
        );
    }

    #[test]
    fn test_add_cell_trailing_reset() {
        let mut c = cells(&["a", "b", "c", "d"]);
        c.add_cell([("a", JsonValue::from(1)), ("d", 2.into())]);
        assert_eq!(
            c.data.rows(),
            &[vec![1.into(), JsonValue::Null, JsonValue::Null, 2.into()]]
        );
    }

    #[test]
    fn test_add_cell_all_absent() {
        let mut c = cells(&["a", "b"]);
        let spec: [(&str, JsonValue); 0] = [];
        c.add_cell(spec);
        assert_eq!(c.data.rows(), &[Row::new()]);
    }

    #[test]
    fn test_add_cell_unknown_keys_ignored() {
        let mut c = cells(&["a", "b"]);
        c.add_cell([("z", JsonValue::from(9)), ("b", 5.into())]);
        assert_eq!(c.data.rows(), &[vec![JsonValue::Null, 5.into()]]);
    }

    #[test]
    fn test_add_cell_explicit_null_kept() {
        // A field present with a null value is not a trailing null.
        let mut c = cells(&["a", "b", "c"]);
        c.add_cell([("a", JsonValue::from(1)), ("b", JsonValue::Null)]);
        assert_eq!(c.data.rows(), &[vec![1.into(), JsonValue::Null]]);
    }

    #[test]
    fn test_add_cell_trim_idempotent() {
        let mut c = cells(&["a", "b", "c", "d"]);
        c.add_cell([("a", JsonValue::from(1)), ("c", "x".into())]);
        let row = c.data.rows()[0].clone();
        // Re-encode the positional reconstruction of the trimmed row.
        let spec: Vec<(String, JsonValue)> = c
            .field_order
            .iter()
            .zip(&row)
            .map(|(f, v)| (f.clone(), v.clone()))
            .collect();
        c.add_cell(spec);
        assert_eq!(c.data.rows()[1], row);
    }

    #[test]
    fn test_meta_entries() {
        let mut df = DataFile::new();
        df.add_build_source("archdefs", Some("https://example.org/db".to_string()));
        df.add_build_source("hand-checked", None);
        df.add_description_entry("plain text", None);
        df.add_description_entry("device", Some("xc7a100t".into()));
        let (doc, _) = df.to_json(WriteOptions::default());
        assert_eq!(
            doc["buildSources"][0]["archdefs"],
            JsonValue::from("https://example.org/db")
        );
        assert_eq!(doc["buildSources"][1], JsonValue::from("hand-checked"));
        assert_eq!(doc["description"][0], JsonValue::from("plain text"));
        assert_eq!(doc["description"][1]["device"], JsonValue::from("xc7a100t"));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let df = DataFile::new();
        let (doc, _) = df.to_json(WriteOptions::default());
        for key in ["name", "version", "buildDate", "buildSources", "description"] {
            assert!(!doc.has_key(key), "{key} should be absent");
        }
        assert!(doc.has_key("grids"));
    }

    #[test]
    fn test_ranges_format() {
        let mut df = DataFile::new();
        df.grids[""].cols_range = vec![(0, 10), (20, 30)];
        df.grids[""].rows_range = vec![(1, 5)];
        let single = WriteOptions {
            ranges: RangesFormat::Single,
            ..Default::default()
        };
        let (doc, _) = df.to_json(single);
        assert_eq!(doc["grids"][""]["colsRange"], jzon::array![0, 10]);
        let (doc, _) = df.to_json(WriteOptions::default());
        assert_eq!(
            doc["grids"][""]["colsRange"],
            jzon::array![jzon::array![0, 10], jzon::array![20, 30]]
        );
        assert_eq!(doc["grids"][""]["rowsRange"], jzon::array![jzon::array![1, 5]]);
    }

    fn sample_file() -> DataFile {
        let mut df = DataFile::new();
        df.name = Some("sample".to_string());
        let grid = &mut df.grids[""];
        grid.cells.field_order = vec!["col".to_string(), "row".to_string(), "tag".to_string()];
        grid.cells
            .add_cell([("col", JsonValue::from(0)), ("row", 0.into()), ("tag", "a".into())]);
        grid.cells.add_cell([("col", JsonValue::from(1)), ("row", 2.into())]);
        grid.cols_range = vec![(0, 1)];
        grid.rows_range = vec![(0, 2)];
        df
    }

    #[test]
    fn test_write_files_inline() {
        let dir = tempfile::TempDir::new().unwrap();
        let df = sample_file();
        let files = df
            .write_files("sample.json", dir.path(), WriteOptions::default())
            .unwrap();
        assert_eq!(files, vec![dir.path().join("sample.json")]);
        let doc = jzon::parse(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(doc["name"], JsonValue::from("sample"));
        assert_eq!(
            doc["grids"][""]["cells"]["data"],
            jzon::array![jzon::array![0, 0, "a"], jzon::array![1, 2]]
        );
    }

    #[test]
    fn test_write_files_import_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut df = sample_file();
        let original = df.grids[""].cells.data.rows().to_vec();
        df.grids[""].cells.data.split_into("./sample.data.json");
        let files = df
            .write_files("sample.json", dir.path(), WriteOptions::default())
            .unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("sample.json"),
                dir.path().join("sample.data.json"),
            ]
        );
        let doc = jzon::parse(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(
            doc["grids"][""]["cells"]["data"]["@import"],
            JsonValue::from("./sample.data.json")
        );
        // Substituting the referenced file's content reproduces the rows.
        let rows = jzon::parse(&std::fs::read_to_string(&files[1]).unwrap()).unwrap();
        let expected: Vec<JsonValue> = original.into_iter().map(JsonValue::Array).collect();
        assert_eq!(rows, JsonValue::Array(expected));
    }

    #[test]
    fn test_minimal_matches_pretty_modulo_whitespace() {
        let df = sample_file();
        let pretty = df.to_json(WriteOptions::default()).0.pretty(2);
        let minimal = df
            .to_json(WriteOptions {
                style: OutputStyle::Minimal,
                ..Default::default()
            })
            .0
            .dump();
        // No string in the fixture contains whitespace, so stripping it
        // from the pretty form must reproduce the minimal form.
        let stripped: String = pretty.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(stripped, minimal);
    }

    #[test]
    #[should_panic(expected = "no grids")]
    fn test_write_files_requires_grid() {
        let mut df = DataFile::new();
        df.grids.clear();
        let _ = df.write_files("x.json", Path::new("."), WriteOptions::default());
    }
}
