//! Converts FPGA tile-grid description files into SDBV data files.

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Local;
use indexmap::IndexMap;
use jzon::JsonValue;
use jzon::object::Object;
use regex::Regex;
use sdbv_datafile::DataFile;
use serde::Deserialize;

/// One tile record. Input format:
/// <https://github.com/SymbiFlow/prjxray/blob/master/docs/dev_database/part_specific/tilegrid.rst>
#[derive(Debug, Clone, Deserialize)]
pub struct TileEntry {
    pub grid_x: i64,
    pub grid_y: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Tile name → record, in input file order.
pub type Tilegrid = IndexMap<String, TileEntry>;

pub fn read_tilegrid(path: &Path) -> Result<Tilegrid, Box<dyn Error>> {
    let f = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}

// Ordered tile palette; first match wins, `.*` catches the rest.
// Matches are anchored to the full type string.
static TILE_COLORS: LazyLock<Vec<(Regex, Option<&'static str>)>> = LazyLock::new(|| {
    [
        ("NULL|.*BRK.*", None),
        (".*IO.*", Some("#757575")),
        ("INT_INTERFACE_[LR]|DSP_[LR]", Some("#AB47BC")),
        ("BRAM_INT_INTERFACE_[LR]|BRAM_[LR]", Some("#4DD0E1")),
        ("HCLK_[LR]", Some("#D4E157")),
        (".*CLK.*", Some("#8BC34A")),
        (".*CMT.*", Some("#43A047")),
        ("CLBLM_[LR]", Some("#FF5722")),
        ("CLBLL_[LR]", Some("#FFC107")),
        ("INT_L|INT_R", Some("#1E88E5")),
        (".*INT_FEEDTHRU.*", Some("#1565C0")),
        (".*", Some("#BDBDBD")),
    ]
    .into_iter()
    .map(|(pat, color)| (Regex::new(&format!("^(?:{pat})$")).unwrap(), color))
    .collect()
});

fn lookup_color(kind: &str) -> Option<&'static str> {
    for (pat, color) in TILE_COLORS.iter() {
        if pat.is_match(kind) {
            return *color;
        }
    }
    None
}

fn extend_range(range: &mut Option<(i64, i64)>, value: i64) {
    match range {
        None => *range = Some((value, value)),
        Some((lo, hi)) => {
            if value < *lo {
                *lo = value;
            }
            if value > *hi {
                *hi = value;
            }
        }
    }
}

/// Populates the default grid of a fresh data file from the tile records:
/// one row per tile, bounding ranges over all coordinates, and a `COLORS`
/// constant table mapping each distinct tile type to its display color.
pub fn convert(tilegrid: &Tilegrid) -> DataFile {
    let mut df = DataFile::new();
    df.set_build_date(Local::now().naive_local());

    let mut cols_range = None;
    let mut rows_range = None;
    // One color lookup per distinct type, in first-seen order.
    let mut colors: IndexMap<&str, Option<&'static str>> = IndexMap::new();

    let grid = &mut df.grids[""];
    grid.cells.field_order = ["col", "row", "fullName", "type"]
        .into_iter()
        .map(String::from)
        .collect();
    grid.cells
        .field_templates
        .insert("color".to_string(), "{get(COLORS, type)}".to_string());
    // \u{a0} = non-breaking space
    grid.cells.field_templates.insert(
        "name".to_string(),
        "{replace(fullName, 'INTERFACE_','IFACE_', '_(.)_','\u{a0}$1_', '^(.)_','$1\u{a0}', '_',' ')}"
            .to_string(),
    );

    for (name, entry) in tilegrid {
        extend_range(&mut cols_range, entry.grid_x);
        extend_range(&mut rows_range, entry.grid_y);
        colors
            .entry(entry.kind.as_str())
            .or_insert_with(|| lookup_color(&entry.kind));
        grid.cells.add_cell([
            ("fullName", JsonValue::from(name.as_str())),
            ("col", entry.grid_x.into()),
            ("row", entry.grid_y.into()),
            ("type", entry.kind.as_str().into()),
        ]);
    }

    grid.cells.template_consts.insert(
        "COLORS".to_string(),
        JsonValue::Object(Object::from_iter(
            colors.iter().map(|(&kind, &color)| (kind, color)),
        )),
    );
    if let Some(range) = cols_range {
        grid.cols_range = vec![range];
    }
    if let Some(range) = rows_range {
        grid.rows_range = vec![range];
    }
    df
}
