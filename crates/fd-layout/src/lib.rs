#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fd_panel::{Geometry, Panel};
use fd_types::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_COLOR_SCHEME: &str = "plotly_white";
pub const DEFAULT_PANEL_HEIGHT_PX: u32 = 400;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error(
        "cell ({row}, {col}) spanning {rowspan}x{colspan} falls outside the {rows}x{cols} grid"
    )]
    GridOutOfBounds {
        row: usize,
        col: usize,
        rowspan: usize,
        colspan: usize,
        rows: usize,
        cols: usize,
    },
    #[error("cell ({row}, {col}) overlaps the span of cell ({other_row}, {other_col})")]
    GridOverlap {
        row: usize,
        col: usize,
        other_row: usize,
        other_col: usize,
    },
    #[error("cell ({row}, {col}) is declared but holds no panel")]
    EmptyCell { row: usize, col: usize },
    #[error("cell ({row}, {col}) has {expected} geometry but got {found}: {detail}")]
    GeometryMismatch {
        row: usize,
        col: usize,
        expected: Geometry,
        found: Geometry,
        detail: String,
    },
}

impl LayoutError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Shape
    }
}

fn default_color_scheme() -> String {
    DEFAULT_COLOR_SCHEME.to_owned()
}

fn default_panel_height() -> u32 {
    DEFAULT_PANEL_HEIGHT_PX
}

fn default_true() -> bool {
    true
}

/// Figure-wide styling. Keys are camelCase with snake_case aliases;
/// anything else in the source document is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default = "default_color_scheme", alias = "color_scheme")]
    pub color_scheme: String,
    #[serde(default = "default_panel_height", alias = "panel_height_px")]
    pub panel_height_px: u32,
    #[serde(default = "default_true", alias = "show_legend")]
    pub show_legend: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            color_scheme: default_color_scheme(),
            panel_height_px: default_panel_height(),
            show_legend: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOptions {
    pub rowspan: usize,
    pub colspan: usize,
    /// Overlay panels after the first are drawn against a secondary y axis.
    pub secondary_axis: bool,
    /// Declared geometry; taken from the first panel when absent.
    pub geometry: Option<Geometry>,
    pub title: Option<String>,
}

impl Default for CellOptions {
    fn default() -> Self {
        Self {
            rowspan: 1,
            colspan: 1,
            secondary_axis: false,
            geometry: None,
            title: None,
        }
    }
}

impl CellOptions {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct GridCell {
    panels: Vec<Panel>,
    options: CellOptions,
}

/// Grid declaration handed to `compose`. Positions are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    rows: usize,
    cols: usize,
    height_px: Option<u32>,
    cells: BTreeMap<(usize, usize), GridCell>,
}

impl GridSpec {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            height_px: None,
            cells: BTreeMap::new(),
        }
    }

    /// Fixed figure height instead of `rows * panel_height_px`.
    #[must_use]
    pub fn with_height(mut self, height_px: u32) -> Self {
        self.height_px = Some(height_px);
        self
    }

    /// Add a panel to a cell; later panels overlay the first.
    pub fn place(&mut self, row: usize, col: usize, panel: Panel) -> &mut Self {
        self.cells.entry((row, col)).or_default().panels.push(panel);
        self
    }

    /// Declare or replace a cell's span and display options.
    pub fn configure(&mut self, row: usize, col: usize, options: CellOptions) -> &mut Self {
        self.cells.entry((row, col)).or_default().options = options;
        self
    }

    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutCell {
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
    pub geometry: Geometry,
    pub secondary_axis: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub panels: Vec<Panel>,
}

/// Per-position entry of the subplot grid; covered span positions are
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellSpec {
    #[serde(rename = "type")]
    pub geometry: Geometry,
    pub rowspan: usize,
    pub colspan: usize,
    pub secondary_y: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: String,
    pub theme: Theme,
    pub rows: usize,
    pub cols: usize,
    pub height_px: u32,
    pub cells: Vec<LayoutCell>,
}

impl Layout {
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Option<&LayoutCell> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    #[must_use]
    pub fn panel_count(&self) -> usize {
        self.cells.iter().map(|c| c.panels.len()).sum()
    }

    #[must_use]
    pub fn specs(&self) -> Vec<Vec<Option<CellSpec>>> {
        let mut grid = vec![vec![None; self.cols]; self.rows];
        for cell in &self.cells {
            grid[cell.row - 1][cell.col - 1] = Some(CellSpec {
                geometry: cell.geometry,
                rowspan: cell.rowspan,
                colspan: cell.colspan,
                secondary_y: cell.secondary_axis,
            });
        }
        grid
    }
}

fn check_bounds(
    grid: &GridSpec,
    row: usize,
    col: usize,
    options: &CellOptions,
) -> Result<(), LayoutError> {
    let out_of_bounds = || LayoutError::GridOutOfBounds {
        row,
        col,
        rowspan: options.rowspan,
        colspan: options.colspan,
        rows: grid.rows,
        cols: grid.cols,
    };
    if row == 0 || col == 0 || options.rowspan == 0 || options.colspan == 0 {
        return Err(out_of_bounds());
    }
    let last_row = row.checked_add(options.rowspan - 1).ok_or_else(out_of_bounds)?;
    let last_col = col.checked_add(options.colspan - 1).ok_or_else(out_of_bounds)?;
    if last_row > grid.rows || last_col > grid.cols {
        return Err(out_of_bounds());
    }
    Ok(())
}

fn resolve_geometry(row: usize, col: usize, cell: &GridCell) -> Result<Geometry, LayoutError> {
    let Some(first) = cell.panels.first() else {
        return Err(LayoutError::EmptyCell { row, col });
    };
    let expected = cell.options.geometry.unwrap_or_else(|| first.geometry());
    for panel in &cell.panels {
        if panel.geometry() != expected {
            return Err(LayoutError::GeometryMismatch {
                row,
                col,
                expected,
                found: panel.geometry(),
                detail: format!("{} panel", panel.kind),
            });
        }
    }
    if cell.options.secondary_axis && expected != Geometry::Xy {
        return Err(LayoutError::GeometryMismatch {
            row,
            col,
            expected: Geometry::Xy,
            found: expected,
            detail: "secondary axis needs an xy cell".to_owned(),
        });
    }
    Ok(expected)
}

/// Validate a grid declaration and freeze it into a `Layout`.
pub fn compose(title: &str, grid: GridSpec, theme: &Theme) -> Result<Layout, LayoutError> {
    // Figure height is computed in u32 pixels.
    let row_count = u32::try_from(grid.rows).map_err(|_| LayoutError::GridOutOfBounds {
        row: grid.rows,
        col: 1,
        rowspan: 1,
        colspan: 1,
        rows: grid.rows,
        cols: grid.cols,
    })?;
    let mut owner: Vec<Vec<Option<(usize, usize)>>> = vec![vec![None; grid.cols]; grid.rows];
    let mut geometries = Vec::with_capacity(grid.cells.len());

    for (&(row, col), cell) in &grid.cells {
        check_bounds(&grid, row, col, &cell.options)?;
        for r in row..row + cell.options.rowspan {
            for c in col..col + cell.options.colspan {
                if let Some((other_row, other_col)) = owner[r - 1][c - 1] {
                    return Err(LayoutError::GridOverlap {
                        row,
                        col,
                        other_row,
                        other_col,
                    });
                }
                owner[r - 1][c - 1] = Some((row, col));
            }
        }
        geometries.push(resolve_geometry(row, col, cell)?);
    }

    let height_px = grid
        .height_px
        .unwrap_or_else(|| theme.panel_height_px.saturating_mul(row_count));
    let (rows, cols) = (grid.rows, grid.cols);
    let cells: Vec<LayoutCell> = grid
        .cells
        .into_iter()
        .zip(geometries)
        .map(|(((row, col), cell), geometry)| LayoutCell {
            row,
            col,
            rowspan: cell.options.rowspan,
            colspan: cell.options.colspan,
            geometry,
            secondary_axis: cell.options.secondary_axis,
            title: cell.options.title,
            panels: cell.panels,
        })
        .collect();

    tracing::debug!(title, rows, cols, cells = cells.len(), height_px, "layout composed");

    Ok(Layout {
        title: title.to_owned(),
        theme: theme.clone(),
        rows,
        cols,
        height_px,
        cells,
    })
}
