use serde::{Deserialize, Serialize};

/// A rectangular text table as stored in the remote KPI workbook.
///
/// Every cell is text; a cell that is empty or whitespace-only is treated as
/// "no value". Rows may be shorter than `columns` (trailing blanks are not
/// required to be materialized).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Sector names are compared the way users type them: trimmed, case-insensitive.
pub fn sector_eq(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Strip surrounding whitespace from every header.
    ///
    /// Headers in the shared workbook are hand-edited and regularly pick up
    /// stray spaces; column lookups are by exact text after this step.
    pub fn normalize_headers(&mut self) {
        for column in &mut self.columns {
            let trimmed = column.trim();
            if trimmed.len() != column.len() {
                *column = trimmed.to_string();
            }
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell text, or `None` if the row or column does not exist.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.cell_at(row, col)
    }

    /// Like [`Table::cell`], but a missing cell reads as the empty string.
    pub fn text(&self, row: usize, column: &str) -> &str {
        self.cell(row, column).unwrap_or("")
    }

    fn cell_at(&self, row: usize, col: usize) -> Option<&str> {
        let row = self.rows.get(row)?;
        Some(row.get(col).map(String::as_str).unwrap_or(""))
    }

    /// Whether the cell holds a value (missing columns count as empty).
    pub fn has_value(&self, row: usize, column: &str) -> bool {
        self.cell(row, column).is_some_and(|v| !is_blank(v))
    }

    /// Write a cell, appending the column if the table does not have it yet.
    ///
    /// Returns `false` (and changes nothing) if `row` is out of range.
    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<String>) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        let col = match self.column_index(column) {
            Some(col) => col,
            None => {
                self.columns.push(column.to_string());
                self.columns.len() - 1
            }
        };
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.into();
        true
    }

    pub fn push_row(&mut self, cells: Vec<String>) -> usize {
        self.rows.push(cells);
        self.rows.len() - 1
    }

    /// First row whose sector matches (trimmed, case-insensitive) and whose id
    /// matches exactly after trimming.
    pub fn find_row(&self, sector_column: &str, sector: &str, id_column: &str, id: &str) -> Option<usize> {
        let sector_col = self.column_index(sector_column)?;
        let id_col = self.column_index(id_column)?;
        let id = id.trim();
        (0..self.rows.len()).find(|&row| {
            let row_sector = self.cell_at(row, sector_col).unwrap_or("");
            let row_id = self.cell_at(row, id_col).unwrap_or("");
            sector_eq(row_sector, sector) && row_id.trim() == id
        })
    }

    /// Row indices belonging to `sector`. Returns nothing if the sector column is absent.
    pub fn rows_for_sector<'a>(&'a self, sector_column: &str, sector: &'a str) -> impl Iterator<Item = usize> + 'a {
        let sector_col = self.column_index(sector_column);
        (0..self.rows.len()).filter(move |&row| match sector_col {
            Some(col) => sector_eq(self.cell_at(row, col).unwrap_or(""), sector),
            None => false,
        })
    }

    /// Distinct, trimmed, non-empty values of `column`, sorted.
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let Some(col) = self.column_index(column) else {
            return Vec::new();
        };
        let mut values: Vec<String> = (0..self.rows.len())
            .filter_map(|row| self.cell_at(row, col))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        values.sort();
        values.dedup();
        values
    }
}
