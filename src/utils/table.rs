/// Column alignment inside a `Table`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A fixed-width text table rendered inside a code block
pub struct Table {
    aligns: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table, one alignment per column
    pub fn new(aligns: Vec<Align>) -> Self {
        Table {
            aligns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        self.render_rows(&self.rows)
    }

    /// Render the newest rows that fit in `max_chars`, dropping the oldest ones.
    /// The code block always stays closed.
    pub fn render_within(&self, max_chars: usize) -> String {
        let mut skip = 0;
        loop {
            let rendered = self.render_rows(&self.rows[skip..]);
            if skip == self.rows.len() || rendered.chars().count() <= max_chars {
                return rendered;
            }
            skip += 1;
        }
    }

    fn render_rows(&self, rows: &[Vec<String>]) -> String {
        let mut col_widths = vec![0; self.aligns.len()];
        for row in rows {
            for (width, col) in col_widths.iter_mut().zip(row) {
                *width = (*width).max(col.chars().count());
            }
        }

        let mut output = String::from("```\n");
        for row in rows {
            output.push_str(&self.render_row(row, &col_widths));
            output.push('\n');
        }
        output.push_str("```");
        output
    }

    fn render_row(&self, row: &[String], col_widths: &[usize]) -> String {
        let cells: Vec<String> = row
            .iter()
            .zip(col_widths.iter().zip(&self.aligns))
            .map(|(col, (&width, align))| match align {
                Align::Left => format!("{:<width$}", col, width = width),
                Align::Right => format!("{:>width$}", col, width = width),
            })
            .collect();

        // No trailing padding after the last column
        cells.join("  ").trim_end().to_string()
    }
}
