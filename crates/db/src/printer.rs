use crate::context::Context;

const CELL_WIDTH: usize = 16;

/// Fixed-width table writer for the connection send buffer:
/// `+----+` separators, `| cell |` rows, and a record-count footer.
pub struct RecordPrinter {
    num_cols: usize,
}

impl RecordPrinter {
    pub fn new(num_cols: usize) -> Self {
        Self { num_cols }
    }

    pub fn print_separator(&self, ctx: &mut Context) {
        let mut line = String::with_capacity(self.num_cols * (CELL_WIDTH + 3) + 2);
        line.push('+');
        for _ in 0..self.num_cols {
            line.push_str(&"-".repeat(CELL_WIDTH + 2));
            line.push('+');
        }
        line.push('\n');
        ctx.write(&line);
    }

    pub fn print_record(&self, cells: &[String], ctx: &mut Context) {
        let mut line = String::new();
        line.push('|');
        for cell in cells {
            line.push_str(&format!(" {:<width$} |", cell, width = CELL_WIDTH));
        }
        line.push('\n');
        ctx.write(&line);
    }

    pub fn print_record_count(num_rec: usize, ctx: &mut Context) {
        ctx.write(&format!("Total record(s): {}\n", num_rec));
    }
}
