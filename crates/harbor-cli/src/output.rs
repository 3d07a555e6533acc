//! Fixed-width table output

pub const NAME_WIDTH: usize = 40;
pub const VERSION_WIDTH: usize = 20;

/// Left-align each cell to its width, trailing padding removed.
pub fn format_row(columns: &[(usize, &str)]) -> String {
    let mut line = String::new();
    for (width, text) in columns {
        line.push_str(&format!("{:<width$} ", text, width = *width));
    }
    line.trim_end().to_string()
}

pub fn print_row(columns: &[(usize, &str)]) {
    println!("{}", format_row(columns));
}
