//! Output formatting utilities

use std::fmt::Display;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

pub fn success(msg: &str) {
    println!("{}", msg.green());
}

pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// `+amount` in green for money coming in, `-amount` in red for money going out
pub fn signed_amount(amount: impl Display, incoming: bool) -> String {
    if incoming {
        format!("+{}", amount).green().to_string()
    } else {
        format!("-{}", amount).red().to_string()
    }
}

/// Table with the preset used by every listing
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        colored::control::set_override(false);
        assert_eq!(signed_amount("12.50", true), "+12.50");
        assert_eq!(signed_amount("3.00", false), "-3.00");
    }
}
