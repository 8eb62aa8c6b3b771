// This file contains functions for writing TopoMSA's console output to stderr.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use chrono::prelude::*;
use colored::Colorize;


pub fn section_header(text: &str) {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let date = format!("({})", now);
    eprintln!();
    eprintln!("{} {}", text.bold().bright_yellow().underline(), date.dimmed());
}


pub fn explanation(text: &str) {
    let term_width = match term_size::dimensions_stderr() {
        Some((w, _)) => w,
        None         => 80,
    };
    let width = term_width.min(100);
    let wrapped = textwrap::fill(&squash_spaces(text), width);
    eprintln!("{}", wrapped.dimmed());
    eprintln!();
}


pub fn warning(text: &str) {
    eprintln!("{} {}", "Warning:".yellow(), text);
}


fn squash_spaces(text: &str) -> String {
    // Multi-line string literals with trailing backslashes can leave runs of spaces behind.
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squash_spaces() {
        assert_eq!(squash_spaces("a  b   c"), "a b c");
        assert_eq!(squash_spaces("  leading and trailing  "), "leading and trailing");
        assert_eq!(squash_spaces(""), "");
    }
}
