// This file contains a minimal Newick reader which returns the leaf names of a tree in the order
// they appear in the file.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::Path;


pub fn read_leaf_names(filename: &Path) -> Result<Vec<String>, String> {
    let text = fs::read_to_string(filename)
        .map_err(|e| format!("failed to read {}\n{}", filename.display(), e))?;
    let leaves = leaf_names(&text).map_err(|e| format!("{} in {}", e, filename.display()))?;
    if leaves.is_empty() {
        return Err(format!("no leaves found in {}", filename.display()));
    }
    Ok(leaves)
}


pub fn leaf_names(text: &str) -> Result<Vec<String>, String> {
    // Only the first tree (up to ';') is read. A label is a leaf name when it follows '(' or ','
    // (or starts the tree). Labels after ')' belong to internal nodes and are skipped, as are
    // branch lengths and [comments].
    let chars: Vec<char> = text.chars().collect();
    let mut leaves = Vec::new();
    let mut depth: i64 = 0;
    let mut last_structural = '(';
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' | ',' => { if c == '(' { depth += 1; } last_structural = c; i += 1; }
            ')' => {
                depth -= 1;
                if depth < 0 { return Err("unbalanced parentheses".to_string()); }
                last_structural = c;
                i += 1;
            }
            ';' => break,
            '[' => i = skip_comment(&chars, i)?,
            ':' => {
                i += 1;
                while i < chars.len() && !"(),;[".contains(chars[i]) { i += 1; }
            }
            _ if c.is_whitespace() => i += 1,
            _ => {
                let (label, next) = if c == '\'' { quoted_label(&chars, i)? }
                                    else { unquoted_label(&chars, i) };
                if last_structural != ')' && !label.is_empty() { leaves.push(label); }
                i = next;
            }
        }
    }
    if depth != 0 { return Err("unbalanced parentheses".to_string()); }
    Ok(leaves)
}


fn skip_comment(chars: &[char], start: usize) -> Result<usize, String> {
    let end = chars[start..].iter().position(|&c| c == ']')
        .ok_or_else(|| "unterminated comment".to_string())?;
    Ok(start + end + 1)
}


fn quoted_label(chars: &[char], start: usize) -> Result<(String, usize), String> {
    // Single-quoted labels may contain any character, with '' standing for a literal quote.
    let mut label = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err("unterminated quoted label".to_string()),
            Some('\'') if chars.get(i + 1) == Some(&'\'') => { label.push('\''); i += 2; }
            Some('\'') => return Ok((label, i + 1)),
            Some(&c) => { label.push(c); i += 1; }
        }
    }
}


fn unquoted_label(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    while i < chars.len() && !"()[]':;,".contains(chars[i]) && !chars[i].is_whitespace() {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::make_test_file;

    #[test]
    fn test_leaf_names_simple() {
        assert_eq!(leaf_names("(A,B,(C,D));").unwrap(), vec!["A", "B", "C", "D"]);
        assert_eq!(leaf_names("A;").unwrap(), vec!["A"]);
    }

    #[test]
    fn test_leaf_names_with_lengths_and_internal_labels() {
        let tree = "((sp1:0.1,sp2:0.2)95:0.05,(sp3:1e-3,sp4:0.3)inner:0.4)root;";
        assert_eq!(leaf_names(tree).unwrap(), vec!["sp1", "sp2", "sp3", "sp4"]);
    }

    #[test]
    fn test_leaf_names_quotes_and_comments() {
        let tree = "('leaf one':1,[a comment]'it''s':2, \n plain [&&NHX:x=1]:3);";
        assert_eq!(leaf_names(tree).unwrap(), vec!["leaf one", "it's", "plain"]);
    }

    #[test]
    fn test_leaf_names_only_first_tree() {
        assert_eq!(leaf_names("(A,B);(C,D);").unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_leaf_names_errors() {
        assert!(leaf_names("((A,B);").is_err());
        assert!(leaf_names("(A,B));").is_err());
        assert!(leaf_names("('A,B);").is_err());
        assert!(leaf_names("(A[,B);").is_err());
        assert!(leaf_names("(,,);").unwrap().is_empty());
    }

    #[test]
    fn test_read_leaf_names() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("fam.tree");
        make_test_file(&tree, "(Q1:0.1,(Q2:0.2,Q3:0.3):0.1);\n");
        assert_eq!(read_leaf_names(&tree).unwrap(), vec!["Q1", "Q2", "Q3"]);
        let empty = dir.path().join("empty.tree");
        make_test_file(&empty, "();\n");
        assert!(read_leaf_names(&empty).is_err());
    }
}
