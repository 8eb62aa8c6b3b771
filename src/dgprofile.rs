// This file contains functions for loading DG (hydrophobicity free energy) profiles and placing
// them onto the columns of a drawn topology alignment.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::misc::{file_dir, file_root};
use crate::topology::{align_to_seq_map, GAP};


// (residue index, DG value) pairs in sequence order.
pub type DgProfile = Vec<(usize, f64)>;


pub fn read_dg_profiles(filename: &Path) -> Result<HashMap<String, DgProfile>, String> {
    // A profile file holds one or more blocks:
    //   #SeqID <id>
    //   #Number of sliding windows: <n>
    //   <idx> <dg>     (n lines)
    let text = fs::read_to_string(filename)
        .map_err(|e| format!("failed to read {}\n{}", filename.display(), e))?;
    parse_dg_profiles(&text).map_err(|e| format!("{} in {}", e, filename.display()))
}


fn parse_dg_profiles(text: &str) -> Result<HashMap<String, DgProfile>, String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut profiles = HashMap::new();
    let mut seq_id = String::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("#SeqID") {
            seq_id = line.split_whitespace().nth(1).unwrap_or("").to_string();
        } else if line.starts_with("#Number of sliding windows") {
            let count: usize = line.split(':').nth(1).unwrap_or("").trim().parse()
                .map_err(|_| format!("bad window count \"{}\"", line))?;
            let mut profile = Vec::with_capacity(count);
            for j in 0..count {
                let window = lines.get(i + j + 1)
                    .ok_or_else(|| format!("profile for {} is truncated", seq_id))?;
                let parts: Vec<&str> = window.split_whitespace().collect();
                if parts.len() != 2 {
                    return Err(format!("malformed profile line \"{}\"", window));
                }
                let idx = parts[0].parse::<usize>()
                    .map_err(|_| format!("malformed profile line \"{}\"", window))?;
                let dg = parts[1].parse::<f64>()
                    .map_err(|_| format!("malformed profile line \"{}\"", window))?;
                profile.push((idx, dg));
            }
            i += count;
            profiles.insert(seq_id.clone(), profile);
        }
        i += 1;
    }
    Ok(profiles)
}


pub fn find_dg_profile_file(in_file: &Path, seq_id: &str, given: &Option<PathBuf>)
        -> Option<PathBuf> {
    // An explicitly given file wins if it exists, then <stem>_dg.txt and <stem>-<id>_dg.txt next to
    // the alignment.
    if let Some(path) = given {
        if path.is_file() { return Some(path.clone()); }
    }
    let dir = file_dir(in_file);
    let stem = file_root(in_file);
    [dir.join(format!("{}_dg.txt", stem)), dir.join(format!("{}-{}_dg.txt", stem, seq_id))]
        .into_iter().find(|p| p.is_file())
}


pub fn profile_for<'a>(profiles: &'a HashMap<String, DgProfile>,
                       seq_id: &str) -> Option<&'a DgProfile> {
    // Single-sequence scans are often labelled "query" rather than with the real ID.
    profiles.get(seq_id).or_else(|| profiles.get("query"))
}


pub fn match_to_alignment(profile: &DgProfile, orig_topo: &str, shrink_map: &[usize],
                          topo: &str) -> DgProfile {
    // Returns (drawn column, DG) pairs. orig_topo is the aligned topology before shrinking and
    // shrink_map maps drawn columns back to its columns (empty when nothing was shrunk).
    let by_residue: HashMap<usize, f64> = profile.iter().copied().collect();
    let align_to_seq = align_to_seq_map(orig_topo);
    topo.bytes().enumerate().filter(|&(_, c)| c != GAP).filter_map(|(j, _)| {
        let orig_col = if shrink_map.is_empty() { j } else { *shrink_map.get(j)? };
        let residue = (*align_to_seq.get(orig_col)?)?;
        by_residue.get(&residue).map(|&dg| (j, dg))
    }).collect()
}
