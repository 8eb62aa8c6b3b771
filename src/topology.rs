// This file contains the functions for working with membrane protein topology strings: finding
// TM helices, classifying them, per-column state statistics and annotation parsing.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use regex::Regex;
use std::sync::OnceLock;


pub const GAP: u8 = b'-';
pub const INSIDE: u8 = b'i';
pub const OUTSIDE: u8 = b'o';
pub const MEMBRANE: u8 = b'M';
pub const SIGNAL_PEPTIDE: u8 = b'S';

// A TM helix as a half-open range of alignment columns.
pub type TmSegment = (usize, usize);


pub fn tm_positions(topo: &str) -> Vec<TmSegment> {
    // A helix starts at an 'M' and runs until the next loop state. Trailing gaps are not part of
    // the helix, but gaps between 'M' characters are.
    let topo = topo.as_bytes();
    let mut positions = Vec::new();
    let mut e = 0;
    while let Some(b) = find_from(topo, e, |c| c == MEMBRANE) {
        e = find_from(topo, b + 1, |c| c == INSIDE || c == OUTSIDE).unwrap_or(topo.len());
        if topo[e - 1] == GAP {
            e = topo[..e - 1].iter().rposition(|&c| c == MEMBRANE).unwrap_or(b) + 1;
        }
        if b == e { return Vec::new(); }
        positions.push((b, e));
    }
    positions
}


pub fn count_tm(topo: &str) -> usize {
    tm_positions(topo).len()
}


fn find_from(seq: &[u8], start: usize, pred: impl Fn(u8) -> bool) -> Option<usize> {
    if start >= seq.len() { return None; }
    seq[start..].iter().position(|&c| pred(c)).map(|p| p + start)
}


pub fn io_state_upstream(topo: &str, pos: usize) -> Option<u8> {
    // The nearest loop state before pos, looking past gaps only.
    let topo = topo.as_bytes();
    let end = pos.min(topo.len());
    for &c in topo[..end].iter().rev() {
        match c {
            GAP => continue,
            INSIDE | OUTSIDE => return Some(c),
            _ => return None,
        }
    }
    None
}


pub fn io_state_downstream(topo: &str, pos: usize) -> Option<u8> {
    // The nearest loop state at or after pos, looking past gaps only.
    let topo = topo.as_bytes();
    for &c in topo.iter().skip(pos) {
        match c {
            GAP => continue,
            INSIDE | OUTSIDE => return Some(c),
            _ => return None,
        }
    }
    None
}


pub fn opposite_state(state: u8) -> u8 {
    if state == INSIDE { OUTSIDE } else { INSIDE }
}


pub fn tm_types(topo: &str) -> (Vec<TmSegment>, Vec<u8>) {
    // Classifies each helix by its flanking loops:
    //   M: outside -> inside
    //   W: inside -> outside
    //   R: re-entrant from the inside
    //   r: re-entrant from the outside
    let positions = tm_positions(topo);
    let types = positions.iter().map(|&(b, e)| {
        let up = io_state_upstream(topo, b);
        let down = io_state_downstream(topo, e);
        let (up, down) = match (up, down) {
            (Some(u), Some(d)) => (u, d),
            (Some(u), None)    => (u, opposite_state(u)),
            (None, Some(d))    => (opposite_state(d), d),
            (None, None)       => (OUTSIDE, INSIDE),
        };
        match (up, down) {
            (OUTSIDE, INSIDE) => b'M',
            (INSIDE, OUTSIDE) => b'W',
            (INSIDE, INSIDE)  => b'R',
            _                 => b'r',
        }
    }).collect();
    (positions, types)
}


pub fn nterm_state(topo: &str) -> Option<u8> {
    // The side of the membrane where the N-terminus lies. A signal peptide means the mature
    // protein starts outside and a leading helix means the opposite of the first loop after it.
    let bytes = topo.as_bytes();
    let first = bytes.iter().position(|&c| c != GAP)?;
    match bytes[first] {
        INSIDE | OUTSIDE => Some(bytes[first]),
        SIGNAL_PEPTIDE   => Some(OUTSIDE),
        MEMBRANE => {
            let (b, e) = *tm_positions(topo).first()?;
            debug_assert_eq!(b, first);
            io_state_downstream(topo, e).map(opposite_state)
        }
        _ => None,
    }
}


pub fn tm_index(pos: usize, tm_list: &[TmSegment]) -> Option<usize> {
    tm_list.iter().position(|&(b, e)| pos >= b && pos < e)
}


pub fn is_within_tm(pos: usize, tm_list: &[TmSegment]) -> bool {
    tm_index(pos, tm_list).is_some()
}


pub fn gap_runs(topo: &str) -> Vec<(usize, usize)> {
    // Half-open ranges of consecutive gap characters.
    let bytes = topo.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == GAP {
            let start = i;
            while i < bytes.len() && bytes[i] == GAP { i += 1; }
            runs.push((start, i));
        } else {
            i += 1;
        }
    }
    runs
}


pub fn remove_unnecessary_gaps(seqs: &[String]) -> Vec<String> {
    // Drops every column that is a gap in all sequences.
    if seqs.is_empty() { return Vec::new(); }
    let length = seqs.iter().map(|s| s.len()).max().unwrap_or(0);
    let keep: Vec<bool> = (0..length).map(|j| {
        seqs.iter().any(|s| s.as_bytes().get(j).is_some_and(|&c| c != GAP))
    }).collect();
    seqs.iter().map(|s| {
        s.bytes().enumerate().filter(|(j, _)| keep[*j]).map(|(_, c)| c as char).collect()
    }).collect()
}


pub fn align_to_seq_map(aligned: &str) -> Vec<Option<usize>> {
    // Maps each alignment column to its position in the gapless sequence.
    let mut pos = 0;
    aligned.bytes().map(|c| {
        if c == GAP { None } else { pos += 1; Some(pos - 1) }
    }).collect()
}


#[derive(Debug, Default, Clone)]
pub struct StateFractions {
    pub cnt_i: Vec<usize>,
    pub cnt_o: Vec<usize>,
    pub cnt_m: Vec<usize>,
    pub cnt_sp: Vec<usize>,
    pub cnt_gap: Vec<usize>,
    pub per_i: Vec<f64>,
    pub per_o: Vec<f64>,
    pub per_m: Vec<f64>,
    pub per_sp: Vec<f64>,
    pub per_gap: Vec<f64>,
}

impl StateFractions {
    pub fn from_topologies(topos: &[String]) -> Self {
        let length = topos.first().map_or(0, |t| t.len());
        let mut fractions = StateFractions {
            cnt_i: vec![0; length], cnt_o: vec![0; length], cnt_m: vec![0; length],
            cnt_sp: vec![0; length], cnt_gap: vec![0; length],
            ..Default::default()
        };
        for topo in topos {
            for (j, c) in topo.bytes().take(length).enumerate() {
                match c {
                    INSIDE         => fractions.cnt_i[j] += 1,
                    OUTSIDE        => fractions.cnt_o[j] += 1,
                    MEMBRANE       => fractions.cnt_m[j] += 1,
                    SIGNAL_PEPTIDE => fractions.cnt_sp[j] += 1,
                    GAP            => fractions.cnt_gap[j] += 1,
                    _ => {}
                }
            }
        }
        let n = topos.len().max(1) as f64;
        let per = |counts: &Vec<usize>| counts.iter().map(|&c| c as f64 / n).collect::<Vec<_>>();
        fractions.per_i = per(&fractions.cnt_i);
        fractions.per_o = per(&fractions.cnt_o);
        fractions.per_m = per(&fractions.cnt_m);
        fractions.per_sp = per(&fractions.cnt_sp);
        fractions.per_gap = per(&fractions.cnt_gap);
        fractions
    }

    pub fn len(&self) -> usize {
        self.cnt_i.len()
    }
}


pub fn verify_terminal_status(topos: &mut [String], tm_lists: &[Vec<TmSegment>]) {
    // Topologies which start or end with a helix get a loop state added next to it (the opposite
    // of the loop on the helix's other side), so helix orientation can always be determined.
    for (topo, tm_list) in topos.iter_mut().zip(tm_lists) {
        let (Some(&first), Some(&last)) = (tm_list.first(), tm_list.last()) else { continue; };
        let length = topo.len();
        let mut bytes = topo.as_bytes().to_vec();
        if io_state_upstream(topo, first.0).is_none() {
            if let Some(after) = io_state_downstream(topo, first.1) {
                let p = first.0.saturating_sub(1);
                bytes[p] = opposite_state(after);
            }
        }
        if io_state_downstream(topo, last.1).is_none() {
            if let Some(before) = io_state_upstream(topo, last.0) {
                let p = if last.1 == length { length - 1 } else { last.1 };
                bytes[p] = opposite_state(before);
            }
        }
        *topo = String::from_utf8_lossy(&bytes).to_string();
    }
}


pub fn seq_tag(anno: &str) -> String {
    // The first recognised classification keyword in a header, used to group and colour rows.
    if anno.contains("ClusterNo=") {
        if let Some(m) = cluster_regex().find(anno) { return m.as_str().to_string(); }
    }
    let keywords = [(" IDT ", "IDT"), ("Consensus ", "Consensus"), (" OK ", "OK"),
                    (" SHIFT ", "SHIFT"), (" INV ", "INV"), (" INV_SHIFT ", "INV_SHIFT"),
                    (" DIFF ", "DIFF"), (" TM2GAP ", "TM2GAP"), (" TM2SEQ ", "TM2SEQ"),
                    (" TM2GAP_AND_TM2SEQ ", "TM2GAP_AND_TM2SEQ"), (" Mixed ", "Mixed"),
                    ("Eukaryota", "Eukaryota"), ("Archaea", "Archaea"), ("Bacteria", "Bacteria")];
    for (pattern, tag) in keywords {
        if anno.contains(pattern) { return tag.to_string(); }
    }
    String::new()
}


pub fn cluster_number(tag: &str) -> Option<usize> {
    tag.strip_prefix("ClusterNo=")?.parse().ok()
}


fn cluster_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ClusterNo=[0-9]+").unwrap())
}


fn annotation_field(anno: &str, key: &str) -> Vec<String> {
    // Values of a "key: a;b;c" field, which ends at the next '|' or the end of the line.
    let Some(start) = anno.find(key) else { return Vec::new(); };
    let rest = &anno[start + key.len()..];
    let value = rest.split('|').next().unwrap_or("");
    value.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}


pub fn tm_names_from_annotation(anno: &str) -> Vec<String> {
    annotation_field(anno, "tmname:")
}


pub fn fold_type_from_annotation(anno: &str) -> Vec<String> {
    annotation_field(anno, "foldtype:")
}


pub fn annotation_draw_width(annotations: &[String]) -> usize {
    // Number of annotation characters worth showing: the ID plus any "nTM=N" or "group of N".
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    let patterns = RE.get_or_init(|| [Regex::new(r"nTM\s*=\s*[0-9]*").unwrap(),
                                      Regex::new(r"group of [0-9]*").unwrap(),
                                      Regex::new(r"[^\s]+").unwrap()]);
    annotations.iter().map(|anno| {
        patterns.iter().filter_map(|re| re.find(anno)).map(|m| m.end()).max().unwrap_or(0)
    }).max().unwrap_or(0)
}


#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpecialProteins {
    pub representative: Vec<usize>,
    pub pdb: Vec<usize>,
    pub final_topology: Vec<usize>,
}

impl SpecialProteins {
    pub fn from_ids(ids: &[String]) -> Self {
        // Indices are collected in ID order, not file order.
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by(|&a, &b| ids[a].cmp(&ids[b]));
        let mut special = SpecialProteins::default();
        for i in order {
            let id = &ids[i];
            if id.starts_with("rep") {
                special.representative.push(i);
            } else if id.starts_with("pdb_") {
                special.pdb.push(i);
            } else if id.starts_with("final") {
                special.final_topology.push(i);
            }
        }
        special
    }

    pub fn all(&self) -> Vec<usize> {
        let mut all = self.representative.clone();
        all.extend(&self.pdb);
        all.extend(&self.final_topology);
        all
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.representative.contains(&idx) || self.pdb.contains(&idx) ||
            self.final_topology.contains(&idx)
    }

    pub fn is_empty(&self) -> bool {
        self.representative.is_empty() && self.pdb.is_empty() && self.final_topology.is_empty()
    }
}
