// This file contains the code for shrinking a topology alignment before drawing: long gappy
// loops and wide TM blocks are collapsed so that large families still fit into one image.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use std::collections::BTreeSet;

use crate::topology::{GAP, INSIDE, OUTSIDE, MEMBRANE, StateFractions, is_within_tm, tm_positions};


// Loop blocks keep this many columns on each side of their neighbouring helices.
static HALF_MARGIN: usize = 2;

// Flat TM runs need at least this many columns with the same 'M' count.
static MIN_FLAT_RUN: usize = 5;

// Placeholder for "no state" while shrinking, turned into gaps at the end.
const BLANK: u8 = b' ';


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[value(rename_all = "snake_case")]
pub enum ShrinkMethod {
    #[value(alias = "0")]
    Full,          // collapse loops and flatten TM blocks
    #[value(alias = "1")]
    Loops,         // collapse loops, keep every TM column
    #[value(alias = "2")]
    Proportional,  // shrink TM blocks by a fixed rate and cap loop lengths
}

impl std::fmt::Display for ShrinkMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ShrinkMethod::Full         => "full",
            ShrinkMethod::Loops        => "loops",
            ShrinkMethod::Proportional => "proportional",
        };
        write!(f, "{}", name)
    }
}


#[derive(Debug, Clone)]
pub struct ShrinkSettings {
    pub method: ShrinkMethod,
    pub rate_tm: f64,
    pub max_hold_loop: usize,
}


// Per-column fraction of K and R residues, used to keep positively charged residues visible.
#[derive(Debug, Default, Clone)]
pub struct KrFractions {
    pub per_k: Vec<f64>,
    pub per_r: Vec<f64>,
}

impl KrFractions {
    pub fn from_aligned_seqs(seqs: &[String]) -> Self {
        let length = seqs.first().map_or(0, |s| s.len());
        let mut cnt_k = vec![0usize; length];
        let mut cnt_r = vec![0usize; length];
        for seq in seqs {
            for (j, c) in seq.bytes().take(length).enumerate() {
                match c {
                    b'K' => cnt_k[j] += 1,
                    b'R' => cnt_r[j] += 1,
                    _ => {}
                }
            }
        }
        let n = seqs.len().max(1) as f64;
        KrFractions {
            per_k: cnt_k.iter().map(|&c| c as f64 / n).collect(),
            per_r: cnt_r.iter().map(|&c| c as f64 / n).collect(),
        }
    }

    pub fn has_kr(&self, pos: usize) -> bool {
        self.per_k.get(pos).copied().unwrap_or(0.0) + self.per_r.get(pos).copied().unwrap_or(0.0)
            > 0.0
    }

    fn any_in(&self, start: usize, end: usize) -> bool {
        (start..end).any(|pos| self.has_kr(pos))
    }
}


pub fn shrink(topos: &mut [String], settings: &ShrinkSettings,
              aligned_aa: Option<&[String]>) -> Vec<usize> {
    // Shrinks the topologies in place and returns the map from drawn column to original column.
    // The aligned amino acid sequences are only given when K/R residues should be kept.
    if topos.is_empty() { return Vec::new(); }
    match settings.method {
        ShrinkMethod::Full => {
            let kr = aligned_aa.map(KrFractions::from_aligned_seqs);
            shrink_gaps_and_tm(topos, kr.as_ref())
        }
        ShrinkMethod::Loops => shrink_gaps_exclude_tm(topos),
        ShrinkMethod::Proportional => shrink_proportional(topos, aligned_aa, settings.rate_tm,
                                                          settings.max_hold_loop),
    }
}


fn finish(topos: &mut [String], new_topos: Vec<Vec<u8>>) {
    for (topo, new_topo) in topos.iter_mut().zip(new_topos) {
        *topo = new_topo.into_iter().map(|c| if c == BLANK { GAP as char } else { c as char })
            .collect();
    }
}


fn keep_columns(topos: &mut [String], columns: &[usize]) {
    let new_topos: Vec<Vec<u8>> = topos.iter()
        .map(|t| columns.iter().map(|&p| t.as_bytes()[p]).collect()).collect();
    finish(topos, new_topos);
}


pub fn shrink_gaps_and_tm(topos: &mut [String], kr: Option<&KrFractions>) -> Vec<usize> {
    // Non-TM blocks are reduced to at most two columns per sequence (or removed entirely when
    // that can't change any topology). TM blocks are split into flat runs, which are thinned
    // according to their 'M' fraction, and non-flat runs, where only the well-populated columns
    // are kept.
    let orig: Vec<Vec<u8>> = topos.iter().map(|t| t.as_bytes().to_vec()).collect();
    let fractions = StateFractions::from_topologies(topos);
    let length = fractions.len();
    let mut new: Vec<Vec<u8>> = vec![Vec::new(); orig.len()];
    let mut map = Vec::new();

    let mut i = 0;
    while i < length {
        let mut j = 0;
        let (mut sum_i, mut sum_o) = (0.0, 0.0);
        while i + j < length && fractions.per_m[i + j] == 0.0 {
            sum_i += fractions.per_i[i + j];
            sum_o += fractions.per_o[i + j];
            j += 1;
        }
        if j >= 1 {
            if (sum_i > 0.0 || sum_o > 0.0) &&
                    !is_safe_to_delete(&orig, i, i + j, &new, map.len(), kr) {
                collapse_loop_block(&orig, i, i + j, sum_i, sum_o, kr, &mut new, &mut map);
            }
            i += j;
            continue;
        }

        while i + j < length && fractions.per_m[i + j] > 0.0 { j += 1; }
        for (is_flat, b, e) in split_flat_runs(&fractions.cnt_m[i..i + j], i) {
            let selected: BTreeSet<usize> = if is_flat {
                if fractions.per_gap[b] > 0.95 &&
                        is_safe_to_delete(&orig, b, e, &new, map.len(), kr) {
                    continue;
                }
                let factor = (fractions.per_m[b] * 1.5).min(1.0);
                let width = (((e - b) as f64 * factor).round() as usize).max(MIN_FLAT_RUN);
                (0..width).map(|k| b + ((k * (e - b - 1)) as f64 / (width - 1) as f64).round() as usize)
                    .chain((b..e).filter(|&p| kr.is_some_and(|kr| kr.has_kr(p))))
                    .collect()
            } else {
                let min_m = fractions.per_m[b..e].iter().cloned().fold(f64::INFINITY, f64::min);
                let max_m = fractions.per_m[b..e].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let middle = min_m + (max_m - min_m) * 0.5;
                (b..e).filter(|&k| {
                    (fractions.per_gap[k] < 0.95 && fractions.per_m[k] > middle) ||
                        fractions.per_m[k] > 0.65 || kr.is_some_and(|kr| kr.has_kr(k))
                }).collect()
            };
            for k in b..e {
                if selected.contains(&k) ||
                        !is_safe_to_delete(&orig, k, k + 1, &new, map.len(), kr) {
                    for (n, o) in new.iter_mut().zip(&orig) { n.push(o[k]); }
                    map.push(k);
                }
            }
        }
        i += j;
    }
    finish(topos, new);
    map
}


#[allow(clippy::too_many_arguments)]
fn collapse_loop_block(orig: &[Vec<u8>], start: usize, end: usize, sum_i: f64, sum_o: f64,
                       kr: Option<&KrFractions>, new: &mut [Vec<u8>], map: &mut Vec<usize>) {
    // Replaces a loop block which can't be deleted with one or two columns per sequence.
    let blocks: Vec<&[u8]> = orig.iter().map(|o| &o[start..end]).collect();
    let first_or_last = |block: &[u8]| -> u8 {
        if block.contains(&OUTSIDE) { OUTSIDE } else if block.contains(&INSIDE) { INSIDE }
                                                                           else { BLANK }
    };

    if let Some(kr) = kr {
        let replacements: Vec<u8> = blocks.iter()
            .map(|b| b.iter().copied().find(|&c| c != GAP).unwrap_or(BLANK)).collect();
        let mut kr_columns: Vec<usize> = (start..end).filter(|&p| kr.has_kr(p)).collect();
        if kr_columns.is_empty() { kr_columns.push(start); }
        for p in kr_columns {
            for (n, &r) in new.iter_mut().zip(&replacements) { n.push(r); }
            map.push(p);
        }
        return;
    }

    let both_states = sum_i > 0.0 && sum_o > 0.0 &&
        blocks.iter().any(|b| b.contains(&INSIDE) && b.contains(&OUTSIDE));
    if both_states {
        for (n, block) in new.iter_mut().zip(&blocks) {
            let p_i = block.iter().position(|&c| c == INSIDE);
            let p_o = block.iter().position(|&c| c == OUTSIDE);
            let pair = match (p_i, p_o) {
                (Some(a), Some(b)) => if a < b { [INSIDE, OUTSIDE] } else { [OUTSIDE, INSIDE] },
                (Some(_), None)    => [INSIDE, INSIDE],
                (None, Some(_))    => [OUTSIDE, OUTSIDE],
                (None, None)       => [BLANK, BLANK],
            };
            n.extend_from_slice(&pair);
        }
        map.push(start);
        map.push(end - 1);
    } else {
        for (n, block) in new.iter_mut().zip(&blocks) { n.push(first_or_last(*block)); }
        map.push(end - 1);
    }
}


fn split_flat_runs(cnt_m: &[usize], offset: usize) -> Vec<(bool, usize, usize)> {
    // Splits a TM block into flat runs (at least MIN_FLAT_RUN identical adjacent counts) and
    // the non-flat segments between them, in column order.
    let mut runs = Vec::new();
    let mut nonflat_start: Option<usize> = None;
    let mut i = 0;
    while i < cnt_m.len() {
        let mut j = 0;
        while i + j < cnt_m.len() && cnt_m[i + j] == cnt_m[i] { j += 1; }
        if j >= MIN_FLAT_RUN {
            if let Some(s) = nonflat_start.take() { runs.push((false, s + offset, i + offset)); }
            runs.push((true, i + offset, i + j + offset));
        } else if nonflat_start.is_none() {
            nonflat_start = Some(i);
        }
        i += j;
    }
    if let Some(s) = nonflat_start { runs.push((false, s + offset, cnt_m.len() + offset)); }
    runs
}


pub fn is_safe_to_delete(orig: &[Vec<u8>], start: usize, end: usize, new: &[Vec<u8>],
                         start_new: usize, kr: Option<&KrFractions>) -> bool {
    // Deleting orig[start..end] is safe if no sequence's topology would change: the terminal
    // states must stay in place and two helices must never merge. The left context comes from
    // the already-shrunk sequences, the right context from the original ones.
    if kr.is_some_and(|kr| kr.any_in(start, end)) { return false; }
    let Some(length) = orig.first().map(|o| o.len()) else { return true; };
    if start < 1 || end + 1 >= length { return false; }
    for (topo_orig, topo_new) in orig.iter().zip(new) {
        let region = &topo_orig[start..end];
        let found = [INSIDE, OUTSIDE, MEMBRANE].iter().filter(|&&s| region.contains(&s)).count();
        if found >= 3 { return false; }
        if found == 0 { continue; }
        let gapless: Vec<u8> = region.iter().copied().filter(|&c| c != GAP).collect();
        let (first, last) = (gapless[0], gapless[gapless.len() - 1]);

        if start_new == 0 || topo_new.len() < start_new { return false; }
        let mut p1 = start_new - 1;
        while p1 >= 1 && topo_new[p1] == GAP { p1 -= 1; }
        let left = topo_new[p1];

        let mut p2 = end;
        while p2 < length - 1 && topo_orig[p2] == GAP { p2 += 1; }
        let right = topo_orig[p2];
        if p2 == length - 1 { return false; }

        let keeps_topology = if found == 2 { last == right && first == left }
                                      else { last == right || first == left };
        if !keeps_topology { return false; }
    }
    true
}


pub fn shrink_gaps_exclude_tm(topos: &mut [String]) -> Vec<usize> {
    // Loop blocks (no 'M' or 'S' in any sequence) keep only HALF_MARGIN columns at each end, or
    // just the last ones for the N-terminal block. Blocks that are all gaps are kept as they are.
    let fractions = StateFractions::from_topologies(topos);
    let length = fractions.len();
    let mut keep = BTreeSet::new();
    let mut i = 0;
    while i < length {
        let mut j = 0;
        let (mut sum_i, mut sum_o) = (0.0, 0.0);
        while i + j < length && fractions.per_m[i + j] == 0.0 && fractions.per_sp[i + j] == 0.0 {
            sum_i += fractions.per_i[i + j];
            sum_o += fractions.per_o[i + j];
            j += 1;
        }
        if j >= 1 {
            if sum_i > 0.0 || sum_o > 0.0 {
                if i > 0 { keep.extend(i..(i + HALF_MARGIN).min(length)); }
                keep.extend((i + j).saturating_sub(HALF_MARGIN)..i + j);
            } else {
                keep.extend(i..i + j);
            }
            i += j;
        } else {
            keep.insert(i);
            i += 1;
        }
    }
    let map: Vec<usize> = keep.into_iter().collect();
    keep_columns(topos, &map);
    map
}


pub fn shrink_proportional(topos: &mut [String], aligned_aa: Option<&[String]>, rate_tm: f64,
                           max_hold_loop: usize) -> Vec<usize> {
    // Columns covered by any helix form TM blocks, which are thinned to 1/rate_tm of their width
    // (at least two columns). Loops up to max_hold_loop columns are kept, longer loops keep their
    // ends. K/R columns outside helices are kept as well when amino acids are given.
    let length = topos[0].len();
    let tm_lists: Vec<_> = topos.iter().map(|t| tm_positions(t)).collect();
    let mut column_type = vec![b'l'; length];
    for tm_list in &tm_lists {
        for &(b, e) in tm_list {
            for c in column_type.iter_mut().take(e).skip(b) { *c = b'M'; }
        }
    }
    if let Some(aa_seqs) = aligned_aa {
        for (seq, tm_list) in aa_seqs.iter().zip(&tm_lists) {
            for (j, c) in seq.bytes().enumerate().take(length) {
                if (c == b'K' || c == b'R') && !is_within_tm(j, tm_list) { column_type[j] = b'P'; }
            }
        }
    }

    let mut keep = BTreeSet::new();
    let mut i = 0;
    while i < length {
        let is_tm = column_type[i] == b'M';
        let mut j = 0;
        while i + j < length && (column_type[i + j] == b'M') == is_tm { j += 1; }
        if is_tm {
            let width = (((j as f64) / rate_tm).round() as usize).max(2);
            for k in 0..width {
                keep.insert(i + (((j - 1) * k) as f64 / (width - 1) as f64).round() as usize);
            }
        } else if j < max_hold_loop {
            keep.extend(i..i + j);
        } else {
            keep.extend((i..i + j).filter(|&k| {
                2 * (k - i) < max_hold_loop || i + j - k < max_hold_loop || column_type[k] == b'P'
            }));
        }
        i += j;
    }
    let map: Vec<usize> = keep.into_iter().collect();
    keep_columns(topos, &map);
    map
}
