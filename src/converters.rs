// This file contains the small file-conversion subcommands: iTOL datasets straight from topology
// alignments, TM fragments, gap removal and tree leaf order.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::itol_data::{write_nterm_colordef, write_numtm_multibar, write_taxonomy_label_colours};
use crate::log::{section_header, warning};
use crate::misc::{check_if_file_exists, create_dir, file_dir, file_root, load_fasta,
                  output_writer, quit_with_error, write_fasta, FastaRecord};
use crate::newick::read_leaf_names;
use crate::topology::{remove_unnecessary_gaps, GAP};


pub fn numtm(in_msa: PathBuf, out_file: Option<PathBuf>, legacy: bool) {
    check_if_file_exists(&in_msa);
    let topos = load_fasta(&in_msa);
    write_or_quit(&out_file, |out| write_numtm_multibar(out, &topos, legacy));
    report("numtm", &out_file, &format!("{} topologies", topos.len()));
}


pub fn iocolor(in_msa: PathBuf, out_file: Option<PathBuf>) {
    check_if_file_exists(&in_msa);
    let topos = load_fasta(&in_msa);
    write_or_quit(&out_file, |out| write_nterm_colordef(out, &topos));
    report("iocolor", &out_file, &format!("{} topologies", topos.len()));
}


pub fn colorrange(fasta: PathBuf, tree: PathBuf, out_file: Option<PathBuf>) {
    check_if_file_exists(&fasta);
    check_if_file_exists(&tree);
    let records = load_fasta(&fasta);
    let leaves = read_leaf_names(&tree).unwrap_or_else(|e| quit_with_error(&e));
    let mut coloured = 0;
    write_or_quit(&out_file, |out| {
        coloured = write_taxonomy_label_colours(out, &records, &leaves)?;
        Ok(())
    });
    report("colorrange", &out_file, &format!("{} of {} leaves coloured", coloured, leaves.len()));
}


pub fn tmfrag(in_topo: PathBuf, aa_seq: PathBuf, out_file: Option<PathBuf>, print_id: bool) {
    check_if_file_exists(&in_topo);
    check_if_file_exists(&aa_seq);
    let topos = load_fasta(&in_topo);
    let seqs = load_fasta(&aa_seq);
    let mut fragment_count = 0;
    write_or_quit(&out_file, |out| {
        fragment_count = write_tm_fragments(out, &topos, &seqs, print_id)?;
        Ok(())
    });
    report("tmfrag", &out_file, &format!("{} TM fragments", fragment_count));
}


pub fn rmgap(in_msa: PathBuf, out_file: Option<PathBuf>) {
    check_if_file_exists(&in_msa);
    let mut records = load_fasta(&in_msa);
    let before = records.first().map(|r| r.seq.len()).unwrap_or(0);
    let seqs: Vec<String> = records.iter().map(|r| r.seq.clone()).collect();
    for (record, seq) in records.iter_mut().zip(remove_unnecessary_gaps(&seqs)) {
        record.seq = seq;
    }
    let after = records.first().map(|r| r.seq.len()).unwrap_or(0);
    write_or_quit(&out_file, |out| write_fasta(&records, out));
    report("rmgap", &out_file, &format!("{} columns reduced to {}", before, after));
}


pub fn listorder(trees: Vec<PathBuf>, out_dir: Option<PathBuf>) {
    for tree in &trees { check_if_file_exists(tree); }
    if let Some(out_dir) = &out_dir { create_dir(out_dir); }
    section_header("topomsa listorder");
    for tree in &trees {
        let leaves = read_leaf_names(tree).unwrap_or_else(|e| quit_with_error(&e));
        let order_file = listorder_filename(tree, &out_dir);
        write_or_quit(&Some(order_file.clone()), |out| {
            for leaf in &leaves { writeln!(out, "{}", leaf)?; }
            Ok(())
        });
        eprintln!("  {}: {} leaves -> {}", tree.display(), leaves.len(), order_file.display());
    }
    eprintln!();
}


fn listorder_filename(tree: &Path, out_dir: &Option<PathBuf>) -> PathBuf {
    let dir = out_dir.clone().unwrap_or_else(|| file_dir(tree));
    dir.join(format!("{}.listorder.txt", file_root(tree)))
}


fn tm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"M+").unwrap())
}


fn write_tm_fragments(out: &mut dyn Write, topos: &[FastaRecord], seqs: &[FastaRecord],
                      print_id: bool) -> io::Result<usize> {
    // TM helices are found on the gapless topology, which must be as long as the sequence. Only
    // the first usable topology for each ID is used.
    let seq_map: HashMap<&str, &str> = seqs.iter().map(|r| (r.id.as_str(), r.seq.as_str()))
        .collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut count = 0;
    for topo in topos {
        let Some(aa_seq) = seq_map.get(topo.id.as_str()) else {
            warning(&format!("no amino acid sequence found for {}", topo.id));
            continue;
        };
        if done.contains(topo.id.as_str()) { continue; }
        let gapless: String = topo.seq.chars().filter(|&c| c != GAP as char).collect();
        if !aa_seq.is_ascii() || !gapless.is_ascii() {
            warning(&format!("non-ASCII characters in sequence or topology for {}", topo.id));
            continue;
        }
        if gapless.len() != aa_seq.len() {
            warning(&format!("length of sequence ({}) and topology ({}) do not match for {}",
                             aa_seq.len(), gapless.len(), topo.id));
            continue;
        }
        done.insert(topo.id.as_str());
        for m in tm_regex().find_iter(&gapless) {
            let fragment = &aa_seq[m.start()..m.end()];
            if print_id { writeln!(out, "{} \t {}", topo.id, fragment)?; }
                   else { writeln!(out, "{}", fragment)?; }
            count += 1;
        }
    }
    Ok(count)
}


fn write_or_quit<F>(out_file: &Option<PathBuf>, write_fn: F)
where F: FnOnce(&mut dyn Write) -> io::Result<()> {
    let mut out = output_writer(out_file);
    let result = write_fn(&mut out).and_then(|_| out.flush());
    if let Err(e) = result {
        let target = match out_file {
            Some(path) => path.display().to_string(),
            None       => "stdout".to_string(),
        };
        quit_with_error(&format!("failed to write to {}\n{}", target, e));
    }
}


fn report(command: &str, out_file: &Option<PathBuf>, summary: &str) {
    // Converters print a single status line to stderr so stdout stays clean for piping.
    match out_file {
        Some(path) => eprintln!("topomsa {}: {} written to {}", command, summary, path.display()),
        None       => eprintln!("topomsa {}: {}", command, summary),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::make_test_file;

    fn records(pairs: &[(&str, &str)]) -> Vec<FastaRecord> {
        pairs.iter().map(|(anno, seq)| FastaRecord::new(anno, seq)).collect()
    }

    #[test]
    fn test_write_tm_fragments() {
        let topos = records(&[("P1", "ii-MMM--oooMMi"), ("P1", "iiiiiiiiiiiiii"),
                              ("P2", "iiMMoo"), ("P3", "MMM")]);
        let seqs = records(&[("P1 desc", "ACDEFGHIKLM"), ("P2", "ACD")]);
        let mut buf = Vec::new();
        let count = write_tm_fragments(&mut buf, &topos, &seqs, true).unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(buf).unwrap(), "P1 \t DEF\nP1 \t KL\n");

        let mut buf = Vec::new();
        write_tm_fragments(&mut buf, &topos, &seqs, false).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "DEF\nKL\n");
    }

    #[test]
    fn test_write_tm_fragments_retries_id_after_mismatch() {
        // A mismatched topology doesn't use up the ID, so a later matching one is still used.
        let topos = records(&[("P1", "iiMMo"), ("P1", "iMMo")]);
        let seqs = records(&[("P1", "ACDE")]);
        let mut buf = Vec::new();
        assert_eq!(write_tm_fragments(&mut buf, &topos, &seqs, false).unwrap(), 1);
        assert_eq!(String::from_utf8(buf).unwrap(), "CD\n");
    }

    #[test]
    fn test_write_tm_fragments_non_ascii() {
        // A non-ASCII residue is skipped rather than splitting a multi-byte character.
        let topos = records(&[("P1", "iMMo"), ("P2", "iMMo")]);
        let seqs = records(&[("P1", "ÉAC"), ("P2", "ACDE")]);
        let mut buf = Vec::new();
        assert_eq!(write_tm_fragments(&mut buf, &topos, &seqs, true).unwrap(), 1);
        assert_eq!(String::from_utf8(buf).unwrap(), "P2 \t CD\n");
    }

    #[test]
    fn test_listorder() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("PF00001.tree");
        make_test_file(&tree, "((B:1,A:1):1,(C:1,D:1):1);\n");
        listorder(vec![tree.clone()], None);
        let text = std::fs::read_to_string(dir.path().join("PF00001.listorder.txt")).unwrap();
        assert_eq!(text, "B\nA\nC\nD\n");

        let out_dir = dir.path().join("orders");
        listorder(vec![tree], Some(out_dir.clone()));
        assert!(out_dir.join("PF00001.listorder.txt").is_file());
    }

    #[test]
    fn test_rmgap() {
        let dir = tempdir().unwrap();
        let in_msa = dir.path().join("fam.topomsa");
        let out_msa = dir.path().join("fam.rmgap.topomsa");
        make_test_file(&in_msa, ">P1\ni--MMo-\n>P2\ni-M-Mo-\n");
        rmgap(in_msa, Some(out_msa.clone()));
        assert_eq!(std::fs::read_to_string(&out_msa).unwrap(), ">P1\ni-MMo\n>P2\niM-Mo\n");
    }

    #[test]
    fn test_numtm_and_iocolor_files() {
        let dir = tempdir().unwrap();
        let in_msa = dir.path().join("fam.topomsa");
        make_test_file(&in_msa, ">Consensus\niiMMMoo\n>P1\niiMMMoo\n>P2\nooMMMii\n");
        let numtm_file = dir.path().join("fam.numTM_and_io.txt");
        numtm(in_msa.clone(), Some(numtm_file.clone()), true);
        assert_eq!(std::fs::read_to_string(&numtm_file).unwrap(), "P1,1,0\nP2,0,1\n\n");
        let io_file = dir.path().join("fam.ntermstate.colordef.txt");
        iocolor(in_msa, Some(io_file.clone()));
        assert_eq!(std::fs::read_to_string(&io_file).unwrap(), "P1,#FF0000\nP2,#0000FF\n\n");
    }

    #[test]
    fn test_colorrange_file() {
        let dir = tempdir().unwrap();
        let fasta = dir.path().join("fam.fasta");
        let tree = dir.path().join("fam.tree");
        let out = dir.path().join("fam.colorrange.txt");
        make_test_file(&fasta, ">Q1 x|Eukaryota\nMK\n>Q2 y|Bacteria\nMK\n");
        make_test_file(&tree, "(Q2,Q3);\n");
        colorrange(fasta, tree, Some(out.clone()));
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.ends_with("DATA\nQ2\tlabel\t#800080\tbold\t2\n"));
    }
}
