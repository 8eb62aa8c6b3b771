// This file contains some high-level tests for TopoMSA and functions common to other tests.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use flate2::Compression;
use flate2::write::GzEncoder;
use maplit::hashmap;
use std::collections::HashMap;
use std::fs::{File, read_to_string};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

use crate::converters::{iocolor, listorder, numtm, rmgap, tmfrag};
use crate::draw::{draw, DrawSettings};
use crate::metrics::DrawMetrics;
use crate::misc::load_fasta;
use crate::seqaln::{seqaln, SeqalnSettings};
use crate::topology::count_tm;


pub fn assert_almost_eq(a: f64, b: f64, epsilon: f64) {
    assert!((a - b).abs() < epsilon,
            "Numbers are not within {:?} of each other: {} vs {}", epsilon, a, b);
}


pub fn make_test_file(file_path: &Path, contents: &str) {
    let mut file = File::create(file_path).unwrap();
    write!(file, "{}", contents).unwrap();
}


pub fn make_gzipped_test_file(file_path: &Path, contents: &str) {
    let mut file = File::create(file_path).unwrap();
    let mut e = GzEncoder::new(Vec::new(), Compression::default());
    e.write_all(contents.as_bytes()).unwrap();
    let _ = file.write_all(&e.finish().unwrap());
}


// A small family: three aligned proteins with a shared two-helix core, where the third protein
// has an extra N-terminal helix.
const TOPO_MSA: &str = ">P1 ClusterNo=1 nTM=2\n\
                        ----iiiiMMMMMMMMoooooMMMMMMMMiii\n\
                        >P2 ClusterNo=1 nTM=2\n\
                        ----iiiiMMMMMMMMoo-ooMMMMMMMMii-\n\
                        >P3 ClusterNo=2 nTM=3\n\
                        MMMMiiiiMMMMMMMMoooooMMMMMMMMooo\n";

const SEQ_MSA: &str = ">P1\n\
                       ----MKTALLVAGLLAWNRSPEFVLAILGLKK\n\
                       >P2\n\
                       ----MKSALIVSGLLGWN-RPEYVLSVLGLK-\n\
                       >P3\n\
                       ILVAMRTAMLVAGVLAWDRSPEFVLAIIGLRR\n";


fn topology_counts(text: &str) -> HashMap<String, (usize, usize)> {
    text.lines().filter(|l| !l.is_empty()).map(|l| {
        let parts: Vec<&str> = l.split(',').collect();
        (parts[0].to_string(), (parts[1].parse().unwrap(), parts[2].parse().unwrap()))
    }).collect()
}


#[test]
fn test_draw_command() {
    let dir = tempdir().unwrap();
    let msa = dir.path().join("fam.topomsa");
    let out_dir = dir.path().join("images");
    make_test_file(&msa, TOPO_MSA);
    let settings = DrawSettings { out_dir: Some(out_dir.clone()), font_size: 8,
                                  max_image_size: 2_000_000, ..Default::default() };
    draw(vec![msa], None, settings);

    assert!(out_dir.join("fam.png").is_file());
    let yaml = read_to_string(out_dir.join("fam.yaml")).unwrap();
    let metrics: DrawMetrics = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(metrics.sequence_count, 3);
    assert_eq!(metrics.alignment_length, 32);
    assert_eq!(metrics.tm_count_min, 2);
    assert_eq!(metrics.tm_count_max, 3);
    assert_almost_eq(metrics.tm_count_mean, 7.0 / 3.0, 1e-9);
}


#[test]
fn test_draw_from_list() {
    let dir = tempdir().unwrap();
    let msa_a = dir.path().join("a.topomsa");
    let msa_b = dir.path().join("b.topomsa");
    let list = dir.path().join("list.txt");
    make_test_file(&msa_a, TOPO_MSA);
    make_gzipped_test_file(&msa_b, TOPO_MSA);
    make_test_file(&list, &format!("{}\n\n{}\n", msa_a.display(), msa_b.display()));
    draw(vec![], Some(list), DrawSettings { font_size: 8, shrink: None, ..Default::default() });
    assert!(dir.path().join("a.png").is_file());
    assert!(dir.path().join("b.png").is_file());
}


#[test]
fn test_seqaln_command() {
    let dir = tempdir().unwrap();
    let aln = dir.path().join("fam.aln");
    make_test_file(&aln, SEQ_MSA);
    make_test_file(&dir.path().join("fam.topomsa"), TOPO_MSA);
    let out_html = dir.path().join("fam.html");
    let out_txt = dir.path().join("fam.txt");
    seqaln(vec![aln], out_html.clone(), Some(out_txt.clone()),
           SeqalnSettings { window: 20, ..Default::default() });

    let html = read_to_string(&out_html).unwrap();
    assert!(html.contains("<html"));
    assert!(html.contains("P3"));
    let txt = read_to_string(&out_txt).unwrap();
    assert!(txt.starts_with("# fam"));
    // Three sequences, so no relationship line between them.
    assert!(!txt.contains('|'));
}


#[test]
fn test_converter_commands() {
    let dir = tempdir().unwrap();
    let msa = dir.path().join("fam.topomsa");
    let aln = dir.path().join("fam.aln");
    let aa = dir.path().join("fam.fasta");
    make_test_file(&msa, TOPO_MSA);
    make_test_file(&aln, SEQ_MSA);
    let seqs: String = load_fasta(&aln).iter()
        .map(|r| format!(">{}\n{}\n", r.id, r.seq.replace('-', ""))).collect();
    make_test_file(&aa, &seqs);

    let numtm_file = dir.path().join("fam.numTM_and_io.txt");
    numtm(msa.clone(), Some(numtm_file.clone()), true);
    assert_eq!(topology_counts(&read_to_string(&numtm_file).unwrap()),
               hashmap!{"P1".to_string() => (2, 0), "P2".to_string() => (2, 0),
                        "P3".to_string() => (0, 3)});

    let io_file = dir.path().join("fam.io.txt");
    iocolor(msa.clone(), Some(io_file.clone()));
    assert!(read_to_string(&io_file).unwrap().contains("P3,#0000FF\n"));

    let frag_file = dir.path().join("fam.tmfrag.txt");
    tmfrag(msa.clone(), aa, Some(frag_file.clone()), false);
    let fragments = read_to_string(&frag_file).unwrap();
    let topos = load_fasta(&msa);
    let expected: usize = topos.iter().map(|r| count_tm(&r.seq)).sum();
    assert_eq!(fragments.lines().count(), expected);
    assert!(fragments.starts_with("LLVAGLLA\n"));

    let rmgap_file = dir.path().join("fam.rmgap.topomsa");
    rmgap(msa, Some(rmgap_file.clone()));
    let trimmed = load_fasta(&rmgap_file);
    assert_eq!(trimmed.len(), 3);
    assert_eq!(trimmed[0].seq.len(), 32);

    let tree = dir.path().join("fam.tree");
    make_test_file(&tree, "((P1:0.1,P2:0.1)0.9:0.2,P3:0.4);");
    listorder(vec![tree], None);
    assert_eq!(read_to_string(dir.path().join("fam.listorder.txt")).unwrap(), "P1\nP2\nP3\n");
}
