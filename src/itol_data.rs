// This file contains the readers and writers for the annotation files which decorate iTOL trees:
// TM counts, N-terminal states, taxonomy, subfamilies, species and domain architectures.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::colour::{gradient, to_hex};
use crate::log::warning;
use crate::misc::FastaRecord;
use crate::topology::{count_tm, nterm_state, OUTSIDE};


static CONSENSUS_ID: &str = "Consensus";
static NTERM_INSIDE_COLOUR: &str = "#FF0000";
static NTERM_OUTSIDE_COLOUR: &str = "#0000FF";

static TAXONOMY_LABEL_COLOURS: [(&str, &str); 3] =
    [("Archaea", "#0000ff"), ("Bacteria", "#800080"), ("Eukaryota", "#00ff00")];
static KINGDOM_RANGE_COLOURS: [(&str, &str); 3] =
    [("Archaea", "#ff0000"), ("Bacteria", "#0066ff"), ("Eukaryota", "#cc6600")];

static MULTIBAR_HEADER: &str = "DATASET_MULTIBAR\n\
                                SEPARATOR TAB\n\
                                DATASET_LABEL\tTree of TM evolution\n\
                                COLOR\t#ff0000\n\
                                FIELD_COLORS\t#ff0000\t#0000ff\n\
                                FIELD_LABELS\tNterm-inside\tNterm-outside\n\
                                WIDTH\t1000\n\
                                DATA\n";

static TREE_COLORS_HEADER: &str = "TREE_COLORS\n\
                                   SEPARATOR TAB\n\
                                   DATA\n";


fn tm_topologies(records: &[FastaRecord]) -> impl Iterator<Item = &FastaRecord> {
    records.iter().filter(|r| r.id != CONSENSUS_ID)
}


fn nterm_outside(topo: &str) -> bool {
    nterm_state(topo) == Some(OUTSIDE)
}


pub fn write_numtm_multibar(out: &mut dyn Write, topos: &[FastaRecord],
                            legacy: bool) -> io::Result<()> {
    // Each protein gets a two-field bar: its TM count goes in the first field when the
    // N-terminus is inside (or unknown) and in the second when it is outside. The legacy
    // variant is the header-less comma-separated form.
    if !legacy {
        out.write_all(MULTIBAR_HEADER.as_bytes())?;
    }
    let sep = if legacy { ',' } else { '\t' };
    for record in tm_topologies(topos) {
        let num_tm = count_tm(&record.seq);
        let (n_in, n_out) = if nterm_outside(&record.seq) { (0, num_tm) } else { (num_tm, 0) };
        writeln!(out, "{}{sep}{}{sep}{}", record.id, n_in, n_out)?;
    }
    writeln!(out)?;
    Ok(())
}


pub fn write_nterm_colordef(out: &mut dyn Write, topos: &[FastaRecord]) -> io::Result<()> {
    for record in tm_topologies(topos) {
        let colour = if nterm_outside(&record.seq) { NTERM_OUTSIDE_COLOUR }
                     else { NTERM_INSIDE_COLOUR };
        writeln!(out, "{},{}", record.id, colour)?;
    }
    writeln!(out)?;
    Ok(())
}


pub fn taxonomy_from_annotation(annotation: &str) -> &str {
    // Taxonomy is the last '|' field of the first ','-delimited part of the header.
    let first = annotation.split(',').next().unwrap_or("");
    first.rsplit('|').next().unwrap_or("").trim()
}


pub fn write_taxonomy_label_colours(out: &mut dyn Write, records: &[FastaRecord],
                                    leaves: &[String]) -> io::Result<usize> {
    // Returns the number of labels written. Sequences not in the tree or with an unknown
    // taxonomy are left uncoloured.
    let leaf_set: HashSet<&str> = leaves.iter().map(|s| s.as_str()).collect();
    out.write_all(TREE_COLORS_HEADER.as_bytes())?;
    let mut count = 0;
    for record in records {
        if !leaf_set.contains(record.id.as_str()) { continue; }
        let taxonomy = taxonomy_from_annotation(&record.annotation);
        if let Some((_, colour)) = TAXONOMY_LABEL_COLOURS.iter().find(|(t, _)| *t == taxonomy) {
            writeln!(out, "{}\tlabel\t{}\tbold\t2", record.id, colour)?;
            count += 1;
        }
    }
    Ok(count)
}


/// Subfamily membership: each sequence ID maps to a subfamily, and subfamilies are kept in the
/// order they first appear in the file (which sets their gradient colours).
#[derive(Debug, Default, PartialEq)]
pub struct Subfamilies {
    pub members: HashMap<String, String>,
    pub names: Vec<String>,
}


pub fn read_subfamilies(filename: &Path) -> Result<Subfamilies, String> {
    let text = read_text(filename)?;
    let mut subfams = Subfamilies::default();
    for line in data_lines(&text) {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            warning(&format!("broken line in {}: \"{}\"", filename.display(), line));
            continue;
        }
        let fam_id = parts[0].trim().to_string();
        if !subfams.names.contains(&fam_id) { subfams.names.push(fam_id.clone()); }
        for seq_id in parts[1].split_whitespace() {
            subfams.members.insert(seq_id.to_string(), fam_id.clone());
        }
    }
    Ok(subfams)
}


pub fn write_subfamily_ranges(out: &mut dyn Write, subfams: &Subfamilies,
                              leaves: &[String]) -> io::Result<Vec<String>> {
    // Returns the leaves which have no subfamily.
    let colours = name_colours(&subfams.names);
    out.write_all(TREE_COLORS_HEADER.as_bytes())?;
    let mut missing = Vec::new();
    for leaf in leaves {
        match subfams.members.get(leaf) {
            Some(fam) => writeln!(out, "{}\trange\t{}\t{}", leaf, colours[fam.as_str()], fam)?,
            None => missing.push(leaf.clone()),
        }
    }
    Ok(missing)
}


pub fn read_species(filename: &Path) -> Result<HashMap<String, Vec<String>>, String> {
    // Lines look like `id|...|Kingdom;Phylum;Class;Order`: the lineage is the last '|' field.
    let text = read_text(filename)?;
    let mut species = HashMap::new();
    for line in data_lines(&text) {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 2 {
            warning(&format!("broken line in {}: \"{}\"", filename.display(), line));
            continue;
        }
        let lineage = fields[fields.len() - 1].split(';').map(|s| s.trim().to_string()).collect();
        species.insert(fields[0].trim().to_string(), lineage);
    }
    Ok(species)
}


pub fn write_kingdom_ranges(out: &mut dyn Write, species: &HashMap<String, Vec<String>>,
                            leaves: &[String]) -> io::Result<Vec<String>> {
    // Returns the leaves with no usable kingdom.
    out.write_all(TREE_COLORS_HEADER.as_bytes())?;
    let mut missing = Vec::new();
    for leaf in leaves {
        let kingdom = species.get(leaf).and_then(|lineage| lineage.first());
        let colour = kingdom.and_then(|k| {
            KINGDOM_RANGE_COLOURS.iter().find(|(name, _)| name == k).map(|(_, c)| *c)
        });
        match (kingdom, colour) {
            (Some(kingdom), Some(colour)) => writeln!(out, "{}\trange\t{}\t{}", leaf, colour, kingdom)?,
            _ => missing.push(leaf.clone()),
        }
    }
    Ok(missing)
}


pub fn write_species_strip(out: &mut dyn Write, species: &HashMap<String, Vec<String>>,
                           leaves: &[String], level: usize, label: &str) -> io::Result<usize> {
    // A colour strip for one lineage level (1 = phylum, 2 = class, 3 = order). Colours follow
    // the order in which names first appear among the leaves. Returns the number of leaves
    // written.
    let leaf_names: Vec<(&String, &String)> = leaves.iter()
        .filter_map(|leaf| species.get(leaf).and_then(|l| l.get(level)).map(|name| (leaf, name)))
        .collect();
    let mut names: Vec<String> = Vec::new();
    for (_, name) in &leaf_names {
        if !names.contains(name) { names.push(name.to_string()); }
    }
    let colours = name_colours(&names);
    writeln!(out, "DATASET_COLORSTRIP")?;
    writeln!(out, "SEPARATOR COMMA")?;
    writeln!(out, "DATASET_LABEL,{}", label)?;
    writeln!(out, "COLOR,#ff0000")?;
    writeln!(out, "STRIP_WIDTH,100")?;
    writeln!(out, "DATA")?;
    for (leaf, name) in &leaf_names {
        writeln!(out, "{},{},{}", leaf, colours[name.as_str()], name)?;
    }
    Ok(leaf_names.len())
}


#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub start: usize,  // 0-based, inclusive
    pub end: usize,    // 0-based, inclusive
    pub name: String,
}


/// Domain architectures per sequence, in file order, plus the domain names in the order they
/// first appear.
#[derive(Debug, Default, PartialEq)]
pub struct DomainTable {
    pub seqs: Vec<(String, Vec<Domain>)>,
    pub names: Vec<String>,
}


pub fn read_domains(filename: &Path) -> Result<DomainTable, String> {
    // Lines look like `A0A024P4Z6: PF00999 11-392|PF02080 419-487` with 1-based coordinates.
    let text = read_text(filename)?;
    let mut table = DomainTable::default();
    for line in data_lines(&text) {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            warning(&format!("broken line in {}: \"{}\"", filename.display(), line));
            continue;
        }
        let mut domains = Vec::new();
        for item in parts[1].trim().split('|') {
            let domain = parse_domain(item).ok_or_else(|| {
                format!("invalid domain \"{}\" in {}", item.trim(), filename.display())
            })?;
            if !table.names.contains(&domain.name) { table.names.push(domain.name.clone()); }
            domains.push(domain);
        }
        table.seqs.push((parts[0].trim().to_string(), domains));
    }
    Ok(table)
}


fn parse_domain(item: &str) -> Option<Domain> {
    let mut words = item.split_whitespace();
    let name = words.next()?.to_string();
    let (start, end) = words.next()?.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse().ok()?;
    if start == 0 || end < start { return None; }
    Some(Domain { start: start - 1, end: end - 1, name })
}


pub fn read_seq_lengths(filename: &Path) -> Result<HashMap<String, usize>, String> {
    let text = read_text(filename)?;
    let mut lengths = HashMap::new();
    for line in data_lines(&text) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 { continue; }
        if let Ok(len) = parts[1].parse::<usize>() {
            lengths.insert(parts[0].to_string(), len);
        }
    }
    Ok(lengths)
}


pub fn write_domain_architectures(out: &mut dyn Write, table: &DomainTable,
                                  lengths: &HashMap<String, usize>,
                                  leaves: &[String]) -> io::Result<Vec<String>> {
    // Only sequences in the tree are written. Returns those skipped for lack of a length.
    let leaf_set: HashSet<&str> = leaves.iter().map(|s| s.as_str()).collect();
    let colours = name_colours(&table.names);
    writeln!(out, "DATASET_DOMAINS")?;
    writeln!(out, "SEPARATOR COMMA")?;
    writeln!(out, "DATASET_LABEL,Domain architecture")?;
    writeln!(out, "COLOR,#ff0000")?;
    writeln!(out, "DATA")?;
    let mut no_length = Vec::new();
    for (seq_id, domains) in &table.seqs {
        if !leaf_set.contains(seq_id.as_str()) { continue; }
        let Some(len) = lengths.get(seq_id) else {
            no_length.push(seq_id.clone());
            continue;
        };
        write!(out, "{},{}", seq_id, len)?;
        for d in domains {
            write!(out, ",HH|{}|{}|{}|{}", d.start + 1, d.end + 1, colours[d.name.as_str()], d.name)?;
        }
        writeln!(out)?;
    }
    Ok(no_length)
}


fn name_colours(names: &[String]) -> HashMap<&str, String> {
    names.iter().map(|n| n.as_str())
        .zip(gradient(names.len()).into_iter().map(to_hex))
        .collect()
}


fn read_text(filename: &Path) -> Result<String, String> {
    fs::read_to_string(filename).map_err(|e| format!("failed to read {}\n{}", filename.display(), e))
}


fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(|l| l.trim()).filter(|l| !l.is_empty() && !l.starts_with('#'))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::make_test_file;

    fn records(pairs: &[(&str, &str)]) -> Vec<FastaRecord> {
        pairs.iter().map(|(anno, seq)| FastaRecord::new(anno, seq)).collect()
    }

    fn to_string(f: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut buf = Vec::new();
        f(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    fn leaves(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numtm_multibar() {
        let topos = records(&[("Consensus", "iiMMMooo"), ("P1 x", "iiMMMoooMMMi"),
                              ("P2", "ooMMMi"), ("P3", "SSoMMMiiMMMooMMMi")]);
        let text = to_string(|b| write_numtm_multibar(b, &topos, false).unwrap());
        assert!(text.starts_with("DATASET_MULTIBAR\nSEPARATOR TAB\n"));
        assert!(text.contains("FIELD_LABELS\tNterm-inside\tNterm-outside\n"));
        assert!(text.ends_with("DATA\nP1\t2\t0\nP2\t0\t1\nP3\t0\t3\n\n"));
        assert!(!text.contains("Consensus"));

        let legacy = to_string(|b| write_numtm_multibar(b, &topos, true).unwrap());
        assert_eq!(legacy, "P1,2,0\nP2,0,1\nP3,0,3\n\n");
    }

    #[test]
    fn test_nterm_colordef() {
        let topos = records(&[("P1", "--iiMMMoo"), ("Consensus", "ooMMMi"), ("P2", "MMMii")]);
        let text = to_string(|b| write_nterm_colordef(b, &topos).unwrap());
        assert_eq!(text, "P1,#FF0000\nP2,#0000FF\n\n");
    }

    #[test]
    fn test_taxonomy_from_annotation() {
        assert_eq!(taxonomy_from_annotation("Q1 desc|Bacteria, other"), "Bacteria");
        assert_eq!(taxonomy_from_annotation("Q1|x|Archaea"), "Archaea");
        assert_eq!(taxonomy_from_annotation("Q1"), "Q1");
    }

    #[test]
    fn test_taxonomy_label_colours() {
        let seqs = records(&[("Q1 a|Bacteria,x", "MK"), ("Q2 b|Eukaryota", "MK"),
                             ("Q3 c|Viruses", "MK"), ("Q4 d|Archaea", "MK")]);
        let mut buf = Vec::new();
        let count = write_taxonomy_label_colours(&mut buf, &seqs,
                                                 &leaves(&["Q1", "Q2", "Q3"])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(count, 2);
        assert!(text.starts_with("TREE_COLORS\nSEPARATOR TAB\nDATA\n"));
        assert!(text.contains("Q1\tlabel\t#800080\tbold\t2\n"));
        assert!(text.contains("Q2\tlabel\t#00ff00\tbold\t2\n"));
        assert!(!text.contains("Q3") && !text.contains("Q4"));
    }

    #[test]
    fn test_subfamilies() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("fam.subfamilies");
        make_test_file(&file, "# comment\nSF2: A B\nbroken line\nSF1:C\n");
        let subfams = read_subfamilies(&file).unwrap();
        assert_eq!(subfams.names, vec!["SF2", "SF1"]);
        assert_eq!(subfams.members["C"], "SF1");

        let mut buf = Vec::new();
        let missing = write_subfamily_ranges(&mut buf, &subfams,
                                             &leaves(&["A", "C", "D"])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(missing, vec!["D"]);
        assert!(text.contains("A\trange\t#0000ff\tSF2\n"));
        assert!(text.contains("C\trange\t#ff0000\tSF1\n"));
    }

    #[test]
    fn test_species() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("fam.species");
        make_test_file(&file, "A|Homo sapiens|Eukaryota; Chordata; Mammalia\n\
                               B|E. coli|Bacteria;Proteobacteria\n\
                               C|x|Viruses;Something\n");
        let species = read_species(&file).unwrap();
        assert_eq!(species["A"], vec!["Eukaryota", "Chordata", "Mammalia"]);

        let tree_leaves = leaves(&["A", "B", "C", "D"]);
        let mut buf = Vec::new();
        let missing = write_kingdom_ranges(&mut buf, &species, &tree_leaves).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(missing, vec!["C", "D"]);
        assert!(text.contains("A\trange\t#cc6600\tEukaryota\n"));
        assert!(text.contains("B\trange\t#0066ff\tBacteria\n"));

        let mut buf = Vec::new();
        let count = write_species_strip(&mut buf, &species, &tree_leaves, 1, "Phylum").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(count, 3);
        assert!(text.contains("DATASET_LABEL,Phylum\n"));
        assert!(text.contains("A,#0000ff,Chordata\n"));

        let mut buf = Vec::new();
        assert_eq!(write_species_strip(&mut buf, &species, &tree_leaves, 2, "Class").unwrap(), 1);
        assert!(String::from_utf8(buf).unwrap().contains("A,#0000ff,Mammalia\n"));
    }

    #[test]
    fn test_domains() {
        let dir = tempdir().unwrap();
        let domain_file = dir.path().join("fam.mdp");
        make_test_file(&domain_file, "S1: PF00999 11-392|PF02080 419-487\nS2:PF02080 5-50\n\
                                      S3: PF00001 1-10\n");
        let table = read_domains(&domain_file).unwrap();
        assert_eq!(table.names, vec!["PF00999", "PF02080", "PF00001"]);
        assert_eq!(table.seqs[0].1[0], Domain { start: 10, end: 391, name: "PF00999".to_string() });

        let len_file = dir.path().join("fam.seqlen.txt");
        make_test_file(&len_file, "S1 500\n# comment\nS3 20\n");
        let lengths = read_seq_lengths(&len_file).unwrap();
        assert_eq!(lengths.len(), 2);

        let mut buf = Vec::new();
        let no_length = write_domain_architectures(&mut buf, &table, &lengths,
                                                   &leaves(&["S1", "S2"])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(no_length, vec!["S2"]);
        assert!(text.contains("S1,500,HH|11|392|#0000ff|PF00999,HH|419|487|#00ff00|PF02080\n"));
        assert!(!text.contains("S3"));
    }

    #[test]
    fn test_bad_domain() {
        let dir = tempdir().unwrap();
        let domain_file = dir.path().join("fam.mdp");
        make_test_file(&domain_file, "S1: PF00999 11\n");
        assert!(read_domains(&domain_file).is_err());
        assert!(read_domains(&dir.path().join("missing.mdp")).is_err());
    }
}
