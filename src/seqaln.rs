// This file contains the code for the topomsa seqaln subcommand, which writes amino acid
// alignments as HTML with the TM helices of their topology alignments highlighted.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use image::Rgb;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::blosum::relationship_char;
use crate::colour::{to_hex, LOOP_IN, LOOP_OUT, TM_IN_TO_OUT, TM_OUT_TO_IN};
use crate::draw::tm_label_style;
use crate::log::{section_header, explanation, warning};
use crate::misc::{file_root, quit_with_error, read_fasta, row_letter};
use crate::topology::{fold_type_from_annotation, tm_index, tm_names_from_annotation, tm_types,
                      TmSegment, GAP, INSIDE, MEMBRANE, OUTSIDE};


#[derive(Debug, Clone)]
pub struct SeqalnSettings {
    pub topo_ext: String,
    pub window: usize,
    pub relation: bool,
    pub rmgap: bool,
    pub break_tm: bool,
    pub clean_plot: bool,
}

impl Default for SeqalnSettings {
    fn default() -> Self {
        SeqalnSettings { topo_ext: "topomsa".to_string(), window: 60, relation: true,
                         rmgap: false, break_tm: false, clean_plot: false }
    }
}


pub fn seqaln(in_aln: Vec<PathBuf>, out_html: PathBuf, out_txt: Option<PathBuf>,
              settings: SeqalnSettings) {
    check_settings(&in_aln, &out_html, &settings);
    starting_message();
    print_settings(&in_aln, &out_html, &out_txt, &settings);
    section_header("Writing alignments");
    explanation("Each sequence alignment is paired with its topology alignment and written with \
                 TM-helix residues in uppercase on the helix colour and loop residues in lowercase \
                 on the loop colour.");
    let names = write_seqaln_files(&in_aln, &out_html, &out_txt, &settings)
        .unwrap_or_else(|e| quit_with_error(&e));
    for name in &names {
        eprintln!("  {}", name);
    }
    eprintln!();
    finished_message(&out_html, &out_txt, names.len());
}


fn check_settings(in_aln: &[PathBuf], out_html: &Path, settings: &SeqalnSettings) {
    if in_aln.is_empty() { quit_with_error("no alignment files given"); }
    if !out_html.extension().is_some_and(|ext| ext == "html") {
        quit_with_error("--out_html must end with .html");
    }
    if settings.window == 0 { quit_with_error("--window must be greater than 0"); }
    if settings.topo_ext.is_empty() { quit_with_error("--topo_ext cannot be empty"); }
}


fn starting_message() {
    section_header("Starting topomsa seqaln");
    explanation("This command writes sequence alignments as HTML, highlighted by the TM regions \
                 of their topology alignments.");
}


fn print_settings(in_aln: &[PathBuf], out_html: &Path, out_txt: &Option<PathBuf>,
                  settings: &SeqalnSettings) {
    eprintln!("Settings:");
    for f in in_aln { eprintln!("  --in_aln {}", f.display()); }
    eprintln!("  --out_html {}", out_html.display());
    if let Some(out_txt) = out_txt { eprintln!("  --out_txt {}", out_txt.display()); }
    eprintln!("  --topo_ext {}", settings.topo_ext);
    eprintln!("  --window {}", settings.window);
    if !settings.relation { eprintln!("  --no_relation"); }
    if settings.rmgap { eprintln!("  --rmgap"); }
    if settings.break_tm { eprintln!("  --break_tm"); }
    if settings.clean_plot { eprintln!("  --clean_plot"); }
    eprintln!();
}


fn finished_message(out_html: &Path, out_txt: &Option<PathBuf>, count: usize) {
    section_header("Finished!");
    eprintln!("Alignments written: {}", count);
    eprintln!("HTML: {}", out_html.display());
    if let Some(out_txt) = out_txt { eprintln!("Text: {}", out_txt.display()); }
    eprintln!();
}


pub fn write_seqaln_files(in_aln: &[PathBuf], out_html: &Path, out_txt: &Option<PathBuf>,
                          settings: &SeqalnSettings) -> Result<Vec<String>, String> {
    // Returns the names of the alignments that were written.
    let create = |path: &Path| {
        File::create(path).map(BufWriter::new)
            .map_err(|e| format!("unable to create {}\n{}", path.display(), e))
    };
    let write_err = |e: std::io::Error| format!("failed to write output\n{}", e);
    let mut html = create(out_html)?;
    let mut txt = match out_txt { Some(path) => Some(create(path)?), None => None };

    write_html_header(&mut html, settings.clean_plot).map_err(write_err)?;
    let mut names = Vec::new();
    for aln_file in in_aln {
        let topo_file = aln_file.with_extension(&settings.topo_ext);
        if !aln_file.is_file() || !topo_file.is_file() {
            for f in [aln_file, &topo_file] {
                if !f.is_file() { warning(&format!("{} does not exist", f.display())); }
            }
            continue;
        }
        let mut aln = match TopoSeqAlignment::load(aln_file, &topo_file) {
            Ok(aln) => aln,
            Err(e) => { warning(&e); continue; }
        };
        if settings.rmgap { aln.remove_unnecessary_gaps(); }
        write_html_alignment(&mut html, &aln, settings).map_err(write_err)?;
        if let Some(txt) = txt.as_mut() {
            write_text_alignment(txt, &aln, settings).map_err(write_err)?;
        }
        names.push(aln.name);
    }
    write_html_tail(&mut html).map_err(write_err)?;
    html.flush().map_err(write_err)?;
    if let Some(mut txt) = txt { txt.flush().map_err(write_err)?; }
    Ok(names)
}


// An amino acid alignment together with its topology alignment, paired by sequence ID.
struct TopoSeqAlignment {
    name: String,
    ids: Vec<String>,
    annotations: Vec<String>,
    seqs: Vec<String>,
    topos: Vec<String>,
}

impl TopoSeqAlignment {
    fn load(aln_file: &Path, topo_file: &Path) -> Result<Self, String> {
        let load = |path: &Path| read_fasta(path)
            .map_err(|e| format!("unable to load {}: {}", path.display(), e));
        let seq_records = load(aln_file)?;
        let topo_records = load(topo_file)?;
        if topo_records.is_empty() {
            return Err(format!("{} contains no sequences", topo_file.display()));
        }
        let mut aln = TopoSeqAlignment { name: file_root(aln_file), ids: Vec::new(),
                                         annotations: Vec::new(), seqs: Vec::new(),
                                         topos: Vec::new() };
        for topo in topo_records {
            let seq = seq_records.iter().find(|r| r.id == topo.id).ok_or_else(|| {
                format!("{} has no sequence for {}", aln_file.display(), topo.id)
            })?;
            if seq.seq.len() != topo.seq.len() {
                return Err(format!("{}: aligned sequence and topology lengths differ ({} vs {})",
                                   topo.id, seq.seq.len(), topo.seq.len()));
            }
            aln.ids.push(topo.id);
            aln.annotations.push(topo.annotation);
            aln.seqs.push(seq.seq.clone());
            aln.topos.push(topo.seq);
        }
        if aln.topos.iter().any(|t| t.len() != aln.topos[0].len()) {
            return Err(format!("sequences in {} are not all the same length", topo_file.display()));
        }
        Ok(aln)
    }

    fn length(&self) -> usize {
        self.topos[0].len()
    }

    fn remove_unnecessary_gaps(&mut self) {
        // Drops columns which are gaps in every sequence and every topology.
        let keep: Vec<usize> = (0..self.length()).filter(|&j| {
            self.topos.iter().chain(&self.seqs).any(|s| s.as_bytes()[j] != GAP)
        }).collect();
        let filter = |s: &String| -> String {
            let bytes = s.as_bytes();
            keep.iter().map(|&j| bytes[j] as char).collect()
        };
        self.topos = self.topos.iter().map(filter).collect();
        self.seqs = self.seqs.iter().map(filter).collect();
    }
}


#[derive(Clone, Copy, PartialEq, Debug)]
enum CellStyle {
    Tm { background: Rgb<u8>, outline: Rgb<u8> },
    Loop { background: Option<Rgb<u8>> },
}


fn cell_styles(aln: &TopoSeqAlignment) -> Vec<Vec<CellStyle>> {
    aln.topos.iter().zip(&aln.annotations).map(|(topo, anno)| {
        let (tm_list, types) = tm_types(topo);
        let tm_names = tm_names_from_annotation(anno);
        let fold_types = fold_type_from_annotation(anno);
        topo.bytes().enumerate().map(|(j, c)| match tm_index(j, &tm_list) {
            Some(k) => {
                let background = match types[k] {
                    MEMBRANE => TM_OUT_TO_IN,
                    b'W'     => TM_IN_TO_OUT,
                    b'R'     => LOOP_IN,
                    _        => LOOP_OUT,
                };
                let outline = tm_label_style(k, &tm_names, &fold_types, 1).outline_colour;
                CellStyle::Tm { background, outline }
            }
            None => CellStyle::Loop { background: match c {
                INSIDE  => Some(LOOP_IN),
                OUTSIDE => Some(LOOP_OUT),
                _       => None,
            }},
        }).collect()
    }).collect()
}


fn line_ranges(length: usize, window: usize, tm_lists: &[Vec<TmSegment>],
               break_tm: bool) -> Vec<(usize, usize)> {
    // Splits the columns into lines of at least `window` columns. Unless break_tm is set, a line
    // only ends where no helix of any sequence continues across the break.
    let mut ranges = Vec::new();
    let mut start = 0;
    for end in 1..=length {
        let full = end - start >= window;
        let splits_helix = !break_tm &&
            tm_lists.iter().flatten().any(|&(b, e)| b < end && end < e);
        if end == length || (full && !splits_helix) {
            ranges.push((start, end));
            start = end;
        }
    }
    ranges
}


fn residue_counts(seq: &str) -> Vec<usize> {
    // Number of residues before each column (plus a final total).
    let mut counts = Vec::with_capacity(seq.len() + 1);
    let mut count = 0;
    counts.push(0);
    for c in seq.bytes() {
        if c != GAP { count += 1; }
        counts.push(count);
    }
    counts
}


fn row_labels(aln: &TopoSeqAlignment, clean_plot: bool) -> (Vec<String>, usize) {
    if clean_plot {
        return ((0..aln.ids.len()).map(row_letter).collect(), 2);
    }
    let width = aln.ids.iter().map(|id| id.len()).max().unwrap_or(0);
    (aln.ids.clone(), width)
}


fn relationship_line(aln: &TopoSeqAlignment, start: usize, end: usize) -> String {
    let (a, b) = (aln.seqs[0].as_bytes(), aln.seqs[1].as_bytes());
    (start..end).map(|j| relationship_char(a[j], b[j])).collect()
}


fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}


fn write_html_header(out: &mut dyn Write, clean_plot: bool) -> std::io::Result<()> {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<body>")?;
    if !clean_plot {
        writeln!(out, "<h2>Alignment highlighted by <font color=red>TM regions</font></h2>")?;
    }
    Ok(())
}


fn write_html_tail(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}


fn html_cells(seq: &[u8], styles: &[CellStyle], start: usize, end: usize,
              clean_plot: bool) -> String {
    // Consecutive columns with the same style share one element.
    let (tm_text, loop_text) = if clean_plot { ("black", "#646464") } else { ("red", "grey") };
    let mut html = String::new();
    let mut j = start;
    while j < end {
        let mut k = j;
        while k < end && styles[k] == styles[j] { k += 1; }
        let residues = String::from_utf8_lossy(&seq[j..k]);
        match styles[j] {
            CellStyle::Tm { background, outline } => html.push_str(&format!(
                "<b><font style=\"background-color:{}; border-style:solid none solid none; \
                 border-color:{}; \" color=\"{}\">{}</font></b>",
                to_hex(background), to_hex(outline), tm_text, residues.to_uppercase())),
            CellStyle::Loop { background } => html.push_str(&format!(
                "<font style=\"background-color:{}\" color=\"{}\">{}</font>",
                background.map_or("none".to_string(), to_hex), loop_text,
                residues.to_lowercase())),
        }
        j = k;
    }
    html
}


fn text_cells(seq: &[u8], styles: &[CellStyle], start: usize, end: usize) -> String {
    (start..end).map(|j| {
        let c = seq[j] as char;
        match styles[j] {
            CellStyle::Tm { .. }   => c.to_ascii_uppercase(),
            CellStyle::Loop { .. } => c.to_ascii_lowercase(),
        }
    }).collect()
}


fn write_html_alignment(out: &mut dyn Write, aln: &TopoSeqAlignment,
                        settings: &SeqalnSettings) -> std::io::Result<()> {
    let styles = cell_styles(aln);
    writeln!(out, "<p>")?;
    if !settings.clean_plot {
        writeln!(out, "<h4>Alignment for {}</h4>", escape_html(&aln.name))?;
    }
    writeln!(out, "<pre>")?;
    write_blocks(out, aln, settings, |i, start, end| {
        html_cells(aln.seqs[i].as_bytes(), &styles[i], start, end, settings.clean_plot)
    }, true)?;
    writeln!(out, "</pre>")?;
    writeln!(out, "</p>")
}


fn write_text_alignment(out: &mut dyn Write, aln: &TopoSeqAlignment,
                        settings: &SeqalnSettings) -> std::io::Result<()> {
    let styles = cell_styles(aln);
    if !settings.clean_plot { writeln!(out, "# {}", aln.name)?; }
    write_blocks(out, aln, settings, |i, start, end| {
        text_cells(aln.seqs[i].as_bytes(), &styles[i], start, end)
    }, false)
}


fn write_blocks<F>(out: &mut dyn Write, aln: &TopoSeqAlignment, settings: &SeqalnSettings,
                   cells: F, html: bool) -> std::io::Result<()>
where F: Fn(usize, usize, usize) -> String {
    // Each block holds one line of every sequence, labelled with its first and last residue
    // numbers. A pairwise alignment gets a relationship line between its two rows.
    let (labels, width) = row_labels(aln, settings.clean_plot);
    let counts: Vec<Vec<usize>> = aln.seqs.iter().map(|s| residue_counts(s)).collect();
    let tm_lists: Vec<Vec<TmSegment>> = aln.topos.iter().map(|t| tm_types(t).0).collect();
    let show_relation = settings.relation && aln.seqs.len() == 2;
    for (start, end) in line_ranges(aln.length(), settings.window, &tm_lists, settings.break_tm) {
        let rows: Vec<String> = (0..aln.seqs.len()).map(|i| {
            let label = format!("{:<width$}", labels[i], width = width);
            let label = if html { escape_html(&label) } else { label };
            format!("{} {:>4} {} {:>4}", label, counts[i][start] + 1, cells(i, start, end),
                    counts[i][end])
        }).collect();
        for (i, row) in rows.iter().enumerate() {
            writeln!(out, "{}", row)?;
            if i == 0 && show_relation {
                writeln!(out, "{:<width$} {:>4} {}", "", "", relationship_line(aln, start, end),
                         width = width)?;
            }
        }
        writeln!(out)?;
        writeln!(out)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::make_test_file;

    fn make_pair(dir: &Path) -> PathBuf {
        let aln = dir.join("fam.aln");
        make_test_file(&aln, ">seqA\nMKLLIVAGT-RE\n>seqB tmname: H1\nMRLIVVAGTQ-E\n");
        make_test_file(&dir.join("fam.topomsa"),
                       ">seqA\niiiMMMMMo-oo\n>seqB tmname: H1\niiiMMMMMoo-o\n");
        aln
    }

    #[test]
    fn test_line_ranges() {
        assert_eq!(line_ranges(10, 4, &[], false), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(line_ranges(10, 4, &[vec![(2, 7)]], false), vec![(0, 7), (7, 10)]);
        assert_eq!(line_ranges(10, 4, &[vec![(2, 7)]], true), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(line_ranges(3, 60, &[], false), vec![(0, 3)]);
        assert!(line_ranges(0, 60, &[], false).is_empty());
    }

    #[test]
    fn test_residue_counts() {
        assert_eq!(residue_counts("A-CD-"), vec![0, 1, 1, 2, 3, 3]);
        assert_eq!(residue_counts(""), vec![0]);
    }

    #[test]
    fn test_html_cells() {
        let styles = vec![CellStyle::Loop { background: Some(LOOP_IN) },
                          CellStyle::Loop { background: Some(LOOP_IN) },
                          CellStyle::Tm { background: TM_OUT_TO_IN, outline: Rgb([0, 0, 0]) },
                          CellStyle::Loop { background: None }];
        let html = html_cells(b"AKLR", &styles, 0, 4, false);
        assert_eq!(html, "<font style=\"background-color:#ffff00\" color=\"grey\">ak</font>\
                          <b><font style=\"background-color:#dcdcdc; border-style:solid none \
                          solid none; border-color:#000000; \" color=\"red\">L</font></b>\
                          <font style=\"background-color:none\" color=\"grey\">r</font>");
        assert_eq!(text_cells(b"akLR", &styles, 1, 4), "kLr");
    }

    #[test]
    fn test_write_seqaln_files() {
        let dir = tempdir().unwrap();
        let aln = make_pair(dir.path());
        let missing = dir.path().join("missing.aln");
        make_test_file(&missing, ">x\nAAA\n");
        let html = dir.path().join("out.html");
        let txt = dir.path().join("out.txt");
        let names = write_seqaln_files(&[aln, missing], &html, &Some(txt.clone()),
                                       &SeqalnSettings::default()).unwrap();
        assert_eq!(names, vec!["fam"]);

        let html = std::fs::read_to_string(&html).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h4>Alignment for fam</h4>"));
        assert!(html.contains("seqA    1 "));
        assert!(html.contains(">LIVAG</font></b>"));
        assert!(html.trim_end().ends_with("</html>"));

        let txt = std::fs::read_to_string(&txt).unwrap();
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "# fam");
        assert_eq!(lines[1], "seqA    1 mklLIVAGt-re   11");
        assert_eq!(lines[2], "          |.|..||||  |");
        assert_eq!(lines[3], "seqB    1 mrlIVVAGtq-e   11");
    }

    #[test]
    fn test_clean_plot_and_rmgap() {
        let dir = tempdir().unwrap();
        let aln = dir.path().join("fam.aln");
        make_test_file(&aln, ">a\nMK-L\n>b\nMR-L\n>c\nM--L\n");
        make_test_file(&dir.path().join("fam.topo"), ">a\nio-M\n>b\nio-M\n>c\ni--M\n");
        let settings = SeqalnSettings { topo_ext: "topo".to_string(), rmgap: true,
                                        clean_plot: true, ..Default::default() };
        let html = dir.path().join("clean.html");
        let txt = dir.path().join("clean.txt");
        write_seqaln_files(&[aln], &html, &Some(txt.clone()), &settings).unwrap();
        let html = std::fs::read_to_string(&html).unwrap();
        assert!(!html.contains("<h2>"));
        assert!(!html.contains("<h4>"));
        let txt = std::fs::read_to_string(&txt).unwrap();
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "A     1 mkL    3");
        assert_eq!(lines[1], "B     1 mrL    3");
        assert_eq!(lines[2], "C     1 m-L    2");
    }

    #[test]
    fn test_mismatched_lengths_are_skipped() {
        let dir = tempdir().unwrap();
        let aln = dir.path().join("bad.aln");
        make_test_file(&aln, ">a\nMKL\n");
        make_test_file(&dir.path().join("bad.topomsa"), ">a\niMMo\n");
        let html = dir.path().join("out.html");
        let names = write_seqaln_files(&[aln], &html, &None, &SeqalnSettings::default()).unwrap();
        assert!(names.is_empty());
    }
}
