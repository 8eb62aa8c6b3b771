// This file contains miscellaneous functions used by various parts of TopoMSA.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use indicatif::{ProgressBar, ProgressStyle};
use flate2::read::GzDecoder;
use std::fs::{File, create_dir_all};
use std::io;
use std::ffi::OsStr;
use std::io::{prelude::*, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use which::which;


#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    pub id: String,
    pub annotation: String,
    pub seq: String,
}

impl FastaRecord {
    pub fn new(annotation: &str, seq: &str) -> Self {
        FastaRecord {
            id: seq_id_from_annotation(annotation),
            annotation: annotation.to_string(),
            seq: seq.to_string(),
        }
    }
}


pub fn create_dir(dir_path: &Path) {
    match create_dir_all(dir_path) {
        Ok(_) => {},
        Err(e) => quit_with_error(&format!("failed to create directory {}\n{}", dir_path.display(), e)),
    }
}


pub fn load_file_lines(filename: &Path) -> Vec<String> {
    let file = File::open(filename).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to open file {}\n{}", filename.display(), e));
    });
    let reader = BufReader::new(file);
    reader.lines().map(|line_result| {
        line_result.unwrap_or_else(|e| {
            quit_with_error(&format!("failed to read line\n{}", e));
        })
    }).collect()
}


pub fn load_id_list(filename: &Path) -> Vec<String> {
    // One ID per line, blank lines and '#' comments ignored.
    load_file_lines(filename).into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}


pub fn check_if_file_exists(filename: &Path) {
    // Quits with an error if the given path is not an existing file.
    if !filename.exists() {
        quit_with_error(&format!("file does not exist: {}", filename.display()));
    }
    if !filename.is_file() {
        quit_with_error(&format!("{} is not a file", filename.display()));
    }
}


pub fn check_if_dir_exists(dir: &Path) {
    // Quits with an error if the given path is not an existing directory.
    if !dir.exists() {
        quit_with_error(&format!("directory does not exist: {}", dir.display()));
    }
    if !dir.is_dir() {
        quit_with_error(&format!("{} is not a directory", dir.display()));
    }
}


pub fn check_requirements(reqs: &[&str]) {
    for cmd in reqs {
        if which(cmd).is_err() {
            quit_with_error(&format!("required program '{cmd}' not found in $PATH"));
        }
    }
}


pub fn program_available(cmd: &str) -> bool {
    which(cmd).is_ok()
}


pub fn run_command<S: AsRef<OsStr>>(program: &str, args: &[S],
                                    dir: Option<&Path>) -> Result<(), String> {
    // Runs an external tool to completion, returning its stderr in the error if it fails.
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir { cmd.current_dir(dir); }
    let output = cmd.output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            format!("required program '{program}' not found in $PATH")
        } else {
            format!("could not run {program}: {e}")
        }
    })?;
    if !output.status.success() {
        let args: Vec<_> = args.iter().map(|a| a.as_ref().to_string_lossy()).collect();
        return Err(format!("{} {} failed ({})\n{}", program, args.join(" "), output.status,
                           String::from_utf8_lossy(&output.stderr).trim()));
    }
    Ok(())
}


#[cfg(not(test))]
pub fn quit_with_error(text: &str) -> ! {
    // For friendly error messages, this function normally just prints the error and quits.
    eprintln!();
    eprintln!("Error: {}", text);
    std::process::exit(1);
}
#[cfg(test)]
pub fn quit_with_error(text: &str) -> ! {
    // But when running unit tests, this function instead panics so I can catch it for the test.
    panic!("{}", text);
}


pub fn seq_id_from_annotation(line: &str) -> String {
    // Sequence IDs come from the first word of a header line. Database-style IDs (e.g.
    // sp|P12345|NAME) give the accession and UniRef IDs lose their cluster prefix.
    let line = line.trim_start_matches('>');
    let first_word = line.split_whitespace().next().unwrap_or("");
    let mut seq_id = if first_word.contains('|') {
        let fields: Vec<&str> = first_word.split('|').collect();
        if ["sp", "lcl", "tr", "gi", "r", "p"].contains(&fields[0]) && fields.len() > 1 {
            fields[1].to_string()
        } else {
            fields[0].to_string()
        }
    } else {
        first_word.to_string()
    };
    seq_id = seq_id.trim_end_matches(',').to_string();
    if seq_id.contains("UniRef") {
        if let Some((_, rest)) = seq_id.split_once('_') {
            seq_id = rest.to_string();
        }
    }
    seq_id
}


pub fn load_fasta(filename: &Path) -> Vec<FastaRecord> {
    // Loads a FASTA file (topology alignments are FASTA too), quitting with an error if it can't
    // be read or contains no sequences. Unlike DNA loaders, case is preserved.
    let records = match read_fasta(filename) {
        Ok(records) => records,
        Err(e) => quit_with_error(&format!("unable to load {}\n{}", filename.display(), e)),
    };
    if records.is_empty() {
        quit_with_error(&format!("{} contains no sequences", filename.display()));
    }
    records
}


pub fn read_fasta(filename: &Path) -> io::Result<Vec<FastaRecord>> {
    let file = File::open(filename)?;
    let reader: Box<dyn Read> = if is_file_gzipped(filename)? { Box::new(GzDecoder::new(file)) }
                                                          else { Box::new(file) };
    let mut records = Vec::new();
    let mut annotation: Option<String> = None;
    let mut sequence = String::new();
    for line in BufReader::new(reader).lines() {
        let text = line?;
        let text = text.trim_end();
        if text.is_empty() { continue; }
        if let Some(header) = text.strip_prefix('>') {
            if let Some(anno) = annotation.take() {
                records.push(FastaRecord::new(&anno, &sequence));
                sequence.clear();
            }
            annotation = Some(header.to_string());
        } else {
            if annotation.is_none() {
                return Err(io::Error::new(io::ErrorKind::InvalidData,
                                          "sequence line found before the first header"));
            }
            sequence.extend(text.chars().filter(|c| !c.is_whitespace()));
        }
    }
    if let Some(anno) = annotation {
        records.push(FastaRecord::new(&anno, &sequence));
    }
    Ok(records)
}


fn is_file_gzipped(filename: &Path) -> io::Result<bool> {
    // Gzipped files are recognised by their first two bytes. Files shorter than two bytes are
    // treated as plain text.
    let mut reader = BufReader::new(File::open(filename)?);
    let mut buf = vec![0u8; 2];
    match reader.read_exact(&mut buf) {
        Ok(_)  => Ok(buf[0] == 31 && buf[1] == 139),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


pub fn write_fasta(records: &[FastaRecord], out: &mut dyn Write) -> io::Result<()> {
    for record in records {
        writeln!(out, ">{}", record.annotation)?;
        writeln!(out, "{}", record.seq)?;
    }
    Ok(())
}


pub fn output_writer(out_file: &Option<PathBuf>) -> Box<dyn Write> {
    // Writes to the given file, or to stdout when no file is given.
    match out_file {
        Some(path) => {
            let file = File::create(path).unwrap_or_else(|e| {
                quit_with_error(&format!("unable to create {}\n{}", path.display(), e));
            });
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    }
}


pub fn file_root(path: &Path) -> String {
    // The file name without directory and without its last extension.
    path.file_stem().unwrap_or_default().to_string_lossy().to_string()
}


pub fn file_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}


pub fn format_float(num: f64) -> String {
    // Formats a float with up to six decimal places but then drops trailing zeros.
    let mut formatted = format!("{:.6}", num);
    if !formatted.contains('.') { return formatted }
    while formatted.ends_with('0') { formatted.pop(); }
    if formatted.ends_with('.') { formatted.pop(); }
    formatted
}


pub fn row_letter(idx: usize) -> String {
    // Clean plots label rows A, B, C, ... and fall back to numbers after Z.
    if idx < 26 { ((b'A' + idx as u8) as char).to_string() } else { (idx + 1).to_string() }
}


pub fn spinner(message: &str) -> ProgressBar {
    if cfg!(test) {
        ProgressBar::hidden() // don't show a spinner during unit tests
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])  // dots3 from github.com/sindresorhus/cli-spinners
                .template("{spinner} {msg}").unwrap(),
        );
        pb.set_message(message.to_string());
        pb
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::{make_test_file, make_gzipped_test_file};

    #[test]
    fn test_seq_id_from_annotation() {
        assert_eq!(seq_id_from_annotation(">Q9X123 some protein"), "Q9X123");
        assert_eq!(seq_id_from_annotation(">sp|P12345|ABC_HUMAN desc"), "P12345");
        assert_eq!(seq_id_from_annotation(">tr|A0A000|X"), "A0A000");
        assert_eq!(seq_id_from_annotation(">ABC|def|ghi"), "ABC");
        assert_eq!(seq_id_from_annotation(">seq1, nTM=3"), "seq1");
        assert_eq!(seq_id_from_annotation(">UniRef90_Q8ZB72 cluster"), "Q8ZB72");
        assert_eq!(seq_id_from_annotation("rep_1"), "rep_1");
        assert_eq!(seq_id_from_annotation(">"), "");
    }

    #[test]
    fn test_read_fasta() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("a.topomsa");
        make_test_file(&path, ">seq1 nTM=1\niiiMMMM\nMooo\n\n>sp|P1|X\n--iMM MMoo\n");
        let records = read_fasta(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "seq1");
        assert_eq!(records[0].annotation, "seq1 nTM=1");
        assert_eq!(records[0].seq, "iiiMMMMMooo");
        assert_eq!(records[1].id, "P1");
        assert_eq!(records[1].seq, "--iMMMMoo");
    }

    #[test]
    fn test_read_fasta_gzipped() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("a.topomsa.gz");
        make_gzipped_test_file(&path, ">a\nioM\n>b\nMoi\n");
        let records = read_fasta(&path).unwrap();
        assert_eq!(records.iter().map(|r| r.seq.as_str()).collect::<Vec<_>>(), vec!["ioM", "Moi"]);
    }

    #[test]
    fn test_read_fasta_bad_format() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.fa");
        make_test_file(&path, "ACGT\n>a\nACGT\n");
        assert!(read_fasta(&path).is_err());
    }

    #[test]
    #[should_panic]
    fn test_load_fasta_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("empty.fa");
        make_test_file(&path, "");
        load_fasta(&path);
    }

    #[test]
    fn test_file_root() {
        assert_eq!(file_root(Path::new("/a/b/PF00001.topomsa")), "PF00001");
        assert_eq!(file_root(Path::new("x.sorted.fa")), "x.sorted");
        assert_eq!(file_dir(Path::new("x.fa")), PathBuf::from("."));
        assert_eq!(file_dir(Path::new("/a/x.fa")), PathBuf::from("/a"));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(0.1111111), "0.111111");
        assert_eq!(format_float(10.0), "10");
    }

    #[test]
    fn test_run_command() {
        assert!(run_command("true", &[] as &[&str], None).is_ok());
        assert!(run_command("false", &[] as &[&str], None).is_err());
        let err = run_command("not_a_real_program_xyz", &["a"], None).unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_row_letter() {
        assert_eq!(row_letter(0), "A");
        assert_eq!(row_letter(25), "Z");
        assert_eq!(row_letter(26), "27");
    }
}
