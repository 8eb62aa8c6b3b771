// This file contains the code for the topomsa tmplot subcommand, which combines a clean topology
// alignment image and a TM-highlighted sequence alignment into a single PDF figure.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use image::imageops::FilterType;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::canvas::{Fonts, ImageFormat};
use crate::draw::{draw_topology_msa, DrawSettings};
use crate::log::{section_header, explanation};
use crate::misc::{check_if_file_exists, check_requirements, create_dir, file_root,
                  program_available, quit_with_error, read_fasta, row_letter, run_command};
use crate::seqaln::{write_seqaln_files, SeqalnSettings};


static TOOLS: [&str; 3] = ["wkhtmltopdf", "pdfcrop", "pdflatex"];


#[derive(Debug, Clone)]
pub struct TmplotSettings {
    pub resize: u32,
    pub window: usize,
    pub h2w_ratio: f64,
    pub break_tm: bool,
}

impl Default for TmplotSettings {
    fn default() -> Self {
        TmplotSettings { resize: 5000, window: 100, h2w_ratio: 0.08, break_tm: false }
    }
}


pub fn tmplot(seq_aln: PathBuf, topo_aln: PathBuf, out_dir: PathBuf, settings: TmplotSettings) {
    check_settings(&seq_aln, &topo_aln, &settings);
    starting_message();
    print_settings(&seq_aln, &topo_aln, &out_dir, &settings);
    create_dir(&out_dir);

    let temp_dir = tempfile::Builder::new().prefix("topomsa_tmplot_").tempdir()
        .unwrap_or_else(|e| quit_with_error(&format!("could not create temp dir: {e}")));
    match make_tmplot(&seq_aln, &topo_aln, &out_dir, temp_dir.path(), &settings) {
        Ok(out_file) => finished_message(&out_file),
        Err(e) => {
            let kept = temp_dir.keep();
            quit_with_error(&format!("{}\ntemporary files kept in {}", e, kept.display()));
        }
    }
}


fn check_settings(seq_aln: &Path, topo_aln: &Path, settings: &TmplotSettings) {
    check_if_file_exists(seq_aln);
    check_if_file_exists(topo_aln);
    check_requirements(&TOOLS);
    if settings.resize == 0 { quit_with_error("--resize must be greater than 0"); }
    if settings.window == 0 { quit_with_error("--window must be greater than 0"); }
    if settings.h2w_ratio <= 0.0 { quit_with_error("--h2w_ratio must be greater than 0"); }
}


fn starting_message() {
    section_header("Starting topomsa tmplot");
    explanation("This command makes a single PDF figure for a family: a clean topology alignment \
                 image above the sequence alignment with its TM regions highlighted.");
}


fn print_settings(seq_aln: &Path, topo_aln: &Path, out_dir: &Path, settings: &TmplotSettings) {
    eprintln!("Settings:");
    eprintln!("  --seq_aln {}", seq_aln.display());
    eprintln!("  --topo_aln {}", topo_aln.display());
    eprintln!("  --out_dir {}", out_dir.display());
    eprintln!("  --resize {}", settings.resize);
    eprintln!("  --window {}", settings.window);
    eprintln!("  --h2w_ratio {}", settings.h2w_ratio);
    if settings.break_tm { eprintln!("  --break_tm"); }
    eprintln!();
}


fn finished_message(out_file: &Path) {
    section_header("Finished!");
    eprintln!("Figure: {}", out_file.display());
    eprintln!();
}


fn make_tmplot(seq_aln: &Path, topo_aln: &Path, out_dir: &Path, temp_dir: &Path,
               settings: &TmplotSettings) -> Result<PathBuf, String> {
    let root = file_root(seq_aln);
    let topo_ext = topo_aln.extension().map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty() && e != "aln")
        .unwrap_or_else(|| "topomsa".to_string());

    // Both alignments are copied in under the same stem so seqaln can pair them.
    let temp_seq = temp_dir.join(format!("{root}.aln"));
    let temp_topo = temp_dir.join(format!("{root}.{topo_ext}"));
    copy(seq_aln, &temp_seq)?;
    copy(topo_aln, &temp_topo)?;

    section_header("Drawing topology alignment");
    let fonts = Fonts::load()?;
    let topo_png = temp_dir.join(format!("{root}.png"));
    let metrics = draw_topology_msa(&temp_topo, &topo_png, &draw_settings(settings), &fonts)?;
    eprintln!("{}: {} sequences, {}x{} px", topo_png.display(), metrics.sequence_count,
              metrics.image_width, metrics.image_height);
    let resized_png = temp_dir.join(format!("{root}.s{}.png", settings.resize));
    resize_image(&topo_png, &resized_png, settings.resize)?;
    eprintln!("resized to {} px wide", settings.resize);
    eprintln!();

    section_header("Writing sequence alignment");
    let seqaln_html = temp_dir.join(format!("{root}.seqaln.html"));
    let seqaln_settings = SeqalnSettings { topo_ext: topo_ext.clone(), window: settings.window,
                                           relation: true, rmgap: true,
                                           break_tm: settings.break_tm, clean_plot: true };
    let written = write_seqaln_files(&[temp_seq], &seqaln_html, &None, &seqaln_settings)?;
    if written.is_empty() {
        return Err(format!("could not pair {} with {}", seq_aln.display(), topo_aln.display()));
    }
    let seqaln_pdf = temp_dir.join(format!("{root}.seqaln.pdf"));
    html_to_pdf(&seqaln_html, &seqaln_pdf)?;
    let seqaln_crop = crop_pdf(&seqaln_pdf)?;
    eprintln!("{}", seqaln_crop.display());
    eprintln!();

    section_header("Merging figures");
    let ids: Vec<String> = read_fasta(&temp_topo)
        .map_err(|e| format!("unable to load {}\n{}", topo_aln.display(), e))?
        .into_iter().map(|r| r.id).collect();
    let tex_name = format!("{root}.seqtopaln.tex");
    let tex_file = temp_dir.join(&tex_name);
    fs::write(&tex_file, merge_document(&root, &resized_png, &seqaln_crop, &ids))
        .map_err(|e| format!("failed to write {}: {e}", tex_file.display()))?;
    run_command("pdflatex", &["-interaction=nonstopmode", "-halt-on-error", tex_name.as_str()],
                Some(temp_dir))?;
    let merged = crop_pdf(&tex_file.with_extension("pdf"))?;
    let out_file = out_dir.join(format!("{root}.seqtopaln.pdf"));
    copy(&merged, &out_file)?;
    eprintln!();
    Ok(out_file)
}


fn draw_settings(settings: &TmplotSettings) -> DrawSettings {
    DrawSettings {
        format: ImageFormat::Png,
        h2w_ratio: Some(settings.h2w_ratio),
        text: false,
        separators: false,
        shrink: None,
        tag_column: true,
        show_tm_index: true,
        show_gap: true,
        clean_plot: true,
        ..Default::default()
    }
}


fn resize_image(in_png: &Path, out_png: &Path, width: u32) -> Result<(), String> {
    // Scales to the given width, keeping the aspect ratio.
    let img = image::open(in_png).map_err(|e| format!("unable to read {}: {e}", in_png.display()))?;
    let resized = img.resize(width, u32::MAX, FilterType::Lanczos3);
    resized.save(out_png).map_err(|e| format!("unable to write {}: {e}", out_png.display()))
}


fn html_to_pdf(html: &Path, pdf: &Path) -> Result<(), String> {
    // wkhtmltopdf needs an X display, so a virtual one is used when none is available.
    let has_display = env::var_os("DISPLAY").is_some_and(|d| !d.is_empty());
    let html = html.to_string_lossy();
    let pdf = pdf.to_string_lossy();
    if !has_display && program_available("xvfb-run") {
        run_command("xvfb-run", &["-a", "wkhtmltopdf", &*html, &*pdf], None)
    } else {
        run_command("wkhtmltopdf", &[&*html, &*pdf], None)
    }
}


fn crop_pdf(pdf: &Path) -> Result<PathBuf, String> {
    // pdfcrop writes <stem>-crop.pdf next to its input.
    let cropped = pdf.with_file_name(format!("{}-crop.pdf", file_root(pdf)));
    run_command("pdfcrop", &[pdf, cropped.as_path()], None)?;
    if !cropped.is_file() {
        return Err(format!("pdfcrop did not create {}", cropped.display()));
    }
    Ok(cropped)
}


fn copy(from: &Path, to: &Path) -> Result<(), String> {
    fs::copy(from, to).map(|_| ())
        .map_err(|e| format!("could not copy {} to {}: {e}", from.display(), to.display()))
}


fn merge_document(root: &str, topo_png: &Path, seqaln_pdf: &Path, ids: &[String]) -> String {
    // The topology image goes above the sequence alignment, followed by a caption which names
    // each row letter used in the clean plots.
    let mut tex = String::new();
    tex.push_str("\\documentclass[a4paper]{article}\n");
    tex.push_str("\\usepackage[margin=1cm]{geometry}\n");
    tex.push_str("\\usepackage{graphicx}\n");
    tex.push_str("\\pagestyle{empty}\n");
    tex.push_str("\\begin{document}\n");
    tex.push_str("\\begin{center}\n");
    tex.push_str(&format!("\\includegraphics[width=\\textwidth]{{{}}}\\\\[1em]\n",
                          tex_path(topo_png)));
    tex.push_str(&format!("\\includegraphics[width=\\textwidth]{{{}}}\n", tex_path(seqaln_pdf)));
    tex.push_str("\\end{center}\n");
    tex.push_str(&format!("\\noindent\\textbf{{{}}}\\\\\n", latex_escape(root)));
    for (i, id) in ids.iter().enumerate() {
        tex.push_str(&format!("{}: {}\\\\\n", row_letter(i), latex_escape(id)));
    }
    tex.push_str("\\end{document}\n");
    tex
}


fn tex_path(path: &Path) -> String {
    // Only the file name is used since pdflatex runs in the same directory. Braces guard against
    // extra dots in the name.
    let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{{{stem}}}.{ext}"),
        None              => name,
    }
}


fn latex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => { escaped.push('\\'); escaped.push(c); }
            '~' => escaped.push_str("\\textasciitilde{}"),
            '^' => escaped.push_str("\\textasciicircum{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}
