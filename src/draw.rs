// This file contains the code for the topomsa draw subcommand, which renders a topology alignment
// as an image: TM-helix boxes for the special (representative, PDB and final) topologies, a scale
// bar, one coloured row per sequence, and optional DG-profile and %M histogram panels.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use image::Rgb;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::canvas::{new_canvas, Canvas, FontSpec, Fonts, ImageFormat};
use crate::colour::{gradient, BLACK, BLUE, GREEN, GREY, LOOP_IN, LOOP_OUT, MSA_IN_TO_OUT,
                    MSA_LOOP_IN, MSA_LOOP_OUT, MSA_OUT_TO_IN, MSA_SIGNAL_PEPTIDE, RED,
                    TM_IN_TO_OUT, TM_OUT_TO_IN, VIOLET, WHITE};
use crate::dgprofile::{find_dg_profile_file, match_to_alignment, profile_for, read_dg_profiles,
                       DgProfile};
use crate::log::{section_header, explanation, warning};
use crate::metrics::DrawMetrics;
use crate::misc::{check_if_file_exists, create_dir, file_dir, file_root, format_float,
                  load_id_list, quit_with_error, read_fasta, row_letter};
use crate::shrink::{shrink, ShrinkMethod, ShrinkSettings};
use crate::topology::{annotation_draw_width, cluster_number, count_tm, fold_type_from_annotation,
                      gap_runs, io_state_downstream, io_state_upstream, is_within_tm, nterm_state,
                      remove_unnecessary_gaps, seq_tag, tm_names_from_annotation, tm_positions,
                      tm_types, verify_terminal_status, SpecialProteins, StateFractions,
                      TmSegment, GAP, INSIDE, MEMBRANE, OUTSIDE, SIGNAL_PEPTIDE};


static HEIGHT_TM_BOX: f64 = 3.0;           // TM boxes are this many TM-font lines tall
static ANNO_SEQ_INTERVAL: i32 = 4;         // TM-font columns between annotation and alignment
static MARGIN_X: f64 = 20.0;
static MARGIN_Y: f64 = 50.0;
static MAX_ANNOTATION_WIDTH: usize = 30;
static CLEAN_PLOT_ANNOTATION_WIDTH: usize = 4;
static MAX_AUTOSIZE_ITERATIONS: usize = 300;
static DG_LABEL: &str = "ΔG (kcal/mol)";
static HISTOGRAM_LABEL: &str = "% state M";
static HISTOGRAM_TICKS: [u32; 3] = [0, 50, 100];

static CLUSTER_COLOURS: [Rgb<u8>; 10] = [
    Rgb([0, 128, 0]),     Rgb([35, 156, 35]),   Rgb([53, 168, 53]),   Rgb([83, 185, 83]),
    Rgb([108, 198, 108]), Rgb([132, 208, 132]), Rgb([165, 222, 165]), Rgb([206, 238, 206]),
    Rgb([226, 245, 226]), Rgb([245, 252, 245])];
static FOLD_GROUP_COLOURS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]), Rgb([0, 0, 255]), Rgb([0, 128, 0]), Rgb([255, 140, 0]), Rgb([128, 0, 128]),
    Rgb([0, 139, 139])];


#[derive(Debug, Clone)]
pub struct DrawSettings {
    pub out_dir: Option<PathBuf>,
    pub format: ImageFormat,
    pub font_size: u32,
    pub image_scale: Option<f64>,
    pub h2w_ratio: Option<f64>,
    pub max_image_size: u64,
    pub autosize: bool,
    pub text: bool,
    pub separators: bool,
    pub msa: bool,
    pub scale_bar: bool,
    pub histogram: bool,
    pub dg_profile: bool,
    pub dg_legend: bool,
    pub tag_column: bool,
    pub dgp_file: Option<PathBuf>,
    pub aa_path: Option<PathBuf>,
    pub aa_seq: Option<PathBuf>,
    pub shrink: Option<ShrinkSettings>,
    pub kr_bias: bool,
    pub max_dist_kr: usize,
    pub color_tm_box: bool,
    pub color_kingdom: bool,
    pub show_tm_index: bool,
    pub show_gap: bool,
    pub clean_plot: bool,
}

impl Default for DrawSettings {
    fn default() -> Self {
        DrawSettings {
            out_dir: None,
            format: ImageFormat::Png,
            font_size: 16,
            image_scale: None,
            h2w_ratio: None,
            max_image_size: 50 * 1024 * 1024,
            autosize: true,
            text: true,
            separators: true,
            msa: true,
            scale_bar: true,
            histogram: true,
            dg_profile: false,
            dg_legend: false,
            tag_column: false,
            dgp_file: None,
            aa_path: None,
            aa_seq: None,
            shrink: Some(ShrinkSettings { method: ShrinkMethod::Loops, rate_tm: 2.0,
                                          max_hold_loop: 12 }),
            kr_bias: false,
            max_dist_kr: 12,
            color_tm_box: false,
            color_kingdom: false,
            show_tm_index: false,
            show_gap: false,
            clean_plot: false,
        }
    }
}


pub fn draw(in_msa: Vec<PathBuf>, in_list: Option<PathBuf>, settings: DrawSettings) {
    let in_files = gather_input_files(in_msa, &in_list);
    check_settings(&in_files, &settings);
    starting_message();
    print_settings(&in_files, &in_list, &settings);
    let fonts = Fonts::load().unwrap_or_else(|e| quit_with_error(&e));
    if let Some(out_dir) = &settings.out_dir {
        create_dir(out_dir);
    }
    section_header("Drawing topology alignments");
    explanation("Each topology alignment is now drawn to an image, with a YAML file of metrics \
                 saved alongside it.");
    let mut out_files = Vec::new();
    for in_file in &in_files {
        let out_file = output_filename(in_file, &settings);
        let metrics = draw_topology_msa(in_file, &out_file, &settings, &fonts)
            .unwrap_or_else(|e| quit_with_error(&e));
        eprintln!("  {}: {} sequences, {}x{} px, font size {}{}", in_file.display(),
                  metrics.sequence_count, metrics.image_width, metrics.image_height,
                  metrics.font_size, if metrics.text_drawn { "" } else { " (no text)" });
        metrics.save_to_yaml(&out_file.with_extension("yaml"));
        out_files.push(out_file);
    }
    eprintln!();
    finished_message(&out_files);
}


fn gather_input_files(mut in_msa: Vec<PathBuf>, in_list: &Option<PathBuf>) -> Vec<PathBuf> {
    if let Some(list) = in_list {
        check_if_file_exists(list);
        in_msa.extend(load_id_list(list).into_iter().map(PathBuf::from));
    }
    in_msa
}


fn check_settings(in_files: &[PathBuf], settings: &DrawSettings) {
    if in_files.is_empty() { quit_with_error("no input files given (use --in_msa or --in_list)"); }
    for f in in_files { check_if_file_exists(f); }
    if settings.font_size == 0 { quit_with_error("--font_size must be greater than 0"); }
    if settings.max_image_size == 0 { quit_with_error("--max_image_size must be greater than 0"); }
    if let Some(scale) = settings.image_scale {
        if scale <= 0.0 { quit_with_error("--image_scale must be greater than 0"); }
    }
    if let Some(ratio) = settings.h2w_ratio {
        if ratio <= 0.0 { quit_with_error("--h2w_ratio must be greater than 0"); }
    }
    if let Some(shrink) = &settings.shrink {
        if shrink.rate_tm <= 0.0 { quit_with_error("--shrink_rate_tm must be greater than 0"); }
        if shrink.max_hold_loop < 2 { quit_with_error("--max_hold_loop must be at least 2"); }
    }
    if let Some(aa_seq) = &settings.aa_seq { check_if_file_exists(aa_seq); }
    if let Some(dgp_file) = &settings.dgp_file { check_if_file_exists(dgp_file); }
}


fn starting_message() {
    section_header("Starting topomsa draw");
    explanation("This command draws topology alignments (FASTA files where every residue is \
                 labelled i, o, M, S or -) as images, with TM-helix boxes for representative, PDB \
                 and final topologies.");
}


fn print_settings(in_files: &[PathBuf], in_list: &Option<PathBuf>, settings: &DrawSettings) {
    eprintln!("Settings:");
    match in_list {
        Some(list) => eprintln!("  --in_list {} ({} files)", list.display(), in_files.len()),
        None       => { for f in in_files { eprintln!("  --in_msa {}", f.display()); } }
    }
    if let Some(out_dir) = &settings.out_dir { eprintln!("  --out_dir {}", out_dir.display()); }
    eprintln!("  --format {}", settings.format);
    eprintln!("  --font_size {}", settings.font_size);
    match settings.image_scale {
        Some(scale) => eprintln!("  --image_scale {}", format_float(scale)),
        None        => eprintln!("  --image_scale auto"),
    }
    if let Some(ratio) = settings.h2w_ratio { eprintln!("  --h2w_ratio {}", format_float(ratio)); }
    eprintln!("  --max_image_size {}", settings.max_image_size);
    match &settings.shrink {
        Some(shrink) => {
            eprintln!("  --shrink_method {}", shrink.method);
            if shrink.method == ShrinkMethod::Proportional {
                eprintln!("  --shrink_rate_tm {}", format_float(shrink.rate_tm));
                eprintln!("  --max_hold_loop {}", shrink.max_hold_loop);
            }
        }
        None => eprintln!("  --no_shrink"),
    }
    if let Some(aa_seq) = &settings.aa_seq { eprintln!("  --aa_seq {}", aa_seq.display()); }
    if let Some(aa_path) = &settings.aa_path { eprintln!("  --aa_path {}", aa_path.display()); }
    if let Some(dgp_file) = &settings.dgp_file { eprintln!("  --dgp_file {}", dgp_file.display()); }
    if settings.kr_bias { eprintln!("  --kr_bias (--max_dist_kr {})", settings.max_dist_kr); }
    let flags = [(!settings.autosize, "--no_autosize"), (!settings.text, "--no_text"),
                 (!settings.separators, "--no_separators"), (!settings.msa, "--no_msa"),
                 (!settings.scale_bar, "--no_scale_bar"), (!settings.histogram, "--no_histogram"),
                 (settings.dg_profile, "--dg_profile"), (settings.dg_legend, "--dg_legend"),
                 (settings.tag_column, "--tag_column"), (settings.color_tm_box, "--color_tm_box"),
                 (settings.color_kingdom, "--color_kingdom"),
                 (settings.show_tm_index, "--show_tm_index"), (settings.show_gap, "--show_gap"),
                 (settings.clean_plot, "--clean_plot")];
    for (set, flag) in flags {
        if set { eprintln!("  {}", flag); }
    }
    eprintln!();
}


fn finished_message(out_files: &[PathBuf]) {
    section_header("Finished!");
    eprintln!("Topology images:");
    for f in out_files { eprintln!("  {}", f.display()); }
    eprintln!();
}


pub fn output_filename(in_file: &Path, settings: &DrawSettings) -> PathBuf {
    let dir = settings.out_dir.clone().unwrap_or_else(|| file_dir(in_file));
    let kr = if settings.kr_bias { ".krbias" } else { "" };
    dir.join(format!("{}{}.{}", file_root(in_file), kr, settings.format.extension()))
}


pub fn draw_topology_msa(in_file: &Path, out_file: &Path, settings: &DrawSettings,
                         fonts: &Fonts) -> Result<DrawMetrics, String> {
    let aln = TopoAlignment::load(in_file, settings)?;
    let layout = Layout::new(&aln, settings, fonts, in_file);
    let dg_profiles = if settings.dg_profile { load_dg_profiles(in_file, &aln, settings)? }
                                        else { Vec::new() };
    let mut canvas = new_canvas(settings.format, layout.width as u32, layout.height as u32, fonts);
    render(canvas.as_mut(), &aln, &layout, settings, fonts, &dg_profiles);
    canvas.save(out_file)?;
    Ok(draw_metrics(in_file, out_file, &aln, &layout, dg_profiles.len()))
}


// A topology alignment prepared for drawing.
struct TopoAlignment {
    stem: String,
    ids: Vec<String>,
    annotations: Vec<String>,
    tags: Vec<String>,
    aligned_topos: Vec<String>,     // all-gap columns removed, otherwise as loaded
    topos: Vec<String>,             // terminal states added, then shrunk
    tm_lists: Vec<Vec<TmSegment>>,  // TM segments of the drawn topologies
    shrink_map: Vec<usize>,         // drawn column -> aligned column, empty if not shrunk
    residues: Vec<Option<String>>,  // amino acids at the drawn columns
    special: SpecialProteins,
    tm_box_rows: Vec<usize>,        // rows drawn as TM boxes above the alignment
    tm_names: Vec<Vec<String>>,
    fold_types: Vec<Vec<String>>,
}

impl TopoAlignment {
    fn load(in_file: &Path, settings: &DrawSettings) -> Result<Self, String> {
        let records = read_fasta(in_file)
            .map_err(|e| format!("unable to load {}\n{}", in_file.display(), e))?;
        if records.is_empty() {
            return Err(format!("{} contains no sequences", in_file.display()));
        }
        let length = records[0].seq.len();
        if records.iter().any(|r| r.seq.len() != length) {
            return Err(format!("sequences in {} are not all the same length", in_file.display()));
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let annotations: Vec<String> = records.iter().map(|r| r.annotation.clone()).collect();
        let raw_topos: Vec<String> = records.into_iter().map(|r| r.seq).collect();
        let aligned_topos = remove_unnecessary_gaps(&raw_topos);
        let aligned_length = aligned_topos[0].len();
        let n = ids.len();

        let mut special = SpecialProteins::from_ids(&ids);
        if special.is_empty() {
            if settings.clean_plot { special.final_topology = (0..n).collect(); }
                              else { special.representative = vec![0]; }
        }
        let tm_box_rows = if special.final_topology.len() == special.all().len() { vec![] }
                          else if !special.representative.is_empty() { special.representative.clone() }
                          else { vec![0] };
        let tm_names: Vec<Vec<String>> = (0..n).map(|i| if special.contains(i) { tm_names_from_annotation(&annotations[i]) }
                                      else { Vec::new() }).collect();
        let fold_types: Vec<Vec<String>> = (0..n).map(|i| if special.contains(i) { fold_type_from_annotation(&annotations[i]) }
                                        else { Vec::new() }).collect();

        let aligned_tm_lists: Vec<Vec<TmSegment>> = aligned_topos.iter().map(|t| tm_positions(t)).collect();
        let mut topos = aligned_topos.clone();
        verify_terminal_status(&mut topos, &aligned_tm_lists);

        let residue_seqs = load_residue_seqs(in_file, settings)?;
        let aligned_residues: Vec<Option<String>> = ids.iter().zip(&aligned_topos).map(|(id, topo)| {
            let seq = residue_seqs.get(id)?;
            let aligned = align_residues(seq, topo);
            if aligned.is_none() {
                warning(&format!("{}: amino acid sequence length does not match topology", id));
            }
            aligned
        }).collect();

        let shrink_map = match &settings.shrink {
            Some(shrink_settings) => {
                let kr_seqs: Option<Vec<String>> = settings.kr_bias.then(|| {
                    aligned_residues.iter()
                        .map(|r| r.clone().unwrap_or_else(|| "-".repeat(aligned_length))).collect()
                });
                shrink(&mut topos, shrink_settings, kr_seqs.as_deref())
            }
            None => Vec::new(),
        };
        let residues: Vec<Option<String>> = aligned_residues.iter().zip(&aligned_tm_lists).map(|(r, tm_list)| {
            r.as_ref().map(|aligned| drawn_residues(aligned, &shrink_map, tm_list, settings))
        }).collect();
        let tm_lists: Vec<Vec<TmSegment>> = topos.iter().map(|t| tm_positions(t)).collect();
        let tags: Vec<String> = annotations.iter().map(|a| seq_tag(a)).collect();

        Ok(TopoAlignment { stem: file_root(in_file), ids, annotations, tags, aligned_topos, topos,
                           tm_lists, shrink_map, residues, special, tm_box_rows, tm_names,
                           fold_types })
    }

    fn drawn_length(&self) -> usize {
        self.topos[0].len()
    }

    fn tag_count(&self) -> usize {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        tags.len()
    }

    fn special_rows(&self) -> Vec<usize> {
        let mut rows = self.special.pdb.clone();
        rows.extend(&self.special.final_topology);
        rows
    }

    fn boxed_rows(&self) -> Vec<usize> {
        let mut rows = self.tm_box_rows.clone();
        rows.extend(self.special_rows());
        rows
    }
}


fn load_residue_seqs(in_file: &Path, settings: &DrawSettings)
        -> Result<HashMap<String, String>, String> {
    // Amino acid sequences come from --aa_seq, or else from <first dot field>.fa (.homology.fa for
    // homology alignments) in --aa_path or the alignment's directory, if such a file exists.
    let path = match &settings.aa_seq {
        Some(path) => path.clone(),
        None => {
            let dir = settings.aa_path.clone().unwrap_or_else(|| file_dir(in_file));
            let name = in_file.file_name().unwrap_or_default().to_string_lossy().to_string();
            let fasta_id = name.split('.').next().unwrap_or_default();
            let suffix = if name.contains("homology") { ".homology.fa" } else { ".fa" };
            let path = dir.join(format!("{}{}", fasta_id, suffix));
            if !path.is_file() || path == in_file { return Ok(HashMap::new()); }
            path
        }
    };
    let records = read_fasta(&path)
        .map_err(|e| format!("unable to load {}\n{}", path.display(), e))?;
    Ok(records.into_iter().map(|r| (r.id, r.seq.replace('-', ""))).collect())
}


fn align_residues(seq: &str, aligned_topo: &str) -> Option<String> {
    // Places the ungapped residues onto the non-gap columns of the aligned topology.
    let needed = aligned_topo.bytes().filter(|&c| c != GAP).count();
    if seq.chars().count() != needed { return None; }
    let mut residues = seq.chars();
    Some(aligned_topo.bytes()
         .map(|c| if c == GAP { '-' } else { residues.next().unwrap_or('-') }).collect())
}


fn drawn_residues(aligned: &str, shrink_map: &[usize], tm_list: &[TmSegment],
                  settings: &DrawSettings) -> String {
    // The residues at the drawn columns. With K/R bias only K and R residues near (but not in) a
    // TM helix are shown.
    let bytes = aligned.as_bytes();
    let columns: Vec<usize> = if shrink_map.is_empty() { (0..bytes.len()).collect() }
                                                   else { shrink_map.to_vec() };
    columns.iter().map(|&p| {
        let c = bytes.get(p).copied().unwrap_or(GAP);
        if !settings.kr_bias { return c as char; }
        if (c == b'K' || c == b'R') && kr_near_tm(p, tm_list, settings.max_dist_kr) { c as char }
        else { ' ' }
    }).collect()
}


fn kr_near_tm(pos: usize, tm_list: &[TmSegment], max_dist: usize) -> bool {
    if is_within_tm(pos, tm_list) { return false; }
    tm_list.iter().any(|&(b, e)| {
        let dist = if pos <= b { b - pos } else { pos + 1 - e };
        dist > 0 && dist <= max_dist
    })
}


fn load_dg_profiles(in_file: &Path, aln: &TopoAlignment, settings: &DrawSettings)
        -> Result<Vec<(String, DgProfile)>, String> {
    // Profiles for the representative topologies, placed onto the drawn columns.
    let mut profiles = Vec::new();
    for &idx in &aln.special.representative {
        let id = &aln.ids[idx];
        let Some(filename) = find_dg_profile_file(in_file, id, &settings.dgp_file) else {
            warning(&format!("no DG profile found for {}", id));
            continue;
        };
        let file_profiles = read_dg_profiles(&filename)?;
        match profile_for(&file_profiles, id) {
            Some(profile) => profiles.push((id.clone(),
                                            match_to_alignment(profile, &aln.aligned_topos[idx],
                                                               &aln.shrink_map, &aln.topos[idx]))),
            None => warning(&format!("{} has no DG profile for {}", filename.display(), id)),
        }
    }
    Ok(profiles)
}


fn auto_image_scale(seq_count: usize) -> f64 {
    if seq_count < 50       { 2.0 }
    else if seq_count < 100 { 1.5 }
    else if seq_count < 500 { 1.2 }
    else                    { 1.0 }
}


fn top_margin_factor(seq_count: usize) -> i32 {
    // Grows from 2 to 6 margins as the sigmoid of the sequence count goes from 0.5 to 1.
    let sigmoid = 1.0 / (1.0 + (-(seq_count as f64) / 5.0).exp());
    (2.0 + (sigmoid - 0.5) * 8.0) as i32
}


fn char_size(fonts: &Fonts, font: FontSpec) -> (i32, i32) {
    let width = fonts.text_width("a", font).round().max(1.0) as i32;
    let height = fonts.line_height(font).round().max(1.0) as i32;
    (width, height)
}


fn half_up(value: f64) -> i32 {
    (value + 0.5) as i32
}


#[derive(Debug, Default, Clone)]
struct Layout {
    scale: f64,
    margin_x: i32,
    margin_y: i32,
    section_sep: i32,
    anno_width: usize,
    cell_w: i32,
    cell_h: i32,
    msa_font: FontSpec,
    draw_text: bool,
    tm_font: FontSpec,
    tm_label_font: FontSpec,
    tm_w: i32,
    tm_h: i32,
    scale_font: FontSpec,
    scale_w: i32,
    scale_h: i32,
    dg_label_font: FontSpec,
    dg_tick_font: FontSpec,
    dg_legend_font: FontSpec,
    dg_width: i32,
    dg_height: i32,
    histo_width: i32,
    histo_height: i32,
    width: i32,
    height: i32,
}

impl Layout {
    fn new(aln: &TopoAlignment, settings: &DrawSettings, fonts: &Fonts, in_file: &Path) -> Self {
        let n = aln.ids.len();
        let scale = settings.image_scale.unwrap_or_else(|| auto_image_scale(n));
        let anno_width = if settings.clean_plot { CLEAN_PLOT_ANNOTATION_WIDTH }
                         else { annotation_draw_width(&aln.annotations).min(MAX_ANNOTATION_WIDTH) };
        let mut font_size = ((scale * settings.font_size as f64) as u32).max(1);
        let msa_font = FontSpec::mono(font_size);
        let (cell_w, cell_h) = char_size(fonts, msa_font);
        let mut layout = Layout {
            scale, anno_width, cell_w, cell_h, msa_font,
            margin_x: half_up(MARGIN_X * scale),
            margin_y: half_up(MARGIN_Y * scale),
            section_sep: half_up(scale * HEIGHT_TM_BOX / 2.0),
            draw_text: settings.text,
            ..Default::default()
        };
        layout.calculate(aln, settings, fonts, 1.0);
        layout.apply_h2w_ratio(aln, settings, fonts);

        if settings.autosize && layout.pixel_count() > settings.max_image_size {
            while layout.pixel_count() > settings.max_image_size {
                if font_size > 3 {
                    font_size -= 1;
                    layout.msa_font = FontSpec::mono(font_size);
                    (layout.cell_w, layout.cell_h) = char_size(fonts, layout.msa_font);
                } else {
                    // Cells smaller than the smallest font can't hold text.
                    layout.draw_text = false;
                    if layout.cell_w > 1 { layout.cell_w -= 1; }
                    if layout.cell_h > 1 { layout.cell_h -= 1; }
                }
                layout.calculate(aln, settings, fonts, 1.0);
                if layout.cell_w < 2 && layout.cell_h < 2 { break; }
            }
            layout.apply_h2w_ratio(aln, settings, fonts);
            if layout.pixel_count() > settings.max_image_size {
                warning(&format!("{}: cells have been reduced to {}x{} px, but the image is still \
                                  {}M pixels", in_file.display(), layout.cell_w, layout.cell_h,
                                 layout.pixel_count() / 1024 / 1024));
            }
        }
        layout
    }

    fn pixel_count(&self) -> u64 {
        self.width.max(0) as u64 * self.height.max(0) as u64
    }

    fn label_space(&self) -> i32 {
        // Space to the left of the alignment columns.
        self.anno_width as i32 * self.cell_w + ANNO_SEQ_INTERVAL * self.tm_w
    }

    fn alignment_x(&self) -> i32 {
        self.margin_x + self.label_space()
    }

    fn tm_box_height(&self) -> i32 {
        half_up(HEIGHT_TM_BOX * self.tm_h as f64)
    }

    fn tm_row_height(&self) -> i32 {
        half_up(HEIGHT_TM_BOX * self.tm_h as f64 * 1.5)
    }

    fn apply_h2w_ratio(&mut self, aln: &TopoAlignment, settings: &DrawSettings, fonts: &Fonts) {
        // Stretches the alignment cells horizontally to approach the requested height/width.
        let Some(ratio) = settings.h2w_ratio else { return; };
        let current = self.height as f64 / self.width.max(1) as f64;
        if (current - ratio).abs() <= f64::EPSILON { return; }
        let adjust = current / ratio;
        self.cell_w = half_up(self.cell_w as f64 * adjust).max(1);
        self.margin_y += half_up(adjust * 10.0);
        self.calculate(aln, settings, fonts, adjust);
    }

    fn calculate(&mut self, aln: &TopoAlignment, settings: &DrawSettings, fonts: &Fonts,
                 width_adjust: f64) {
        let n = aln.ids.len() as i32;
        let length = aln.drawn_length() as i32;

        let boxed: Vec<&Vec<TmSegment>> = aln.boxed_rows().iter().map(|&i| &aln.tm_lists[i]).collect();
        let tm_font_size = autosize_tm_font(fonts, self.cell_w, self.cell_h, n as usize, &boxed,
                                            self.msa_font.size as u32);
        self.tm_font = FontSpec::mono(tm_font_size);
        self.tm_label_font = FontSpec::serif(tm_font_size + 1);
        (self.tm_w, self.tm_h) = char_size(fonts, self.tm_font);
        self.scale_font = FontSpec::mono((half_up(tm_font_size as f64 * 0.9) as u32).max(1));
        (self.scale_w, self.scale_h) = char_size(fonts, self.scale_font);

        self.width = (self.anno_width as i32 + length) * self.cell_w
            + ANNO_SEQ_INTERVAL * self.tm_w + 2 * self.margin_x;
        self.dg_width = length * self.cell_w;
        self.dg_height = 30.max(half_up(self.width as f64 * 0.15))
                           .max((n as f64 * self.cell_h as f64 * 0.2).round() as i32)
                           .max((HEIGHT_TM_BOX * 2.0) as i32 * self.tm_h);
        self.histo_width = length * self.cell_w;
        self.histo_height = 50.max((length as f64 * self.cell_h as f64 * width_adjust * 0.1).round() as i32)
                              .max((n as f64 * self.cell_h as f64 * 0.1).round() as i32);

        let dg_font_size = autosize_dg_label_font(fonts, self.dg_height);
        self.dg_label_font = FontSpec::serif(dg_font_size);
        self.dg_tick_font = FontSpec::serif(((dg_font_size as f64 * 0.65) as u32).max(2));
        self.dg_legend_font = FontSpec::serif(((dg_font_size as f64 * 0.7) as u32).max(2));

        let reps = aln.tm_box_rows.len() as i32;
        let specials = aln.special_rows().len() as i32;
        let section_gap = self.section_sep * self.scale_h;
        let mut height = self.margin_y * top_margin_factor(n as usize) + reps * self.tm_row_height();
        if settings.msa {
            if settings.scale_bar { height += half_up(self.scale_h as f64 * 2.5); }
            height += n * self.cell_h;
            if settings.separators { height += aln.tag_count() as i32 * self.cell_h; }
        }
        if specials > 0 {
            height += self.tm_box_height() + section_gap + specials * self.tm_row_height();
        }
        if settings.dg_profile {
            height += half_up(self.dg_height as f64 * 1.1) + section_gap;
            if settings.dg_legend && aln.special.representative.len() > 1 {
                height += char_size(fonts, self.dg_legend_font).1 * 4;
            }
        }
        if settings.histogram { height += self.histo_height; }
        self.height = height;
    }
}


fn autosize_tm_font(fonts: &Fonts, cell_w: i32, cell_h: i32, seq_count: usize,
                    tm_lists: &[&Vec<TmSegment>], fallback: u32) -> u32 {
    // Finds a font size for the TM-box numbers that leaves the narrowest box with between 5 px and
    // two alignment rows of space.
    let boxes: Vec<(usize, i32)> = tm_lists.iter()
        .flat_map(|tm_list| tm_list.iter().enumerate().map(|(j, &(b, e))| (j, (e - b) as i32)))
        .collect();
    if boxes.is_empty() { return fallback; }
    let mut size: i32 = 50;
    for _ in 0..=MAX_AUTOSIZE_ITERATIONS {
        if size < 2 { break; }
        let font = FontSpec::mono(size as u32);
        let min_margin = boxes.iter()
            .map(|&(j, len)| (cell_w * len) as f32 - fonts.text_width(&(j + 1).to_string(), font))
            .fold(f32::INFINITY, f32::min);
        let text_h = fonts.line_height(font) as f64;
        if min_margin < 5.0 { size -= 1; }
        else if min_margin >= 2.0 * cell_h as f32 { size += 1; }
        else { break; }
        let rows = (cell_h as f64) * seq_count as f64;
        if text_h < rows * 0.1 && text_h > rows * 0.05 { break; }
    }
    size.max(1) as u32
}


fn autosize_dg_label_font(fonts: &Fonts, dg_height: i32) -> u32 {
    // The rotated DG label should span most of the panel height.
    let margin = half_up(dg_height as f64 * 0.1) as f32;
    let mut size: i32 = 50;
    for _ in 0..=MAX_AUTOSIZE_ITERATIONS {
        if size < 2 { break; }
        let diff = dg_height as f32 - fonts.text_width(DG_LABEL, FontSpec::serif(size as u32));
        if diff < margin { size -= 1; }
        else if diff >= 2.0 * margin { size += 1; }
        else { break; }
    }
    size.max(2) as u32
}


fn autosize_histogram_font(fonts: &Fonts, space: i32, box_height: i32) -> u32 {
    // The largest font (100 down to 9) whose label and tick text fit to the left of the panel.
    let max_tick_len = HISTOGRAM_TICKS.iter().map(|t| t.to_string().len()).max().unwrap_or(1);
    let chars_needed = HISTOGRAM_LABEL.chars().count() + 2 * max_tick_len + 1;
    let max_w = space as f64 / chars_needed as f64;
    let max_h = box_height as f64 / (HISTOGRAM_TICKS.len() - 1) as f64;
    let mut size = 100;
    while size >= 9 {
        let (w, h) = char_size(fonts, FontSpec::mono(size));
        if w as f64 <= max_w && h as f64 <= max_h { break; }
        size -= 1;
    }
    size
}


pub struct TmLabelStyle {
    pub label: String,
    pub text_colour: Rgb<u8>,
    pub outline_colour: Rgb<u8>,
    pub outline_width: u32,
}


pub fn tm_label_style(idx: usize, tm_names: &[String], fold_types: &[String],
                      base_width: u32) -> TmLabelStyle {
    // The label is the helix's name if given, otherwise its 1-based number. Helices which share a
    // fold-type group with another helix get that group's outline colour at double width.
    let label = tm_names.get(idx).filter(|n| !n.is_empty()).cloned()
        .unwrap_or_else(|| (idx + 1).to_string());
    let base_width = base_width.max(1);
    let is_group = |g: &&str| !g.is_empty() && *g != "-";
    let mut shared_groups: Vec<&str> = Vec::new();
    for g in fold_types.iter().map(|s| s.as_str()).filter(is_group) {
        let count = fold_types.iter().filter(|s| s.as_str() == g).count();
        if count > 1 && !shared_groups.contains(&g) { shared_groups.push(g); }
    }
    let group = fold_types.get(idx).map(|s| s.as_str())
        .and_then(|g| shared_groups.iter().position(|s| *s == g));
    match group {
        Some(k) => TmLabelStyle { label, text_colour: BLACK,
                                  outline_colour: FOLD_GROUP_COLOURS[k % FOLD_GROUP_COLOURS.len()],
                                  outline_width: base_width * 2 },
        None => TmLabelStyle { label, text_colour: BLACK, outline_colour: BLACK,
                               outline_width: base_width },
    }
}


fn render(canvas: &mut dyn Canvas, aln: &TopoAlignment, layout: &Layout, settings: &DrawSettings,
          fonts: &Fonts, dg_profiles: &[(String, DgProfile)]) {
    let mut y = layout.margin_y;
    for &idx in &aln.tm_box_rows {
        let label = if settings.clean_plot { "" } else { aln.stem.as_str() };
        draw_tm_box_row(canvas, aln, idx, label, y, layout, settings, fonts);
        y += layout.tm_row_height();
    }

    if settings.msa {
        if settings.scale_bar {
            draw_scale_bar(canvas, aln, layout, y);
            y += half_up(layout.scale_h as f64 * 2.5);
        }
        y = draw_alignment_rows(canvas, aln, layout, settings, fonts, y);
    }

    let special_rows = aln.special_rows();
    if !special_rows.is_empty() {
        y += layout.tm_box_height();
        for &idx in &special_rows {
            let label = special_row_label(aln, idx, settings.clean_plot);
            draw_tm_box_row(canvas, aln, idx, &label, y, layout, settings, fonts);
            y += layout.tm_row_height();
        }
        y += layout.section_sep * layout.scale_h;
    }

    if settings.dg_profile {
        if !dg_profiles.is_empty() {
            draw_dg_section(canvas, dg_profiles, aln.drawn_length(), layout, settings, fonts, y);
            y += layout.dg_height;
        }
        y += layout.section_sep * layout.scale_h;
    }

    if settings.histogram {
        let fractions = StateFractions::from_topologies(&aln.topos);
        draw_histogram(canvas, &fractions.per_m, layout.alignment_x(), y, layout, fonts);
    }
}


fn special_row_label(aln: &TopoAlignment, idx: usize, clean_plot: bool) -> String {
    let id = &aln.ids[idx];
    if aln.special.pdb.contains(&idx) {
        return id.strip_prefix("pdb_").unwrap_or(id).to_string();
    }
    if clean_plot { return row_letter(idx); }
    if aln.special.final_topology.len() == 1 { return "Final Topology".to_string(); }
    format!("Final Topology {}", id.strip_prefix("final").unwrap_or(id))
}


#[allow(clippy::too_many_arguments)]
fn draw_tm_box_row(canvas: &mut dyn Canvas, aln: &TopoAlignment, idx: usize, label: &str, y: i32,
                   layout: &Layout, settings: &DrawSettings, fonts: &Fonts) {
    let label: String = label.chars().take(layout.anno_width).collect();
    if !label.is_empty() {
        canvas.text(layout.margin_x, y, &label, layout.tm_label_font, BLACK);
    }
    draw_tm_boxes(canvas, &aln.topos[idx], &aln.tm_names[idx], &aln.fold_types[idx], y, layout,
                  settings.show_gap, fonts);
}


fn state_before(tm_type: u8) -> u8 {
    match tm_type {
        b'W' | b'R' => INSIDE,
        _           => OUTSIDE,
    }
}


fn state_after(tm_type: u8) -> u8 {
    match tm_type {
        b'M' | b'R' => INSIDE,
        _           => OUTSIDE,
    }
}


// Vertical extent of a TM-box row: inside loops run along the bottom, outside loops along the top.
struct BoxBand {
    top: i32,
    bottom: i32,
    loop_h: i32,
}

impl BoxBand {
    fn loop_rect(&self, canvas: &mut dyn Canvas, x1: i32, x2: i32, state: u8, colour: Option<Rgb<u8>>) {
        if x2 <= x1 { return; }
        if state == INSIDE {
            canvas.fill_rect(x1, self.bottom - self.loop_h, x2, self.bottom, colour.unwrap_or(LOOP_IN));
        } else {
            canvas.fill_rect(x1, self.top, x2, self.top + self.loop_h, colour.unwrap_or(LOOP_OUT));
        }
    }
}


#[allow(clippy::too_many_arguments)]
fn draw_tm_boxes(canvas: &mut dyn Canvas, topo: &str, tm_names: &[String], fold_types: &[String],
                 y: i32, layout: &Layout, show_gap: bool, fonts: &Fonts) {
    let x0 = layout.alignment_x();
    let cw = layout.cell_w;
    let top = y - layout.tm_h / 2;
    let box_h = layout.tm_box_height();
    let band = BoxBand { top, bottom: top + box_h, loop_h: (layout.tm_h as f64 * 0.4).round() as i32 };
    let end_x = x0 + topo.len() as i32 * cw;
    let base_width = half_up(layout.tm_h as f64 * HEIGHT_TM_BOX * 0.06) as u32;
    let (tm_list, types) = tm_types(topo);

    let mut last = x0;
    for (j, (&(b, e), &tm_type)) in tm_list.iter().zip(&types).enumerate() {
        let x1 = x0 + b as i32 * cw;
        let x2 = x0 + e as i32 * cw;
        band.loop_rect(canvas, last, x1, state_before(tm_type), None);
        let (y1, y2, fill) = match tm_type {
            MEMBRANE => (band.top, band.bottom, TM_OUT_TO_IN),
            b'W'     => (band.top, band.bottom, TM_IN_TO_OUT),
            b'R'     => (band.top + half_up(box_h as f64 / 3.0), band.bottom, LOOP_IN),
            b'r'     => (band.top, band.top + half_up(box_h as f64 * 2.0 / 3.0), LOOP_OUT),
            _        => (band.top, band.bottom, VIOLET),
        };
        let style = tm_label_style(j, tm_names, fold_types, base_width);
        canvas.box_rect(x1, y1, x2, y2, fill, style.outline_colour, style.outline_width);
        let (text_w, text_h) = fonts.text_size(&style.label, layout.tm_font);
        let text_h = text_h as i32 + 2;
        let x3 = ((x1 + x2 - text_w as i32) as f64 / 2.0).round() as i32;
        let y3 = ((y1 + y2 - text_h) as f64 / 2.0).round() as i32;
        canvas.text(x3, y3, &style.label, layout.tm_font, style.text_colour);
        last = x2;
    }
    match types.last() {
        Some(&tm_type) => band.loop_rect(canvas, last, end_x, state_after(tm_type), None),
        None => if let Some(state) = nterm_state(topo) { band.loop_rect(canvas, x0, end_x, state, None); },
    }

    if show_gap {
        for (b, e) in gap_runs(topo) {
            if is_within_tm(b, &tm_list) { continue; }
            let inside = io_state_upstream(topo, b) == Some(INSIDE) ||
                         io_state_downstream(topo, e) == Some(INSIDE);
            let state = if inside { INSIDE } else { OUTSIDE };
            band.loop_rect(canvas, x0 + b as i32 * cw, x0 + e as i32 * cw, state, Some(WHITE));
        }
    }
}


fn draw_scale_bar(canvas: &mut dyn Canvas, aln: &TopoAlignment, layout: &Layout, y: i32) {
    // Column numbers every `step` columns (original alignment columns when shrunk), with a tick
    // mark under each.
    let length = aln.drawn_length();
    let cw = layout.cell_w;
    let x_start = layout.alignment_x();
    let digits = length.to_string().len() as f64;
    let step = 20 * ((layout.scale_w as f64 / cw as f64 * digits / 10.0 + 0.5).ceil() as usize).max(1);

    let mut x = x_start;
    let mut i = step;
    while i < length {
        let column = if aln.shrink_map.is_empty() { i } else { aln.shrink_map[i] };
        let label = column.to_string();
        let label_x = x + step as i32 * cw - label.len() as i32 * layout.scale_w;
        canvas.text(label_x, y, &label, layout.scale_font, BLACK);
        i += step;
        x += step as i32 * cw;
    }

    let y = y + half_up(layout.scale_h as f64 * 1.5);
    let mut x = x_start;
    let mut i = step;
    while i < length {
        canvas.text(x + (step as i32 - 1) * cw, y, "|", layout.scale_font, BLACK);
        i += step;
        x += step as i32 * cw;
    }
}


fn draw_alignment_rows(canvas: &mut dyn Canvas, aln: &TopoAlignment, layout: &Layout,
                       settings: &DrawSettings, fonts: &Fonts, mut y: i32) -> i32 {
    // Special topologies are drawn as TM boxes instead. A grey separator goes between groups of
    // differently tagged sequences.
    let mut previous_tag: Option<&str> = None;
    for i in 0..aln.ids.len() {
        if aln.special.contains(i) { continue; }
        let tag = aln.tags[i].as_str();
        if previous_tag.is_some_and(|t| t != tag) {
            if settings.separators {
                canvas.fill_rect(layout.margin_x, y + 1, layout.width - layout.margin_x,
                                 y + layout.cell_h - 1, GREY);
                y += layout.cell_h;
            }
        }
        previous_tag = Some(tag);
        draw_topology_row(canvas, aln, i, layout, settings, fonts, y);
        y += layout.cell_h;
    }
    y
}


fn draw_topology_row(canvas: &mut dyn Canvas, aln: &TopoAlignment, i: usize, layout: &Layout,
                     settings: &DrawSettings, fonts: &Fonts, y: i32) {
    let (cw, ch) = (layout.cell_w, layout.cell_h);
    let anno = &aln.annotations[i];
    let x_tag = layout.margin_x + layout.anno_width as i32 * cw;
    if settings.tag_column {
        canvas.fill_rect(x_tag + layout.tm_w, y, x_tag + 3 * layout.tm_w, y + ch - 1,
                         tag_colour(&aln.tags[i], anno));
    }
    let x = layout.alignment_x();
    let topo = &aln.topos[i];
    let bytes = topo.as_bytes();
    let (tm_list, types) = tm_types(topo);
    let mut type_at = vec![b' '; bytes.len()];
    for (&(b, e), &t) in tm_list.iter().zip(&types) {
        type_at[b..e].fill(t);
    }
    let tm_colour = if settings.color_kingdom { kingdom_colour(anno) } else { RED };

    let mut start = 0;
    while start < bytes.len() {
        let mut end = start;
        while end < bytes.len() && bytes[end] == bytes[start] { end += 1; }
        let bg = match bytes[start] {
            MEMBRANE       => if type_at[start] == b'W' { MSA_IN_TO_OUT } else { MSA_OUT_TO_IN },
            INSIDE         => MSA_LOOP_IN,
            OUTSIDE        => MSA_LOOP_OUT,
            SIGNAL_PEPTIDE => MSA_SIGNAL_PEPTIDE,
            _ if settings.color_tm_box && is_within_tm(start, &tm_list) => tm_colour,
            _              => WHITE,
        };
        if bg != WHITE {
            canvas.fill_rect(x + start as i32 * cw, y, x + end as i32 * cw - 1, y + ch - 1, bg);
        }
        start = end;
    }

    if layout.draw_text {
        let label: String = anno.chars().take(layout.anno_width).collect();
        canvas.text(layout.margin_x, y, &label, layout.msa_font, BLACK);
        let text = if settings.show_tm_index { tm_index_text(&tm_list, bytes.len()) }
                   else if let Some(residues) = &aln.residues[i] { residues.replace('-', " ") }
                   else { topo.replace('-', " ") };
        draw_cell_text(canvas, fonts, x, y, &text, layout);
    }
}


fn draw_cell_text(canvas: &mut dyn Canvas, fonts: &Fonts, x: i32, y: i32, text: &str,
                  layout: &Layout) {
    // One text call per row when the font's advance matches the cell width, otherwise one per
    // character so letters stay in their columns.
    let advance = fonts.text_width("a", layout.msa_font).round() as i32;
    if advance == layout.cell_w {
        canvas.text(x, y, text.trim_end(), layout.msa_font, BLACK);
        return;
    }
    for (k, c) in text.chars().enumerate() {
        if c == ' ' { continue; }
        canvas.text(x + k as i32 * layout.cell_w, y, &c.to_string(), layout.msa_font, BLACK);
    }
}


fn tm_index_text(tm_list: &[TmSegment], length: usize) -> String {
    // "TM1", "TM2", ... centred on each helix.
    let mut chars = vec![' '; length];
    for (k, &(b, e)) in tm_list.iter().enumerate() {
        let label = format!("TM{}", k + 1);
        let mid = (b + e) / 2;
        let start = mid.saturating_sub(label.len() / 2)
            .min(length.saturating_sub(label.len() + 1));
        for (j, c) in label.chars().enumerate() {
            if let Some(slot) = chars.get_mut(start + j) { *slot = c; }
        }
    }
    chars.into_iter().collect()
}


fn ntm_from_annotation(anno: &str) -> Option<usize> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"nTM=([0-9]+)").unwrap());
    re.captures(anno)?.get(1)?.as_str().parse().ok()
}


fn tag_colour(tag: &str, anno: &str) -> Rgb<u8> {
    if let Some(cluster) = cluster_number(tag) {
        if ntm_from_annotation(anno) == Some(1) { return BLACK; }
        return match cluster {
            1..=10 => CLUSTER_COLOURS[cluster - 1],
            _      => BLACK,
        };
    }
    match tag {
        "IDT" | "OK"           => RED,
        "INV" | "Archaea"      => BLUE,
        "TM2GAP" | "Eukaryota" => Rgb([0, 128, 0]),
        "TM2SEQ"               => VIOLET,
        "TM2GAP_AND_TM2SEQ"    => Rgb([0, 255, 255]),
        "Consensus" | "Bacteria" => Rgb([128, 0, 128]),
        "SHIFT"                => Rgb([255, 192, 203]),
        "INV_SHIFT"            => Rgb([144, 238, 144]),
        "DIFF"                 => BLACK,
        _                      => WHITE,
    }
}


fn kingdom_colour(anno: &str) -> Rgb<u8> {
    if anno.contains("Eukaryota")     { BLUE }
    else if anno.contains("Archaea")  { GREEN }
    else if anno.contains("Bacteria") { RED }
    else                              { GREY }
}


fn draw_dg_section(canvas: &mut dyn Canvas, profiles: &[(String, DgProfile)], length: usize,
                   layout: &Layout, settings: &DrawSettings, fonts: &Fonts, y: i32) {
    let values: Vec<f64> = profiles.iter().flat_map(|(_, p)| p.iter().map(|&(_, dg)| dg)).collect();
    if values.is_empty() { return; }
    let min_dg = values.iter().copied().fold(f64::INFINITY, f64::min).min(-1.0);
    let max_dg = values.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(2.0);
    draw_dg_profile(canvas, profiles, length, min_dg, max_dg, layout.alignment_x(), y, layout,
                    settings, fonts);
    canvas.vertical_text(half_up(layout.margin_x as f64 * 1.5), y, DG_LABEL,
                         layout.dg_label_font, BLACK);
}


#[allow(clippy::too_many_arguments)]
fn draw_dg_profile(canvas: &mut dyn Canvas, profiles: &[(String, DgProfile)], length: usize,
                   min_dg: f64, max_dg: f64, x0: i32, y0: i32, layout: &Layout,
                   settings: &DrawSettings, fonts: &Fonts) {
    let (w, h) = (layout.dg_width, layout.dg_height);
    let padding = half_up(h as f64 * 0.05);
    let draw_h = (h - 2 * padding) as f64;
    let line_w = (half_up(h as f64 * 0.02) as u32).max(1);
    let outline_w = (half_up(line_w as f64 * 0.75) as u32).max(1);
    let tick_line_w = (half_up(outline_w as f64 * 0.75) as u32).max(1);
    let range = max_dg - min_dg;

    canvas.outline_rect(x0, y0 + padding, x0 + w, y0 + h - padding, BLACK, outline_w);
    let y_zero = y0 + padding + (draw_h * max_dg / range).round() as i32;
    canvas.line(x0, y_zero, x0 + w, y_zero, GREY, 1);

    let step = (range / 5.0).round().max(0.5);
    let tick_len = half_up(w as f64 * 0.01).max(5);
    let draw_tick = |canvas: &mut dyn Canvas, value: f64, width: u32| {
        let y1 = y_zero - (draw_h * value / range).round() as i32;
        canvas.line(x0 - tick_len, y1, x0, y1, BLACK, width);
        let text = format!("{:.1}", value);
        let (text_w, text_h) = fonts.text_size(&text, layout.dg_tick_font);
        canvas.text(x0 - tick_len - text_w as i32 - tick_len, y1 - text_h as i32 / 2, &text,
                    layout.dg_tick_font, BLACK);
    };
    let mut tick = 0.0;
    while tick <= max_dg {
        draw_tick(&mut *canvas, tick, tick_line_w);
        tick += step;
    }
    let mut tick = -step;
    while tick > min_dg {
        draw_tick(&mut *canvas, tick, 1);
        tick -= step;
    }

    let palette = gradient(profiles.len());
    let length = length.max(1) as f64;
    for ((_, profile), &colour) in profiles.iter().zip(&palette) {
        let points: Vec<(i32, i32)> = profile.iter().map(|&(idx, dg)| {
            (x0 + (w as f64 * idx as f64 / length).round() as i32,
             y_zero - (dg / range * draw_h).round() as i32)
        }).collect();
        for pair in points.windows(2) {
            canvas.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, colour, line_w);
        }
    }

    if settings.dg_legend {
        draw_dg_legend(canvas, profiles, &palette, x0, y0 + h, line_w, outline_w, layout, fonts);
    }
}


#[allow(clippy::too_many_arguments)]
fn draw_dg_legend(canvas: &mut dyn Canvas, profiles: &[(String, DgProfile)], palette: &[Rgb<u8>],
                  x0: i32, y0: i32, line_w: u32, outline_w: u32, layout: &Layout, fonts: &Fonts) {
    let font = layout.dg_legend_font;
    let (text_w, text_h) = fonts.text_size("Initial Topology 1", font);
    let (text_w, text_h) = (text_w as i32, text_h as i32);
    let bar_w = text_w / 3;
    let gap_text_bar = bar_w / 2;
    let item_w = text_w + bar_w + text_w / 4 + gap_text_bar;
    let count = profiles.len() as i32;
    let x_padding = half_up(item_w as f64 * count as f64 * 0.05);
    if count > 1 {
        canvas.outline_rect(x0, y0, x0 + item_w * count + 2 * x_padding, y0 + 2 * text_h, BLACK,
                            outline_w);
    }
    for (ii, ((id, _), &colour)) in profiles.iter().zip(palette).enumerate() {
        let label = if count == 1 { "Initial Topology".to_string() }
                    else { format!("Initial Topology {}", id.strip_prefix("rep").unwrap_or(id)) };
        let (label_w, label_h) = fonts.text_size(&label, font);
        let x = x0 + ii as i32 * item_w + x_padding;
        let y = y0 + label_h as i32 / 4;
        canvas.text(x, y, &label, font, BLACK);
        let x1 = x + label_w as i32 + gap_text_bar;
        let y1 = y + label_h as i32 / 2;
        canvas.line(x1, y1, x1 + bar_w, y1, colour, line_w * 2);
    }
}


fn draw_histogram(canvas: &mut dyn Canvas, per_m: &[f64], x0: i32, y0: i32, layout: &Layout,
                  fonts: &Fonts) {
    // Bar chart of the fraction of sequences in state M at each drawn column.
    let (w, h) = (layout.histo_width, layout.histo_height);
    let margin_top = 20.max((h as f64 * 0.1).round() as i32);
    let margin_bottom = (h as f64 * 0.1).round() as i32;
    let box_h = (h - margin_top - margin_bottom).max(1);
    let box_bottom = y0 + margin_top + box_h;
    canvas.outline_rect(x0, y0 + margin_top, x0 + w, box_bottom, BLACK, 1);

    let font = FontSpec::mono(autosize_histogram_font(fonts, layout.label_space(), box_h));
    let tick_len = fonts.text_size("-", font).0 as i32;
    let mut max_tick_w = 0;
    for tick in HISTOGRAM_TICKS {
        let y1 = box_bottom - (tick as f64 / 100.0 * box_h as f64).round() as i32;
        canvas.line(x0 - tick_len, y1, x0, y1, BLACK, 1);
        let text = tick.to_string();
        let (text_w, text_h) = fonts.text_size(&text, font);
        max_tick_w = max_tick_w.max(text_w as i32);
        canvas.text(x0 - tick_len - text_w as i32 - tick_len - 3, y1 - text_h as i32 / 2, &text,
                    font, BLACK);
    }
    let (label_w, label_h) = fonts.text_size(HISTOGRAM_LABEL, font);
    let label_x = x0 - label_w as i32 - 2 * tick_len - max_tick_w - 13;
    let label_y = y0 + margin_top + box_h / 2 - label_h as i32 / 2;
    canvas.text(label_x, label_y, HISTOGRAM_LABEL, font, BLACK);

    let length = per_m.len().max(1) as f64;
    for (j, &fraction) in per_m.iter().enumerate() {
        let bar_h = (fraction * box_h as f64).round() as i32;
        if bar_h == 0 { continue; }
        let x1 = x0 + (j as f64 * w as f64 / length).round() as i32;
        let x2 = x0 + ((j + 1) as f64 * w as f64 / length).round() as i32;
        canvas.box_rect(x1, box_bottom - bar_h, x2, box_bottom, RED, BLACK, 1);
    }
}


fn draw_metrics(in_file: &Path, out_file: &Path, aln: &TopoAlignment, layout: &Layout,
                dg_profile_count: usize) -> DrawMetrics {
    let mut tag_counts = BTreeMap::new();
    for tag in &aln.tags {
        let key = if tag.is_empty() { "none".to_string() } else { tag.clone() };
        *tag_counts.entry(key).or_insert(0) += 1;
    }
    let tm_counts: Vec<usize> = aln.aligned_topos.iter().map(|t| count_tm(t)).collect();
    let mut metrics = DrawMetrics::new();
    metrics.input_file = in_file.display().to_string();
    metrics.output_file = out_file.display().to_string();
    metrics.sequence_count = aln.ids.len();
    metrics.alignment_length = aln.aligned_topos[0].len();
    metrics.drawn_length = aln.drawn_length();
    metrics.representative_count = aln.tm_box_rows.len();
    metrics.pdb_count = aln.special.pdb.len();
    metrics.final_count = aln.special.final_topology.len();
    metrics.tag_counts = tag_counts;
    metrics.set_tm_counts(&tm_counts);
    metrics.image_width = layout.width as u32;
    metrics.image_height = layout.height as u32;
    metrics.image_scale = layout.scale;
    metrics.font_size = layout.msa_font.size as u32;
    metrics.tm_box_font_size = layout.tm_font.size as u32;
    metrics.cell_width = layout.cell_w as u32;
    metrics.cell_height = layout.cell_h as u32;
    metrics.text_drawn = layout.draw_text;
    metrics.dg_profile_count = dg_profile_count;
    metrics
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::canvas::{PngCanvas, SvgCanvas};
    use crate::tests::make_test_file;

    fn test_alignment() -> &'static str {
        ">rep1 representative\n\
         --oooMMMMMMMMiiiiMMMMMMMMooo--\n\
         >seq1 OK nTM=2\n\
         --oooMMMMMMMMiiiiMMMMMMMMooo--\n\
         >seq2 OK nTM=2\n\
         -ooooMMMMMMMMiiiiMMMMMMMMooo--\n\
         >seq3 SHIFT nTM=2\n\
         ---ooMMMMMMMMiiii-MMMMMMMooooo\n\
         >final1\n\
         --oooMMMMMMMMiiiiMMMMMMMMooo--\n"
    }

    fn small_settings() -> DrawSettings {
        DrawSettings { image_scale: Some(1.0), font_size: 10, ..Default::default() }
    }

    #[test]
    fn test_auto_image_scale() {
        assert_eq!(auto_image_scale(1), 2.0);
        assert_eq!(auto_image_scale(49), 2.0);
        assert_eq!(auto_image_scale(50), 1.5);
        assert_eq!(auto_image_scale(499), 1.2);
        assert_eq!(auto_image_scale(500), 1.0);
    }

    #[test]
    fn test_top_margin_factor() {
        assert_eq!(top_margin_factor(1), 2);
        assert_eq!(top_margin_factor(10), 5);
        assert_eq!(top_margin_factor(1000), 6);
    }

    #[test]
    fn test_output_filename() {
        let settings = DrawSettings::default();
        assert_eq!(output_filename(Path::new("dir/fam.topomsa"), &settings),
                   PathBuf::from("dir/fam.png"));
        let settings = DrawSettings { kr_bias: true, format: ImageFormat::Svg,
                                      out_dir: Some(PathBuf::from("out")), ..Default::default() };
        assert_eq!(output_filename(Path::new("dir/fam.topomsa"), &settings),
                   PathBuf::from("out/fam.krbias.svg"));
    }

    #[test]
    fn test_align_residues() {
        assert_eq!(align_residues("ACDE", "i-MM-o"), Some("A-CD-E".to_string()));
        assert_eq!(align_residues("ACD", "i-MM-o"), None);
        assert_eq!(align_residues("ACDEF", "i-MM-o"), None);
        assert_eq!(align_residues("", "---"), Some("---".to_string()));
    }

    #[test]
    fn test_kr_near_tm() {
        let tm_list = vec![(10, 20)];
        assert!(kr_near_tm(9, &tm_list, 12));
        assert!(kr_near_tm(20, &tm_list, 12));
        assert!(kr_near_tm(31, &tm_list, 12));
        assert!(!kr_near_tm(32, &tm_list, 12));
        assert!(!kr_near_tm(15, &tm_list, 12));
        assert!(!kr_near_tm(0, &tm_list, 5));
        assert!(!kr_near_tm(5, &[], 12));
    }

    #[test]
    fn test_drawn_residues() {
        let settings = DrawSettings::default();
        assert_eq!(drawn_residues("AKL-RW", &[], &[(2, 4)], &settings), "AKL-RW");
        assert_eq!(drawn_residues("AKL-RW", &[0, 2, 5], &[(2, 4)], &settings), "ALW");
        let settings = DrawSettings { kr_bias: true, max_dist_kr: 2, ..Default::default() };
        assert_eq!(drawn_residues("KKLLRR", &[], &[(2, 4)], &settings), "KK  RR");
    }

    #[test]
    fn test_tm_index_text() {
        assert_eq!(tm_index_text(&[(2, 8)], 12), "    TM1     ");
        assert_eq!(tm_index_text(&[(0, 2), (8, 12)], 12), "TM1     TM2 ");
        assert_eq!(tm_index_text(&[], 4), "    ");
    }

    #[test]
    fn test_tm_label_style() {
        let names = vec!["H1".to_string(), "".to_string()];
        let folds = vec!["A".to_string(), "B".to_string(), "A".to_string(), "-".to_string()];
        let style = tm_label_style(0, &names, &folds, 3);
        assert_eq!(style.label, "H1");
        assert_eq!(style.outline_colour, FOLD_GROUP_COLOURS[0]);
        assert_eq!(style.outline_width, 6);
        let style = tm_label_style(1, &names, &folds, 3);
        assert_eq!(style.label, "2");
        assert_eq!(style.outline_colour, BLACK);
        assert_eq!(style.outline_width, 3);
        let style = tm_label_style(2, &names, &folds, 0);
        assert_eq!(style.label, "3");
        assert_eq!(style.outline_width, 2);
        let style = tm_label_style(3, &[], &[], 2);
        assert_eq!(style.label, "4");
        assert_eq!(style.outline_colour, BLACK);
    }

    #[test]
    fn test_tag_colour() {
        assert_eq!(tag_colour("ClusterNo=1", "x nTM=3"), CLUSTER_COLOURS[0]);
        assert_eq!(tag_colour("ClusterNo=10", "x"), CLUSTER_COLOURS[9]);
        assert_eq!(tag_colour("ClusterNo=2", "x nTM=1"), BLACK);
        assert_eq!(tag_colour("ClusterNo=11", "x nTM=4"), BLACK);
        assert_eq!(tag_colour("IDT", ""), RED);
        assert_eq!(tag_colour("Archaea", ""), BLUE);
        assert_eq!(tag_colour("", ""), WHITE);
        assert_eq!(kingdom_colour("a Bacteria b"), RED);
        assert_eq!(kingdom_colour("unknown"), GREY);
    }

    #[test]
    fn test_load_topo_alignment() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, test_alignment());
        let aln = TopoAlignment::load(&msa, &small_settings()).unwrap();
        assert_eq!(aln.stem, "fam");
        assert_eq!(aln.ids.len(), 5);
        assert_eq!(aln.aligned_topos[0].len(), 29);  // one all-gap column removed
        assert_eq!(aln.special.representative, vec![0]);
        assert_eq!(aln.special.final_topology, vec![4]);
        assert_eq!(aln.tm_box_rows, vec![0]);
        assert_eq!(aln.special_rows(), vec![4]);
        assert_eq!(aln.tags, vec!["", "OK", "OK", "SHIFT", ""]);
        assert_eq!(aln.tag_count(), 3);
        assert!(aln.residues.iter().all(|r| r.is_none()));
        assert!(aln.drawn_length() < 29);
        assert_eq!(aln.shrink_map.len(), aln.drawn_length());
        for tm_list in &aln.tm_lists { assert_eq!(tm_list.len(), 2); }
    }

    #[test]
    fn test_load_topo_alignment_unequal_lengths() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("bad.topomsa");
        make_test_file(&msa, ">a\niiMMoo\n>b\niiMM\n");
        assert!(TopoAlignment::load(&msa, &small_settings()).is_err());
        let empty = dir.path().join("empty.topomsa");
        make_test_file(&empty, "");
        assert!(TopoAlignment::load(&empty, &small_settings()).is_err());
    }

    #[test]
    fn test_load_topo_alignment_with_residues() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, ">s1\niiMMMoo\n>s2\ni-MMMoo\n");
        make_test_file(&dir.path().join("fam.fa"), ">s1\nAKLLLRE\n>s2\nTOOLONGSEQ\n");
        let settings = DrawSettings { shrink: None, ..small_settings() };
        let aln = TopoAlignment::load(&msa, &settings).unwrap();
        assert_eq!(aln.residues[0], Some("AKLLLRE".to_string()));
        assert_eq!(aln.residues[1], None);
        assert!(aln.shrink_map.is_empty());
    }

    #[test]
    fn test_clean_plot_makes_all_final() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, ">a\niiMMMoo\n>b\niiMMMoo\n");
        let settings = DrawSettings { clean_plot: true, ..small_settings() };
        let aln = TopoAlignment::load(&msa, &settings).unwrap();
        assert_eq!(aln.special.final_topology, vec![0, 1]);
        assert!(aln.tm_box_rows.is_empty());
        assert_eq!(special_row_label(&aln, 0, true), "A");
        assert_eq!(special_row_label(&aln, 1, true), "B");
        assert_eq!(special_row_label(&aln, 1, false), "Final Topology b");
    }

    #[test]
    fn test_layout() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, test_alignment());
        let fonts = Fonts::load().unwrap();
        let settings = small_settings();
        let aln = TopoAlignment::load(&msa, &settings).unwrap();
        let layout = Layout::new(&aln, &settings, &fonts, &msa);
        assert_eq!(layout.margin_x, 20);
        assert_eq!(layout.margin_y, 50);
        assert!(layout.draw_text);
        assert_eq!(layout.width, (layout.anno_width as i32 + aln.drawn_length() as i32)
                   * layout.cell_w + ANNO_SEQ_INTERVAL * layout.tm_w + 40);
        assert!(layout.height > layout.margin_y * 2 + 5 * layout.cell_h);
        assert!(layout.histo_height >= 50);
        assert!(layout.dg_height >= 30);

        // A tight pixel budget shrinks the font.
        let tight = DrawSettings { max_image_size: (layout.width * layout.height / 2) as u64,
                                   ..small_settings() };
        let small = Layout::new(&aln, &tight, &fonts, &msa);
        assert!(small.msa_font.size < layout.msa_font.size);
        assert!(small.pixel_count() <= tight.max_image_size || small.cell_w < 2);

        // The height-to-width ratio option widens the cells of this short alignment.
        let ratio = DrawSettings { h2w_ratio: Some(0.1), ..small_settings() };
        let wide = Layout::new(&aln, &ratio, &fonts, &msa);
        assert!(wide.cell_w > layout.cell_w);
    }

    #[test]
    fn test_render_png_and_svg() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, test_alignment());
        let fonts = Fonts::load().unwrap();
        let settings = DrawSettings { show_gap: true, tag_column: true, text: false,
                                      ..small_settings() };
        let aln = TopoAlignment::load(&msa, &settings).unwrap();
        let layout = Layout::new(&aln, &settings, &fonts, &msa);

        let mut png = PngCanvas::new(layout.width as u32, layout.height as u32, &fonts);
        render(&mut png, &aln, &layout, &settings, &fonts, &[]);
        // After shrinking, the first alignment row (seq1) starts with outside-loop cells.
        let row_y = layout.margin_y + layout.tm_row_height() + half_up(layout.scale_h as f64 * 2.5);
        let cell_x = layout.alignment_x() + layout.cell_w / 2;
        assert_eq!(png.pixel(cell_x as u32, (row_y + layout.cell_h - 2) as u32), MSA_LOOP_OUT);

        let mut svg = SvgCanvas::new(layout.width as u32, layout.height as u32, &fonts);
        render(&mut svg, &aln, &layout, &settings, &fonts, &[]);
        let labels = svg.text_contents();
        assert!(labels.iter().any(|l| l.starts_with("Final Topology")));
        assert!(labels.iter().any(|l| l == "% state M"));
        assert!(labels.iter().any(|l| l == "fam"));
    }

    #[test]
    fn test_draw_topology_msa() {
        let dir = tempdir().unwrap();
        let msa = dir.path().join("fam.topomsa");
        make_test_file(&msa, test_alignment());
        make_test_file(&dir.path().join("fam_dg.txt"),
                       "#SeqID rep1\n#Number of sliding windows: 4\n0 1.0\n5 -2.0\n10 3.5\n20 0.5\n");
        let fonts = Fonts::load().unwrap();
        let settings = DrawSettings { dg_profile: true, dg_legend: true, ..small_settings() };
        let out_png = dir.path().join("fam.png");
        let metrics = draw_topology_msa(&msa, &out_png, &settings, &fonts).unwrap();
        assert!(out_png.exists());
        assert_eq!(metrics.sequence_count, 5);
        assert_eq!(metrics.alignment_length, 29);
        assert_eq!(metrics.dg_profile_count, 1);
        assert_eq!(metrics.tag_counts["OK"], 2);
        assert_eq!(metrics.tm_count_max, 2);
        let img = image::open(&out_png).unwrap();
        assert_eq!(img.width(), metrics.image_width);
        assert_eq!(img.height(), metrics.image_height);

        let settings = DrawSettings { format: ImageFormat::Svg, shrink: None, ..small_settings() };
        let out_svg = dir.path().join("fam.svg");
        let metrics = draw_topology_msa(&msa, &out_svg, &settings, &fonts).unwrap();
        assert_eq!(metrics.drawn_length, 29);
        assert!(std::fs::read_to_string(&out_svg).unwrap().contains("<svg"));
    }
}
