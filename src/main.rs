// This is the main file of TopoMSA and where execution starts. It mainly handles the CLI and then
// calls into other files to run whichever subcommand the user chose.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;
use clap::{Parser, Subcommand, crate_version};

mod blosum;
mod canvas;
mod colour;
mod converters;
mod dgprofile;
mod draw;
mod itol;
mod itol_data;
mod log;
mod metrics;
mod misc;
mod newick;
mod seqaln;
mod shrink;
mod tmplot;
mod topology;

#[cfg(test)]
mod tests;

use canvas::ImageFormat;
use draw::DrawSettings;
use itol::{ItolMethod, ItolSettings};
use seqaln::SeqalnSettings;
use shrink::{ShrinkMethod, ShrinkSettings};
use tmplot::TmplotSettings;

#[derive(Parser)]
#[clap(name = "TopoMSA",
       version = concat!("v", crate_version!()),
       about = "a toolkit for visualising membrane protein topology alignments",
       before_help = concat!(r#"  _______                  __  __  _____"#, "\n",
                             r#" |__   __|                |  \/  |/ ____|  /\"#, "\n",
                             r#"    | | ___  _ __   ___   | \  / | (___   /  \"#, "\n",
                             r#"    | |/ _ \| '_ \ / _ \  | |\/| |\___ \ / /\ \"#, "\n",
                             r#"    | | (_) | |_) | (_) | | |  | |____) / ____ \"#, "\n",
                             r#"    |_|\___/| .__/ \___/  |_|  |_|_____/_/    \_\"#, "\n",
                             r#"            | |"#, "\n",
                             r#"            |_|"#))]
#[command(author, version, long_about = None, disable_help_subcommand = true,
          propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {

    /// iTOL colour definition of each protein's N-terminal state
    Iocolor {
        /// Topology MSA in FASTA format (required)
        #[clap(short = 'i', long = "in_msa", required = true)]
        in_msa: PathBuf,

        /// Output file (default: stdout)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,
    },

    /// iTOL label colours for the leaves of a tree, by annotation taxonomy
    Colorrange {
        /// Annotated protein sequences in FASTA format (required)
        #[clap(short = 'f', long = "fasta", required = true)]
        fasta: PathBuf,

        /// Tree in Newick format (required)
        #[clap(short = 't', long = "tree", required = true)]
        tree: PathBuf,

        /// Output file (default: stdout)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,
    },

    /// draw topology MSAs as PNG or SVG images
    Draw {
        /// Topology MSA files in FASTA format
        #[clap(short = 'i', long = "in_msa", num_args = 1..)]
        in_msa: Vec<PathBuf>,

        /// File listing topology MSA files, one per line
        #[clap(short = 'l', long = "in_list")]
        in_list: Option<PathBuf>,

        /// Output directory (default: same as each input file)
        #[clap(short = 'o', long = "out_dir")]
        out_dir: Option<PathBuf>,

        /// Image format
        #[clap(long = "format", value_enum, default_value_t = ImageFormat::Png)]
        format: ImageFormat,

        /// Font size for annotations and sequence text
        #[clap(long = "font_size", default_value = "16")]
        font_size: u32,

        /// Image scale factor
        #[clap(long = "image_scale", hide_default_value = true,
               help = "Image scale factor [default: automatic from sequence count]")]
        image_scale: Option<f64>,

        /// Fix the height-to-width ratio of the image
        #[clap(long = "h2w_ratio")]
        h2w_ratio: Option<f64>,

        /// Maximum image size in pixels
        #[clap(long = "max_image_size", default_value = "52428800")]
        max_image_size: u64,

        /// Do not shrink the font to keep the image under --max_image_size
        #[clap(long = "no_autosize")]
        no_autosize: bool,

        /// Do not draw sequence text in the MSA rows
        #[clap(long = "no_text")]
        no_text: bool,

        /// Do not draw separators between groups of sequences
        #[clap(long = "no_separators")]
        no_separators: bool,

        /// Do not draw the MSA rows
        #[clap(long = "no_msa")]
        no_msa: bool,

        /// Do not draw the scale bar
        #[clap(long = "no_scale_bar")]
        no_scale_bar: bool,

        /// Do not draw the membrane-state histogram
        #[clap(long = "no_histogram")]
        no_histogram: bool,

        /// Draw the DG profile of the representative protein
        #[clap(long = "dg_profile")]
        dg_profile: bool,

        /// Draw a colour legend for the DG profile
        #[clap(long = "dg_legend")]
        dg_legend: bool,

        /// Draw a column of group tags beside the annotations
        #[clap(long = "tag_column")]
        tag_column: bool,

        /// DG profile file (default: found next to the input)
        #[clap(long = "dgp_file")]
        dgp_file: Option<PathBuf>,

        /// Directory holding amino acid FASTA files (default: same as each input file)
        #[clap(long = "aa_path")]
        aa_path: Option<PathBuf>,

        /// Amino acid sequences for the proteins in the MSA
        #[clap(long = "aa_seq")]
        aa_seq: Option<PathBuf>,

        /// Method for shrinking the alignment
        #[clap(long = "shrink_method", value_enum, default_value_t = ShrinkMethod::Loops)]
        shrink_method: ShrinkMethod,

        /// Draw the alignment without shrinking
        #[clap(long = "no_shrink")]
        no_shrink: bool,

        /// TM shrinking rate for the proportional method
        #[clap(long = "shrink_rate_tm", default_value = "2.0")]
        shrink_rate_tm: f64,

        /// Longest loop kept by the proportional method
        #[clap(long = "max_hold_loop", default_value = "12")]
        max_hold_loop: usize,

        /// Keep and show K/R residues near TM helices
        #[clap(long = "kr_bias")]
        kr_bias: bool,

        /// Maximum distance from a TM helix for a shown K/R residue
        #[clap(long = "max_dist_kr", default_value = "12")]
        max_dist_kr: usize,

        /// Colour gaps within TM regions with the TM colour
        #[clap(long = "color_tm_box")]
        color_tm_box: bool,

        /// Colour annotations by kingdom
        #[clap(long = "color_kingdom")]
        color_kingdom: bool,

        /// Label TM helices with their index instead of sequence text
        #[clap(long = "show_tm_index")]
        show_tm_index: bool,

        /// Leave gaps blank in TM boxes
        #[clap(long = "show_gap")]
        show_gap: bool,

        /// Publication-style plot without special proteins
        #[clap(long = "clean_plot")]
        clean_plot: bool,
    },

    /// decorate phylogenetic trees with topology data and render them with iTOL
    Itol {
        /// Pfam IDs whose trees should be rendered
        pfam_ids: Vec<String>,

        /// File listing Pfam IDs, one per line
        #[clap(short = 'l', long = "pfam_list")]
        pfam_list: Option<PathBuf>,

        /// Tree in Newick format (required for the linear method)
        #[clap(short = 't', long = "tree")]
        tree: Option<PathBuf>,

        /// Annotated protein sequences for label colours (linear method)
        #[clap(short = 'f', long = "fasta")]
        fasta: Option<PathBuf>,

        /// Annotation method
        #[clap(short = 'm', long = "method", value_enum, default_value_t = ItolMethod::Basic)]
        method: ItolMethod,

        /// Directory holding <id>.tree files and their datasets
        #[clap(short = 'd', long = "data_dir", default_value = ".")]
        data_dir: PathBuf,

        /// Output directory (default: --data_dir, or the tree's directory for linear)
        #[clap(short = 'o', long = "out_dir")]
        out_dir: Option<PathBuf>,

        /// iTOL API key for uploading to a project
        #[clap(long = "api_key")]
        api_key: Option<String>,

        /// iTOL project name
        #[clap(long = "project")]
        project: Option<String>,

        /// Write datasets and zip files but do not upload
        #[clap(long = "dry_run")]
        dry_run: bool,
    },

    /// write the leaf order of Newick trees
    Listorder {
        /// Trees in Newick format (one or more required)
        #[clap(short = 'i', long = "in_trees", required = true, num_args = 1..)]
        in_trees: Vec<PathBuf>,

        /// Output directory (default: same as each tree)
        #[clap(short = 'o', long = "out_dir")]
        out_dir: Option<PathBuf>,
    },

    /// iTOL multibar of TM helix counts split by N-terminal state
    Numtm {
        /// Topology MSA in FASTA format (required)
        #[clap(short = 'i', long = "in_msa", required = true)]
        in_msa: PathBuf,

        /// Output file (default: stdout)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,

        /// Write plain id,in,out lines without a dataset header
        #[clap(long = "legacy")]
        legacy: bool,
    },

    /// remove all-gap columns from an alignment
    Rmgap {
        /// Alignment in FASTA format (required)
        #[clap(short = 'i', long = "in_msa", required = true)]
        in_msa: PathBuf,

        /// Output file (default: stdout)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,
    },

    /// HTML sequence alignment highlighted by TM regions
    Seqaln {
        /// Sequence alignments (X.aln) in FASTA format (one or more required)
        #[clap(short = 'i', long = "in_aln", required = true, num_args = 1..)]
        in_aln: Vec<PathBuf>,

        /// Output HTML file (required)
        #[clap(short = 'o', long = "out_html", required = true)]
        out_html: PathBuf,

        /// Output plain-text file
        #[clap(long = "out_txt")]
        out_txt: Option<PathBuf>,

        /// Extension of the matching topology MSA files
        #[clap(long = "topo_ext", default_value = "topomsa")]
        topo_ext: String,

        /// Alignment columns per line
        #[clap(long = "window", default_value = "60")]
        window: usize,

        /// Do not show the relationship line for pairwise alignments
        #[clap(long = "no_relation")]
        no_relation: bool,

        /// Remove all-gap columns
        #[clap(long = "rmgap")]
        rmgap: bool,

        /// Allow line breaks inside TM helices
        #[clap(long = "break_tm")]
        break_tm: bool,

        /// Publication-style output with rows labelled A, B, ...
        #[clap(long = "clean_plot")]
        clean_plot: bool,
    },

    /// amino acid fragments of TM helices
    Tmfrag {
        /// Topology MSA in FASTA format (required)
        #[clap(short = 'i', long = "in_topo", required = true)]
        in_topo: PathBuf,

        /// Amino acid sequences in FASTA format (required)
        #[clap(short = 'a', long = "aa_seq", required = true)]
        aa_seq: PathBuf,

        /// Output file (default: stdout)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,

        /// Write fragments without their sequence ID
        #[clap(long = "no_id")]
        no_id: bool,
    },

    /// combined topology plot and sequence alignment PDF
    Tmplot {
        /// Sequence alignment in FASTA format (required)
        #[clap(short = 's', long = "seq_aln", required = true)]
        seq_aln: PathBuf,

        /// Topology alignment in FASTA format (required)
        #[clap(short = 't', long = "topo_aln", required = true)]
        topo_aln: PathBuf,

        /// Output directory (required)
        #[clap(short = 'o', long = "out_dir", required = true)]
        out_dir: PathBuf,

        /// Width in pixels of the topology image
        #[clap(long = "resize", default_value = "5000")]
        resize: u32,

        /// Alignment columns per line
        #[clap(long = "window", default_value = "100")]
        window: usize,

        /// Height-to-width ratio of the topology image
        #[clap(long = "h2w_ratio", default_value = "0.08")]
        h2w_ratio: f64,

        /// Allow line breaks inside TM helices
        #[clap(long = "break_tm")]
        break_tm: bool,
    },
}


fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Colorrange { fasta, tree, out_file }) => {
            converters::colorrange(fasta, tree, out_file);
        },
        Some(Commands::Draw { in_msa, in_list, out_dir, format, font_size, image_scale, h2w_ratio,
                              max_image_size, no_autosize, no_text, no_separators, no_msa,
                              no_scale_bar, no_histogram, dg_profile, dg_legend, tag_column,
                              dgp_file, aa_path, aa_seq, shrink_method, no_shrink,
                              shrink_rate_tm, max_hold_loop, kr_bias, max_dist_kr, color_tm_box,
                              color_kingdom, show_tm_index, show_gap, clean_plot }) => {
            let shrink = if no_shrink { None } else {
                Some(ShrinkSettings { method: shrink_method, rate_tm: shrink_rate_tm,
                                      max_hold_loop })
            };
            let settings = DrawSettings {
                out_dir, format, font_size, image_scale, h2w_ratio, max_image_size,
                autosize: !no_autosize, text: !no_text, separators: !no_separators, msa: !no_msa,
                scale_bar: !no_scale_bar, histogram: !no_histogram, dg_profile, dg_legend,
                tag_column, dgp_file, aa_path, aa_seq, shrink, kr_bias, max_dist_kr, color_tm_box,
                color_kingdom, show_tm_index, show_gap, clean_plot,
            };
            draw::draw(in_msa, in_list, settings);
        },
        Some(Commands::Iocolor { in_msa, out_file }) => {
            converters::iocolor(in_msa, out_file);
        },
        Some(Commands::Itol { pfam_ids, pfam_list, tree, fasta, method, data_dir, out_dir,
                              api_key, project, dry_run }) => {
            let settings = ItolSettings { method, data_dir, out_dir, api_key, project, dry_run };
            itol::itol(pfam_ids, pfam_list, tree, fasta, settings);
        },
        Some(Commands::Listorder { in_trees, out_dir }) => {
            converters::listorder(in_trees, out_dir);
        },
        Some(Commands::Numtm { in_msa, out_file, legacy }) => {
            converters::numtm(in_msa, out_file, legacy);
        },
        Some(Commands::Rmgap { in_msa, out_file }) => {
            converters::rmgap(in_msa, out_file);
        },
        Some(Commands::Seqaln { in_aln, out_html, out_txt, topo_ext, window, no_relation, rmgap,
                                break_tm, clean_plot }) => {
            let settings = SeqalnSettings { topo_ext, window, relation: !no_relation, rmgap,
                                            break_tm, clean_plot };
            seqaln::seqaln(in_aln, out_html, out_txt, settings);
        },
        Some(Commands::Tmfrag { in_topo, aa_seq, out_file, no_id }) => {
            converters::tmfrag(in_topo, aa_seq, out_file, !no_id);
        },
        Some(Commands::Tmplot { seq_aln, topo_aln, out_dir, resize, window, h2w_ratio,
                                break_tm }) => {
            let settings = TmplotSettings { resize, window, h2w_ratio, break_tm };
            tmplot::tmplot(seq_aln, topo_aln, out_dir, settings);
        },
        None => {}
    }
}
