// This file contains the code for the topomsa itol subcommand, which decorates Pfam family trees
// with topology datasets, uploads them to iTOL and exports the rendered trees.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use reqwest::blocking::{Client, multipart::Form};
use std::fmt;
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::itol_data::{read_domains, read_seq_lengths, read_species, read_subfamilies,
                       write_domain_architectures, write_kingdom_ranges, write_species_strip,
                       write_subfamily_ranges, write_taxonomy_label_colours};
use crate::log::{section_header, explanation, warning};
use crate::metrics::ItolMetrics;
use crate::misc::{check_if_dir_exists, check_if_file_exists, check_requirements, create_dir,
                  file_dir, file_root, load_fasta, load_id_list, program_available,
                  quit_with_error, run_command, spinner};
use crate::newick::read_leaf_names;


static ITOL_UPLOAD_URL: &str = "https://itol.embl.de/batch_uploader.cgi";
static ITOL_EXPORT_URL: &str = "https://itol.embl.de/batch_downloader.cgi";
static ITOL_TREE_URL: &str = "https://itol.embl.de/tree/";
static REQUEST_TIMEOUT_SECS: u64 = 600;
static THUMBNAIL_WIDTH: &str = "200";
static SPECIES_LEVELS: [(usize, &str); 3] = [(1, "Phylum"), (2, "Class"), (3, "Order")];


#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItolMethod {
    #[value(name = "0")]
    Basic,        // TM-count bars plus any colour definitions in the data directory
    #[value(name = "1")]
    Compare,      // as above with the comparison-class strip, exported as EPS
    #[value(name = "sd1")]
    Subfamilies,  // subfamily ranges
    #[value(name = "sd2")]
    Domains,      // domain architectures
    #[value(name = "sd3")]
    Species,      // kingdom ranges and phylum/class/order strips
    #[value(name = "linear")]
    Linear,       // a single tree with taxonomy-coloured labels
}

impl fmt::Display for ItolMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ItolMethod::Basic       => "0",
            ItolMethod::Compare     => "1",
            ItolMethod::Subfamilies => "sd1",
            ItolMethod::Domains     => "sd2",
            ItolMethod::Species     => "sd3",
            ItolMethod::Linear      => "linear",
        };
        write!(f, "{}", name)
    }
}

impl ItolMethod {
    fn out_suffix(&self) -> &'static str {
        match self {
            ItolMethod::Basic | ItolMethod::Compare => "-itol",
            ItolMethod::Subfamilies                 => "-itol-sd1",
            ItolMethod::Domains                     => "-itol-sd2",
            ItolMethod::Species                     => "-itol-sd3",
            ItolMethod::Linear                      => ".itol_linear",
        }
    }

    fn export_format(&self) -> &'static str {
        match self {
            ItolMethod::Basic | ItolMethod::Linear => "pdf",
            _ => "eps",
        }
    }
}


#[derive(Debug, Clone)]
pub struct ItolSettings {
    pub method: ItolMethod,
    pub data_dir: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub dry_run: bool,
}

impl Default for ItolSettings {
    fn default() -> Self {
        ItolSettings { method: ItolMethod::Basic, data_dir: PathBuf::from("."), out_dir: None,
                       api_key: None, project: None, dry_run: false }
    }
}


/// Everything needed to upload and export one tree.
#[derive(Debug)]
struct ItolJob {
    name: String,
    tree_file: PathBuf,
    leaf_count: usize,
    datasets: Vec<PathBuf>,
    out_stem: PathBuf,
    export: ExportParams,
    warnings: Vec<String>,
}


#[derive(Debug, Clone, PartialEq)]
struct ExportParams {
    format: &'static str,
    display_mode: u32,   // 1 = normal, 2 = circular
    font_size: Option<u32>,
    align_labels: bool,
    line_width: Option<u32>,
}


#[derive(Debug, PartialEq)]
struct UploadResult {
    tree_id: String,
    warnings: Vec<String>,
}


pub fn itol(pfam_ids: Vec<String>, pfam_list: Option<PathBuf>, tree: Option<PathBuf>,
            fasta: Option<PathBuf>, settings: ItolSettings) {
    let mut pfam_ids = pfam_ids;
    if let Some(list) = &pfam_list {
        check_if_file_exists(list);
        pfam_ids.extend(load_id_list(list));
    }
    check_settings(&pfam_ids, &tree, &fasta, &settings);
    starting_message();
    print_settings(&pfam_ids, &pfam_list, &tree, &fasta, &settings);

    section_header("Preparing datasets");
    explanation("Annotation files are gathered (and written where needed) for each tree, then \
                 packaged with the tree into a zip file for the iTOL batch uploader.");
    let jobs = if settings.method == ItolMethod::Linear {
        let tree = tree.as_ref().unwrap_or_else(|| quit_with_error("--tree is required"));
        vec![prepare_linear_job(tree, &fasta, &settings).unwrap_or_else(|e| quit_with_error(&e))]
    } else {
        pfam_ids.iter().filter_map(|id| {
            match prepare_pfam_job(id, &settings) {
                Ok(job) => Some(job),
                Err(e) => { warning(&e); None }
            }
        }).collect()
    };
    for job in &jobs {
        eprintln!("  {}: {} leaves, {} dataset{}", job.name, job.leaf_count, job.datasets.len(),
                  if job.datasets.len() == 1 { "" } else { "s" });
        for dataset in &job.datasets { eprintln!("    {}", dataset.display()); }
    }
    eprintln!();

    let mut out_files = Vec::new();
    for job in jobs {
        out_files.extend(run_job(job, &settings));
    }
    finished_message(&out_files, settings.dry_run);
}


fn check_settings(pfam_ids: &[String], tree: &Option<PathBuf>, fasta: &Option<PathBuf>,
                  settings: &ItolSettings) {
    check_requirements(&["zip"]);
    if settings.method == ItolMethod::Linear {
        match tree {
            Some(tree) => check_if_file_exists(tree),
            None => quit_with_error("--tree is required for the linear method"),
        }
        if let Some(fasta) = fasta { check_if_file_exists(fasta); }
    } else {
        if pfam_ids.is_empty() {
            quit_with_error("no Pfam IDs given (use positional IDs or --pfam_list)");
        }
        check_if_dir_exists(&settings.data_dir);
    }
}


fn starting_message() {
    section_header("Starting topomsa itol");
    explanation("This command decorates phylogenetic trees with topology annotations, uploads \
                 them to iTOL (Interactive Tree Of Life) and exports the rendered trees.");
}


fn print_settings(pfam_ids: &[String], pfam_list: &Option<PathBuf>, tree: &Option<PathBuf>,
                  fasta: &Option<PathBuf>, settings: &ItolSettings) {
    eprintln!("Settings:");
    eprintln!("  --method {}", settings.method);
    if settings.method == ItolMethod::Linear {
        if let Some(tree) = tree { eprintln!("  --tree {}", tree.display()); }
        if let Some(fasta) = fasta { eprintln!("  --fasta {}", fasta.display()); }
    } else {
        match pfam_list {
            Some(list) => eprintln!("  --pfam_list {} ({} IDs)", list.display(), pfam_ids.len()),
            None       => eprintln!("  {}", pfam_ids.join(" ")),
        }
        eprintln!("  --data_dir {}", settings.data_dir.display());
    }
    if let Some(out_dir) = &settings.out_dir { eprintln!("  --out_dir {}", out_dir.display()); }
    if settings.api_key.is_some() { eprintln!("  --api_key ********"); }
    if let Some(project) = &settings.project { eprintln!("  --project {}", project); }
    if settings.dry_run { eprintln!("  --dry_run"); }
    eprintln!();
}


fn finished_message(out_files: &[PathBuf], dry_run: bool) {
    section_header("Finished!");
    if out_files.is_empty() {
        eprintln!("No files were created.");
    } else {
        eprintln!("{}:", if dry_run { "iTOL upload packages" } else { "Exported trees" });
        for f in out_files { eprintln!("  {}", f.display()); }
    }
    eprintln!();
}


fn font_size(leaf_count: usize) -> u32 {
    // Larger trees get smaller labels.
    let size = 500.0 / (leaf_count.max(1) as f64).sqrt();
    size.clamp(30.0, 200.0).round() as u32
}


fn existing_files(candidates: Vec<PathBuf>) -> Vec<PathBuf> {
    candidates.into_iter().filter(|f| f.is_file()).collect()
}


fn prepare_pfam_job(pfam_id: &str, settings: &ItolSettings) -> Result<ItolJob, String> {
    let data_dir = &settings.data_dir;
    let out_dir = settings.out_dir.clone().unwrap_or_else(|| data_dir.clone());
    create_dir(&out_dir);
    let tree_file = data_dir.join(format!("{pfam_id}.tree"));
    if !tree_file.is_file() {
        return Err(format!("tree file {} does not exist, skipping {pfam_id}",
                           tree_file.display()));
    }
    let leaves = read_leaf_names(&tree_file)?;
    let data_file = |ext: &str| data_dir.join(format!("{pfam_id}.{ext}"));
    let out_file = |ext: &str| out_dir.join(format!("{pfam_id}.{ext}"));
    let numtm = data_file("numTM_and_io.txt");
    let mut warnings = Vec::new();

    let datasets = match settings.method {
        ItolMethod::Basic => existing_files(vec![
            numtm, data_file("cluster.colordef.txt"),
            data_file("pfam.colordef.txt"), data_file("branchlabel.txt")]),
        ItolMethod::Compare => existing_files(vec![
            numtm, data_file("cmpclass.colordef.txt"), data_file("cluster.colordef.txt"),
            data_file("pfam.colordef.txt"), data_file("branchlabel.txt")]),
        ItolMethod::Subfamilies => {
            let subfams = read_subfamilies(&data_file("subfamilies"))?;
            let colordef = out_file("subfamilies.colordef.txt");
            let missing = write_dataset(&colordef, |out| {
                write_subfamily_ranges(out, &subfams, &leaves)
            })?;
            for leaf in missing {
                warnings.push(format!("sequence {leaf} does not have a subfamily"));
            }
            let mut datasets = vec![colordef];
            datasets.extend(existing_files(vec![numtm]));
            datasets
        }
        ItolMethod::Domains => {
            let lengths = read_seq_lengths(&data_file("seqlen.txt"))?;
            let domains = read_domains(&data_file("mdp"))?;
            let colordef = out_file("mdp.colordef.txt");
            let no_length = write_dataset(&colordef, |out| {
                write_domain_architectures(out, &domains, &lengths, &leaves)
            })?;
            for seq_id in no_length {
                warnings.push(format!("sequence {seq_id} has no length, domains not shown"));
            }
            vec![colordef]
        }
        ItolMethod::Species => {
            let species = read_species(&data_file("species"))?;
            let kingdom_file = out_file("kingdom.colordef.txt");
            let missing = write_dataset(&kingdom_file, |out| {
                write_kingdom_ranges(out, &species, &leaves)
            })?;
            for leaf in missing {
                warnings.push(format!("sequence {leaf} has no kingdom definition"));
            }
            let mut datasets = vec![kingdom_file];
            for (level, label) in SPECIES_LEVELS {
                let strip_file = out_file(&format!("species.level_{level}.txt"));
                write_dataset(&strip_file, |out| {
                    write_species_strip(out, &species, &leaves, level, label)
                })?;
                datasets.push(strip_file);
            }
            datasets
        }
        ItolMethod::Linear => return Err("the linear method takes a tree file, not Pfam IDs".to_string()),
    };
    for w in &warnings { warning(w); }
    Ok(ItolJob {
        name: pfam_id.to_string(),
        leaf_count: leaves.len(),
        tree_file,
        datasets,
        out_stem: out_dir.join(format!("{pfam_id}{}", settings.method.out_suffix())),
        export: ExportParams {
            format: settings.method.export_format(),
            display_mode: 2,
            font_size: (settings.method != ItolMethod::Basic).then(|| font_size(leaves.len())),
            align_labels: true,
            line_width: None,
        },
        warnings,
    })
}


fn prepare_linear_job(tree: &Path, fasta: &Option<PathBuf>,
                      settings: &ItolSettings) -> Result<ItolJob, String> {
    // The linear method draws a single tree (normal display mode, thin branches) with leaf
    // labels coloured by the taxonomy in the FASTA headers.
    let tree_dir = file_dir(tree);
    let out_dir = settings.out_dir.clone().unwrap_or_else(|| tree_dir.clone());
    create_dir(&out_dir);
    let name = file_root(tree);
    let leaves = read_leaf_names(tree)?;
    let mut datasets = Vec::new();
    if let Some(fasta) = fasta {
        let colorrange = out_dir.join(format!("{}.colorrange.txt", file_root(fasta)));
        let records = load_fasta(fasta);
        let coloured = write_dataset(&colorrange, |out| {
            write_taxonomy_label_colours(out, &records, &leaves)
        })?;
        eprintln!("  {}: {} of {} leaves coloured by taxonomy", colorrange.display(), coloured,
                  leaves.len());
        datasets.push(colorrange);
    }
    Ok(ItolJob {
        name: name.clone(),
        leaf_count: leaves.len(),
        tree_file: tree.to_path_buf(),
        datasets,
        out_stem: out_dir.join(format!("{name}{}", ItolMethod::Linear.out_suffix())),
        export: ExportParams { format: "pdf", display_mode: 1, font_size: None,
                               align_labels: false, line_width: Some(1) },
        warnings: Vec::new(),
    })
}


fn write_dataset<T, F>(filename: &Path, write_fn: F) -> Result<T, String>
where F: FnOnce(&mut BufWriter<File>) -> std::io::Result<T> {
    let err = |e: std::io::Error| format!("failed to write {}\n{}", filename.display(), e);
    let file = File::create(filename).map_err(err)?;
    let mut writer = BufWriter::new(file);
    let result = write_fn(&mut writer).map_err(err)?;
    writer.flush().map_err(err)?;
    Ok(result)
}


fn run_job(job: ItolJob, settings: &ItolSettings) -> Vec<PathBuf> {
    section_header(&format!("iTOL: {}", job.name));
    let mut metrics = ItolMetrics::new();
    metrics.tree_file = job.tree_file.display().to_string();
    metrics.leaf_count = job.leaf_count;
    metrics.datasets = job.datasets.iter().map(|d| d.display().to_string()).collect();
    metrics.warnings = job.warnings.clone();
    let yaml_file = PathBuf::from(format!("{}.yaml", job.out_stem.display()));

    let zip_file = match build_zip(&job) {
        Ok(zip_file) => zip_file,
        Err(e) => {
            warning(&format!("could not package {}: {}", job.name, e));
            return Vec::new();
        }
    };
    eprintln!("Upload package: {}", zip_file.display());
    if settings.dry_run {
        eprintln!();
        metrics.save_to_yaml(&yaml_file);
        return vec![zip_file];
    }

    let client = match Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS)).build() {
        Ok(client) => client,
        Err(e) => quit_with_error(&format!("could not build HTTP client: {e}")),
    };
    let pb = spinner("uploading tree to iTOL...");
    let upload = upload_tree(&client, &zip_file, &job.name, settings);
    pb.finish_and_clear();
    let upload = match upload {
        Ok(upload) => upload,
        Err(e) => {
            warning(&format!("upload of {} failed: {}", job.name, e));
            metrics.save_to_yaml(&yaml_file);
            return Vec::new();
        }
    };
    let web_page = format!("{}{}", ITOL_TREE_URL, upload.tree_id);
    eprintln!("Tree ID: {}", upload.tree_id);
    eprintln!("Tree web page: {}", web_page);
    for w in &upload.warnings { warning(w); }
    metrics.tree_id = Some(upload.tree_id.clone());
    metrics.web_page = Some(web_page);
    metrics.warnings.extend(upload.warnings.iter().cloned());

    let export_file = PathBuf::from(format!("{}.{}", job.out_stem.display(), job.export.format));
    let pb = spinner(&format!("exporting tree to {}...", job.export.format.to_uppercase()));
    let exported = export_tree(&client, &upload.tree_id, job.datasets.len(), &job.export,
                               &export_file);
    pb.finish_and_clear();
    if let Err(e) = exported {
        warning(&format!("export of {} failed: {}", job.name, e));
        metrics.save_to_yaml(&yaml_file);
        return Vec::new();
    }
    eprintln!("Exported tree to {}", export_file.display());
    let mut out_files = vec![export_file.clone()];
    if settings.method != ItolMethod::Linear {
        out_files.extend(post_process(&export_file, &job.out_stem));
    }
    eprintln!();
    metrics.exported_files = out_files.iter().map(|f| f.display().to_string()).collect();
    metrics.save_to_yaml(&yaml_file);
    out_files
}


fn build_zip(job: &ItolJob) -> Result<PathBuf, String> {
    // iTOL's batch uploader takes a zip holding one tree (which must end in .tree) and any
    // number of dataset files (which must end in .txt).
    let staging = tempfile::tempdir().map_err(|e| format!("could not create temp dir: {e}"))?;
    let tree_copy = staging.path().join(format!("{}.tree", job.name));
    fs::copy(&job.tree_file, &tree_copy).map_err(|e| format!("could not copy tree: {e}"))?;
    let mut files = vec![tree_copy];
    for dataset in &job.datasets {
        let Some(file_name) = dataset.file_name() else { continue; };
        let mut name = file_name.to_string_lossy().to_string();
        if !name.ends_with(".txt") { name.push_str(".txt"); }
        let copy = staging.path().join(name);
        fs::copy(dataset, &copy).map_err(|e| format!("could not copy {}: {e}", dataset.display()))?;
        files.push(copy);
    }
    let zip_file = PathBuf::from(format!("{}.zip", job.out_stem.display()));
    if zip_file.exists() {
        fs::remove_file(&zip_file).map_err(|e| format!("could not replace {}: {e}",
                                                       zip_file.display()))?;
    }
    let mut args = vec![zip_file.as_os_str().to_owned(), "-j".into(), "-q".into()];
    args.extend(files.iter().map(|f| f.as_os_str().to_owned()));
    run_command("zip", &args, None)?;
    Ok(zip_file)
}


fn upload_tree(client: &Client, zip_file: &Path, name: &str,
               settings: &ItolSettings) -> Result<UploadResult, String> {
    let mut form = Form::new().text("treeName", name.to_string());
    if let Some(api_key) = &settings.api_key { form = form.text("APIkey", api_key.clone()); }
    if let Some(project) = &settings.project { form = form.text("projectName", project.clone()); }
    let form = form.file("zipFile", zip_file)
        .map_err(|e| format!("could not read {}: {e}", zip_file.display()))?;
    let response = client.post(ITOL_UPLOAD_URL).multipart(form).send()
        .map_err(|e| format!("request failed: {e}"))?;
    let status = response.status();
    let body = response.text().map_err(|e| format!("could not read response: {e}"))?;
    if !status.is_success() {
        return Err(format!("status {status}: {}", body.trim()));
    }
    parse_upload_response(&body)
}


fn parse_upload_response(body: &str) -> Result<UploadResult, String> {
    // The uploader replies with zero or more WARN lines and then either SUCCESS followed by the
    // new tree ID or an error message.
    let mut warnings = Vec::new();
    for line in body.lines().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("SUCCESS:") {
            let tree_id = rest.split_whitespace().next().unwrap_or("").to_string();
            if tree_id.is_empty() { return Err("no tree ID in iTOL response".to_string()); }
            return Ok(UploadResult { tree_id, warnings });
        } else if line.starts_with("WARN") {
            warnings.push(line.to_string());
        }
    }
    Err(if body.trim().is_empty() { "empty response from iTOL".to_string() }
        else { body.trim().to_string() })
}


fn export_form(tree_id: &str, dataset_count: usize, params: &ExportParams) -> Vec<(&'static str, String)> {
    let mut fields = vec![("tree", tree_id.to_string()),
                          ("format", params.format.to_string()),
                          ("display_mode", params.display_mode.to_string())];
    if params.align_labels { fields.push(("align_labels", "1".to_string())); }
    if let Some(size) = params.font_size { fields.push(("current_font_size", size.to_string())); }
    if let Some(width) = params.line_width { fields.push(("line_width", width.to_string())); }
    if dataset_count > 0 {
        let visible: Vec<String> = (0..dataset_count).map(|i| i.to_string()).collect();
        fields.push(("datasets_visible", visible.join(",")));
    }
    fields
}


fn export_tree(client: &Client, tree_id: &str, dataset_count: usize, params: &ExportParams,
               out_file: &Path) -> Result<(), String> {
    let form = export_form(tree_id, dataset_count, params).into_iter()
        .fold(Form::new(), |form, (key, value)| form.text(key, value));
    let response = client.post(ITOL_EXPORT_URL).multipart(form).send()
        .map_err(|e| format!("request failed: {e}"))?;
    let status = response.status();
    let bytes = response.bytes().map_err(|e| format!("could not read response: {e}"))?;
    if !status.is_success() || bytes.starts_with(b"ERROR") {
        return Err(String::from_utf8_lossy(&bytes).trim().to_string());
    }
    fs::write(out_file, &bytes).map_err(|e| format!("failed to write {}: {e}", out_file.display()))
}


fn post_process(export_file: &Path, out_stem: &Path) -> Vec<PathBuf> {
    // EPS exports are converted to PDF, and every export gets a JPEG and a thumbnail. These
    // steps are skipped (with a warning) when the tools are missing.
    let mut created = Vec::new();
    let stem = out_stem.display().to_string();
    if export_file.extension().is_some_and(|e| e == "eps") {
        match run_command("epstopdf", &[export_file], None) {
            Ok(()) => created.push(PathBuf::from(format!("{stem}.pdf"))),
            Err(e) => warning(&e),
        }
    }
    if !program_available("convert") {
        warning("ImageMagick convert not found, skipping JPEG and thumbnail images");
        return created;
    }
    let jpg_file = PathBuf::from(format!("{stem}.jpg"));
    if let Err(e) = run_command("convert", &[export_file, jpg_file.as_path()], None) {
        warning(&e);
        return created;
    }
    created.push(jpg_file.clone());
    let thumb_name = format!("thumb.{}", jpg_file.file_name().unwrap_or_default().to_string_lossy());
    let thumb_file = file_dir(&jpg_file).join(thumb_name);
    let args = [Path::new("-thumbnail"), Path::new(THUMBNAIL_WIDTH), jpg_file.as_path(),
                thumb_file.as_path()];
    match run_command("convert", &args, None) {
        Ok(()) => created.push(thumb_file),
        Err(e) => warning(&e),
    }
    created
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::tests::make_test_file;

    #[test]
    fn test_method_names() {
        assert_eq!(ItolMethod::from_str("0", false).unwrap(), ItolMethod::Basic);
        assert_eq!(ItolMethod::from_str("SD2", true).unwrap(), ItolMethod::Domains);
        assert!(ItolMethod::from_str("sd4", true).is_err());
        for method in ["0", "1", "sd1", "sd2", "sd3", "linear"] {
            assert_eq!(ItolMethod::from_str(method, false).unwrap().to_string(), method);
        }
    }

    #[test]
    fn test_font_size() {
        assert_eq!(font_size(1), 200);
        assert_eq!(font_size(4), 200);
        assert_eq!(font_size(25), 100);
        assert_eq!(font_size(100), 50);
        assert_eq!(font_size(10000), 30);
        assert_eq!(font_size(0), 200);
    }

    #[test]
    fn test_parse_upload_response() {
        let result = parse_upload_response("SUCCESS: 1234567890\n").unwrap();
        assert_eq!(result, UploadResult { tree_id: "1234567890".to_string(), warnings: vec![] });

        let body = "WARN: dataset 1 has unknown IDs\nWARN: another\nSUCCESS: 42abc\n";
        let result = parse_upload_response(body).unwrap();
        assert_eq!(result.tree_id, "42abc");
        assert_eq!(result.warnings.len(), 2);

        assert_eq!(parse_upload_response("ERROR: no tree file\n").unwrap_err(),
                   "ERROR: no tree file");
        assert!(parse_upload_response("").is_err());
        assert!(parse_upload_response("SUCCESS:\n").is_err());
    }

    #[test]
    fn test_export_form() {
        let params = ExportParams { format: "eps", display_mode: 2, font_size: Some(50),
                                    align_labels: true, line_width: None };
        let fields = export_form("99", 3, &params);
        assert!(fields.contains(&("tree", "99".to_string())));
        assert!(fields.contains(&("format", "eps".to_string())));
        assert!(fields.contains(&("current_font_size", "50".to_string())));
        assert!(fields.contains(&("datasets_visible", "0,1,2".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "line_width"));

        let params = ExportParams { format: "pdf", display_mode: 1, font_size: None,
                                    align_labels: false, line_width: Some(1) };
        let fields = export_form("99", 0, &params);
        assert!(fields.contains(&("line_width", "1".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "datasets_visible" || *k == "align_labels"));
    }

    #[test]
    fn test_prepare_pfam_job_basic() {
        let dir = tempdir().unwrap();
        make_test_file(&dir.path().join("PF00001.tree"), "((A:1,B:1):1,C:1);\n");
        make_test_file(&dir.path().join("PF00001.numTM_and_io.txt"), "A,2,0\n");
        make_test_file(&dir.path().join("PF00001.branchlabel.txt"), "A,x\n");
        let settings = ItolSettings { data_dir: dir.path().to_path_buf(), ..Default::default() };
        let job = prepare_pfam_job("PF00001", &settings).unwrap();
        assert_eq!(job.leaf_count, 3);
        assert_eq!(job.datasets.len(), 2);
        assert_eq!(job.out_stem, dir.path().join("PF00001-itol"));
        assert_eq!(job.export.format, "pdf");
        assert_eq!(job.export.font_size, None);

        assert!(prepare_pfam_job("PF99999", &settings).is_err());
    }

    #[test]
    fn test_prepare_pfam_job_subfamilies() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("out");
        make_test_file(&dir.path().join("PF00002.tree"), "((A:1,B:1):1,C:1);\n");
        make_test_file(&dir.path().join("PF00002.subfamilies"), "SF1: A B\n");
        let settings = ItolSettings { method: ItolMethod::Subfamilies,
                                      data_dir: dir.path().to_path_buf(),
                                      out_dir: Some(out_dir.clone()), ..Default::default() };
        let job = prepare_pfam_job("PF00002", &settings).unwrap();
        assert_eq!(job.datasets, vec![out_dir.join("PF00002.subfamilies.colordef.txt")]);
        assert_eq!(job.warnings.len(), 1);
        assert_eq!(job.out_stem, out_dir.join("PF00002-itol-sd1"));
        assert_eq!(job.export.format, "eps");
        assert_eq!(job.export.font_size, Some(200));
        let text = fs::read_to_string(&job.datasets[0]).unwrap();
        assert!(text.contains("B\trange\t#0000ff\tSF1\n"));
    }

    #[test]
    fn test_prepare_pfam_job_species() {
        let dir = tempdir().unwrap();
        make_test_file(&dir.path().join("PF00003.tree"), "(A,B);\n");
        make_test_file(&dir.path().join("PF00003.species"),
                       "A|x|Bacteria;Firmicutes;Bacilli;Bacillales\nB|y|Archaea;Euryarchaeota\n");
        let settings = ItolSettings { method: ItolMethod::Species,
                                      data_dir: dir.path().to_path_buf(), ..Default::default() };
        let job = prepare_pfam_job("PF00003", &settings).unwrap();
        assert_eq!(job.datasets.len(), 4);
        assert!(job.warnings.is_empty());
        let order = fs::read_to_string(dir.path().join("PF00003.species.level_3.txt")).unwrap();
        assert!(order.contains("DATASET_LABEL,Order\n"));
        assert!(order.contains("A,#0000ff,Bacillales\n"));
        assert!(!order.contains("B,"));
    }

    #[test]
    fn test_prepare_linear_job() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("family.nwk");
        let fasta = dir.path().join("family.fasta");
        make_test_file(&tree, "(Q1:0.1,Q2:0.2);\n");
        make_test_file(&fasta, ">Q1 kinase|Bacteria\nMKV\n>Q2 kinase|Archaea\nMKL\n");
        let settings = ItolSettings { method: ItolMethod::Linear, ..Default::default() };
        let job = prepare_linear_job(&tree, &Some(fasta), &settings).unwrap();
        assert_eq!(job.name, "family");
        assert_eq!(job.out_stem, dir.path().join("family.itol_linear"));
        assert_eq!(job.export.display_mode, 1);
        let text = fs::read_to_string(&job.datasets[0]).unwrap();
        assert!(text.contains("Q1\tlabel\t#800080\tbold\t2\n"));
        assert!(text.contains("Q2\tlabel\t#0000ff\tbold\t2\n"));
    }
}
