// This file contains the code for writing TopoMSA's YAML files of metrics.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::misc::quit_with_error;


#[derive(Serialize, Deserialize, Debug, Default)]
pub struct DrawMetrics {
    pub input_file: String,
    pub output_file: String,
    pub sequence_count: usize,
    pub alignment_length: usize,
    pub drawn_length: usize,
    pub representative_count: usize,
    pub pdb_count: usize,
    pub final_count: usize,
    pub tag_counts: BTreeMap<String, usize>,
    pub tm_count_min: usize,
    pub tm_count_max: usize,
    pub tm_count_mean: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub image_scale: f64,
    pub font_size: u32,
    pub tm_box_font_size: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub text_drawn: bool,
    pub dg_profile_count: usize,
}

impl DrawMetrics {
    pub fn new() -> Self { Self::default() }

    pub fn set_tm_counts(&mut self, counts: &[usize]) {
        self.tm_count_min = counts.iter().copied().min().unwrap_or(0);
        self.tm_count_max = counts.iter().copied().max().unwrap_or(0);
        self.tm_count_mean = if counts.is_empty() { 0.0 }
                             else { counts.iter().sum::<usize>() as f64 / counts.len() as f64 };
    }

    pub fn save_to_yaml(&self, filename: &Path) { save_yaml_or_quit(filename, self); }
}


#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ItolMetrics {
    pub tree_file: String,
    pub leaf_count: usize,
    pub datasets: Vec<String>,
    pub tree_id: Option<String>,
    pub web_page: Option<String>,
    pub warnings: Vec<String>,
    pub exported_files: Vec<String>,
}

impl ItolMetrics {
    pub fn new() -> Self { Self::default() }

    pub fn save_to_yaml(&self, filename: &Path) { save_yaml_or_quit(filename, self); }
}


fn save_yaml_or_quit<T: Serialize>(filename: &Path, data: T) {
    if let Err(e) = save_yaml(filename, data) {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


fn save_yaml<T: Serialize>(yaml_filename: &Path, data: T) -> io::Result<()> {
    let yaml_string = serde_yaml::to_string(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut file = File::create(yaml_filename)?;
    file.write_all(yaml_string.as_bytes())?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_tm_counts() {
        let mut metrics = DrawMetrics::new();
        metrics.set_tm_counts(&[2, 4, 3, 3]);
        assert_eq!(metrics.tm_count_min, 2);
        assert_eq!(metrics.tm_count_max, 4);
        assert_eq!(metrics.tm_count_mean, 3.0);
        metrics.set_tm_counts(&[]);
        assert_eq!(metrics.tm_count_max, 0);
        assert_eq!(metrics.tm_count_mean, 0.0);
    }

    #[test]
    fn test_save_to_yaml() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("fam.yaml");
        let mut metrics = DrawMetrics::new();
        metrics.sequence_count = 12;
        metrics.tag_counts.insert("OK".to_string(), 7);
        metrics.save_to_yaml(&yaml);
        let text = std::fs::read_to_string(&yaml).unwrap();
        assert!(text.contains("sequence_count: 12"));
        let loaded: DrawMetrics = serde_yaml::from_str(&text).unwrap();
        assert_eq!(loaded.tag_counts["OK"], 7);

        let mut itol = ItolMetrics::new();
        itol.tree_id = Some("123456".to_string());
        let itol_yaml = dir.path().join("itol.yaml");
        itol.save_to_yaml(&itol_yaml);
        assert!(std::fs::read_to_string(&itol_yaml).unwrap().contains("123456"));
    }
}
