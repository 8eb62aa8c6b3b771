// This file contains colour constants and helpers shared by the image, HTML and iTOL outputs.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use image::Rgb;


pub static WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub static BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub static GREY: Rgb<u8> = Rgb([128, 128, 128]);
pub static RED: Rgb<u8> = Rgb([255, 0, 0]);
pub static GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub static BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub static VIOLET: Rgb<u8> = Rgb([238, 130, 238]);

// TM boxes above and below the alignment.
pub static TM_OUT_TO_IN: Rgb<u8> = Rgb([220, 220, 220]);
pub static TM_IN_TO_OUT: Rgb<u8> = Rgb([128, 128, 128]);
pub static LOOP_IN: Rgb<u8> = Rgb([255, 255, 0]);
pub static LOOP_OUT: Rgb<u8> = Rgb([51, 153, 255]);

// Cells of the alignment rows.
pub static MSA_OUT_TO_IN: Rgb<u8> = Rgb([255, 102, 102]);
pub static MSA_IN_TO_OUT: Rgb<u8> = Rgb([204, 0, 0]);
pub static MSA_LOOP_IN: Rgb<u8> = Rgb([242, 234, 189]);
pub static MSA_LOOP_OUT: Rgb<u8> = Rgb([204, 255, 255]);
pub static MSA_SIGNAL_PEPTIDE: Rgb<u8> = Rgb([0, 0, 0]);


pub fn to_hex(colour: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", colour[0], colour[1], colour[2])
}


pub fn gradient(count: usize) -> Vec<Rgb<u8>> {
    // `count` colours running from blue to red through the hue wheel (full saturation, half
    // lightness), as used for DG profiles and iTOL colour strips.
    let start_hue = 2.0 / 3.0;
    (0..count).map(|i| {
        let t = if count > 1 { i as f64 / (count - 1) as f64 } else { 0.0 };
        hsl_to_rgb(start_hue * (1.0 - t), 1.0, 0.5)
    }).collect()
}


fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb<u8> {
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return Rgb([v, v, v]);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0      { p + (q - p) * 6.0 * t }
                else if t < 0.5       { q }
                else if t < 2.0 / 3.0 { p + (q - p) * (2.0 / 3.0 - t) * 6.0 }
                else                  { p };
        (v * 255.0).round() as u8
    };
    Rgb([channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(MSA_IN_TO_OUT), "#cc0000");
        assert_eq!(to_hex(LOOP_OUT), "#3399ff");
        assert_eq!(to_hex(MSA_LOOP_IN), "#f2eabd");
    }

    #[test]
    fn test_gradient() {
        assert!(gradient(0).is_empty());
        assert_eq!(gradient(1), vec![BLUE]);
        let colours = gradient(3);
        assert_eq!(colours[0], BLUE);
        assert_eq!(colours[1], GREEN);
        assert_eq!(colours[2], RED);
        assert_eq!(gradient(7).len(), 7);
    }
}
