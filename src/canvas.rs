// This file contains the drawing surfaces for topology images: a PNG canvas backed by an RGB image
// buffer and an SVG canvas backed by an SVG document. Both take the same calls, so the layout code
// in draw.rs doesn't care which format it is producing.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of TopoMSA. TopoMSA is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. TopoMSA
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with TopoMSA. If not, see <http://www.gnu.org/licenses/>.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use clap::ValueEnum;
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
                         draw_polygon_mut, draw_text_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::path::Path;
use svg::node::element::{Line, Rectangle, Text};
use svg::{Document, Node};

use crate::colour::{to_hex, WHITE};


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}


#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Face {
    #[default]
    Mono,
    Serif,
}

impl Face {
    fn svg_family(&self) -> &'static str {
        match self {
            Face::Mono  => "DejaVu Sans Mono, monospace",
            Face::Serif => "DejaVu Serif, serif",
        }
    }
}


// A font face at a size given in pixels per em, which is how font sizes are specified on the
// command line.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FontSpec {
    pub face: Face,
    pub size: f32,
}

impl FontSpec {
    pub fn mono(size: u32) -> Self {
        FontSpec { face: Face::Mono, size: size as f32 }
    }

    pub fn serif(size: u32) -> Self {
        FontSpec { face: Face::Serif, size: size as f32 }
    }
}


pub struct Fonts {
    mono: FontArc,
    serif: FontArc,
}

impl Fonts {
    pub fn load() -> Result<Self, String> {
        let mono = FontArc::try_from_slice(include_bytes!("assets/DejaVuSansMono.ttf"))
            .map_err(|e| format!("error loading monospace font: {}", e))?;
        let serif = FontArc::try_from_slice(include_bytes!("assets/DejaVuSerif.ttf"))
            .map_err(|e| format!("error loading serif font: {}", e))?;
        Ok(Fonts { mono, serif })
    }

    fn font(&self, face: Face) -> &FontArc {
        match face {
            Face::Mono  => &self.mono,
            Face::Serif => &self.serif,
        }
    }

    fn scale(&self, spec: FontSpec) -> PxScale {
        // ab_glyph scales fonts by line height, so convert from the em size.
        let font = self.font(spec.face);
        let units_per_em = font.units_per_em().unwrap_or(2048.0);
        PxScale::from(spec.size * font.height_unscaled() / units_per_em)
    }

    pub fn text_width(&self, text: &str, spec: FontSpec) -> f32 {
        let scaled_font = self.font(spec.face).as_scaled(self.scale(spec));
        text.chars().map(|c| scaled_font.h_advance(scaled_font.glyph_id(c))).sum()
    }

    pub fn line_height(&self, spec: FontSpec) -> f32 {
        let scaled_font = self.font(spec.face).as_scaled(self.scale(spec));
        scaled_font.ascent() - scaled_font.descent()
    }

    pub fn ascent(&self, spec: FontSpec) -> f32 {
        self.font(spec.face).as_scaled(self.scale(spec)).ascent()
    }

    pub fn text_size(&self, text: &str, spec: FontSpec) -> (u32, u32) {
        // Width and height in whole pixels, rounded up.
        (self.text_width(text, spec).ceil() as u32, self.line_height(spec).ceil() as u32)
    }
}


// Rectangle corners are inclusive, so a rectangle from (x0, y0) to (x1, y1) covers
// (x1 - x0 + 1) * (y1 - y0 + 1) pixels.
pub trait Canvas {
    fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>);
    fn outline_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32);
    fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32);

    // Text is positioned by the top-left corner of its line box.
    fn text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>);

    // Text rotated 90 degrees counterclockwise (reading upwards), positioned by the top-left
    // corner of the rotated box.
    fn vertical_text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>);

    fn save(&self, filename: &Path) -> Result<(), String>;

    fn box_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, fill: Rgb<u8>, outline: Rgb<u8>,
                width: u32) {
        self.fill_rect(x0, y0, x1, y1, fill);
        if width > 0 {
            self.outline_rect(x0, y0, x1, y1, outline, width);
        }
    }
}


pub fn new_canvas<'a>(format: ImageFormat, width: u32, height: u32,
                      fonts: &'a Fonts) -> Box<dyn Canvas + 'a> {
    match format {
        ImageFormat::Png => Box::new(PngCanvas::new(width, height, fonts)),
        ImageFormat::Svg => Box::new(SvgCanvas::new(width, height, fonts)),
    }
}


fn rect_between(x0: i32, y0: i32, x1: i32, y1: i32) -> Option<Rect> {
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (top, bottom) = (y0.min(y1), y0.max(y1));
    let width = (right - left + 1) as u32;
    let height = (bottom - top + 1) as u32;
    if width == 0 || height == 0 { return None; }
    Some(Rect::at(left, top).of_size(width, height))
}


pub struct PngCanvas<'a> {
    img: RgbImage,
    fonts: &'a Fonts,
}

impl<'a> PngCanvas<'a> {
    pub fn new(width: u32, height: u32, fonts: &'a Fonts) -> Self {
        PngCanvas { img: ImageBuffer::from_pixel(width.max(1), height.max(1), WHITE), fonts }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.img.get_pixel(x, y)
    }
}

impl Canvas for PngCanvas<'_> {

    fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>) {
        if let Some(rect) = rect_between(x0, y0, x1, y1) {
            draw_filled_rect_mut(&mut self.img, rect, colour);
        }
    }

    fn outline_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32) {
        // Thick outlines grow inwards.
        for i in 0..width as i32 {
            if x1 - x0 < 2 * i || y1 - y0 < 2 * i { break; }
            if let Some(rect) = rect_between(x0 + i, y0 + i, x1 - i, y1 - i) {
                draw_hollow_rect_mut(&mut self.img, rect, colour);
            }
        }
    }

    fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32) {
        if width <= 1 {
            draw_line_segment_mut(&mut self.img, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32),
                                  colour);
            return;
        }
        let (dx, dy) = ((x1 - x0) as f32, (y1 - y0) as f32);
        let length = (dx * dx + dy * dy).sqrt();
        let half = width as f32 / 2.0;
        if length < 1.0 {
            let h = half.round() as i32;
            self.fill_rect(x0 - h, y0 - h, x0 + h, y0 + h, colour);
            return;
        }
        let (nx, ny) = (-dy / length * half, dx / length * half);
        let corners = [(x0 as f32 + nx, y0 as f32 + ny), (x1 as f32 + nx, y1 as f32 + ny),
                       (x1 as f32 - nx, y1 as f32 - ny), (x0 as f32 - nx, y0 as f32 - ny)];
        let mut poly: Vec<Point<i32>> = corners.iter()
            .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32)).collect();
        poly.dedup();
        if poly.len() < 3 || poly.first() == poly.last() {
            draw_line_segment_mut(&mut self.img, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32),
                                  colour);
        } else {
            draw_polygon_mut(&mut self.img, &poly, colour);
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>) {
        let scale = self.fonts.scale(font);
        draw_text_mut(&mut self.img, colour, x, y, scale, self.fonts.font(font.face), text);
    }

    fn vertical_text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>) {
        // Draws the text onto a temp image and then copies it over, pixel-by-pixel, rotated.
        let (text_width, text_height) = self.fonts.text_size(text, font);
        if text_width == 0 || text_height == 0 { return; }
        let mut temp_img = ImageBuffer::from_pixel(text_width, text_height, WHITE);
        draw_text_mut(&mut temp_img, colour, 0, 0, self.fonts.scale(font),
                      self.fonts.font(font.face), text);
        let bottom = y + text_width as i32 - 1;
        for i in 0..text_width {
            let new_y = bottom - i as i32;
            if new_y < 0 || new_y >= self.img.height() as i32 { continue; }
            for j in 0..text_height {
                let new_x = x + j as i32;
                if new_x < 0 || new_x >= self.img.width() as i32 { continue; }
                let pixel = temp_img.get_pixel(i, j);
                if pixel != &WHITE {
                    self.img.put_pixel(new_x as u32, new_y as u32, *pixel);
                }
            }
        }
    }

    fn save(&self, filename: &Path) -> Result<(), String> {
        self.img.save(filename).map_err(|e| format!("failed to save {}\n{}", filename.display(), e))
    }
}


pub struct SvgCanvas<'a> {
    doc: Document,
    fonts: &'a Fonts,
}

impl<'a> SvgCanvas<'a> {
    pub fn new(width: u32, height: u32, fonts: &'a Fonts) -> Self {
        let doc = Document::new()
            .set("viewBox", (0, 0, width, height))
            .set("width", width)
            .set("height", height)
            .add(Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", width)
                .set("height", height)
                .set("fill", to_hex(WHITE)));
        SvgCanvas { doc, fonts }
    }

    #[cfg(test)]
    pub fn to_svg_string(&self) -> String {
        self.doc.to_string()
    }

    #[cfg(test)]
    pub fn text_contents(&self) -> Vec<String> {
        // The content of every <text> element, trimmed, with no-break spaces read back as spaces.
        let svg = self.to_svg_string();
        svg.split("<text").skip(1).filter_map(|part| {
            let start = part.find('>')? + 1;
            let end = part.find("</text>")?;
            Some(part[start..end].trim_matches(['\n', ' ']).replace('\u{a0}', " "))
        }).collect()
    }
}


fn svg_text_node(text: &str) -> Text {
    // SVG collapses runs of spaces and the writer puts text content on its own line, so spaces
    // become no-break spaces and the surrounding whitespace is left to be trimmed.
    Text::new(text.replace(' ', "\u{a0}"))
}

impl Canvas for SvgCanvas<'_> {

    fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>) {
        self.doc.append(Rectangle::new()
            .set("x", x0.min(x1))
            .set("y", y0.min(y1))
            .set("width", (x1 - x0).abs() + 1)
            .set("height", (y1 - y0).abs() + 1)
            .set("fill", to_hex(colour)));
    }

    fn outline_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32) {
        // SVG strokes are centred on the path, so inset by half the width to match the PNG.
        let w = width as f32;
        let (left, top) = (x0.min(x1) as f32, y0.min(y1) as f32);
        let box_width = ((x1 - x0).abs() + 1) as f32;
        let box_height = ((y1 - y0).abs() + 1) as f32;
        self.doc.append(Rectangle::new()
            .set("x", left + w / 2.0)
            .set("y", top + w / 2.0)
            .set("width", (box_width - w).max(0.0))
            .set("height", (box_height - w).max(0.0))
            .set("fill", "none")
            .set("stroke", to_hex(colour))
            .set("stroke-width", width));
    }

    fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: Rgb<u8>, width: u32) {
        self.doc.append(Line::new()
            .set("x1", x0)
            .set("y1", y0)
            .set("x2", x1)
            .set("y2", y1)
            .set("stroke", to_hex(colour))
            .set("stroke-width", width.max(1))
            .set("stroke-linecap", "square"));
    }

    fn text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>) {
        let baseline = y as f32 + self.fonts.ascent(font);
        self.doc.append(svg_text_node(text)
            .set("x", x)
            .set("y", baseline)
            .set("font-family", font.face.svg_family())
            .set("font-size", font.size)
            .set("fill", to_hex(colour)));
    }

    fn vertical_text(&mut self, x: i32, y: i32, text: &str, font: FontSpec, colour: Rgb<u8>) {
        let bottom = y as f32 + self.fonts.text_width(text, font);
        let baseline = bottom + self.fonts.ascent(font);
        self.doc.append(svg_text_node(text)
            .set("x", x)
            .set("y", baseline)
            .set("transform", format!("rotate(-90 {} {})", x, bottom))
            .set("font-family", font.face.svg_family())
            .set("font-size", font.size)
            .set("fill", to_hex(colour)));
    }

    fn save(&self, filename: &Path) -> Result<(), String> {
        svg::save(filename, &self.doc)
            .map_err(|e| format!("failed to save {}\n{}", filename.display(), e))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour::{BLACK, RED};

    #[test]
    fn test_fonts() {
        let fonts = Fonts::load().unwrap();
        let mono = FontSpec::mono(20);
        let w1 = fonts.text_width("M", mono);
        let w10 = fonts.text_width("MMMMMMMMMM", mono);
        assert!(w1 > 5.0 && w1 < 20.0);
        assert!((w10 - 10.0 * w1).abs() < 0.01);
        assert!((fonts.text_width("i", mono) - w1).abs() < 0.01);  // monospace
        assert!(fonts.line_height(mono) > 20.0);
        assert!(fonts.ascent(mono) < fonts.line_height(mono));
        assert!(fonts.text_width("M", FontSpec::mono(40)) > w1);
        assert_eq!(fonts.text_width("", mono), 0.0);
    }

    #[test]
    fn test_png_rects() {
        let fonts = Fonts::load().unwrap();
        let mut canvas = PngCanvas::new(20, 20, &fonts);
        assert_eq!(canvas.pixel(5, 5), WHITE);
        canvas.fill_rect(2, 2, 5, 5, RED);
        assert_eq!(canvas.pixel(2, 2), RED);
        assert_eq!(canvas.pixel(5, 5), RED);
        assert_eq!(canvas.pixel(6, 6), WHITE);
        canvas.outline_rect(10, 10, 19, 19, BLACK, 2);
        assert_eq!(canvas.pixel(10, 15), BLACK);
        assert_eq!(canvas.pixel(11, 15), BLACK);
        assert_eq!(canvas.pixel(12, 15), WHITE);
        assert_eq!(canvas.pixel(19, 19), BLACK);

        // Drawing off the edge is clipped rather than panicking.
        canvas.fill_rect(-5, -5, 30, 1, RED);
        canvas.line(-10, 3, 40, 3, BLACK, 3);
        assert_eq!(canvas.pixel(0, 0), RED);
        assert_eq!(canvas.pixel(15, 3), BLACK);
    }

    #[test]
    fn test_png_text() {
        let fonts = Fonts::load().unwrap();
        let mut canvas = PngCanvas::new(100, 100, &fonts);
        canvas.text(0, 0, "MMM", FontSpec::mono(30), BLACK);
        let dark = (0..50).flat_map(|x| (0..40).map(move |y| (x, y)))
            .filter(|&(x, y)| canvas.pixel(x, y) != WHITE).count();
        assert!(dark > 0);

        // Rotated text occupies a tall, narrow region.
        let mut canvas = PngCanvas::new(100, 100, &fonts);
        canvas.vertical_text(10, 10, "MMMM", FontSpec::mono(12), BLACK);
        let marked: Vec<(u32, u32)> = (0..100).flat_map(|x| (0..100).map(move |y| (x, y)))
            .filter(|&(x, y)| canvas.pixel(x, y) != WHITE).collect();
        let max_x = marked.iter().map(|p| p.0).max().unwrap();
        let max_y = marked.iter().map(|p| p.1).max().unwrap();
        let min_y = marked.iter().map(|p| p.1).min().unwrap();
        assert!(max_x < 30);
        assert!(max_y - min_y > 20);
    }

    #[test]
    fn test_svg_canvas() {
        let fonts = Fonts::load().unwrap();
        let mut canvas = SvgCanvas::new(200, 100, &fonts);
        canvas.box_rect(10, 10, 49, 29, RED, BLACK, 2);
        canvas.line(0, 50, 199, 50, BLACK, 1);
        canvas.text(5, 60, "TM1", FontSpec::serif(12), BLACK);
        canvas.vertical_text(5, 5, "label", FontSpec::mono(10), BLACK);
        let svg = canvas.to_svg_string();
        assert!(svg.contains("viewBox=\"0 0 200 100\""));
        assert!(svg.contains("fill=\"#ff0000\""));
        assert!(svg.contains("stroke-width=\"2\""));
        assert!(svg.contains("width=\"40\""));
        assert!(svg.contains("rotate(-90"));
        assert!(svg.contains("DejaVu Serif"));
        assert!(!svg.contains("xml:space"));
        assert_eq!(canvas.text_contents(), vec!["TM1", "label"]);
    }

    #[test]
    fn test_svg_text_spacing() {
        // Labels carry no padding, and runs of spaces survive as no-break spaces.
        let fonts = Fonts::load().unwrap();
        let mut canvas = SvgCanvas::new(100, 50, &fonts);
        canvas.text(0, 0, "ab  c", FontSpec::mono(10), BLACK);
        assert!(canvas.to_svg_string().contains("ab\u{a0}\u{a0}c"));
        assert_eq!(canvas.text_contents(), vec!["ab  c"]);
    }
}
