use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use ert_core::{Background, Content, Screen};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tiny_skia::{
    Color, ColorU8, FilterQuality, Paint, Pixmap, PixmapPaint, Rect, Transform,
};

const TEXT_PX: f32 = 36.0;
const PROMPT_PX: f32 = 48.0;
const ANCHOR_PX: f32 = 28.0;
/// Fraction of screen width the VAS line and wrapped text may occupy.
const CONTENT_WIDTH: f32 = 0.7;

/// Visual constants of the task, pulled out of the parameter table so
/// the renderer does not depend on it.
#[derive(Clone)]
pub struct RenderStyle {
    pub font_file: PathBuf,
    pub face_paths: Vec<PathBuf>,
    pub task_bg: [u8; 3],
    pub mood_bg: [u8; 3],
    pub text_color: [u8; 3],
    pub fix_cross_size: f32,
    /// Face height as a fraction of screen height.
    pub face_height: f32,
    pub prepped_key: char,
}

fn opaque(rgb: [u8; 3]) -> Color {
    Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255)
}

/// Draws whole frames for the task: every screen is a full clear plus a
/// handful of blits, which is cheap at the resolutions and frame rates
/// involved and keeps the presented frame independent of history.
pub struct SurfaceRenderer {
    width: u32,
    height: u32,
    font: FontVec,
    canvas: Pixmap,
    style: RenderStyle,
    faces: HashMap<PathBuf, Pixmap>,
    /// Keyed by text and integer pixel size.
    text_cache: HashMap<(String, u32), Pixmap>,
}

impl SurfaceRenderer {
    /// Loads the font and decodes every face image up front, so asset
    /// problems surface before the scanner is running.
    pub fn new(width: u32, height: u32, style: RenderStyle) -> Result<Self> {
        let font_bytes = fs::read(&style.font_file)
            .with_context(|| format!("cannot read font {}", style.font_file.display()))?;
        let font = FontVec::try_from_vec(font_bytes)
            .with_context(|| format!("cannot parse font {}", style.font_file.display()))?;

        let mut faces = HashMap::new();
        for path in &style.face_paths {
            faces.insert(path.clone(), load_image(path)?);
        }

        let canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("zero-sized canvas"))?;

        Ok(Self {
            width,
            height,
            font,
            canvas,
            style,
            faces,
            text_cache: HashMap::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(canvas) = Pixmap::new(width, height) {
            self.width = width;
            self.height = height;
            self.canvas = canvas;
        }
    }

    /// Renders the current screen into `frame` (RGBA, row-major, same
    /// size as the canvas).
    pub fn render(
        &mut self,
        screen: Option<&Screen>,
        rating_value: Option<f32>,
        frame: &mut [u8],
    ) -> Result<()> {
        let background = match screen.map(|s| s.background) {
            Some(Background::Mood) => self.style.mood_bg,
            _ => self.style.task_bg,
        };
        self.canvas.fill(opaque(background));

        let (cx, cy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        if let Some(screen) = screen {
            match &screen.content {
                Content::Instruction { top, bottom } => {
                    self.draw_wrapped(top, TEXT_PX, cx, cy - 120.0);
                    self.draw_wrapped(bottom, TEXT_PX, cx, cy + 120.0);
                }
                Content::ScannerPrep => {
                    self.draw_wrapped(
                        "Experimenter: is the scanner prepared?",
                        TEXT_PX,
                        cx,
                        cy - 60.0,
                    );
                    let hint =
                        format!("Press '{}' when ready.", self.style.prepped_key);
                    self.draw_wrapped(&hint, TEXT_PX, cx, cy + 60.0);
                }
                Content::ScannerWait => {
                    self.draw_wrapped("Waiting for scanner to start...", TEXT_PX, cx, cy);
                }
                Content::Fixation { .. } => self.draw_fixation(cx, cy),
                Content::Face { path, .. } => self.draw_face(path, cx, cy),
                Content::BlockPrompt { question } => {
                    self.draw_wrapped(question, PROMPT_PX, cx, cy);
                }
                Content::Rating {
                    question, anchors, ..
                } => {
                    let value = rating_value.unwrap_or(50.0);
                    self.draw_rating(question, anchors, value, cx, cy);
                }
                Content::End => {
                    self.draw_wrapped("Thank you for participating!", PROMPT_PX, cx, cy - 80.0);
                    self.draw_wrapped(
                        "Tell the experimenter you are done.",
                        TEXT_PX,
                        cx,
                        cy + 80.0,
                    );
                }
            }
        }

        let data = self.canvas.data();
        if frame.len() == data.len() {
            frame.copy_from_slice(data);
        }
        Ok(())
    }

    fn draw_fixation(&mut self, cx: f32, cy: f32) {
        let extent = self.style.fix_cross_size;
        let thickness = (extent / 12.0).max(2.0);
        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color(opaque(self.style.text_color));

        if let Some(h) =
            Rect::from_xywh(cx - extent / 2.0, cy - thickness / 2.0, extent, thickness)
        {
            self.canvas.fill_rect(h, &paint, Transform::identity(), None);
        }
        if let Some(v) =
            Rect::from_xywh(cx - thickness / 2.0, cy - extent / 2.0, thickness, extent)
        {
            self.canvas.fill_rect(v, &paint, Transform::identity(), None);
        }
    }

    fn draw_face(&mut self, path: &PathBuf, cx: f32, cy: f32) {
        let Some(face) = self.faces.get(path) else {
            return;
        };
        let target_h = self.style.face_height * self.height as f32;
        let scale = target_h / face.height() as f32;
        let w = face.width() as f32 * scale;
        let transform = Transform::from_row(
            scale,
            0.0,
            0.0,
            scale,
            cx - w / 2.0,
            cy - target_h / 2.0,
        );
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.canvas
            .draw_pixmap(0, 0, face.as_ref(), &paint, transform, None);
    }

    fn draw_rating(
        &mut self,
        question: &str,
        anchors: &[String],
        value: f32,
        cx: f32,
        cy: f32,
    ) {
        self.draw_wrapped(question, TEXT_PX, cx, cy - self.height as f32 * 0.2);

        let line_w = self.width as f32 * CONTENT_WIDTH;
        let line_y = cy + self.height as f32 * 0.1;
        let x0 = cx - line_w / 2.0;

        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color(opaque(self.style.text_color));

        if let Some(line) = Rect::from_xywh(x0, line_y - 1.5, line_w, 3.0) {
            self.canvas
                .fill_rect(line, &paint, Transform::identity(), None);
        }
        // End ticks.
        for tick_x in [x0, x0 + line_w] {
            if let Some(tick) = Rect::from_xywh(tick_x - 1.5, line_y - 15.0, 3.0, 30.0) {
                self.canvas
                    .fill_rect(tick, &paint, Transform::identity(), None);
            }
        }
        // Marker at the current value (0..=100 maps onto the line).
        let marker_x = x0 + line_w * (value / 100.0).clamp(0.0, 1.0);
        if let Some(marker) = Rect::from_xywh(marker_x - 3.0, line_y - 25.0, 6.0, 50.0) {
            self.canvas
                .fill_rect(marker, &paint, Transform::identity(), None);
        }

        // Anchor labels spread evenly under the line.
        let n = anchors.len();
        for (i, anchor) in anchors.iter().enumerate() {
            let frac = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.5 };
            self.draw_wrapped(anchor, ANCHOR_PX, x0 + line_w * frac, line_y + 60.0);
        }
    }

    /// Word-wraps `text` to the content width and draws it centered on
    /// `(cx, cy)`.
    fn draw_wrapped(&mut self, text: &str, size_px: f32, cx: f32, cy: f32) {
        let max_w = self.width as f32 * CONTENT_WIDTH;
        let lines = wrap_text(&self.font, text, size_px, max_w);
        let line_h = size_px * 1.3;
        let total_h = line_h * lines.len() as f32;
        let mut y = cy - total_h / 2.0 + line_h / 2.0;
        for line in lines {
            self.draw_text_line(&line, size_px, cx, y);
            y += line_h;
        }
    }

    fn draw_text_line(&mut self, text: &str, size_px: f32, cx: f32, cy: f32) {
        if text.is_empty() {
            return;
        }
        let key = (text.to_string(), size_px as u32);
        if !self.text_cache.contains_key(&key) {
            let pm = render_text_pixmap(&self.font, text, size_px, self.style.text_color);
            self.text_cache.insert(key.clone(), pm);
        }
        let pm = &self.text_cache[&key];
        let x = cx - pm.width() as f32 / 2.0;
        let y = cy - pm.height() as f32 / 2.0;
        self.canvas.draw_pixmap(
            x.round() as i32,
            y.round() as i32,
            pm.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}

fn advance_width(font: &impl Font, text: &str, size_px: f32) -> f32 {
    let sf = font.as_scaled(PxScale::from(size_px));
    let mut w = 0.0;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            w += sf.kern(p, id);
        }
        w += sf.h_advance(id);
        prev = Some(id);
    }
    w
}

/// Greedy word wrap against a pixel budget. A single word wider than
/// the budget gets its own line rather than being split.
fn wrap_text(font: &impl Font, text: &str, size_px: f32, max_w: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if advance_width(font, &candidate, size_px) <= max_w || current.is_empty() {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    lines
}

/// Rasterizes one line of text into a tight premultiplied pixmap.
fn render_text_pixmap(font: &impl Font, text: &str, size_px: f32, rgb: [u8; 3]) -> Pixmap {
    let scale = PxScale::from(size_px);
    let sf = font.as_scaled(scale);

    // Lay out glyphs with the baseline at the ascent.
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    // Union of the outlined pixel bounds.
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }
    if min_x == f32::INFINITY {
        return Pixmap::new(1, 1).expect("pixmap");
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h).expect("pixmap");

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            out.draw(|x, y, cov| {
                if cov <= f32::EPSILON {
                    return;
                }
                let ix = (x as f32 + b.min.x - min_x).floor() as i32;
                let iy = (y as f32 + b.min.y - min_y).floor() as i32;
                if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                    return;
                }
                let i = iy as usize * stride + ix as usize;
                let a = (cov * 255.0) as u8;
                // Glyphs never overlap within a line; last write wins.
                dst[i] = ColorU8::from_rgba(rgb[0], rgb[1], rgb[2], a).premultiply();
            });
        }
    }
    pm
}

fn load_image(path: &PathBuf) -> Result<Pixmap> {
    let img = image::open(path)
        .with_context(|| format!("cannot load image {}", path.display()))?
        .into_rgba8();
    let (w, h) = img.dimensions();
    let mut pm =
        Pixmap::new(w, h).ok_or_else(|| anyhow!("zero-sized image {}", path.display()))?;
    for (dst, src) in pm.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_font() -> FontVec {
        // Any TrueType font works for layout tests; the repo ships one.
        let bytes = fs::read("../assets/DejaVuSans.ttf")
            .or_else(|_| fs::read("assets/DejaVuSans.ttf"))
            .expect("test font");
        FontVec::try_from_vec(bytes).expect("test font parse")
    }

    #[test]
    fn wrap_respects_the_pixel_budget() {
        let font = test_font();
        let text = "You will see a series of faces and rate each one";
        let lines = wrap_text(&font, text, 36.0, 300.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(advance_width(&font, line, 36.0) <= 300.0, "line too wide: {line}");
        }
        // Nothing lost in the wrap.
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let font = test_font();
        let lines = wrap_text(&font, "a Supercalifragilisticexpialidocious b", 36.0, 100.0);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn text_pixmap_is_tight_and_nonempty() {
        let font = test_font();
        let pm = render_text_pixmap(&font, "Fixation", 36.0, [0, 0, 0]);
        assert!(pm.width() > 1 && pm.height() > 1);
        assert!(pm.pixels().iter().any(|p| p.alpha() > 0));
    }
}
