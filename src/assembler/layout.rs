//! Greedy text pagination.
//!
//! Lines are filled word by word while the estimated width
//! `chars × font_size × width_factor` fits the printable width. A word that
//! would overflow starts the next line; a single word wider than the page is
//! placed alone rather than hyphenated. The vertical cursor starts at
//! `height − margin` and drops by `1.5 × font_size` per line; a line that
//! would sit below the bottom margin starts a new page.
//!
//! Hard line breaks in the input are kept: each input line wraps on its own
//! and a blank input line becomes an empty spacer line.

use crate::error::DocForgeError;
use serde::{Deserialize, Serialize};

/// Line height as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.5;

/// Page size and type metrics, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
    /// Average glyph advance as a fraction of the font size.
    pub width_factor: f32,
}

impl Default for PageGeometry {
    /// A4 portrait, 50 pt margins, 12 pt text.
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 50.0,
            font_size: 12.0,
            width_factor: 0.5,
        }
    }
}

impl PageGeometry {
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_FACTOR
    }

    pub fn printable_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    /// Baseline of the first line on every page.
    pub fn top(&self) -> f32 {
        self.height - self.margin
    }

    /// Check that at least one character fits on at least one line.
    pub fn validate(&self) -> Result<(), String> {
        let all_finite = [
            self.width,
            self.height,
            self.margin,
            self.font_size,
            self.width_factor,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err("dimensions must be finite".into());
        }
        if self.font_size <= 0.0 || self.width_factor <= 0.0 {
            return Err(format!(
                "font size and width factor must be positive (got {} and {})",
                self.font_size, self.width_factor
            ));
        }
        if self.margin < 0.0 {
            return Err(format!("margin must not be negative (got {})", self.margin));
        }
        if self.printable_width() <= 0.0 {
            return Err(format!(
                "margins of {} leave no printable width on a {} pt page",
                self.margin, self.width
            ));
        }
        if self.top() < self.margin {
            return Err(format!(
                "margins of {} leave no printable height on a {} pt page",
                self.margin, self.height
            ));
        }
        Ok(())
    }
}

/// One laid-out line and the baseline it sits on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutLine {
    pub text: String,
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutPage {
    pub lines: Vec<LayoutLine>,
}

/// Pages of positioned lines, together with the geometry used to place them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLayout {
    pub geometry: PageGeometry,
    pub pages: Vec<LayoutPage>,
}

impl TextLayout {
    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|p| p.lines.len()).sum()
    }
}

/// Wrap and paginate `text` for `geometry`.
///
/// Empty or whitespace-only text yields exactly one empty page.
///
/// # Errors
/// [`DocForgeError::MalformedText`] for control characters other than tab,
/// line feed and carriage return, or for geometry with no printable area.
pub fn layout_text_to_pages(
    text: &str,
    geometry: &PageGeometry,
) -> Result<TextLayout, DocForgeError> {
    geometry
        .validate()
        .map_err(|reason| DocForgeError::MalformedText { reason })?;

    if let Some(c) = text
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(DocForgeError::MalformedText {
            reason: format!("control character U+{:04X}", c as u32),
        });
    }

    let mut pages = Paginator::new(*geometry);
    if text.trim().is_empty() {
        return Ok(pages.finish());
    }

    let char_width = geometry.font_size * geometry.width_factor;
    let max_width = geometry.printable_width();

    for input_line in text.trim_end().lines() {
        let mut line = String::new();
        let mut line_chars = 0usize;

        for word in input_line.split_whitespace() {
            let word_chars = word.chars().count();
            if line.is_empty() {
                // Always accept: an over-long word goes on a line of its own.
                line.push_str(word);
                line_chars = word_chars;
                continue;
            }
            let candidate = line_chars + 1 + word_chars;
            if candidate as f32 * char_width <= max_width {
                line.push(' ');
                line.push_str(word);
                line_chars = candidate;
            } else {
                pages.commit(std::mem::take(&mut line));
                line.push_str(word);
                line_chars = word_chars;
            }
        }

        pages.commit(line);
    }

    Ok(pages.finish())
}

/// Vertical cursor and the pages filled so far.
struct Paginator {
    geometry: PageGeometry,
    done: Vec<LayoutPage>,
    current: LayoutPage,
    y: f32,
}

impl Paginator {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            done: Vec::new(),
            current: LayoutPage::default(),
            y: geometry.top(),
        }
    }

    fn commit(&mut self, text: String) {
        if self.y < self.geometry.margin {
            // A spacer never opens a page.
            if text.is_empty() {
                return;
            }
            self.done.push(std::mem::take(&mut self.current));
            self.y = self.geometry.top();
        }
        self.current.lines.push(LayoutLine { text, y: self.y });
        self.y -= self.geometry.line_height();
    }

    fn finish(mut self) -> TextLayout {
        self.done.push(self.current);
        TextLayout {
            geometry: self.geometry,
            pages: self.done,
        }
    }
}
