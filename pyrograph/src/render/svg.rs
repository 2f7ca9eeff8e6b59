//! Self-contained SVG flame graph document
//!
//! ## Document Structure
//!
//! ```text
//! <svg>
//!   background rect
//!   title (16px) / subtitle (total samples, search hint)
//!   [legend]                           (differential graphs only)
//!   details line                       (updated on hover)
//!   <g><title>tooltip</title><rect class="frame"/><text>label</text></g>  × visible frames
//!   <script> hover highlight, Ctrl+F search dimming, Escape reset </script>
//! </svg>
//! ```
//!
//! Frame names are escaped before they are embedded. Output is a pure
//! function of the tree and options, so rendering twice gives identical
//! bytes.

use std::io::Write;

use super::color::{warm_color, Rgb, NEUTRAL_GRAY};
use super::layout::{compute_layout, fit_label, FrameRect, Layout, LayoutConfig};
use crate::aggregation::FrameTree;
use crate::domain::RenderError;

/// Opacity of frames that do not match a search
const DIMMED_OPACITY: &str = "0.3";

const SCRIPT: &str = r"<script type='text/javascript'><![CDATA[
(function() {
  var frames = document.querySelectorAll('.frame');
  var details = document.getElementById('details');
  function reset() { frames.forEach(function(f) { f.style.opacity = '1'; }); }
  frames.forEach(function(f) {
    f.style.cursor = 'pointer';
    f.addEventListener('mouseover', function() {
      f.style.stroke = '#000'; f.style.strokeWidth = '0.5';
      var t = f.parentNode.querySelector('title');
      if (t && details) details.textContent = t.textContent;
    });
    f.addEventListener('mouseout', function() {
      f.style.stroke = 'none';
      if (details) details.textContent = '';
    });
  });
  document.addEventListener('keydown', function(e) {
    if (e.ctrlKey && e.key === 'f') {
      e.preventDefault();
      var term = prompt('Search function name:');
      if (!term) { reset(); return; }
      term = term.toLowerCase();
      frames.forEach(function(f) {
        var t = f.parentNode.querySelector('title');
        var hit = t && t.textContent.toLowerCase().indexOf(term) >= 0;
        f.style.opacity = hit ? '1' : 'DIMMED';
      });
    }
    if (e.key === 'Escape') { reset(); }
  });
})();
]]></script>
";

/// Title and geometry of a rendered graph
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    pub title: String,
    pub layout: LayoutConfig,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self { title: "Flame Graph".to_string(), layout: LayoutConfig::default() }
    }
}

/// Escape the characters that are structural in XML
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a frame tree as an SVG flame graph
///
/// # Errors
/// - [`RenderError::NoSamples`] if the tree is empty
/// - [`RenderError::InvalidWidth`] for a canvas narrower than its margins
/// - [`RenderError::Io`] if writing fails
pub fn render_flamegraph<W: Write>(tree: &FrameTree, options: &SvgOptions, mut out: W) -> Result<(), RenderError> {
    let layout = compute_layout(tree, &options.layout)?;
    let total = tree.total_samples();

    let subtitle = format!("{total} samples. Ctrl+F to search, Esc to reset.");
    write_header(&mut out, &layout, &options.title, &subtitle)?;
    write_details(&mut out, &layout)?;

    for rect in &layout.rects {
        let node = tree.node(rect.id);
        let fill = if rect.depth == 0 { NEUTRAL_GRAY } else { warm_color(&node.name) };
        let self_share = if node.self_count > 0 {
            format!(", self: {:.1}%", percent(node.self_count, total))
        } else {
            String::new()
        };
        let tooltip =
            format!("{} ({} samples, {:.1}%{self_share})", node.name, node.inclusive, percent(node.inclusive, total));
        write_frame(&mut out, rect, &node.name, &tooltip, fill, &options.layout)?;
    }

    write_footer(&mut out)
}

/// [`render_flamegraph`] into a string
///
/// # Errors
/// As [`render_flamegraph`].
pub fn render_flamegraph_to_string(tree: &FrameTree, options: &SvgOptions) -> Result<String, RenderError> {
    let mut buffer = Vec::new();
    render_flamegraph(tree, options, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// `part` as a percentage of `whole`
#[allow(clippy::cast_precision_loss)]
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

pub(crate) fn write_header<W: Write, Id>(
    out: &mut W,
    layout: &Layout<Id>,
    title: &str,
    subtitle: &str,
) -> Result<(), RenderError> {
    let (width, height) = (layout.width, layout.height);
    let center = width / 2;
    writeln!(out, r#"<?xml version="1.0" standalone="no"?>"#)?;
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    )?;
    writeln!(out, r##"<rect width="100%" height="100%" fill="#f8f8f8" />"##)?;
    writeln!(
        out,
        r##"<text x="{center}" y="20" font-size="16" font-family="sans-serif" text-anchor="middle" fill="#333">{}</text>"##,
        escape_xml(title)
    )?;
    writeln!(
        out,
        r##"<text x="{center}" y="36" font-size="11" font-family="sans-serif" text-anchor="middle" fill="#888">{}</text>"##,
        escape_xml(subtitle)
    )?;
    Ok(())
}

pub(crate) fn write_details<W: Write, Id>(out: &mut W, layout: &Layout<Id>) -> Result<(), RenderError> {
    writeln!(
        out,
        r##"<text id="details" x="4" y="{}" font-size="11" font-family="monospace" fill="#333"></text>"##,
        layout.height.saturating_sub(6)
    )?;
    Ok(())
}

pub(crate) fn write_frame<W: Write, Id>(
    out: &mut W,
    rect: &FrameRect<Id>,
    name: &str,
    tooltip: &str,
    fill: Rgb,
    config: &LayoutConfig,
) -> Result<(), RenderError> {
    let row_height = config.row_height;
    writeln!(out, "<g>")?;
    writeln!(out, "<title>{}</title>", escape_xml(tooltip))?;
    writeln!(
        out,
        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{}" fill="{fill}" rx="1" ry="1" class="frame" />"#,
        rect.x,
        rect.y,
        rect.width,
        row_height.saturating_sub(1)
    )?;
    if let Some(label) = fit_label(name, rect.width, config) {
        writeln!(
            out,
            r##"<text x="{:.1}" y="{:.1}" font-size="{}" font-family="monospace" fill="#000">{}</text>"##,
            rect.x + 3.0,
            rect.y + f64::from(row_height) - 4.0,
            config.font_size,
            escape_xml(&label)
        )?;
    }
    writeln!(out, "</g>")?;
    Ok(())
}

pub(crate) fn write_footer<W: Write>(out: &mut W) -> Result<(), RenderError> {
    out.write_all(SCRIPT.replace("DIMMED", DIMMED_OPACITY).as_bytes())?;
    writeln!(out, "</svg>")?;
    out.flush()?;
    Ok(())
}
