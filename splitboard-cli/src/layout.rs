//! Generate an HTML/SVG visualization of a keymap.
//!
//! One drawing per layer: the base layer shows every binding, each further
//! layer shows what the keys resolve to while it alone is held, with the keys
//! it remaps and the key that activates it highlighted.

use std::fmt::Write;

use splitboard_keymap::{KeyBinding, Keymap, LayerId};

/// Key cap side, in SVG units.
const KEY: f64 = 52.0;
/// Distance between neighbouring key origins.
const PITCH: f64 = KEY + 6.0;
const CORNER: f64 = 5.0;
/// Extra space between the two halves.
const SPLIT_GAP: f64 = 64.0;
const PAD: f64 = 24.0;
/// Room for a layer's title above its drawing.
const TITLE: f64 = 36.0;

/// Column stagger for the left half in units of `PITCH`, outermost column
/// first. The right half mirrors it; extra columns get none.
const STAGGER: [f64; 7] = [0.45, 0.30, 0.05, -0.10, 0.05, 0.35, 0.60];

const STYLE: &str = "
body { margin: 0; padding: 2em; background: #f4f1ea; color: #2b2b2b; font-family: sans-serif; }
rect { fill: #fffdf8; stroke: #8a8372; stroke-width: 1.2; }
rect.modifier { fill: #e3ecf5; stroke: #4d6f91; }
rect.override { fill: #e2f2e0; stroke: #3f8a3a; stroke-width: 2; }
rect.transparent { fill: #f4f1ea; stroke: #c9c2b1; stroke-dasharray: 3 2; }
rect.layer { fill: #efe2f3; stroke: #7d4e8c; }
rect.active { stroke: #c0392b; stroke-width: 3; }
text { font-family: monospace; font-size: 12px; text-anchor: middle; dominant-baseline: middle; }
text.small { font-size: 9px; }
text.title { font-family: sans-serif; font-size: 15px; font-weight: bold; text-anchor: start; }
";

/// Where one key cap sits in a layer drawing.
struct Key {
    x: f64,
    y: f64,
    index: usize,
}

fn place_keys(keymap: &Keymap<'_>) -> Vec<Key> {
    let split = keymap.split() as usize;
    let right_columns = keymap.columns() as usize - split;

    (0..keymap.len())
        .map(|index| {
            let position = keymap.position(index);
            let col = position.col as usize;
            let (x, stagger) = if col < split {
                (col as f64 * PITCH, STAGGER.get(col))
            } else {
                let local = col - split;
                (
                    (split + local) as f64 * PITCH + SPLIT_GAP,
                    STAGGER.get(right_columns - 1 - local),
                )
            };
            Key {
                x,
                y: (position.row as f64 + stagger.copied().unwrap_or(0.0)) * PITCH,
                index,
            }
        })
        .collect()
}

/// Width and height of one layer drawing.
fn extent(keys: &[Key]) -> (f64, f64) {
    keys.iter().fold((0.0, 0.0), |(w, h), k| {
        (f64::max(w, k.x + KEY), f64::max(h, k.y + KEY))
    })
}

/// Label and CSS class for one key while `layer` (or nothing) is held.
fn describe(keymap: &Keymap<'_>, index: usize, layer: Option<LayerId>) -> (String, &'static str) {
    match (keymap.base(index), layer) {
        (KeyBinding::Layer(id), held) => {
            let class = if held == Some(id) { "layer active" } else { "layer" };
            (keymap.layer(id).name.to_string(), class)
        }
        (KeyBinding::Key(code), Some(id)) => match keymap.layer(id).override_for(code) {
            Some(to) => (to.label().to_string(), "override"),
            None => (code.label().to_string(), "transparent"),
        },
        (KeyBinding::Key(code), None) if code.is_modifier() => {
            (code.label().to_string(), "modifier")
        }
        (KeyBinding::Key(code), None) => (code.label().to_string(), "key"),
    }
}

fn escape(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
        out
    })
}

fn draw_layer(svg: &mut String, keymap: &Keymap<'_>, keys: &[Key], layer: Option<LayerId>, top: f64) {
    let title = match layer {
        None => "Base".to_string(),
        Some(id) => format!("{} {}", id, keymap.layer(id).name),
    };
    let _ = writeln!(svg, r#"<g transform="translate({PAD} {top})">"#);
    let _ = writeln!(svg, r#"<text class="title" x="0" y="-14">{}</text>"#, escape(&title));

    for key in keys {
        let (label, class) = describe(keymap, key.index, layer);
        let size = if label.chars().count() > 3 { "small" } else { "" };
        let _ = writeln!(
            svg,
            r#"<rect class="{class}" x="{}" y="{}" width="{KEY}" height="{KEY}" rx="{CORNER}"/><text class="{size}" x="{}" y="{}">{}</text>"#,
            key.x,
            key.y,
            key.x + KEY / 2.0,
            key.y + KEY / 2.0,
            escape(&label),
        );
    }
    svg.push_str("</g>\n");
}

/// Generate the complete HTML document with inline SVG.
pub fn generate_html(keymap: &Keymap<'_>) -> String {
    let keys = place_keys(keymap);
    let (width, height) = extent(&keys);
    let drawings: Vec<Option<LayerId>> = std::iter::once(None)
        .chain(keymap.layers().map(|(id, _)| Some(id)))
        .collect();
    let step = height + TITLE + PAD;

    let mut svg = String::new();
    for (i, layer) in drawings.iter().enumerate() {
        draw_layer(&mut svg, keymap, &keys, *layer, PAD + TITLE + i as f64 * step);
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Splitboard keymap</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\n{svg}</svg>\n</body>\n</html>\n",
        width + 2.0 * PAD,
        drawings.len() as f64 * step + PAD,
    )
}
