//! Page layout for sealed reports.
//!
//! Layout is computed before any PDF object exists so the final page count is
//! known up front and can be embedded in the QR metadata.

/// A4 in PDF points
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

pub const MARGIN_X: f32 = 50.0;
const TOP_Y: f32 = PAGE_HEIGHT - 80.0;
/// Lowest baseline for body text; the footer lives below it
const BOTTOM_Y: f32 = 80.0;
const FOOTER_Y: f32 = 40.0;
const FOOTER_SIZE: f32 = 8.0;

pub const QR_SIZE: f32 = 120.0;
pub const QR_X: f32 = PAGE_WIDTH - MARGIN_X - QR_SIZE;
pub const QR_Y: f32 = 50.0;

const BODY_SIZE: f32 = 10.0;
const LINE_SPACING: f32 = 1.35;
const BULLET_INDENT: f32 = 10.0;
const BULLET: &str = "\u{2022} ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
}

/// One positioned run of text
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub style: FontStyle,
    /// Fill gray level, 0 = black
    pub gray: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<TextLine>,
    /// Reserve the bottom-right corner for the QR code
    pub has_qr: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Evidence line on the cover page
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceLine {
    pub name: String,
    pub sha512: Option<String>,
}

/// Everything the layout needs; all strings are final (placeholders substituted)
#[derive(Debug, Clone)]
pub struct LayoutInput<'a> {
    pub title: &'a str,
    pub report: &'a str,
    pub evidence: &'a [EvidenceLine],
    pub metadata: &'a [String],
    pub footer: &'a str,
}

/// Markdown constructs the renderer understands
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Bullet(String),
    Paragraph(String),
    Spacer,
}

/// Split report markdown into blocks. Inline emphasis markers are dropped.
pub fn parse_markdown(text: &str) -> Vec<Block> {
    text.lines()
        .map(|raw| {
            let line = raw.trim();
            if line.is_empty() || line.chars().all(|c| c == '-' || c == '*' || c == '_') {
                Block::Spacer
            } else if let Some(rest) = line.strip_prefix("### ") {
                Block::Heading {
                    level: 3,
                    text: strip_inline(rest),
                }
            } else if let Some(rest) = line.strip_prefix("## ") {
                Block::Heading {
                    level: 2,
                    text: strip_inline(rest),
                }
            } else if let Some(rest) = line.strip_prefix("# ") {
                Block::Heading {
                    level: 1,
                    text: strip_inline(rest),
                }
            } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                Block::Bullet(strip_inline(rest))
            } else {
                Block::Paragraph(strip_inline(line))
            }
        })
        .collect()
}

fn strip_inline(text: &str) -> String {
    text.replace("**", "").replace('`', "").trim().to_string()
}

/// Helvetica advance widths (1/1000 em) for printable ASCII
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space ../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // : ; < = > ? @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [ \ ] ^ _ `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // { | } ~
];

/// Approximate rendered width of `text` in points
pub fn text_width(text: &str, size: f32, style: FontStyle) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (32..127).contains(&code) {
                u32::from(HELVETICA_WIDTHS[(code - 32) as usize])
            } else {
                556
            }
        })
        .sum();
    // Bold glyphs run slightly wider; overestimate rather than overflow
    let factor = match style {
        FontStyle::Regular => 1.0,
        FontStyle::Bold => 1.08,
    };
    units as f32 * size / 1000.0 * factor
}

/// Greedy word wrap. Words longer than a line are split by character.
pub fn wrap_text(text: &str, size: f32, style: FontStyle, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, size, style) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if text_width(word, size, style) <= max_width {
            current = word.to_string();
        } else {
            for c in word.chars() {
                current.push(c);
                if text_width(&current, size, style) > max_width {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Cursor that fills pages top to bottom, breaking when space runs out
struct Flow {
    pages: Vec<PageLayout>,
    current: PageLayout,
    y: f32,
}

impl Flow {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: PageLayout::default(),
            y: TOP_Y,
        }
    }

    fn break_page(&mut self) {
        let page = std::mem::take(&mut self.current);
        self.pages.push(page);
        self.y = TOP_Y;
    }

    fn space(&mut self, points: f32) {
        // Spacing at the top of a page is dropped
        if self.y < TOP_Y {
            self.y -= points;
        }
    }

    fn line(&mut self, text: String, x: f32, size: f32, style: FontStyle, gray: f32) {
        let height = size * LINE_SPACING;
        if self.y - height < BOTTOM_Y && !self.current.lines.is_empty() {
            self.break_page();
        }
        self.current.lines.push(TextLine {
            text,
            x,
            y: self.y,
            size,
            style,
            gray,
        });
        self.y -= height;
    }

    fn wrapped(&mut self, text: &str, x: f32, size: f32, style: FontStyle) {
        let max_width = PAGE_WIDTH - MARGIN_X - x;
        for line in wrap_text(text, size, style, max_width) {
            self.line(line, x, size, style, 0.0);
        }
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.lines.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn hash_halves(hash: &str) -> (String, String) {
    (hash.chars().take(64).collect(), hash.chars().skip(64).collect())
}

fn cover_pages(input: &LayoutInput<'_>) -> Vec<PageLayout> {
    let mut flow = Flow::new();
    flow.line("Verum Omnis V5".to_string(), MARGIN_X, 24.0, FontStyle::Bold, 0.0);
    flow.space(8.0);
    flow.wrapped(input.title, MARGIN_X, 18.0, FontStyle::Regular);
    flow.space(14.0);
    flow.line(
        "Evidence & Hashes:".to_string(),
        MARGIN_X,
        12.0,
        FontStyle::Bold,
        0.0,
    );
    flow.space(4.0);

    if input.evidence.is_empty() {
        flow.line("No evidence files attached.".to_string(), 60.0, 10.0, FontStyle::Regular, 0.3);
    }
    for item in input.evidence {
        flow.wrapped(&format!("{}{}", BULLET, item.name), 60.0, 10.0, FontStyle::Regular);
        match &item.sha512 {
            Some(hash) => {
                let (head, tail) = hash_halves(hash);
                flow.line(format!("SHA-512: {}", head), 70.0, 8.0, FontStyle::Regular, 0.2);
                if !tail.is_empty() {
                    flow.line(tail, 70.0, 8.0, FontStyle::Regular, 0.2);
                }
            }
            None => flow.line(
                "SHA-512: pending".to_string(),
                70.0,
                8.0,
                FontStyle::Regular,
                0.2,
            ),
        }
        flow.space(4.0);
    }
    flow.finish()
}

fn body_pages(report: &str) -> Vec<PageLayout> {
    let mut flow = Flow::new();
    for block in parse_markdown(report) {
        match block {
            Block::Heading { level, text } => {
                let size = match level {
                    1 => 18.0,
                    2 => 16.0,
                    _ => 14.0,
                };
                flow.space(8.0);
                flow.wrapped(&text, MARGIN_X, size, FontStyle::Bold);
                flow.space(2.0);
            }
            Block::Bullet(text) => {
                let x = MARGIN_X + BULLET_INDENT;
                let width = PAGE_WIDTH - MARGIN_X - x - BULLET_INDENT;
                let lines = wrap_text(&text, BODY_SIZE, FontStyle::Regular, width);
                for (i, line) in lines.into_iter().enumerate() {
                    if i == 0 {
                        flow.line(format!("{}{}", BULLET, line), x, BODY_SIZE, FontStyle::Regular, 0.0);
                    } else {
                        flow.line(line, x + BULLET_INDENT, BODY_SIZE, FontStyle::Regular, 0.0);
                    }
                }
            }
            Block::Paragraph(text) => flow.wrapped(&text, MARGIN_X, BODY_SIZE, FontStyle::Regular),
            Block::Spacer => flow.space(BODY_SIZE * 0.6),
        }
    }
    flow.finish()
}

fn metadata_page(metadata: &[String]) -> PageLayout {
    let mut flow = Flow::new();
    flow.line("Sealing Metadata".to_string(), MARGIN_X, 14.0, FontStyle::Bold, 0.0);
    flow.space(10.0);
    // Keep clear of the QR code
    let width = QR_X - MARGIN_X - 10.0;
    for entry in metadata {
        for line in wrap_text(entry, 11.0, FontStyle::Regular, width) {
            flow.line(line, MARGIN_X, 11.0, FontStyle::Regular, 0.0);
        }
    }
    let mut page = flow.finish().into_iter().next().unwrap_or_default();
    page.has_qr = true;
    page
}

/// Lay out cover, body and metadata pages, then stamp the footer on each
pub fn layout_document(input: &LayoutInput<'_>) -> DocumentLayout {
    let mut pages = cover_pages(input);
    pages.extend(body_pages(input.report));
    pages.push(metadata_page(input.metadata));

    for page in &mut pages {
        page.lines.push(TextLine {
            text: input.footer.to_string(),
            x: MARGIN_X,
            y: FOOTER_Y,
            size: FOOTER_SIZE,
            style: FontStyle::Regular,
            gray: 0.5,
        });
    }

    DocumentLayout { pages }
}
